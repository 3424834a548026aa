//! Step domain model
//!
//! A step is one unit of pipeline work. Three variants are provided:
//! [`NoopStep`] (a named placeholder, useful for pure condition gates),
//! [`ProcessStep`] (an ordered sequence of shell commands) and
//! [`CallableStep`] (a closure invoked with a tee write endpoint). All three
//! carry optional precondition/postcondition predicates; checking those is
//! the engine's job, wrapped explicitly around every invocation rather than
//! hidden inside the variants.

use crate::core::error::PipelineError;
use crate::execution::tee::{Tee, TeeWriter};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// Result of executing or skipping a single step.
///
/// `Failed` is the only value the run loop gates on: a callable that wants to
/// signal failure must return it explicitly, everything else counts as
/// success. `Skipped` records that the step produced no pass/fail signal at
/// all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step ran and signalled success
    Passed,
    /// Step ran and explicitly signalled failure
    Failed,
    /// Step was skipped, or ran without producing a pass/fail signal
    Skipped,
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed)
    }
}

impl From<bool> for StepOutcome {
    fn from(ok: bool) -> Self {
        if ok {
            StepOutcome::Passed
        } else {
            StepOutcome::Failed
        }
    }
}

/// Zero-argument predicate used for pre/postconditions.
pub type Condition = Box<dyn Fn() -> bool + Send + Sync>;

/// Action of a [`CallableStep`]. Arguments are captured by the closure at
/// construction time; the tee endpoint lets the callable's output reach the
/// same sinks as subprocess output.
pub type CallableFn = Box<dyn FnMut(&TeeWriter) -> StepOutcome + Send>;

/// One unit of pipeline work.
///
/// `execute` and `skip` report failure by return value, never by error;
/// errors are reserved for plumbing problems (a command that cannot be
/// spawned). The `ignore_failure` argument is the effective policy already
/// resolved by the engine (step-local override falling back to the pipeline
/// flag).
#[async_trait]
pub trait Step: Send {
    fn name(&self) -> &str;

    /// Suppress informational messages for this step.
    fn silent(&self) -> bool {
        false
    }

    /// Step-local failure policy; `None` inherits the pipeline's flag.
    fn ignore_failure(&self) -> Option<bool> {
        None
    }

    fn precondition(&self) -> bool {
        true
    }

    fn postcondition(&self) -> bool {
        true
    }

    async fn execute(
        &mut self,
        tee: &Tee,
        ignore_failure: bool,
    ) -> Result<StepOutcome, PipelineError>;

    async fn skip(
        &mut self,
        tee: &Tee,
        ignore_failure: bool,
    ) -> Result<StepOutcome, PipelineError>;
}

/// Shared fields of the provided step variants.
struct StepMeta {
    name: String,
    silent: bool,
    ignore_failure: Option<bool>,
    precondition: Option<Condition>,
    postcondition: Option<Condition>,
}

impl StepMeta {
    fn new(name: impl Into<String>) -> Self {
        StepMeta {
            name: name.into(),
            silent: false,
            ignore_failure: None,
            precondition: None,
            postcondition: None,
        }
    }

    fn check(cond: &Option<Condition>) -> bool {
        cond.as_ref().map(|c| c()).unwrap_or(true)
    }

    fn info(&self, tee: &Tee, msg: &str) {
        if !self.silent {
            tee.info(msg);
        }
    }
}

/// Base step that performs no work on its own. Executing it succeeds,
/// skipping it yields no pass/fail signal.
pub struct NoopStep {
    meta: StepMeta,
}

impl NoopStep {
    pub fn new(name: impl Into<String>) -> Self {
        NoopStep {
            meta: StepMeta::new(name),
        }
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.meta.silent = silent;
        self
    }

    pub fn ignore_failure(mut self, ignore: bool) -> Self {
        self.meta.ignore_failure = Some(ignore);
        self
    }

    pub fn precondition(mut self, cond: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.meta.precondition = Some(Box::new(cond));
        self
    }

    pub fn postcondition(mut self, cond: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.meta.postcondition = Some(Box::new(cond));
        self
    }
}

#[async_trait]
impl Step for NoopStep {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn silent(&self) -> bool {
        self.meta.silent
    }

    fn ignore_failure(&self) -> Option<bool> {
        self.meta.ignore_failure
    }

    fn precondition(&self) -> bool {
        StepMeta::check(&self.meta.precondition)
    }

    fn postcondition(&self) -> bool {
        StepMeta::check(&self.meta.postcondition)
    }

    async fn execute(
        &mut self,
        tee: &Tee,
        _ignore_failure: bool,
    ) -> Result<StepOutcome, PipelineError> {
        self.meta.info(tee, &self.meta.name);
        Ok(StepOutcome::Passed)
    }

    async fn skip(
        &mut self,
        _tee: &Tee,
        _ignore_failure: bool,
    ) -> Result<StepOutcome, PipelineError> {
        Ok(StepOutcome::Skipped)
    }
}

/// A step that runs an ordered sequence of shell commands.
///
/// Commands run one at a time under `sh -c`, with stdout and stderr routed
/// into the tee. The sequence stops at the first nonzero exit unless
/// failures are being ignored. A second command sequence runs when the step
/// is skipped (cleanup, cache reuse and the like).
pub struct ProcessStep {
    meta: StepMeta,
    commands: Vec<String>,
    skip_commands: Vec<String>,
    env: HashMap<String, String>,
}

impl ProcessStep {
    pub fn new(name: impl Into<String>, commands: Vec<String>) -> Self {
        ProcessStep {
            meta: StepMeta::new(name),
            commands,
            skip_commands: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// Commands to run when the step is skipped instead of executed.
    pub fn skip_commands(mut self, commands: Vec<String>) -> Self {
        self.skip_commands = commands;
        self
    }

    /// Environment overrides applied on top of the inherited environment.
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.meta.silent = silent;
        self
    }

    pub fn ignore_failure(mut self, ignore: bool) -> Self {
        self.meta.ignore_failure = Some(ignore);
        self
    }

    pub fn precondition(mut self, cond: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.meta.precondition = Some(Box::new(cond));
        self
    }

    pub fn postcondition(mut self, cond: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.meta.postcondition = Some(Box::new(cond));
        self
    }

    async fn run_commands(
        &self,
        commands: &[String],
        tee: &Tee,
        ignore_failure: bool,
    ) -> Result<StepOutcome, PipelineError> {
        let writer = tee.writer();
        let mut all_ok = true;

        for command in commands {
            if !self.meta.silent {
                tee.write_direct(&format!("\t{}\n", command), false);
            }
            let command = normalize_command(command);
            let ok = run_shell(&command, &self.env, &writer).await?;
            all_ok = ok;
            if !ignore_failure && !ok {
                break;
            }
        }

        Ok(StepOutcome::from(ignore_failure || all_ok))
    }
}

#[async_trait]
impl Step for ProcessStep {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn silent(&self) -> bool {
        self.meta.silent
    }

    fn ignore_failure(&self) -> Option<bool> {
        self.meta.ignore_failure
    }

    fn precondition(&self) -> bool {
        StepMeta::check(&self.meta.precondition)
    }

    fn postcondition(&self) -> bool {
        StepMeta::check(&self.meta.postcondition)
    }

    async fn execute(
        &mut self,
        tee: &Tee,
        ignore_failure: bool,
    ) -> Result<StepOutcome, PipelineError> {
        self.meta.info(tee, &self.meta.name);
        let commands = self.commands.clone();
        self.run_commands(&commands, tee, ignore_failure).await
    }

    async fn skip(
        &mut self,
        tee: &Tee,
        ignore_failure: bool,
    ) -> Result<StepOutcome, PipelineError> {
        self.meta.info(tee, &format!("{} SKIPPED", self.meta.name));
        let commands = self.skip_commands.clone();
        self.run_commands(&commands, tee, ignore_failure).await
    }
}

/// A step whose action is an arbitrary closure.
///
/// The closure's return value is the step's pass/fail signal, taken verbatim.
/// A separate closure may be supplied for the skip path; by default skipping
/// yields [`StepOutcome::Skipped`]. A panicking closure propagates to the
/// run loop untouched.
pub struct CallableStep {
    meta: StepMeta,
    callable: CallableFn,
    skip_callable: Option<CallableFn>,
}

impl CallableStep {
    pub fn new(
        name: impl Into<String>,
        callable: impl FnMut(&TeeWriter) -> StepOutcome + Send + 'static,
    ) -> Self {
        CallableStep {
            meta: StepMeta::new(name),
            callable: Box::new(callable),
            skip_callable: None,
        }
    }

    /// Closure invoked when the step is skipped instead of executed.
    pub fn skip_callable(
        mut self,
        callable: impl FnMut(&TeeWriter) -> StepOutcome + Send + 'static,
    ) -> Self {
        self.skip_callable = Some(Box::new(callable));
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.meta.silent = silent;
        self
    }

    pub fn ignore_failure(mut self, ignore: bool) -> Self {
        self.meta.ignore_failure = Some(ignore);
        self
    }

    pub fn precondition(mut self, cond: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.meta.precondition = Some(Box::new(cond));
        self
    }

    pub fn postcondition(mut self, cond: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.meta.postcondition = Some(Box::new(cond));
        self
    }
}

#[async_trait]
impl Step for CallableStep {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn silent(&self) -> bool {
        self.meta.silent
    }

    fn ignore_failure(&self) -> Option<bool> {
        self.meta.ignore_failure
    }

    fn precondition(&self) -> bool {
        StepMeta::check(&self.meta.precondition)
    }

    fn postcondition(&self) -> bool {
        StepMeta::check(&self.meta.postcondition)
    }

    async fn execute(
        &mut self,
        tee: &Tee,
        _ignore_failure: bool,
    ) -> Result<StepOutcome, PipelineError> {
        self.meta.info(tee, &self.meta.name);
        let writer = tee.writer();
        Ok((self.callable)(&writer))
    }

    async fn skip(
        &mut self,
        tee: &Tee,
        _ignore_failure: bool,
    ) -> Result<StepOutcome, PipelineError> {
        self.meta.info(tee, &format!("{} SKIPPED", self.meta.name));
        match self.skip_callable.as_mut() {
            Some(callable) => {
                let writer = tee.writer();
                Ok(callable(&writer))
            }
            None => Ok(StepOutcome::Skipped),
        }
    }
}

/// Trim a command string and collapse internal whitespace runs to single
/// spaces. A reproducibility convenience for multi-line command literals, not
/// a security boundary.
pub fn normalize_command(command: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let ws = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("literal regex"));
    ws.replace_all(command.trim(), " ").into_owned()
}

/// Run one command on a shell, pumping its stdout and stderr into the tee.
/// Returns whether the command exited zero.
async fn run_shell(
    command: &str,
    env: &HashMap<String, String>,
    writer: &TeeWriter,
) -> Result<bool, PipelineError> {
    debug!("spawning shell command: {}", command);

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout_pump = child
        .stdout
        .take()
        .map(|out| tokio::spawn(pump(out, writer.clone())));
    let stderr_pump = child
        .stderr
        .take()
        .map(|err| tokio::spawn(pump(err, writer.clone())));

    let status = child.wait().await?;

    // let the pumps observe EOF before reporting the exit status
    if let Some(pump) = stdout_pump {
        let _ = pump.await;
    }
    if let Some(pump) = stderr_pump {
        let _ = pump.await;
    }

    debug!("command exited with {:?}", status.code());
    Ok(status.success())
}

async fn pump<R>(mut src: R, writer: TeeWriter)
where
    R: AsyncReadExt + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        match src.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => writer.write(&buf[..n]),
        }
    }
}
