//! Execution engine - drives a pipeline run end to end
//!
//! The engine resolves which step positions execute (explicitly, or via the
//! interactive steplist prompt), walks the full step sequence in order
//! executing or skipping each position, enforces the abort-on-failure policy,
//! and owns the output tee's lifecycle: the tee starts when the engine is
//! built and is stopped exactly once when `run` finishes, whether the run
//! completed, aborted, errored or was interrupted.

use crate::core::error::PipelineError;
use crate::core::pipeline::{Pipeline, RunReport, RunStatus, Selection};
use crate::core::step::{Step, StepOutcome};
use crate::core::steplist::parse_steplist;
use crate::execution::tee::{Sink, Tee};
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use uuid::Uuid;

/// Fixed prompt of the interactive step-selection protocol.
pub const SELECTION_PROMPT: &str = "Execute which steps (e.g. 1-2,4,6) [all]:";

/// Engine construction options.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Append-mode log file receiving everything the console sees
    pub log: Option<PathBuf>,
}

/// Drives one pipeline run. An engine is single-use: its tee is stopped when
/// `run` returns, so build a fresh engine per run.
pub struct ExecutionEngine {
    tee: Tee,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Result<Self, PipelineError> {
        let mut sinks = vec![Sink::Stderr];
        if let Some(path) = &config.log {
            sinks.push(Sink::append_file(path)?);
        }
        Ok(Self::with_sinks(sinks))
    }

    /// Build an engine over an explicit sink set. Used by tests and
    /// embedders that capture output instead of printing it.
    pub fn with_sinks(sinks: Vec<Sink>) -> Self {
        ExecutionEngine {
            tee: Tee::spawn(sinks),
        }
    }

    /// Execute the pipeline and return the run report.
    ///
    /// Steps at positions in the resolved steplist are executed (wrapped in
    /// their pre/postcondition checks); all other positions are skipped. A
    /// failure outcome aborts the loop unless the pipeline ignores failures;
    /// Ctrl-C interrupts it and keeps the partial outcomes. The tee is
    /// stopped on every path out, including condition and selection errors.
    pub async fn run(
        &mut self,
        pipeline: &mut Pipeline,
        selection: Selection,
    ) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("starting pipeline run: {} ({})", pipeline.name, run_id);
        self.tee.info(&format!(
            "{} ({})",
            pipeline.name,
            &run_id.to_string()[..8]
        ));

        let result = self.run_inner(pipeline, selection).await;
        self.tee.stop().await;

        let (status, outcomes) = result?;
        info!("pipeline run finished: {:?}", status);
        Ok(RunReport {
            run_id,
            status,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_inner(
        &mut self,
        pipeline: &mut Pipeline,
        selection: Selection,
    ) -> Result<(RunStatus, Vec<StepOutcome>), PipelineError> {
        let steplist = match selection {
            Selection::All => (0..pipeline.len()).collect(),
            Selection::Explicit(mut list) => {
                list.sort_unstable();
                list.dedup();
                list
            }
            Selection::Interactive => self.prompt_for_steplist(pipeline).await?,
        };
        debug!("resolved steplist: {:?}", steplist);

        let mut outcomes = Vec::new();
        let status = {
            let tee = &self.tee;
            let loop_fut = execute_steps(tee, pipeline, &steplist, &mut outcomes);
            tokio::pin!(loop_fut);
            tokio::select! {
                status = &mut loop_fut => status?,
                _ = tokio::signal::ctrl_c() => {
                    tee.write_direct("\nPipeline interrupted by user, aborting\n", false);
                    RunStatus::Interrupted
                }
            }
        };

        Ok((status, outcomes))
    }

    /// Interactive step-selection protocol: list the numbered step names,
    /// show the fixed prompt, read one line from stdin, echo prompt+input to
    /// the non-console sinks (the console already displayed both), parse.
    async fn prompt_for_steplist(&self, pipeline: &Pipeline) -> Result<Vec<usize>, PipelineError> {
        for (i, name) in pipeline.step_names().iter().enumerate() {
            self.tee.write_direct(&format!("{}: {}\n", i, name), false);
        }

        let mut stderr = std::io::stderr();
        stderr.write_all(SELECTION_PROMPT.as_bytes())?;
        stderr.flush()?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;

        self.tee.write_direct(
            &format!("{}{}\n", SELECTION_PROMPT, line.trim_end_matches(['\r', '\n'])),
            true,
        );

        parse_steplist(&line, pipeline.len())
    }

    /// Write a timestamped informational line to every sink.
    pub fn info(&self, msg: &str) {
        self.tee.info(msg);
    }

    pub fn warn(&self, msg: &str) {
        self.tee.warn(msg);
    }

    pub fn error(&self, msg: &str) {
        self.tee.error(msg);
    }

    /// Raw write to every sink, optionally excluding console sinks.
    pub fn printout(&self, text: &str, exclude_console: bool) {
        self.tee.write_direct(text, exclude_console);
    }
}

async fn execute_steps(
    tee: &Tee,
    pipeline: &mut Pipeline,
    steplist: &[usize],
    outcomes: &mut Vec<StepOutcome>,
) -> Result<RunStatus, PipelineError> {
    let global_ignore = pipeline.ignore_failure;

    for (pos, step) in pipeline.steps_mut().iter_mut().enumerate() {
        let selected = steplist.binary_search(&pos).is_ok();
        let ignore = step.ignore_failure().unwrap_or(global_ignore);

        let outcome = if selected {
            run_with_conditions(tee, step.as_mut(), ignore).await?
        } else {
            step.skip(tee, ignore).await?
        };
        outcomes.push(outcome);

        if !global_ignore && outcome.is_failure() {
            tee.error(&format!("Step {} failed, aborting pipeline", pos));
            return Ok(RunStatus::Aborted { failed_step: pos });
        }
    }

    Ok(RunStatus::Completed)
}

/// Explicit pre/postcondition wrapping around a step invocation. The
/// effective ignore-failure policy is the step-local override falling back to
/// the pipeline flag.
async fn run_with_conditions(
    tee: &Tee,
    step: &mut dyn Step,
    ignore_failure: bool,
) -> Result<StepOutcome, PipelineError> {
    if !step.precondition() {
        if !ignore_failure {
            return Err(PipelineError::PreconditionFailed {
                step: step.name().to_string(),
            });
        }
        if !step.silent() {
            tee.info("\tPrecondition not met but ignoring failures, skipping");
        }
        return Ok(StepOutcome::Skipped);
    }

    let outcome = step.execute(tee, ignore_failure).await?;

    if !step.postcondition() {
        if !ignore_failure {
            return Err(PipelineError::PostconditionFailed {
                step: step.name().to_string(),
            });
        }
        if !step.silent() {
            tee.info("\tPostcondition not met but ignoring failures");
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::{CallableStep, NoopStep, ProcessStep};
    use std::sync::{Arc, Mutex};

    fn capture_engine() -> (ExecutionEngine, Arc<Mutex<Vec<u8>>>) {
        let (sink, buf) = Sink::buffer();
        (ExecutionEngine::with_sinks(vec![sink]), buf)
    }

    fn captured(buf: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&buf.lock().unwrap()).into_owned()
    }

    fn recording_step(
        name: &str,
        trace: &Arc<Mutex<Vec<String>>>,
        outcome: StepOutcome,
    ) -> CallableStep {
        let executed = trace.clone();
        let skipped = trace.clone();
        let exec_name = format!("exec:{}", name);
        let skip_name = format!("skip:{}", name);
        CallableStep::new(name, move |_| {
            executed.lock().unwrap().push(exec_name.clone());
            outcome
        })
        .skip_callable(move |_| {
            skipped.lock().unwrap().push(skip_name.clone());
            StepOutcome::Skipped
        })
    }

    #[tokio::test]
    async fn test_run_all_executes_every_step_in_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new("ordered");
        for name in ["a", "b", "c"] {
            pipeline.add_step(recording_step(name, &trace, StepOutcome::Passed));
        }

        let (mut engine, _buf) = capture_engine();
        let report = engine.run(&mut pipeline, Selection::All).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.outcomes.len(), pipeline.len());
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["exec:a", "exec:b", "exec:c"]
        );
    }

    #[tokio::test]
    async fn test_explicit_selection_skips_unselected_positions() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new("partial");
        for name in ["a", "b", "c", "d"] {
            pipeline.add_step(recording_step(name, &trace, StepOutcome::Passed));
        }

        let (mut engine, _buf) = capture_engine();
        let report = engine
            .run(&mut pipeline, Selection::Explicit(vec![3, 1]))
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["skip:a", "exec:b", "skip:c", "exec:d"]
        );
        assert_eq!(
            report.outcomes,
            vec![
                StepOutcome::Skipped,
                StepOutcome::Passed,
                StepOutcome::Skipped,
                StepOutcome::Passed,
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_and_truncates_outcomes() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new("failing");
        pipeline.add_step(recording_step("ok", &trace, StepOutcome::Passed));
        pipeline.add_step(recording_step("bad", &trace, StepOutcome::Failed));
        pipeline.add_step(recording_step("never", &trace, StepOutcome::Passed));

        let (mut engine, buf) = capture_engine();
        let report = engine.run(&mut pipeline, Selection::All).await.unwrap();

        assert_eq!(report.status, RunStatus::Aborted { failed_step: 1 });
        assert_eq!(report.outcomes.len(), 2);
        assert!(!trace.lock().unwrap().contains(&"exec:never".to_string()));
        assert!(captured(&buf).contains("Step 1 failed, aborting pipeline"));
    }

    #[tokio::test]
    async fn test_ignore_failure_runs_through_failing_step() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new("tolerant").ignore_failure(true);
        pipeline.add_step(recording_step("bad", &trace, StepOutcome::Failed));
        pipeline.add_step(recording_step("after", &trace, StepOutcome::Passed));

        let (mut engine, _buf) = capture_engine();
        let report = engine.run(&mut pipeline, Selection::All).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.outcomes.len(), 2);
        assert!(trace.lock().unwrap().contains(&"exec:after".to_string()));
    }

    #[tokio::test]
    async fn test_unmet_precondition_is_fatal_by_default() {
        let mut pipeline = Pipeline::new("gated");
        pipeline.add_step(NoopStep::new("guarded").precondition(|| false));

        let (mut engine, _buf) = capture_engine();
        let err = engine.run(&mut pipeline, Selection::All).await.unwrap_err();

        match err {
            PipelineError::PreconditionFailed { step } => assert_eq!(step, "guarded"),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unmet_precondition_with_ignore_skips_the_action() {
        let ran = Arc::new(Mutex::new(false));
        let ran_in_step = ran.clone();
        let mut pipeline = Pipeline::new("gated");
        pipeline.add_step(
            CallableStep::new("guarded", move |_| {
                *ran_in_step.lock().unwrap() = true;
                StepOutcome::Passed
            })
            .precondition(|| false)
            .ignore_failure(true),
        );

        let (mut engine, buf) = capture_engine();
        let report = engine.run(&mut pipeline, Selection::All).await.unwrap();

        assert_eq!(report.outcomes, vec![StepOutcome::Skipped]);
        assert!(!*ran.lock().unwrap());
        assert!(captured(&buf).contains("Precondition not met but ignoring failures"));
    }

    #[tokio::test]
    async fn test_unmet_postcondition_is_fatal_by_default() {
        let mut pipeline = Pipeline::new("checked");
        pipeline.add_step(NoopStep::new("verified").postcondition(|| false));

        let (mut engine, _buf) = capture_engine();
        let err = engine.run(&mut pipeline, Selection::All).await.unwrap_err();

        assert!(matches!(err, PipelineError::PostconditionFailed { .. }));
    }

    #[tokio::test]
    async fn test_step_local_ignore_overrides_pipeline_flag_for_conditions() {
        // the pipeline does not ignore failures, but the step does
        let mut pipeline = Pipeline::new("mixed");
        pipeline.add_step(
            NoopStep::new("lenient")
                .precondition(|| false)
                .ignore_failure(true),
        );
        pipeline.add_step(NoopStep::new("after"));

        let (mut engine, _buf) = capture_engine();
        let report = engine.run(&mut pipeline, Selection::All).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(
            report.outcomes,
            vec![StepOutcome::Skipped, StepOutcome::Passed]
        );
    }

    #[tokio::test]
    async fn test_process_failure_halts_before_later_commands_and_steps() {
        let mut pipeline = Pipeline::new("shell");
        pipeline.add_step(ProcessStep::new(
            "broken",
            vec!["false".to_string(), "echo unreachable".to_string()],
        ));
        pipeline.add_step(ProcessStep::new(
            "after",
            vec!["echo never printed".to_string()],
        ));

        let (mut engine, buf) = capture_engine();
        let report = engine.run(&mut pipeline, Selection::All).await.unwrap();

        assert_eq!(report.status, RunStatus::Aborted { failed_step: 0 });
        let output = captured(&buf);
        assert!(!output.contains("unreachable"));
        assert!(!output.contains("never printed"));
    }

    #[tokio::test]
    async fn test_console_and_log_sinks_receive_identical_content() {
        let (console, console_buf) = Sink::buffer();
        let (log, log_buf) = Sink::buffer();
        let mut engine = ExecutionEngine::with_sinks(vec![console, log]);

        let mut pipeline = Pipeline::new("mirrored");
        pipeline.add_step(ProcessStep::new(
            "speak",
            vec!["echo round trip message".to_string()],
        ));

        engine.run(&mut pipeline, Selection::All).await.unwrap();

        let console = console_buf.lock().unwrap().clone();
        let log = log_buf.lock().unwrap().clone();
        assert_eq!(console, log);
        assert!(String::from_utf8_lossy(&console).contains("round trip message"));
    }

    #[tokio::test]
    async fn test_empty_pipeline_completes_with_no_outcomes() {
        let mut pipeline = Pipeline::new("empty");
        let (mut engine, _buf) = capture_engine();

        let report = engine.run(&mut pipeline, Selection::All).await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.outcomes.is_empty());
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_explicit_selection_is_sorted_and_deduplicated() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new("dedup");
        for name in ["a", "b"] {
            pipeline.add_step(recording_step(name, &trace, StepOutcome::Passed));
        }

        let (mut engine, _buf) = capture_engine();
        let report = engine
            .run(&mut pipeline, Selection::Explicit(vec![1, 1, 0, 0]))
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(*trace.lock().unwrap(), vec!["exec:a", "exec:b"]);
    }
}
