//! Pipeline error types

use thiserror::Error;

/// Errors raised by the pipeline engine.
///
/// Step-level command/callable failures are never surfaced here: they travel
/// as [`StepOutcome::Failed`](crate::core::step::StepOutcome) values so the
/// run loop can gate on them uniformly. Only contract violations become
/// errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A step's precondition predicate returned false and failures were not
    /// being ignored
    #[error("precondition not met for step {step}")]
    PreconditionFailed { step: String },

    /// A step's postcondition predicate returned false and failures were not
    /// being ignored
    #[error("postcondition not met for step {step}")]
    PostconditionFailed { step: String },

    /// A steplist expression (interactive or `--steps`) failed to parse.
    /// This is a usage error at the boundary and is fatal regardless of
    /// ignore-failure mode.
    #[error("invalid steplist argument: {token}")]
    MalformedSelection { token: String },

    /// I/O failure in the engine plumbing (log file, stdin prompt)
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
