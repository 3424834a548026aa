//! stepline - a sequential task-pipeline runner
//!
//! An ordered list of named steps (shell command sequences or closures)
//! executed one after another, with interactive or pre-selected partial
//! execution, per-step pass/fail gating, and an output tee that replicates
//! all step output to the console and an optional log file.

pub mod cli;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use crate::core::config::PipelineConfig;
pub use crate::core::{
    CallableStep, NoopStep, Pipeline, PipelineError, ProcessStep, RunReport, RunStatus, Selection,
    Step, StepOutcome,
};
pub use execution::{EngineConfig, ExecutionEngine, Sink, Tee, TeeWriter};
