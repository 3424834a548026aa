//! Core domain types: steps, pipelines, selection parsing, configuration

pub mod config;
pub mod error;
pub mod pipeline;
pub mod step;
pub mod steplist;

pub use error::PipelineError;
pub use pipeline::{Pipeline, RunReport, RunStatus, Selection};
pub use step::{CallableStep, NoopStep, ProcessStep, Step, StepOutcome};
pub use steplist::parse_steplist;
