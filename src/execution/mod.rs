//! Execution: the run engine and the output tee

pub mod engine;
pub mod tee;

pub use engine::{EngineConfig, ExecutionEngine, SELECTION_PROMPT};
pub use tee::{Sink, Tee, TeeWriter};
