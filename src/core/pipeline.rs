//! Pipeline domain model

use crate::core::step::{Step, StepOutcome};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// An ordered sequence of steps plus the pipeline-level failure policy.
///
/// Insertion order is execution order; positions are stable 0-based indices
/// once a run begins (the engine borrows the pipeline mutably for the whole
/// run, so the sequence cannot change mid-run).
pub struct Pipeline {
    /// Pipeline name, used in announcements
    pub name: String,

    /// Ordered steps
    steps: Vec<Box<dyn Step>>,

    /// Global failure policy; individual steps may override it
    pub ignore_failure: bool,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Pipeline {
            name: name.into(),
            steps: Vec::new(),
            ignore_failure: false,
        }
    }

    pub fn ignore_failure(mut self, ignore: bool) -> Self {
        self.ignore_failure = ignore;
        self
    }

    /// Append a step at the end of the sequence.
    pub fn add_step(&mut self, step: impl Step + 'static) {
        self.steps.push(Box::new(step));
    }

    /// Insert a step at an explicit position, shifting later steps.
    pub fn add_step_at(&mut self, step: impl Step + 'static, pos: usize) {
        let pos = pos.min(self.steps.len());
        self.steps.insert(pos, Box::new(step));
    }

    /// Append several boxed steps in order.
    pub fn add_steps(&mut self, steps: Vec<Box<dyn Step>>) {
        self.steps.extend(steps);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Box<dyn Step>] {
        &mut self.steps
    }
}

/// How the set of executed positions is resolved for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Execute every step
    All,
    /// Execute exactly these positions, skip the rest
    Explicit(Vec<usize>),
    /// Prompt on the console for a steplist expression
    Interactive,
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every step was executed or skipped
    Completed,
    /// A step failed and failures were not being ignored
    Aborted { failed_step: usize },
    /// The user interrupted the run
    Interrupted,
}

/// Outcome of a pipeline run.
///
/// `outcomes` is aligned by step position and truncated at early
/// termination: steps after an abort or interruption have no entry.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub outcomes: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }
}
