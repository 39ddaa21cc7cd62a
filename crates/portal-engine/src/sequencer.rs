//! Ordered workflow steps with a single failure exit.
//!
//! `NotStarted -> Running(step) -> Completed | Failed(step, reason)`.
//! A failing step triggers exactly one diagnostic capture and ends the
//! sequence; nothing is retried.

use crate::diagnostics::Diagnostics;
use crate::driver::Driver;
use crate::{Error, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceState {
    NotStarted,
    Running { step: String },
    Completed,
    Failed { step: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Failed(String),
}

/// One entry of the step trail.
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub step: String,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

/// Value produced by a completed sequence, with its step trail.
#[derive(Debug, Clone)]
pub struct Run<T> {
    pub value: T,
    pub state: SequenceState,
    pub events: Vec<StepEvent>,
}

impl<T> Run<T> {
    /// Step names in execution order.
    pub fn steps(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.step.as_str()).collect()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

pub struct Sequencer<'d, D> {
    driver: &'d D,
    workflow: String,
    diagnostics: Diagnostics,
    state: SequenceState,
    events: Vec<StepEvent>,
    snapshot: Option<PathBuf>,
}

impl<'d, D: Driver> Sequencer<'d, D> {
    pub fn new(driver: &'d D, workflow: impl Into<String>, diagnostics: Diagnostics) -> Self {
        Self {
            driver,
            workflow: workflow.into(),
            diagnostics,
            state: SequenceState::NotStarted,
            events: Vec::new(),
            snapshot: None,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn state(&self) -> &SequenceState {
        &self.state
    }

    pub fn events(&self) -> &[StepEvent] {
        &self.events
    }

    /// Snapshot written when the sequence failed, if capture succeeded.
    pub fn failure_snapshot(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    /// Run one step. On error the sequence moves to `Failed`, diagnostics
    /// are captured once, and the error is returned with step context.
    pub async fn step<T, F, Fut>(&mut self, name: &str, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let SequenceState::Failed { step, .. } = &self.state {
            return Err(Error::Aborted {
                workflow: self.workflow.clone(),
                step: step.clone(),
            });
        }

        info!("[{}] {}", self.workflow, name);
        self.state = SequenceState::Running {
            step: name.to_string(),
        };
        let start = Instant::now();

        match action().await {
            Ok(value) => {
                self.events.push(StepEvent {
                    step: name.to_string(),
                    outcome: StepOutcome::Done,
                    elapsed: start.elapsed(),
                });
                Ok(value)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("[{}] step '{}' failed: {}", self.workflow, name, reason);
                self.state = SequenceState::Failed {
                    step: name.to_string(),
                    reason: reason.clone(),
                };
                self.events.push(StepEvent {
                    step: name.to_string(),
                    outcome: StepOutcome::Failed(reason),
                    elapsed: start.elapsed(),
                });
                let tag = format!("{}_{}", self.workflow, name);
                self.snapshot = self.diagnostics.capture(self.driver, &tag).await;
                if let Some(path) = &self.snapshot {
                    warn!("[{}] failure snapshot: {}", self.workflow, path.display());
                }
                Err(Error::StepFailed {
                    workflow: self.workflow.clone(),
                    step: name.to_string(),
                    source: Box::new(e),
                    snapshot: self.snapshot.clone(),
                })
            }
        }
    }

    /// Close the sequence around its result.
    pub fn finish<T>(mut self, value: T) -> Run<T> {
        if !matches!(self.state, SequenceState::Failed { .. }) {
            self.state = SequenceState::Completed;
            info!("[{}] completed {} steps", self.workflow, self.events.len());
        }
        Run {
            value,
            state: self.state,
            events: self.events,
        }
    }
}
