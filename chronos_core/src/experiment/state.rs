use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::ChronosError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    Idle,
    Armed,
    Running,
    Finished,
}

impl ExperimentState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExperimentState::Idle => "idle",
            ExperimentState::Armed => "armed",
            ExperimentState::Running => "running",
            ExperimentState::Finished => "finished",
        }
    }

    /// Gate transitions may mutate timestamps only in these states.
    pub fn should_poll(self) -> bool {
        matches!(self, ExperimentState::Armed | ExperimentState::Running)
    }

    fn to_u8(self) -> u8 {
        match self {
            ExperimentState::Idle => 0,
            ExperimentState::Armed => 1,
            ExperimentState::Running => 2,
            ExperimentState::Finished => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => ExperimentState::Armed,
            2 => ExperimentState::Running,
            3 => ExperimentState::Finished,
            _ => ExperimentState::Idle,
        }
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free shared experiment state.
///
/// The experiment engine owns the transitions; clones handed to the poll
/// loop only read it.
#[derive(Debug, Clone, Default)]
pub struct RunState(Arc<AtomicU8>);

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ExperimentState {
        ExperimentState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn should_poll(&self) -> bool {
        self.get().should_poll()
    }

    fn transition(
        &self,
        allowed: &[ExperimentState],
        to: ExperimentState,
    ) -> Result<(), ChronosError> {
        let from = self.get();
        if !allowed.contains(&from) {
            return Err(ChronosError::InvalidTransition {
                from: from.as_str(),
                to: to.as_str(),
            });
        }
        self.0.store(to.to_u8(), Ordering::Release);
        tracing::info!(%from, %to, polling = to.should_poll(), "experiment state");
        Ok(())
    }

    pub fn arm(&self) -> Result<(), ChronosError> {
        self.transition(
            &[ExperimentState::Idle, ExperimentState::Finished],
            ExperimentState::Armed,
        )
    }

    pub fn start(&self) -> Result<(), ChronosError> {
        self.transition(&[ExperimentState::Armed], ExperimentState::Running)
    }

    pub fn finish(&self) -> Result<(), ChronosError> {
        self.transition(&[ExperimentState::Running], ExperimentState::Finished)
    }

    /// Always allowed.
    pub fn disarm(&self) {
        let from = self.get();
        self.0
            .store(ExperimentState::Idle.to_u8(), Ordering::Release);
        if from != ExperimentState::Idle {
            tracing::info!(%from, to = "idle", polling = false, "experiment state");
        }
    }
}
