//! Queue status summary.

use crate::job::JobState;
use serde::Serialize;
use std::fmt;

/// Number of jobs in each lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
}

impl StatusSummary {
    /// Builds a summary from `(state, count)` pairs; missing states count as zero.
    pub fn from_counts(counts: impl IntoIterator<Item = (JobState, u64)>) -> Self {
        let mut summary = Self::default();
        for (state, count) in counts {
            *summary.slot_mut(state) += count;
        }
        summary
    }

    /// Returns the count for a single state.
    #[must_use]
    pub const fn count(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }

    /// Returns the number of jobs across all states.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed + self.dead
    }

    fn slot_mut(&mut self, state: JobState) -> &mut u64 {
        match state {
            JobState::Pending => &mut self.pending,
            JobState::Processing => &mut self.processing,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
            JobState::Dead => &mut self.dead,
        }
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<12} {:>8}", "STATE", "JOBS")?;
        for state in JobState::ALL {
            writeln!(f, "{:<12} {:>8}", state.as_str(), self.count(state))?;
        }
        write!(f, "{:<12} {:>8}", "total", self.total())
    }
}
