//! Independently trackable subsets of a workflow's steps.

use super::{FragmentName, StepId, StepStatus, WorkflowStep};
use serde::Serialize;

/// Derived status of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentStatus {
    /// No member has started.
    Pending,
    /// Members are in flight.
    Running,
    /// Every member reached terminal success.
    Completed,
    /// A member failed for good.
    Failed,
}

/// A named subset of a workflow's steps.
///
/// Fragments let independent parts of a large workflow report progress
/// without waiting for the whole run; their status is derived entirely
/// from their member steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    name: FragmentName,
    members: Vec<StepId>,
}

impl Fragment {
    /// Creates a fragment over the given member step ids.
    #[must_use]
    pub const fn new(name: FragmentName, members: Vec<StepId>) -> Self {
        Self { name, members }
    }

    /// Returns the fragment name.
    #[must_use]
    pub const fn name(&self) -> &FragmentName {
        &self.name
    }

    /// Returns the member step ids.
    #[must_use]
    pub fn members(&self) -> &[StepId] {
        &self.members
    }

    /// Returns whether the fragment contains the given step.
    #[must_use]
    pub fn contains(&self, step_id: &StepId) -> bool {
        self.members.iter().any(|member| member == step_id)
    }

    /// Derives progress counters from the member steps.
    #[must_use]
    pub fn progress<'a>(
        &self,
        steps: impl Iterator<Item = &'a WorkflowStep>,
    ) -> FragmentProgress {
        let mut progress = FragmentProgress {
            name: self.name.clone(),
            status: FragmentStatus::Pending,
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            pending: 0,
        };
        let mut any_started = false;
        for step in steps.filter(|step| self.contains(step.id())) {
            progress.total += 1;
            match step.status() {
                StepStatus::Succeeded => progress.succeeded += 1,
                StepStatus::Failed => progress.failed += 1,
                StepStatus::Skipped => progress.skipped += 1,
                StepStatus::Pending => progress.pending += 1,
                StepStatus::Ready | StepStatus::Running | StepStatus::Retrying => {
                    progress.pending += 1;
                    any_started = true;
                }
            }
        }
        progress.status = if progress.failed > 0 {
            FragmentStatus::Failed
        } else if progress.total > 0 && progress.succeeded + progress.skipped == progress.total {
            FragmentStatus::Completed
        } else if any_started || progress.succeeded + progress.skipped > 0 {
            FragmentStatus::Running
        } else {
            FragmentStatus::Pending
        };
        progress
    }
}

/// Progress counters for one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentProgress {
    /// The fragment name.
    pub name: FragmentName,
    /// Derived fragment status.
    pub status: FragmentStatus,
    /// Member step count.
    pub total: usize,
    /// Members that succeeded.
    pub succeeded: usize,
    /// Members that failed for good.
    pub failed: usize,
    /// Members that were skipped.
    pub skipped: usize,
    /// Members not yet in an end state.
    pub pending: usize,
}
