//! Execution identity and lifecycle tracking

use crate::error::{Result, SandboxError};
use serde::{Deserialize, Serialize};

/// Unique execution identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one invocation's isolate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Created,
    BootstrapRun,
    ApiInstalled,
    UserCodeRunning,
    SummaryCollected,
    Errored,
    Disposed,
}

impl ExecutionPhase {
    /// Whether `next` may follow `self`. Transitions only move forward.
    pub fn can_advance_to(self, next: ExecutionPhase) -> bool {
        use ExecutionPhase::*;
        matches!(
            (self, next),
            (Created, BootstrapRun)
                | (BootstrapRun, ApiInstalled)
                | (ApiInstalled, UserCodeRunning)
                | (UserCodeRunning, SummaryCollected)
                | (SummaryCollected, Disposed)
                | (Errored, Disposed)
                | (Created | BootstrapRun | ApiInstalled | UserCodeRunning | SummaryCollected, Errored)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ExecutionPhase::Disposed
    }
}

/// Records the phases an invocation has passed through
#[derive(Debug)]
pub struct PhaseTracker {
    id: ExecutionId,
    history: Vec<ExecutionPhase>,
}

impl PhaseTracker {
    pub fn new(id: ExecutionId) -> Self {
        Self {
            id,
            history: vec![ExecutionPhase::Created],
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn current(&self) -> ExecutionPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(ExecutionPhase::Created)
    }

    pub fn visited(&self, phase: ExecutionPhase) -> bool {
        self.history.contains(&phase)
    }

    pub fn advance(&mut self, next: ExecutionPhase) -> Result<()> {
        let current = self.current();
        if !current.can_advance_to(next) {
            return Err(SandboxError::vm(format!(
                "Invalid execution phase transition {:?} -> {:?}",
                current, next
            )));
        }
        tracing::trace!(execution_id = %self.id, from = ?current, to = ?next, "Execution phase");
        self.history.push(next);
        Ok(())
    }

    /// Move to `Errored` unless already there or disposed.
    pub fn fail(&mut self) {
        if self.current().can_advance_to(ExecutionPhase::Errored) {
            let _ = self.advance(ExecutionPhase::Errored);
        }
    }

    /// Move to `Disposed`, passing through `Errored` when the run did not finish.
    pub fn dispose(&mut self) {
        if !self.current().can_advance_to(ExecutionPhase::Disposed) {
            self.fail();
        }
        let _ = self.advance(ExecutionPhase::Disposed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExecutionPhase::*;

    #[test]
    fn test_execution_id_unique() {
        assert_ne!(ExecutionId::new(), ExecutionId::new());
    }

    #[test]
    fn test_happy_path() {
        let mut tracker = PhaseTracker::new(ExecutionId::new());
        for phase in [BootstrapRun, ApiInstalled, UserCodeRunning, SummaryCollected, Disposed] {
            tracker.advance(phase).unwrap();
        }
        assert!(tracker.current().is_terminal());
        assert!(!tracker.visited(Errored));
    }

    #[test]
    fn test_no_backward_or_skipping_transitions() {
        let mut tracker = PhaseTracker::new(ExecutionId::new());
        assert!(tracker.advance(UserCodeRunning).is_err());
        tracker.advance(BootstrapRun).unwrap();
        assert!(tracker.advance(Created).is_err());
        assert!(tracker.advance(BootstrapRun).is_err());
        assert_eq!(tracker.current(), BootstrapRun);
    }

    #[test]
    fn test_errored_from_running_state() {
        let mut tracker = PhaseTracker::new(ExecutionId::new());
        tracker.advance(BootstrapRun).unwrap();
        tracker.advance(ApiInstalled).unwrap();
        tracker.advance(UserCodeRunning).unwrap();
        tracker.fail();
        assert_eq!(tracker.current(), Errored);
        assert!(tracker.advance(SummaryCollected).is_err());
        tracker.dispose();
        assert_eq!(tracker.current(), Disposed);
        assert!(tracker.visited(UserCodeRunning));
    }

    #[test]
    fn test_dispose_unfinished_run_passes_through_errored() {
        let mut tracker = PhaseTracker::new(ExecutionId::new());
        tracker.advance(BootstrapRun).unwrap();
        tracker.dispose();
        assert!(tracker.visited(Errored));
        assert_eq!(tracker.current(), Disposed);
        // Disposed is final.
        tracker.fail();
        assert_eq!(tracker.current(), Disposed);
    }
}
