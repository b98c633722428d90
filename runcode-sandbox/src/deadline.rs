//! Invocation deadline shared by the watchdog, the event-loop pump and the bridges

use std::time::{Duration, Instant};

/// A fixed point in time computed once when an invocation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn starting_at(started: Instant, budget: Duration) -> Self {
        Self { started, budget }
    }

    pub fn after(budget: Duration) -> Self {
        Self::starting_at(Instant::now(), budget)
    }

    pub fn instant(&self) -> Instant {
        self.started + self.budget
    }

    pub fn tokio_instant(&self) -> tokio::time::Instant {
        tokio::time::Instant::from_std(self.instant())
    }

    /// Time left, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.instant().saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn budget_ms(&self) -> u64 {
        self.budget.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_saturates() {
        let past = Instant::now() - Duration::from_secs(5);
        let deadline = Deadline::starting_at(past, Duration::from_millis(250));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert_eq!(deadline.budget_ms(), 250);
    }

    #[test]
    fn test_fresh_deadline_has_time_left() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(59));
    }
}
