//! Idle detection as an explicit two-state machine.
//!
//! The monitor loop in the CLI drives [`IdleTracker::observe`] on a
//! timer; the tracker reports a transition only when the state actually
//! changes, so repeated identical checks stay silent.

use std::time::Duration;

/// Longest allowed gap between idle checks, regardless of threshold.
const MAX_POLL_PERIOD: Duration = Duration::from_secs(30);

/// Binary idle/active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleState {
    #[default]
    Active,
    Idle,
}

impl IdleState {
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Pure transition function: idle iff the observed idle seconds meet
/// the threshold.
#[must_use]
pub const fn next(_state: IdleState, idle_seconds: u64, threshold_seconds: u64) -> IdleState {
    if idle_seconds >= threshold_seconds {
        IdleState::Idle
    } else {
        IdleState::Active
    }
}

/// Poll period for the idle monitor: the threshold itself, capped at
/// 30 seconds so large thresholds still get timely checks.
#[must_use]
pub fn poll_period(threshold_seconds: u64) -> Duration {
    Duration::from_secs(threshold_seconds).min(MAX_POLL_PERIOD)
}

/// Hysteresis tracker holding the last observed state.
#[derive(Debug, Default)]
pub struct IdleTracker {
    state: IdleState,
}

impl IdleTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> IdleState {
        self.state
    }

    /// Feeds one idle-seconds observation. Returns the new state only
    /// when it differs from the previous one.
    pub fn observe(&mut self, idle_seconds: u64, threshold_seconds: u64) -> Option<IdleState> {
        let next_state = next(self.state, idle_seconds, threshold_seconds);
        if next_state == self.state {
            return None;
        }
        self.state = next_state;
        Some(next_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_at_threshold() {
        assert_eq!(next(IdleState::Active, 299, 300), IdleState::Active);
        assert_eq!(next(IdleState::Active, 300, 300), IdleState::Idle);
        assert_eq!(next(IdleState::Idle, 0, 300), IdleState::Active);
    }

    #[test]
    fn callback_fires_exactly_once_per_transition() {
        // Sequence [0, 0, 400, 400, 0] with threshold 300 must produce
        // exactly two transitions: active->idle and idle->active.
        let mut tracker = IdleTracker::new();
        let observations = [0_u64, 0, 400, 400, 0];
        let transitions: Vec<IdleState> = observations
            .iter()
            .filter_map(|&secs| tracker.observe(secs, 300))
            .collect();

        assert_eq!(transitions, vec![IdleState::Idle, IdleState::Active]);
    }

    #[test]
    fn initial_state_is_active() {
        let mut tracker = IdleTracker::new();
        assert_eq!(tracker.state(), IdleState::Active);
        // Starting active and observing activity reports nothing.
        assert_eq!(tracker.observe(0, 300), None);
    }

    #[test]
    fn poll_period_caps_at_thirty_seconds() {
        assert_eq!(poll_period(10), Duration::from_secs(10));
        assert_eq!(poll_period(30), Duration::from_secs(30));
        assert_eq!(poll_period(300), Duration::from_secs(30));
        assert_eq!(poll_period(0), Duration::from_secs(0));
    }
}
