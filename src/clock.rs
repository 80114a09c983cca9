//! Deterministic clock abstraction for testable time-dependent logic.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::time::Instant;

/// Monotonic epoch for `SystemClock::monotonic`, captured at first use.
static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Clock trait for deterministic time in tests.
pub trait Clock: Send + Sync {
    /// Get the current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Elapsed monotonic time since an arbitrary fixed origin.
    ///
    /// Unlike `now_utc`, this reading cannot be moved by the user editing
    /// the system clock, so differences between two readings measure real
    /// elapsed time.
    fn monotonic(&self) -> std::time::Duration;
}

/// System clock using actual wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> std::time::Duration {
        PROCESS_EPOCH.elapsed()
    }
}

/// Mock clock for deterministic testing.
///
/// Interior mutability lets tests share the clock via `Arc` with the
/// services under test and move time while they hold a reference.
///
/// `advance` models real time passing: wall and monotonic time move
/// together. `turn_back` and `set` model a user editing the system clock:
/// only wall time moves, the monotonic reading is unaffected.
#[cfg(any(test, feature = "test-seams"))]
#[derive(Debug)]
pub struct MockClock {
    state: std::sync::Mutex<MockState>,
}

#[cfg(any(test, feature = "test-seams"))]
#[derive(Debug)]
struct MockState {
    now: DateTime<Utc>,
    monotonic: std::time::Duration,
}

#[cfg(any(test, feature = "test-seams"))]
impl MockClock {
    /// Create a mock clock frozen at the given time.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: std::sync::Mutex::new(MockState {
                now,
                monotonic: std::time::Duration::ZERO,
            }),
        }
    }

    /// Create a mock clock from an RFC 3339 string.
    pub fn from_rfc3339(s: &str) -> Self {
        Self::new(
            DateTime::parse_from_rfc3339(s)
                .expect("valid RFC 3339")
                .with_timezone(&Utc),
        )
    }

    /// Let real time pass: advance wall and monotonic time together.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut state = self.state.lock().expect("clock lock");
        state.now += duration;
        state.monotonic += duration.to_std().unwrap_or(std::time::Duration::ZERO);
    }

    /// Roll the wall clock backward, simulating a user editing the system
    /// clock. Monotonic time is unaffected.
    pub fn turn_back(&self, duration: chrono::Duration) {
        let mut state = self.state.lock().expect("clock lock");
        state.now -= duration;
    }

    /// Jump the wall clock to an absolute time, simulating a user editing
    /// the system clock. Monotonic time is unaffected.
    pub fn set(&self, now: DateTime<Utc>) {
        self.state.lock().expect("clock lock").now = now;
    }
}

#[cfg(any(test, feature = "test-seams"))]
impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.state.lock().expect("clock lock").now
    }

    fn monotonic(&self) -> std::time::Duration {
        self.state.lock().expect("clock lock").monotonic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn system_clock_returns_time() {
        let clock = SystemClock;
        let now = clock.now_utc();
        // Just verify it doesn't panic and returns something reasonable
        assert!(now.year() >= 2024);
    }

    #[test]
    fn system_clock_monotonic_never_decreases() {
        let clock = SystemClock;
        let first = clock.monotonic();
        let second = clock.monotonic();
        assert!(second >= first);
    }

    #[test]
    fn mock_clock_is_deterministic() {
        let clock = MockClock::from_rfc3339("2025-01-15T12:00:00Z");
        assert_eq!(clock.now_utc().to_rfc3339(), "2025-01-15T12:00:00+00:00");
        assert_eq!(clock.now_utc().to_rfc3339(), "2025-01-15T12:00:00+00:00");
    }

    #[test]
    fn mock_clock_advances_wall_and_monotonic_together() {
        let clock = MockClock::from_rfc3339("2025-01-15T12:00:00Z");
        clock.advance(chrono::Duration::hours(1));
        assert_eq!(clock.now_utc().to_rfc3339(), "2025-01-15T13:00:00+00:00");
        assert_eq!(clock.monotonic(), std::time::Duration::from_secs(3600));
    }

    #[test]
    fn mock_clock_turn_back_leaves_monotonic_alone() {
        let clock = MockClock::from_rfc3339("2025-01-15T12:00:00Z");
        clock.advance(chrono::Duration::minutes(10));
        clock.turn_back(chrono::Duration::minutes(30));
        assert_eq!(clock.now_utc().to_rfc3339(), "2025-01-15T11:40:00+00:00");
        assert_eq!(clock.monotonic(), std::time::Duration::from_secs(600));
    }

    #[test]
    fn mock_clock_set_leaves_monotonic_alone() {
        let clock = MockClock::from_rfc3339("2025-01-15T12:00:00Z");
        clock.set(
            DateTime::parse_from_rfc3339("2025-02-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        assert_eq!(clock.now_utc().to_rfc3339(), "2025-02-01T00:00:00+00:00");
        assert_eq!(clock.monotonic(), std::time::Duration::ZERO);
    }
}
