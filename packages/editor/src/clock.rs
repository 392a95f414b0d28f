//! # Logical Clock
//!
//! Time in seconds as seen by the timeline. The document clock is a
//! [`PausableClock`] over some [`ClockSource`]:
//!
//! ```text
//! source   0 ── 5 ──────── 12 ─────── 15
//!              start       stop      start ... now() = 7 + (t - 15)
//! ```

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;

/// Monotonic seconds
pub trait ClockSource: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Manually advanced time, for tests and offline runs
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }

    pub fn set(&self, seconds: f64) {
        *self.now.lock() = seconds;
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

/// Clock that only advances while started. Starts stopped at 0.
pub struct PausableClock {
    source: Arc<dyn ClockSource>,
    accumulated: f64,
    running_since: Option<f64>,
}

impl PausableClock {
    pub fn new(source: Arc<dyn ClockSource>) -> Self {
        Self {
            source,
            accumulated: 0.0,
            running_since: None,
        }
    }

    pub fn now(&self) -> f64 {
        match self.running_since {
            Some(since) => self.accumulated + (self.source.now() - since),
            None => self.accumulated,
        }
    }

    pub fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(self.source.now());
        }
    }

    pub fn stop(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += self.source.now() - since;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }
}

impl std::fmt::Debug for PausableClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PausableClock")
            .field("now", &self.now())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_does_not_count() {
        let source = Arc::new(ManualClock::new());
        let mut clock = PausableClock::new(source.clone());
        assert_eq!(clock.now(), 0.0);

        clock.start();
        source.advance(3.0);
        clock.stop();
        source.advance(100.0);
        assert_eq!(clock.now(), 3.0);

        clock.start();
        source.advance(4.0);
        assert_eq!(clock.now(), 7.0);
    }

    #[test]
    fn test_repeated_start_and_stop() {
        let source = Arc::new(ManualClock::new());
        let mut clock = PausableClock::new(source.clone());
        clock.start();
        clock.start();
        source.advance(1.0);
        clock.stop();
        clock.stop();
        source.advance(1.0);
        assert_eq!(clock.now(), 1.0);
        assert!(!clock.is_running());

        for _ in 0..5 {
            clock.start();
            source.advance(2.0);
            clock.stop();
            source.advance(10.0);
        }
        assert_eq!(clock.now(), 11.0);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
        assert!(a > 1_000_000_000.0);
    }
}
