//! Call deadline timer implemented using `tokio::time::Sleep`.

use std::pin::Pin;

use crate::utils::ChaseError;

use tokio::time::{self, Duration, Instant, Sleep};

/// Timer utility for signalling after a given timeout. One timer is armed
/// per outstanding call and awaited alongside the reply.
///
/// Must be used within the context of a tokio runtime.
#[derive(Debug)]
pub struct Timer {
    /// Inner `tokio::time::Sleep` future, wrapped in a pinned box to support
    /// await multiple times.
    sleep: Pin<Box<Sleep>>,

    /// Timeout duration used by the last arming.
    last_dur: Duration,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Creates a new timer utility that immediately times-out after a
    /// zero-length duration.
    pub fn new() -> Self {
        Timer {
            sleep: Box::pin(time::sleep(Duration::ZERO)),
            last_dur: Duration::ZERO,
        }
    }

    /// Gets the last timeout duration used.
    pub fn get_dur(&self) -> Duration {
        self.last_dur
    }

    /// Arms the timer to fire `dur` from now.
    pub fn restart(&mut self, dur: Duration) -> Result<(), ChaseError> {
        if dur.is_zero() {
            return Err(ChaseError::msg(format!(
                "invalid timeout duration {} ns",
                dur.as_nanos()
            )));
        }

        self.last_dur = dur;
        self.sleep.as_mut().reset(Instant::now() + dur);
        Ok(())
    }

    /// Returns true if the current deadline has already passed.
    pub fn expired(&self) -> bool {
        self.sleep.is_elapsed()
    }

    /// Waits for the timer to timeout. Typically, this should be used as a
    /// branch of a `tokio::select!`.
    pub async fn timeout(&mut self) {
        self.sleep.as_mut().await
    }
}

#[cfg(test)]
mod timer_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn timer_new() {
        let timer = Timer::new();
        assert!(timer.get_dur().is_zero());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timer_zero_rejected() {
        let mut timer = Timer::new();
        assert!(timer.restart(Duration::ZERO).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timer_deadline() -> Result<(), ChaseError> {
        let mut timer = Timer::new();
        let start = Instant::now();
        timer.restart(Duration::from_millis(100))?;
        assert!(!timer.expired());
        timer.timeout().await;
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(100));
        assert!(timer.expired());
        assert_eq!(timer.get_dur(), Duration::from_millis(100));
        Ok(())
    }
}
