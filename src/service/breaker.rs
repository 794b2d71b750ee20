//! Process-wide circuit breaker for collaborating services.
//!
//! The breaker only remembers when a service was last seen down. While the
//! cooldown runs, calls are short-circuited to "unavailable". A stale breaker
//! costs at most one extra request.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::clock::{Clock, SystemClock};

/// Default time a tripped breaker stays open.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

pub struct CircuitBreaker {
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    open_until: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_clock(Arc::new(SystemClock), cooldown)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            clock,
            cooldown,
            open_until: Mutex::new(None),
        }
    }

    /// Whether calls should be short-circuited right now.
    pub fn is_open(&self) -> bool {
        let mut open_until = self.open_until.lock().unwrap_or_else(|e| e.into_inner());
        match *open_until {
            Some(until) if self.clock.now() < until => true,
            Some(_) => {
                *open_until = None;
                false
            }
            None => false,
        }
    }

    /// Open the breaker for one cooldown period.
    pub fn trip(&self) {
        let until = self.clock.now() + self.cooldown;
        *self.open_until.lock().unwrap_or_else(|e| e.into_inner()) = Some(until);
        log::warn!("Service marked unavailable for {}s", self.cooldown.as_secs());
    }

    pub fn reset(&self) {
        *self.open_until.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("cooldown", &self.cooldown)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::clock::ManualClock;

    #[test]
    fn test_breaker_cooldown() {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::with_clock(clock.clone(), Duration::from_secs(60));
        assert!(!breaker.is_open());

        breaker.trip();
        assert!(breaker.is_open());
        clock.advance(Duration::from_secs(59));
        assert!(breaker.is_open());
        clock.advance(Duration::from_secs(1));
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_breaker_reset() {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::with_clock(clock, Duration::from_secs(60));
        breaker.trip();
        breaker.reset();
        assert!(!breaker.is_open());
    }
}
