//! Injectable monotonic clock.
//!
//! The rate limiter and the context cache both make time-based decisions
//! (window purges, idle expiry). They take the clock as a constructor
//! argument so tests can drive time by hand instead of sleeping.

use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The real clock. Default for production construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Convenience for the common case.
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
