//! Sliding-window admission control.
//!
//! Each identity+tier pair tracks a rolling list of admit timestamps.
//! Timestamps older than the tier's window are purged before every check.
//! Tiers with a lifetime cap (demo access) fail terminally once the cap is
//! reached; window-limited failures carry a computed wait derived from the
//! oldest surviving timestamp. This component is pure admission control and
//! knows nothing about message content.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use amity_types::error::AdmissionError;

use crate::clock::{Clock, SystemClock};

/// Access tier an identity sends under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Unauthenticated trial access: 5/min, 10 messages ever.
    Demo,
    /// Authenticated free plan: 10/min. The free-message quota is a
    /// business rule owned by the caller, not a limiter concern.
    Free,
    /// Paid plan: 60/min, uncapped.
    Premium,
}

/// Limits a tier enforces.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub window: Duration,
    pub max_per_window: u32,
    pub lifetime_cap: Option<u32>,
}

impl Tier {
    pub fn limits(&self) -> TierLimits {
        let window = Duration::from_secs(60);
        match self {
            Tier::Demo => TierLimits {
                window,
                max_per_window: 5,
                lifetime_cap: Some(10),
            },
            Tier::Free => TierLimits {
                window,
                max_per_window: 10,
                lifetime_cap: None,
            },
            Tier::Premium => TierLimits {
                window,
                max_per_window: 60,
                lifetime_cap: None,
            },
        }
    }
}

/// Rolling request history for one identity+tier pair.
#[derive(Debug, Default)]
struct RateWindow {
    stamps: VecDeque<Instant>,
    lifetime: u32,
}

/// Per-identity sliding-window rate limiter.
///
/// Constructed once by the composition root and shared by reference; state
/// is a keyed map behind a mutex, so separate limiter instances (e.g. in
/// tests) never share counters.
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, Tier), RateWindow>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Decide whether one more request from `identity` under `tier` may
    /// proceed, recording it if so.
    pub fn admit(&self, identity: &str, tier: Tier) -> Result<(), AdmissionError> {
        let limits = tier.limits();
        let now = self.clock.now();

        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = windows
            .entry((identity.to_string(), tier))
            .or_default();

        // Purge everything that has slid out of the window.
        while let Some(&oldest) = window.stamps.front() {
            if now.duration_since(oldest) >= limits.window {
                window.stamps.pop_front();
            } else {
                break;
            }
        }

        if let Some(cap) = limits.lifetime_cap
            && window.lifetime >= cap
        {
            tracing::info!(identity, ?tier, cap, "lifetime cap exhausted");
            return Err(AdmissionError::LifetimeExceeded);
        }

        if window.stamps.len() as u32 >= limits.max_per_window {
            // The oldest surviving stamp is strictly inside the window, so
            // the wait is always in (0, window].
            let oldest = window.stamps.front().copied().unwrap_or(now);
            let retry_after = limits.window - now.duration_since(oldest);
            tracing::debug!(identity, ?tier, ?retry_after, "window limit reached");
            return Err(AdmissionError::RateExceeded { retry_after });
        }

        window.stamps.push_back(now);
        window.lifetime += 1;
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
