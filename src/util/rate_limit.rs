//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Position report limit per tracker connection. The vision pipeline runs
/// at camera rate; anything faster than this is a misbehaving client.
pub const POSITION_RATE_LIMIT: u32 = 120;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct TrackerRateLimiter {
    position_limiter: Arc<Limiter>,
}

impl TrackerRateLimiter {
    pub fn new() -> Self {
        Self {
            position_limiter: create_limiter(POSITION_RATE_LIMIT),
        }
    }

    /// Check if a position report is allowed (returns true if allowed)
    pub fn check_position(&self) -> bool {
        self.position_limiter.check().is_ok()
    }
}

impl Default for TrackerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
