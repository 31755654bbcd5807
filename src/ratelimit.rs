//! Per-mobile throttling for SMS sends, one message per minute.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use crate::errors::ApiError;

pub struct SmsRateLimiter {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
}

impl SmsRateLimiter {
    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(60))
    }

    fn with_period(period: Duration) -> Self {
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_minute(NonZeroU32::new(1).expect("nonzero")));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn check(&self, mobile: &str) -> Result<(), ApiError> {
        self.limiter
            .check_key(&mobile.to_string())
            .map_err(|_| ApiError::TooManyRequests)
    }
}

impl Default for SmsRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_send_within_the_window_is_blocked() {
        let limiter = SmsRateLimiter::new();

        assert!(limiter.check("13800138000").is_ok());
        assert!(matches!(
            limiter.check("13800138000"),
            Err(ApiError::TooManyRequests)
        ));
    }

    #[test]
    fn different_mobiles_do_not_share_a_bucket() {
        let limiter = SmsRateLimiter::new();

        assert!(limiter.check("13800138000").is_ok());
        assert!(limiter.check("13900139000").is_ok());
    }
}
