//! @ai:module:intent Throttle requests to the text-generation capability
//! @ai:module:layer infrastructure
//! @ai:module:public_api RateLimiter, RateLimiterTrait
//! @ai:module:stateless false

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// @ai:intent Anything that can gate an outgoing request
pub trait RateLimiterTrait: Send + Sync {
    /// @ai:intent Wait until one more request may be sent
    fn wait(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// @ai:intent Token bucket refilled continuously at `requests_per_minute`
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    per_second: f64,
    capacity: f64,
}

struct Bucket {
    available: f64,
    refreshed_at: Instant,
}

impl Bucket {
    /// @ai:intent Credit tokens earned since the last refresh, capped at capacity
    /// @ai:effects state:write
    fn refresh(&mut self, per_second: f64, capacity: f64) {
        let now = Instant::now();
        let earned = now.duration_since(self.refreshed_at).as_secs_f64() * per_second;
        self.available = (self.available + earned).min(capacity);
        self.refreshed_at = now;
    }
}

impl RateLimiter {
    /// @ai:intent Create a limiter that starts with a full minute of burst
    /// @ai:pre requests_per_minute > 0 (zero is treated as one)
    /// @ai:effects pure
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f64;
        Self {
            bucket: Mutex::new(Bucket {
                available: capacity,
                refreshed_at: Instant::now(),
            }),
            per_second: capacity / 60.0,
            capacity,
        }
    }

    /// @ai:intent Take a token if one is available, else report how long to wait
    /// @ai:effects state:write
    async fn try_take(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock().await;
        bucket.refresh(self.per_second, self.capacity);

        if bucket.available >= 1.0 {
            bucket.available -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - bucket.available;
            Err(Duration::from_secs_f64(missing / self.per_second))
        }
    }
}

impl RateLimiterTrait for RateLimiter {
    /// @ai:effects state:write, time
    async fn wait(&self) {
        while let Err(delay) = self.try_take().await {
            tracing::trace!("Rate limited, sleeping {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}
