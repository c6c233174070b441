//! Token bucket pacing outbound lookups

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_update: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = f64::min(self.capacity, self.tokens + elapsed * self.refill_per_sec);
        self.last_update = now;
    }
}

/// Shared request budget. Starts full with `burst` tokens and earns one
/// token back every `spacing`.
#[derive(Debug)]
pub struct RequestLimiter {
    bucket: Option<Mutex<Bucket>>,
}

impl RequestLimiter {
    /// Create a limiter. A zero `spacing` never delays anyone.
    pub fn new(spacing: Duration, burst: u32) -> Self {
        if spacing.is_zero() {
            return Self::unlimited();
        }

        let capacity = f64::from(burst.max(1));
        Self {
            bucket: Some(Mutex::new(Bucket {
                capacity,
                tokens: capacity,
                refill_per_sec: 1.0 / spacing.as_secs_f64(),
                last_update: Instant::now(),
            })),
        }
    }

    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    /// Wait until a token is available and take it
    pub async fn acquire(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };

        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                bucket.refill(Instant::now());

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }

                Duration::from_secs_f64((1.0 - bucket.tokens) / bucket.refill_per_sec)
            };

            tokio::time::sleep(wait).await;
        }
    }
}
