//! Token-bucket rate limiter with an optional daily counter, shared as a
//! single instance per remote service (§4.4, §4.6, §5: "single token
//! bucket per remote service; only the bucket owner mutates internal
//! counters").

use chrono::{NaiveDate, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
#[error("daily request quota exhausted for {service} ({limit} requests)")]
pub struct DailyQuotaExceeded {
    pub service: String,
    pub limit: u32,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    service: String,
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
    daily_limit: Option<u32>,
    daily: Mutex<(NaiveDate, u32)>,
}

impl RateLimiter {
    pub fn new(service: impl Into<String>, requests_per_second: u32, daily_limit: Option<u32>) -> Self {
        let rps = requests_per_second.max(1) as f64;
        Self {
            service: service.into(),
            capacity: rps,
            refill_per_sec: rps,
            bucket: Mutex::new(Bucket {
                tokens: rps,
                last_refill: Instant::now(),
            }),
            daily_limit,
            daily: Mutex::new((Utc::now().date_naive(), 0)),
        }
    }

    /// Blocks (async sleep) until a token is available, then checks the
    /// daily counter. Returns an error without waiting if the daily quota
    /// is already exhausted for today.
    pub async fn acquire(&self) -> Result<(), DailyQuotaExceeded> {
        if let Some(limit) = self.daily_limit {
            let today = Utc::now().date_naive();
            let mut daily = self.daily.lock().expect("lock poisoned");
            if daily.0 != today {
                *daily = (today, 0);
            }
            if daily.1 >= limit {
                return Err(DailyQuotaExceeded {
                    service: self.service.clone(),
                    limit,
                });
            }
            daily.1 += 1;
        }

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().expect("lock poisoned");
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };

            match wait {
                None => return Ok(()),
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_up_to_capacity() {
        let limiter = RateLimiter::new("test", 5, None);
        for _ in 0..5 {
            limiter.acquire().await.unwrap();
        }
    }

    #[tokio::test]
    async fn daily_quota_rejects_once_exhausted() {
        let limiter = RateLimiter::new("test", 100, Some(2));
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        let result = limiter.acquire().await;
        assert!(result.is_err());
    }
}
