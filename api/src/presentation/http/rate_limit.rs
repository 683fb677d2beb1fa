//! Token-bucket limiter keyed by client address prefix.
//!
//! Each key owns a bucket of `burst` tokens refilled at `average / period`
//! tokens per second. A request spends one token; an empty bucket answers
//! 429 with `Retry-After`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::bootstrap::config::RateLimitConfig;
use crate::presentation::http::error::ApiError;

const PRUNE_EVERY: u64 = 1024;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

pub struct RateLimiter {
    cfg: RateLimitConfig,
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<LimiterState>,
}

#[derive(Default)]
struct LimiterState {
    buckets: HashMap<IpAddr, Bucket>,
    checks: u64,
}

impl RateLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        let capacity = f64::from(cfg.burst.max(1));
        let refill_per_sec = f64::from(cfg.average.max(1)) / cfg.period_secs.max(1) as f64;
        Self {
            cfg,
            capacity,
            refill_per_sec,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.cfg
    }

    /// Bucket key: the address with host bits beyond the configured prefix cleared.
    pub fn client_key(&self, ip: IpAddr) -> IpAddr {
        match ip {
            IpAddr::V4(v4) => {
                let bits = u32::from(v4) & prefix_mask_u32(self.cfg.ipv4_prefix);
                IpAddr::V4(Ipv4Addr::from(bits))
            }
            IpAddr::V6(v6) => {
                let bits = u128::from(v6) & prefix_mask_u128(self.cfg.ipv6_prefix);
                IpAddr::V6(Ipv6Addr::from(bits))
            }
        }
    }

    pub fn check(&self, ip: IpAddr) -> Decision {
        self.check_at(ip, Instant::now())
    }

    pub fn check_at(&self, ip: IpAddr, now: Instant) -> Decision {
        let key = self.client_key(ip);
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.checks += 1;
        if state.checks.is_multiple_of(PRUNE_EVERY) {
            self.prune_locked(&mut state, now);
        }
        let bucket = state.buckets.entry(key).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let idle = now.saturating_duration_since(bucket.last_refill);
        let elapsed = idle.as_secs_f64();
        bucket.last_refill = now.max(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision::Allowed
        } else {
            let missing = 1.0 - bucket.tokens;
            Decision::Limited {
                retry_after: Duration::from_secs_f64(missing / self.refill_per_sec),
            }
        }
    }

    /// Drops buckets that have refilled completely; they behave like new ones.
    pub fn prune(&self, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        self.prune_locked(&mut state, now);
    }

    pub fn tracked_keys(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .buckets
            .len()
    }

    fn prune_locked(&self, state: &mut LimiterState, now: Instant) {
        let capacity = self.capacity;
        let refill = self.refill_per_sec;
        state.buckets.retain(|_, b| {
            let elapsed = now.saturating_duration_since(b.last_refill).as_secs_f64();
            b.tokens + elapsed * refill < capacity
        });
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    match prefix.min(32) {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    match prefix.min(128) {
        0 => 0,
        p => u128::MAX << (128 - u32::from(p)),
    }
}

fn client_ip(req: &Request, trust_forwarded: bool) -> Option<IpAddr> {
    if trust_forwarded {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(ip) = client_ip(&req, limiter.config().trust_forwarded) else {
        return next.run(req).await;
    };
    match limiter.check(ip) {
        Decision::Allowed => next.run(req).await,
        Decision::Limited { retry_after } => {
            let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            tracing::debug!(client = %limiter.client_key(ip), retry_after = secs, "rate_limited");
            let mut response =
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    fn drain(limiter: &RateLimiter, ip: IpAddr, now: Instant, attempts: usize) -> usize {
        (0..attempts)
            .filter(|_| limiter.check_at(ip, now) == Decision::Allowed)
            .count()
    }

    #[test]
    fn burst_then_steady_state() {
        let limiter = limiter();
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let start = Instant::now();

        assert_eq!(drain(&limiter, ip, start, 250), 200);

        let mut admitted = 0;
        for tick in 1..=50 {
            let now = start + Duration::from_millis(100 * tick);
            admitted += drain(&limiter, ip, now, 50);
        }
        // five seconds at 100/s
        assert!((495..=505).contains(&admitted), "admitted {admitted}");
    }

    #[test]
    fn limited_requests_report_when_to_retry() {
        let limiter = RateLimiter::new(RateLimitConfig {
            average: 1,
            burst: 1,
            period_secs: 2,
            ..RateLimitConfig::default()
        });
        let ip: IpAddr = "198.51.100.1".parse().unwrap();
        let now = Instant::now();
        assert_eq!(limiter.check_at(ip, now), Decision::Allowed);
        assert_eq!(
            limiter.check_at(ip, now),
            Decision::Limited {
                retry_after: Duration::from_secs(2)
            }
        );
        assert_eq!(
            limiter.check_at(ip, now + Duration::from_secs(2)),
            Decision::Allowed
        );
    }

    #[test]
    fn ipv6_clients_share_a_bucket_per_prefix() {
        let limiter = limiter();
        let now = Instant::now();
        let a: IpAddr = "2001:db8:1:2::1".parse().unwrap();
        let b: IpAddr = "2001:db8:1:2:ffff::9".parse().unwrap();
        let other: IpAddr = "2001:db8:1:3::1".parse().unwrap();

        assert_eq!(limiter.client_key(a), limiter.client_key(b));
        assert_eq!(drain(&limiter, a, now, 150), 150);
        assert_eq!(drain(&limiter, b, now, 100), 50);
        assert_eq!(drain(&limiter, other, now, 10), 10);
    }

    #[test]
    fn ipv4_prefix_is_configurable() {
        let masked = RateLimiter::new(RateLimitConfig {
            ipv4_prefix: 24,
            ..RateLimitConfig::default()
        });
        assert_eq!(
            masked.client_key("192.0.2.77".parse().unwrap()),
            "192.0.2.0".parse::<IpAddr>().unwrap()
        );
        let exact = limiter();
        assert_eq!(
            exact.client_key("192.0.2.77".parse().unwrap()),
            "192.0.2.77".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn idle_buckets_are_pruned() {
        let limiter = limiter();
        let now = Instant::now();
        limiter.check_at("192.0.2.1".parse().unwrap(), now);
        limiter.check_at("192.0.2.2".parse().unwrap(), now);
        assert_eq!(limiter.tracked_keys(), 2);
        limiter.prune(now);
        assert_eq!(limiter.tracked_keys(), 2);
        limiter.prune(now + Duration::from_secs(5));
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
