use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const CLEANUP_THRESHOLD: usize = 10_000;

/// Fixed-window limiter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<DashMap<IpAddr, (u32, Instant)>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            state: Arc::new(DashMap::new()),
            limit,
            window,
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Counts one request; `false` once `ip` exhausted its window.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut entry = self.state.entry(ip).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) >= self.window {
            *count = 0;
            *window_start = now;
        }
        let allowed = *count < self.limit;
        if allowed {
            *count += 1;
        }
        drop(entry);

        if self.state.len() > CLEANUP_THRESHOLD {
            let window = self.window;
            self.state
                .retain(|_, (_, start)| now.duration_since(*start) < window);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn blocks_after_limit_and_resets_with_window() {
        let limiter = RateLimiter::per_minute(2);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let t0 = Instant::now();

        assert!(limiter.check_at(ip, t0));
        assert!(limiter.check_at(ip, t0 + Duration::from_secs(1)));
        assert!(!limiter.check_at(ip, t0 + Duration::from_secs(2)));
        assert!(limiter.check_at(ip, t0 + Duration::from_secs(61)));
    }

    #[test]
    fn clients_are_tracked_separately() {
        let limiter = RateLimiter::per_minute(1);
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
        assert!(!limiter.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
    }
}
