//! Per-client request budgets.
//!
//! Every client IP owns a bucket holding up to `burst` requests. The bucket
//! refills continuously so that a full budget is regained after one window.
//! Rejected requests get a 429 with a `Retry-After` hint.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
struct Quota {
    burst: f64,
    refill_per_sec: f64,
}

#[derive(Debug)]
struct Budget {
    remaining: f64,
    touched: Instant,
}

impl Budget {
    fn full(quota: Quota, now: Instant) -> Self {
        Self {
            remaining: quota.burst,
            touched: now,
        }
    }

    /// Spend one request, or report how long until one is available.
    fn spend(&mut self, quota: Quota, now: Instant) -> Result<(), Duration> {
        let idle = now.saturating_duration_since(self.touched).as_secs_f64();
        self.remaining = (self.remaining + idle * quota.refill_per_sec).min(quota.burst);
        self.touched = now;

        if self.remaining >= 1.0 {
            self.remaining -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - self.remaining;
        Err(Duration::from_secs_f64(missing / quota.refill_per_sec))
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    budgets: Arc<Mutex<HashMap<IpAddr, Budget>>>,
    quota: Quota,
}

impl RateLimiter {
    /// `requests` per `window`, all of which may be spent in one burst.
    pub fn per_window(requests: u32, window: Duration) -> Self {
        let burst = f64::from(requests.max(1));
        Self {
            budgets: Arc::new(Mutex::new(HashMap::new())),
            quota: Quota {
                burst,
                refill_per_sec: burst / window.as_secs_f64().max(1.0),
            },
        }
    }

    /// `Err` carries the wait before the client may retry.
    pub async fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let mut budgets = self.budgets.lock().await;
        budgets
            .entry(ip)
            .or_insert_with(|| Budget::full(self.quota, now))
            .spend(self.quota, now)
    }

    /// Forget clients idle for at least `idle`. Their budget would be full
    /// again anyway once a whole window has passed.
    pub async fn purge_stale(&self, idle: Duration) {
        let now = Instant::now();
        self.budgets
            .lock()
            .await
            .retain(|_, budget| now.saturating_duration_since(budget.touched) < idle);
    }
}

impl Default for RateLimiter {
    /// 100 requests per 15 minutes.
    fn default() -> Self {
        Self::per_window(100, Duration::from_secs(15 * 60))
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(ip) = client_ip(&req) else {
        return next.run(req).await;
    };

    match limiter.check(ip).await {
        Ok(()) => next.run(req).await,
        Err(wait) => {
            let retry_after = wait.as_secs().max(1);
            warn!(ip = %ip, retry_after, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(serde_json::json!({
                    "error": "Too many requests from this IP, please try again later."
                })),
            )
                .into_response()
        }
    }
}

/// The peer address when served with connect info, otherwise the first
/// proxy header that parses.
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .or_else(|| forwarded_ip(req.headers()))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header_value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header_value("x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| header_value("x-real-ip").and_then(|v| v.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn budget_allows_a_full_window_then_blocks() {
        let limiter = RateLimiter::per_window(5, Duration::from_secs(900));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..5 {
            assert!(limiter.check(ip).await.is_ok());
        }

        let wait = limiter.check(ip).await.unwrap_err();
        assert!(wait > Duration::from_secs(100));
        assert!(wait <= Duration::from_secs(180));
    }

    #[tokio::test]
    async fn clients_have_separate_budgets() {
        let limiter = RateLimiter::per_window(2, Duration::from_secs(900));
        let ip1: IpAddr = "10.0.0.1".parse().unwrap();
        let ip2: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(ip1).await.is_ok());
        assert!(limiter.check(ip1).await.is_ok());
        assert!(limiter.check(ip1).await.is_err());

        assert!(limiter.check(ip2).await.is_ok());
    }

    #[tokio::test]
    async fn purge_forgets_idle_clients() {
        let limiter = RateLimiter::default();
        let ip: IpAddr = "192.168.1.1".parse().unwrap();
        assert!(limiter.check(ip).await.is_ok());

        limiter.purge_stale(Duration::from_secs(3600)).await;
        assert_eq!(limiter.budgets.lock().await.len(), 1);

        limiter.purge_stale(Duration::ZERO).await;
        assert!(limiter.budgets.lock().await.is_empty());
    }

    #[test]
    fn proxy_headers_are_used_without_connect_info() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), Some("203.0.113.7".parse().unwrap()));

        let req = Request::builder()
            .header("x-real-ip", " 198.51.100.2 ")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), Some("198.51.100.2".parse().unwrap()));

        let req = Request::builder().body(()).unwrap();
        assert_eq!(client_ip(&req), None);
    }
}
