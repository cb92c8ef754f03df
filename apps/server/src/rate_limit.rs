use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

type TierMap = DashMap<&'static str, (RateLimitConfig, DashMap<IpAddr, Vec<Instant>>)>;

// ── Configuration ──

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed within one sliding window.
    pub max_requests: u32,
    pub window: Duration,
}

// ── Core rate limiter ──

/// Per-IP sliding-window rate limiter. Each named tier keeps its own config
/// and timestamp map; tier names are fixed at startup.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tiers: Arc<TierMap>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            tiers: Arc::new(DashMap::new()),
        }
    }

    /// Register a tier; chainable at startup.
    pub fn with_tier(self, name: &'static str, max_requests: u32, window: Duration) -> Self {
        self.tiers.insert(
            name,
            (
                RateLimitConfig {
                    max_requests,
                    window,
                },
                DashMap::new(),
            ),
        );
        self
    }

    /// Record a request from `ip` against `tier`. `Err(secs)` means the
    /// caller is over the limit and may retry after that many seconds.
    /// An unregistered tier allows the request and logs the wiring error.
    pub fn check(&self, tier: &'static str, ip: IpAddr) -> Result<(), u64> {
        let Some(tier_entry) = self.tiers.get(tier) else {
            tracing::error!("rate limit tier {:?} is not registered; allowing request", tier);
            return Ok(());
        };
        let (config, ip_map) = tier_entry.value();
        let now = Instant::now();
        let window_start = now - config.window;

        let mut timestamps = ip_map.entry(ip).or_insert_with(Vec::new);
        timestamps.retain(|t| *t > window_start);

        if timestamps.len() >= config.max_requests as usize {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_after = (oldest + config.window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drop IPs whose last request is older than twice the tier window.
    /// Run periodically from a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        for tier_entry in self.tiers.iter() {
            let (config, ip_map) = tier_entry.value();
            let cutoff = config.window * 2;
            ip_map.retain(|_ip, timestamps| {
                timestamps.retain(|t| now.duration_since(*t) < cutoff);
                !timestamps.is_empty()
            });
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// ── IP extraction ──

/// Client IP from X-Forwarded-For (reverse proxy) or the socket address.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first_ip) = forwarded.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| "127.0.0.1".parse().unwrap())
}

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Too many requests. Try again in {} seconds",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

// ── Middleware (one per tier) ──

/// Public browse endpoints: styles, stylists, availability.
pub async fn rate_limit_public(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check("public", ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Booking creation — the strictest tier.
pub async fn rate_limit_booking(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check("booking", ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Admin endpoints.
pub async fn rate_limit_admin(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check("admin", ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

// ── Tests ──
