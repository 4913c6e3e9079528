//! Per-client request quotas.
//!
//! Every request draws from the client's general quota; note mutations also
//! draw from a smaller write quota. Exhausting either yields a 429.

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, Method, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
};

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use crate::{app::AppState, config::RateLimitConfig, dto::RateLimitedResponse};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    All,
    Writes,
}

/// Quota for `max` requests per `window`, all of which may arrive at once.
fn quota(window: Duration, max: u32) -> Quota {
    let max = NonZeroU32::new(max).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(window / max.get())
        .unwrap_or_else(|| Quota::per_second(max))
        .allow_burst(max)
}

pub struct RateLimits {
    config: RateLimitConfig,
    limiters: DashMap<(IpAddr, Bucket), Arc<DirectRateLimiter>>,
}

impl RateLimits {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limiters: DashMap::new(),
        }
    }

    fn limiter(&self, ip: IpAddr, bucket: Bucket) -> Arc<DirectRateLimiter> {
        self.limiters
            .entry((ip, bucket))
            .or_insert_with(|| {
                let max = match bucket {
                    Bucket::All => self.config.max_requests,
                    Bucket::Writes => self.config.max_writes,
                };
                Arc::new(RateLimiter::direct(quota(self.config.window, max)))
            })
            .clone()
    }

    fn admit(&self, ip: IpAddr, bucket: Bucket) -> Result<(), RateLimited> {
        self.limiter(ip, bucket).check().map_err(|not_until| RateLimited {
            bucket,
            retry_after: not_until.wait_time_from(DefaultClock::default().now()),
            window: self.config.window,
        })
    }

    fn check(&self, ip: IpAddr, is_write: bool) -> Result<(), RateLimited> {
        if !self.config.enabled {
            return Ok(());
        }

        self.admit(ip, Bucket::All)?;
        if is_write {
            self.admit(ip, Bucket::Writes)?;
        }

        Ok(())
    }

    fn client_ip(&self, request: &Request) -> IpAddr {
        let forwarded = self
            .config
            .trust_forwarded_for
            .then(|| request.headers().get("x-forwarded-for"))
            .flatten()
            .and_then(|h| h.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse().ok());

        forwarded
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

#[derive(Debug)]
struct RateLimited {
    bucket: Bucket,
    retry_after: Duration,
    window: Duration,
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        let error = match self.bucket {
            Bucket::All => "Too many requests, please try again later",
            Bucket::Writes => "Too many write requests, please try again later",
        };
        let body = RateLimitedResponse {
            error: error.to_string(),
            retry_after_minutes: self.window.as_secs().div_ceil(60),
        };

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let retry_after = self.retry_after.as_secs().max(1);
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}

fn is_note_write(method: &Method, path: &str) -> bool {
    let mutating = *method == Method::POST || *method == Method::PUT || *method == Method::DELETE;
    mutating && (path == "/notes" || path.starts_with("/notes/"))
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let limits = &state.rate_limits;
    let ip = limits.client_ip(&request);
    let is_write = is_note_write(request.method(), request.uri().path());

    if let Err(limited) = limits.check(ip, is_write) {
        tracing::warn!(
            "Rate limit exceeded for {}: {} {}",
            ip,
            request.method(),
            request.uri().path()
        );
        return limited.into_response();
    }

    next.run(request).await
}
