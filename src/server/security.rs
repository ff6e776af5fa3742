//! Security middleware for the task protocol server.
//!
//! Every mutating route passes, in order: CORS allow-list, API-key check,
//! sliding-window rate limiter. The public `card` route bypasses the chain.
//!
//! When no shared secret is configured, requests are only accepted if the
//! explicit `dev_mode` flag is set. The flag comes from configuration, never
//! from the peer address: address-based trust is spoofable behind reverse
//! proxies.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ProtocolError;
use crate::server::AppState;

/// Default requests per minute per client identity.
pub const DEFAULT_PER_MINUTE: u32 = 60;

/// Default requests per hour per client identity.
pub const DEFAULT_PER_HOUR: u32 = 500;

/// Security configuration for one server instance.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Shared secret required in `X-API-Key`. `None` means no key is
    /// configured and only dev mode grants access.
    pub api_key: Option<String>,
    /// Explicit development bypass when no API key is configured.
    pub dev_mode: bool,
    /// Origins allowed by the CORS layer.
    pub allowed_origins: Vec<String>,
    /// Sliding-window limit per minute.
    pub requests_per_minute: u32,
    /// Sliding-window limit per hour.
    pub requests_per_hour: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            dev_mode: false,
            allowed_origins: Vec::new(),
            requests_per_minute: DEFAULT_PER_MINUTE,
            requests_per_hour: DEFAULT_PER_HOUR,
        }
    }
}

impl SecurityConfig {
    /// Builder method to set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builder method to enable dev mode.
    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    /// Builder method to set the per-minute limit.
    pub fn with_requests_per_minute(mut self, limit: u32) -> Self {
        self.requests_per_minute = limit;
        self
    }

    /// Builder method to set the per-hour limit.
    pub fn with_requests_per_hour(mut self, limit: u32) -> Self {
        self.requests_per_hour = limit;
        self
    }
}

/// Constant-time byte comparison.
///
/// Folds the XOR of every byte pair so the comparison time does not depend
/// on the position of the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Sliding-window rate limiter keyed by client identity.
///
/// Keeps per-client request timestamps for the last hour; both the minute
/// and the hour window are evaluated on every request. The middleware
/// builds the identity from the API key and the optional `X-Client-Id`
/// header, so tenants sharing a deployment secret do not share a bucket.
pub struct RateLimiter {
    per_minute: u32,
    per_hour: u32,
    requests: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        Self {
            per_minute,
            per_hour,
            requests: HashMap::new(),
        }
    }

    /// Records a request at `now` and returns an error if either window is
    /// already full.
    pub fn check_at(&mut self, identity: &str, now: Instant) -> Result<(), ProtocolError> {
        let window = self.requests.entry(identity.to_string()).or_default();

        let hour = Duration::from_secs(3600);
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= hour {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() as u32 >= self.per_hour {
            // earliest retry is when the oldest request ages out of the hour
            let retry_secs = window
                .front()
                .map(|t| 3600u64.saturating_sub(now.duration_since(*t).as_secs()))
                .unwrap_or(0)
                .max(1);
            return Err(ProtocolError::RateLimited(format!(
                "{} requests per hour; retry in {}s",
                self.per_hour, retry_secs
            )));
        }

        let minute = Duration::from_secs(60);
        let recent = window
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) < minute)
            .count() as u32;
        if recent >= self.per_minute {
            // the window frees a slot once the oldest of the recent
            // requests leaves the minute
            let oldest_recent = window[window.len() - recent as usize];
            let retry_secs = 60u64
                .saturating_sub(now.duration_since(oldest_recent).as_secs())
                .max(1);
            return Err(ProtocolError::RateLimited(format!(
                "{} requests per minute; retry in {}s",
                self.per_minute, retry_secs
            )));
        }

        window.push_back(now);
        Ok(())
    }

    /// Records a request now.
    pub fn check(&mut self, identity: &str) -> Result<(), ProtocolError> {
        self.check_at(identity, Instant::now())
    }
}

/// Verifies the API key / dev-mode policy for one request.
pub fn authorize(config: &SecurityConfig, presented_key: Option<&str>) -> Result<(), ProtocolError> {
    match (&config.api_key, presented_key) {
        (Some(expected), Some(presented)) => {
            if constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
                Ok(())
            } else {
                Err(ProtocolError::Forbidden("invalid API key".to_string()))
            }
        }
        (Some(_), None) => Err(ProtocolError::MissingApiKey),
        (None, _) => {
            if config.dev_mode {
                Ok(())
            } else {
                Err(ProtocolError::Forbidden(
                    "no API key configured and dev mode is disabled".to_string(),
                ))
            }
        }
    }
}

/// axum middleware applying the API-key check and the rate limiter to every
/// mutating route.
pub async fn security_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ProtocolError> {
    let presented_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    authorize(&state.security, presented_key.as_deref())?;

    // identity is the presented key plus an optional `X-Client-Id`, so
    // clients sharing one deployment secret get separate buckets; clients
    // that send neither header share the anonymous bucket
    let client_id = request
        .headers()
        .get("x-client-id")
        .and_then(|v| v.to_str().ok());
    let key = presented_key.as_deref().unwrap_or("anonymous");
    let identity = match client_id {
        Some(id) => format!("{key}:{id}"),
        None => key.to_string(),
    };
    state.rate_limiter.lock().await.check(&identity)?;

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secre"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_authorize_matching_key() {
        let config = SecurityConfig::default().with_api_key("s3cret");
        assert!(authorize(&config, Some("s3cret")).is_ok());
    }

    #[test]
    fn test_authorize_wrong_key_forbidden() {
        let config = SecurityConfig::default().with_api_key("s3cret");
        let err = authorize(&config, Some("wrong")).unwrap_err();
        assert!(matches!(err, ProtocolError::Forbidden(_)));
    }

    #[test]
    fn test_authorize_missing_key() {
        let config = SecurityConfig::default().with_api_key("s3cret");
        let err = authorize(&config, None).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingApiKey));
    }

    #[test]
    fn test_authorize_dev_mode() {
        let config = SecurityConfig::default().with_dev_mode(true);
        assert!(authorize(&config, None).is_ok());
        assert!(authorize(&config, Some("anything")).is_ok());
    }

    #[test]
    fn test_authorize_no_key_no_dev_mode() {
        let config = SecurityConfig::default();
        let err = authorize(&config, None).unwrap_err();
        assert!(matches!(err, ProtocolError::Forbidden(_)));
    }

    #[test]
    fn test_rate_limiter_minute_window() {
        let mut limiter = RateLimiter::new(3, 100);
        let start = Instant::now();

        for i in 0..3 {
            let at = start + Duration::from_secs(i);
            assert!(limiter.check_at("client", at).is_ok());
        }
        // 4th request inside the same minute; the oldest request in the
        // window is 10s old, so a slot frees up in 50s
        let err = limiter
            .check_at("client", start + Duration::from_secs(10))
            .unwrap_err();
        match &err {
            ProtocolError::RateLimited(msg) => assert!(msg.contains("retry in 50s"), "{msg}"),
            other => panic!("expected RateLimited, got {other:?}"),
        }

        // once the window has slid past the first requests, traffic resumes
        assert!(limiter
            .check_at("client", start + Duration::from_secs(61))
            .is_ok());
    }

    #[test]
    fn test_rate_limiter_hour_window() {
        let mut limiter = RateLimiter::new(100, 5);
        let start = Instant::now();

        // spaced a minute apart so the minute window never trips
        for i in 0..5 {
            let at = start + Duration::from_secs(i * 70);
            assert!(limiter.check_at("client", at).is_ok());
        }
        let err = limiter
            .check_at("client", start + Duration::from_secs(6 * 70))
            .unwrap_err();
        match &err {
            ProtocolError::RateLimited(msg) => {
                assert!(msg.contains("per hour"), "{msg}");
                assert!(msg.contains("retry in"), "{msg}");
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_rate_limiter_isolates_clients() {
        let mut limiter = RateLimiter::new(1, 100);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_ok());
        assert!(limiter.check_at("b", now).is_ok());
        assert!(limiter.check_at("a", now).is_err());
    }
}
