//! Response cache lifetime resolution.
//!
//! An authenticated response must never outlive the token that produced it,
//! so its lifetime is pinned to the token expiry regardless of what the
//! handler asked for. Public responses keep a handler-chosen policy, then
//! fall back to a per-route override, then to one year.

use axum::http::header::{CACHE_CONTROL, EXPIRES};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::{Config, DEFAULT_CACHE_MAX_AGE_SECS};
use crate::context::AuthState;
use crate::utils::http_date_from_secs;

/// Cache header policy derived from configuration.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    enabled: bool,
    overrides: Vec<(String, u64)>,
}

impl CachePolicy {
    pub fn new(enabled: bool, overrides: Vec<(String, u64)>) -> Self {
        Self { enabled, overrides }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.caching_enabled, config.cache_route_overrides.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn override_for(&self, path: &str) -> Option<u64> {
        self.overrides
            .iter()
            .find(|(route, _)| route == path)
            .map(|(_, secs)| *secs)
    }

    /// Stamp cache headers on a finished response.
    pub fn resolve(
        &self,
        auth: &AuthState,
        status: StatusCode,
        headers: &mut HeaderMap,
        path: &str,
        now: DateTime<Utc>,
    ) {
        if !self.enabled {
            return;
        }

        if status.is_server_error() {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.remove(EXPIRES);
            return;
        }

        if let Some(expires_at) = auth.expires_at() {
            let max_age = (expires_at - now.timestamp()).max(0);
            set(headers, EXPIRES, &http_date_from_secs(expires_at));
            set(headers, CACHE_CONTROL, &format!("private, max-age={max_age}"));
            debug!(expires_at, max_age, "Cache lifetime bound to token expiry");
            return;
        }

        if headers.contains_key(CACHE_CONTROL) || headers.contains_key(EXPIRES) {
            return;
        }

        let max_age = self
            .override_for(path)
            .unwrap_or(DEFAULT_CACHE_MAX_AGE_SECS);
        set(headers, CACHE_CONTROL, &format!("max-age={max_age}"));
    }
}

fn set(headers: &mut HeaderMap, name: axum::http::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
