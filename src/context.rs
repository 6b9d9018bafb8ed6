//! Per-request context shared by the gate, the authenticator and handlers.
//!
//! Built once when a request arrives and stored in the request extensions.
//! Only the authenticator changes the auth state, and it does so by
//! producing an updated copy with [`RequestContext::with_auth`].

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::Query;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::middleware::ip::extract_client_ip;

/// Cookie carrying the bearer token issued by `/authresp`.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
/// Cookie carrying the login provider's identity token.
pub const ID_TOKEN_COOKIE: &str = "id_token";
/// Query parameter some clients use to pass the bearer token.
pub const TOKEN_QUERY_PARAM: &str = "jwt";

const SECRET_COOKIES: [&str; 2] = [ACCESS_TOKEN_COOKIE, ID_TOKEN_COOKIE];

/// Authorization state of a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticated {
        subject: String,
        scope: Vec<String>,
        /// Token expiry, epoch seconds
        expires_at: i64,
    },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn expires_at(&self) -> Option<i64> {
        match self {
            AuthState::Authenticated { expires_at, .. } => Some(*expires_at),
            AuthState::Unauthenticated => None,
        }
    }
}

/// Everything a handler needs to know about the inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub arrived_at: DateTime<Utc>,
    pub started: Instant,
    pub method: Method,
    /// Full request path, including any `/api` prefix
    pub path: String,
    pub query: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub host: Option<String>,
    /// Lowercased `Accept` header
    pub accept: Option<String>,
    /// Value after `Bearer ` in the `Authorization` header
    pub bearer: Option<String>,
    /// Request body parsed as JSON, when it is JSON or base64-encoded JSON
    pub body: Option<Value>,
    pub auth: AuthState,
}

impl RequestContext {
    /// Build the context from request parts and the buffered body.
    pub fn from_parts(parts: &Parts, request_id: String, body: &[u8]) -> Self {
        let headers = &parts.headers;
        let query = parse_query(&parts.uri);

        Self {
            request_id,
            arrived_at: Utc::now(),
            started: Instant::now(),
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query,
            cookies: parse_cookies(headers),
            client_ip: extract_client_ip(headers).into_owned(),
            user_agent: header_str(headers, header::USER_AGENT.as_str()),
            host: header_str(headers, header::HOST.as_str()),
            accept: header_str(headers, header::ACCEPT.as_str()).map(|a| a.to_ascii_lowercase()),
            bearer: header_str(headers, header::AUTHORIZATION.as_str())
                .and_then(|v| v.strip_prefix("Bearer ").map(|t| t.trim().to_string()))
                .filter(|t| !t.is_empty()),
            body: decode_body(body),
            auth: AuthState::Unauthenticated,
        }
    }

    /// Copy of this context with a new authorization state.
    pub fn with_auth(&self, auth: AuthState) -> Self {
        Self {
            auth,
            ..self.clone()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// Non-empty query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether a flag-style query parameter is set to anything but an empty value.
    pub fn flag(&self, name: &str) -> bool {
        self.param(name)
            .is_some_and(|v| !v.eq_ignore_ascii_case("false") && v != "0")
    }

    /// Whether the `Accept` header is exactly `media_type`.
    pub fn accepts(&self, media_type: &str) -> bool {
        self.accept.as_deref() == Some(media_type)
    }

    /// Bearer credential, from the header, the access cookie, or `?jwt=`.
    pub fn credential(&self) -> Option<&str> {
        self.bearer
            .as_deref()
            .or_else(|| self.cookies.get(ACCESS_TOKEN_COOKIE).map(String::as_str))
            .or_else(|| self.param(TOKEN_QUERY_PARAM))
            .filter(|t| !t.is_empty())
    }

    /// Query map safe for logs: the token parameter is masked.
    pub fn redacted_query(&self) -> HashMap<&str, &str> {
        self.query
            .iter()
            .map(|(k, v)| {
                let v = if k == TOKEN_QUERY_PARAM { "*****" } else { v.as_str() };
                (k.as_str(), v)
            })
            .collect()
    }

    /// Cookie map safe for logs: token cookies are shortened.
    pub fn redacted_cookies(&self) -> HashMap<&str, String> {
        self.cookies
            .iter()
            .map(|(k, v)| {
                let v = if SECRET_COOKIES.contains(&k.as_str()) {
                    shorten_secret(v)
                } else {
                    v.clone()
                };
                (k.as_str(), v)
            })
            .collect()
    }
}

/// First and last ten characters of a secret; short values are fully masked.
pub fn shorten_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 24 {
        return "*****".to_string();
    }
    let head: String = chars.iter().take(10).collect();
    let tail: String = chars.iter().skip(chars.len() - 10).collect();
    format!("{head}...{tail}")
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Decoded query parameters; an undecodable query string counts as empty.
fn parse_query(uri: &Uri) -> HashMap<String, String> {
    match Query::<HashMap<String, String>>::try_from_uri(uri) {
        Ok(Query(query)) => query,
        Err(e) => {
            warn!(error = %e, "Ignoring undecodable query string");
            HashMap::new()
        }
    }
}

/// Parse every `Cookie` header into a name → value map.
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// JSON body, or base64-encoded JSON as sent by the edge runtime.
fn decode_body(body: &[u8]) -> Option<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    if let Ok(value) = serde_json::from_slice(body) {
        return Some(value);
    }
    let decoded = BASE64
        .decode(body.trim_ascii())
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok());
    if decoded.is_none() {
        warn!(bytes = body.len(), "Request body is neither JSON nor base64 JSON, ignoring");
    }
    decoded
}
