//! Bearer token verification.
//!
//! A token is accepted only when its signature verifies against the key for
//! its declared algorithm, its scope claim contains the required scope, and
//! its expiry is in the future. Every failure collapses to
//! [`AuthState::Unauthenticated`]; the reason goes to the log and the
//! `auth_outcomes_total` counter, never to the caller.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::context::AuthState;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Lifetime of access tokens minted by the login callback.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Why a credential was rejected. Only ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    UnsupportedAlgorithm,
    NoKeyForAlgorithm,
    BadSignature,
    MissingScope,
    Expired,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::Malformed => "malformed",
            Rejection::UnsupportedAlgorithm => "unsupported_algorithm",
            Rejection::NoKeyForAlgorithm => "no_key",
            Rejection::BadSignature => "bad_signature",
            Rejection::MissingScope => "missing_scope",
            Rejection::Expired => "expired",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims read from a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: String,
    #[serde(
        default,
        deserialize_with = "scope_list",
        serialize_with = "scope_string",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub scope: Vec<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
}

/// Scope as a space-delimited string or an array of strings.
fn scope_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Raw::List(v)) => v,
        None => Vec::new(),
    })
}

fn scope_string<S>(scope: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&scope.join(" "))
}

/// Verifies bearer tokens against the configured keys.
#[derive(Clone)]
pub struct TokenAuthenticator {
    rsa_key: Option<DecodingKey>,
    hmac_key: Option<DecodingKey>,
    required_scope: String,
}

impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("rs256", &self.rsa_key.is_some())
            .field("hs256", &self.hmac_key.is_some())
            .field("required_scope", &self.required_scope)
            .finish()
    }
}

impl TokenAuthenticator {
    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if `AUTH_PUBLIC_KEY` is not a usable
    /// RSA public key (PEM, optionally base64-encoded).
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let rsa_key = config
            .auth_public_key
            .as_deref()
            .map(decode_public_key)
            .transpose()?;
        let hmac_key = config
            .access_token_secret
            .as_deref()
            .map(|s| DecodingKey::from_secret(s.as_bytes()));

        if rsa_key.is_none() && hmac_key.is_none() {
            info!("No token keys configured, every request is unauthenticated");
        }

        Ok(Self {
            rsa_key,
            hmac_key,
            required_scope: config.required_scope.clone(),
        })
    }

    /// Authenticate against the current clock.
    pub fn authenticate(&self, token: &str) -> AuthState {
        self.authenticate_at(token, Utc::now().timestamp())
    }

    /// Authenticate against an explicit clock (epoch seconds).
    pub fn authenticate_at(&self, token: &str, now: i64) -> AuthState {
        match self.verify(token, now) {
            Ok(claims) => {
                metrics::record_auth_outcome("authenticated");
                debug!(subject = %claims.sub, expires_at = claims.exp, "Token accepted");
                AuthState::Authenticated {
                    subject: claims.sub,
                    scope: claims.scope,
                    expires_at: claims.exp,
                }
            }
            Err(reason) => {
                metrics::record_auth_outcome(reason.as_str());
                info!(reason = %reason, "Token rejected");
                AuthState::Unauthenticated
            }
        }
    }

    /// Verify signature, scope and expiry, returning the claims.
    pub fn verify(&self, token: &str, now: i64) -> Result<Claims, Rejection> {
        let claims = self.verify_signature(token)?;
        if !claims.scope.iter().any(|s| *s == self.required_scope) {
            return Err(Rejection::MissingScope);
        }
        if claims.exp <= now {
            return Err(Rejection::Expired);
        }
        Ok(claims)
    }

    /// Verify an identity token from the login provider (RS256 only, scope not required).
    pub fn verify_identity(&self, token: &str, now: i64) -> Result<Claims, Rejection> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| Rejection::Malformed)?;
        if header.alg != Algorithm::RS256 {
            return Err(Rejection::UnsupportedAlgorithm);
        }
        let claims = self.verify_signature(token)?;
        if claims.exp <= now {
            return Err(Rejection::Expired);
        }
        Ok(claims)
    }

    fn verify_signature(&self, token: &str) -> Result<Claims, Rejection> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| Rejection::Malformed)?;
        let key = match header.alg {
            Algorithm::RS256 => self.rsa_key.as_ref(),
            Algorithm::HS256 => self.hmac_key.as_ref(),
            _ => return Err(Rejection::UnsupportedAlgorithm),
        }
        .ok_or(Rejection::NoKeyForAlgorithm)?;

        let mut validation = Validation::new(header.alg);
        // Expiry is checked against the caller's clock in `verify`.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        jsonwebtoken::decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => Rejection::BadSignature,
                _ => Rejection::Malformed,
            })
    }
}

/// Accept raw PEM or base64-encoded PEM.
fn decode_public_key(raw: &str) -> AppResult<DecodingKey> {
    let pem = if raw.trim_start().starts_with("-----BEGIN") {
        raw.as_bytes().to_vec()
    } else {
        BASE64
            .decode(raw.trim())
            .map_err(|e| AppError::ConfigError(format!("Invalid AUTH_PUBLIC_KEY: {e}")))?
    };
    DecodingKey::from_rsa_pem(&pem)
        .map_err(|e| AppError::ConfigError(format!("Invalid AUTH_PUBLIC_KEY: {e}")))
}

/// Sign an HS256 access token for a verified identity.
///
/// # Errors
///
/// Returns `AppError::Internal` if signing fails.
pub fn mint_access_token(secret: &str, claims: &Claims) -> AppResult<String> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign access token: {e}")))
}
