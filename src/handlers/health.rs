//! Health and readiness endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check with archive status
//! - `GET /ready` - Kubernetes-compatible readiness probe
//!
//! # Health vs Readiness
//!
//! - **Health** (`/health`): Returns 200 even if degraded, includes details
//! - **Readiness** (`/ready`): Returns 503 while the archive root is unreadable

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// Always returns 200 OK with status details in the body.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "archive_readable": true,
///   "privacy_zones": 2,
///   "banned_addresses": 14,
///   "version": "0.1.0",
///   "uptime_seconds": 3600,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let archive_readable = state.archive_readable();

    Json(HealthResponse {
        status: if archive_readable {
            "healthy"
        } else {
            "degraded"
        }
        .to_string(),
        archive_readable,
        privacy_zones: state.zones.len(),
        banned_addresses: state.gate.bans().len().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint for Kubernetes probes.
///
/// # Usage
///
/// ```yaml
/// readinessProbe:
///   httpGet:
///     path: /ready
///     port: 3000
///   periodSeconds: 10
/// ```
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.archive_readable() {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
