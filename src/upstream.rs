//! Outbound HTTP: sunrise/sunset lookups, video thumbnails and CDN
//! invalidation. One shared `reqwest::Client` with the configured timeout.

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Invalidation request in the shape CDN APIs expect.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvalidationRequest<'a> {
    pub distribution_id: &'a str,
    pub invalidation_batch: InvalidationBatch<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvalidationBatch<'a> {
    pub caller_reference: String,
    pub paths: InvalidationPaths<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvalidationPaths<'a> {
    pub items: &'a [String],
    pub quantity: usize,
}

/// Client for every upstream the API talks to.
#[derive(Debug, Clone)]
pub struct Upstreams {
    client: Client,
    sun_location: Option<(f64, f64)>,
    sun_api_url: String,
    thumbnail_base_url: String,
    cdn_invalidation_url: Option<String>,
    cdn_distribution_id: Option<String>,
}

impl Upstreams {
    /// Build the shared client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the TLS backend cannot be initialized.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.upstream_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            sun_location: config.sunx_latitude.zip(config.sunx_longitude),
            sun_api_url: config.sunx_api_url.clone(),
            thumbnail_base_url: config.thumbnail_base_url.trim_end_matches('/').to_string(),
            cdn_invalidation_url: config.cdn_invalidation_url.clone(),
            cdn_distribution_id: config.cdn_distribution_id.clone(),
        })
    }

    /// Sunrise and sunset for `date` at the configured location.
    ///
    /// An upstream refusal is the caller's problem (bad date) and maps to
    /// `BadRequest`; a transport failure is `Upstream`.
    #[instrument(skip(self))]
    pub async fn sun_times(&self, date: &str) -> AppResult<Value> {
        let (lat, lng) = self.sun_location.ok_or_else(|| {
            AppError::ConfigError("SUNX_LATITUDE and SUNX_LONGITUDE must be set".to_string())
        })?;

        let response = self
            .client
            .get(&self.sun_api_url)
            .query(&[
                ("lat", lat.to_string()),
                ("lng", lng.to_string()),
                ("formatted", "0".to_string()),
                ("date", date.to_string()),
            ])
            .send()
            .await
            .map_err(|e| transport_error("sunx", e))?;

        let status = response.status();
        metrics::record_upstream_request("sunx", status.as_str());
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("sun times response was not JSON: {e}")))?;

        if !status.is_success() {
            let reason = body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_else(|| status.as_str())
                .to_string();
            warn!(%status, %reason, "Sun times lookup refused");
            return Err(AppError::BadRequest(reason));
        }
        Ok(body)
    }

    /// Medium-quality thumbnail bytes, `None` when the video has none.
    #[instrument(skip(self))]
    pub async fn thumbnail(&self, video_id: &str) -> AppResult<Option<Vec<u8>>> {
        let url = format!("{}/{video_id}/mqdefault.jpg", self.thumbnail_base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error("thumbnail", e))?;

        let status = response.status();
        metrics::record_upstream_request("thumbnail", status.as_str());
        if !status.is_success() {
            return Ok(None);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error("thumbnail", e))?;
        Ok(Some(bytes.to_vec()))
    }

    /// Ask the CDN to drop cached copies of `paths`.
    #[instrument(skip(self), fields(count = paths.len()))]
    pub async fn invalidate_cdn(&self, paths: &[String]) -> AppResult<Value> {
        let (Some(url), Some(distribution_id)) = (
            self.cdn_invalidation_url.as_deref(),
            self.cdn_distribution_id.as_deref(),
        ) else {
            return Err(AppError::ConfigError(
                "CDN_INVALIDATION_URL and CDN_DISTRIBUTION_ID must be set".to_string(),
            ));
        };

        let request = InvalidationRequest {
            distribution_id,
            invalidation_batch: InvalidationBatch {
                caller_reference: Utc::now().timestamp_millis().to_string(),
                paths: InvalidationPaths {
                    items: paths,
                    quantity: paths.len(),
                },
            },
        };
        info!(?paths, "Invalidating CDN cache");

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("cdn", e))?;

        let status = response.status();
        metrics::record_upstream_request("cdn", status.as_str());
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "CDN invalidation returned {status}"
            )));
        }

        // Some endpoints answer 201/204 with no body
        let text = response
            .text()
            .await
            .map_err(|e| transport_error("cdn", e))?;
        if text.trim().is_empty() || status == StatusCode::NO_CONTENT {
            return Ok(Value::Object(Default::default()));
        }
        let result = serde_json::from_str(&text)?;
        info!(%status, "Invalidation accepted");
        Ok(result)
    }
}

fn transport_error(service: &'static str, e: reqwest::Error) -> AppError {
    metrics::record_upstream_request(service, "error");
    warn!(service, error = %e, "Upstream request failed");
    AppError::Upstream(format!("{service} request failed: {e}"))
}
