//! Response builders for the content types the API produces.

use axum::Json;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::models::FeatureCollection;

pub const GEOJSON: &str = "application/geo+json";
pub const CSV: &str = "text/csv";
pub const PLAIN: &str = "text/plain";
pub const HTML: &str = "text/html";
pub const JPEG: &str = "image/jpeg";
pub const JSON: &str = "application/json";

const GEOJSON_IO_PREFIX: &str = "https://geojson.io/#data=data:application/json,";

pub fn json<T: Serialize>(value: &T) -> Response {
    Json(value).into_response()
}

/// Serialize with an explicit content type.
pub fn typed_json<T: Serialize>(value: &T, content_type: &'static str) -> AppResult<Response> {
    let body = serde_json::to_vec(value)?;
    Ok(with_type(StatusCode::OK, content_type, body))
}

pub fn geojson(collection: &FeatureCollection) -> AppResult<Response> {
    typed_json(collection, GEOJSON)
}

pub fn csv(body: impl Into<Body>) -> Response {
    with_type(StatusCode::OK, CSV, body)
}

pub fn plain(body: impl Into<Body>) -> Response {
    with_type(StatusCode::OK, PLAIN, body)
}

pub fn html(body: impl Into<Body>) -> Response {
    with_type(StatusCode::OK, HTML, body)
}

/// JPEG bytes; the lifetime comes from the route's cache override.
pub fn jpeg(bytes: Vec<u8>) -> Response {
    with_type(StatusCode::OK, JPEG, bytes)
}

/// 302 to `location`.
pub fn found(location: &str) -> AppResult<Response> {
    let value = HeaderValue::from_str(location)
        .map_err(|e| AppError::Internal(format!("invalid redirect location: {e}")))?;
    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(LOCATION, value);
    Ok(response)
}

/// geojson.io link that renders `collection` inline.
pub fn geojson_io_url(collection: &FeatureCollection) -> AppResult<String> {
    let encoded = serde_json::to_string(collection)?;
    Ok(format!("{GEOJSON_IO_PREFIX}{}", urlencoding::encode(&encoded)))
}

/// HTML page that sends the browser to `url`.
pub fn redirect_page(url: &str) -> String {
    format!(
        "<html>\n\t<body>\n\t\t<script>\n\t\t\twindow.location = '{url}';\n\t\t</script>\n\t</body>\n</html>"
    )
}

/// A map in the representation the caller asked for.
///
/// `application/geo+json` and `application/json` get the collection,
/// `text/plain` a geojson.io link, anything else an HTML page that opens
/// the link.
pub fn map(ctx: &RequestContext, collection: &FeatureCollection) -> AppResult<Response> {
    match ctx.accept.as_deref() {
        Some(GEOJSON) => geojson(collection),
        Some(JSON) => typed_json(collection, JSON),
        Some(PLAIN) => Ok(plain(geojson_io_url(collection)?)),
        _ => Ok(html(redirect_page(&geojson_io_url(collection)?))),
    }
}

fn with_type(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{Feature, Geometry};
    use axum::http::header::CACHE_CONTROL;
    use serde_json::Map;

    fn collection() -> FeatureCollection {
        FeatureCollection::new(vec![Feature::new(Geometry::Point([1.0, 2.0]), Map::new())])
    }

    #[test]
    fn test_geojson_io_url_is_encoded() {
        let url = geojson_io_url(&collection()).unwrap();
        assert!(url.starts_with(GEOJSON_IO_PREFIX));
        assert!(url.contains("%22FeatureCollection%22"));
        assert!(!url[GEOJSON_IO_PREFIX.len()..].contains('{'));
    }

    #[test]
    fn test_redirect_page_shape() {
        let page = redirect_page("https://example.com/x");
        assert!(page.starts_with("<html>\n\t<body>"));
        assert!(page.contains("window.location = 'https://example.com/x';"));
    }

    #[test]
    fn test_found_sets_location() {
        let response = found("https://youtu.be/abc?t=5").unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "https://youtu.be/abc?t=5");
    }

    #[test]
    fn test_jpeg_leaves_cache_to_policy() {
        let response = jpeg(vec![0xff, 0xd8]);
        assert_eq!(response.headers()[CONTENT_TYPE], JPEG);
        assert!(response.headers().get(CACHE_CONTROL).is_none());
    }
}
