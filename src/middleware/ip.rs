//! Client IP extraction shared by the gate, the rate limiter and logging.
//!
//! The service runs behind a CDN that sets `cf-connecting-ip`. When that
//! header is missing (local runs, other proxies) the first `x-forwarded-for`
//! entry is used, then `x-real-ip`.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! **These functions trust client-provided headers.** Deploy behind a proxy
//! that overwrites them, or a caller can pick the address that gets banned
//! or rate limited.

use std::borrow::Cow;

use axum::http::HeaderMap;

/// Fallback IP value when no client IP can be determined.
///
/// All requests without identifiable IPs share this key.
pub const UNKNOWN_IP: &str = "unknown";

/// Where the client address was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractedIp<'a> {
    /// Set by the CDN edge.
    FromCdn(&'a str),
    /// First entry of `X-Forwarded-For`.
    FromXff(&'a str),
    /// `X-Real-IP`.
    FromRealIp(&'a str),
    NotFound,
}

impl<'a> ExtractedIp<'a> {
    fn value(self) -> Option<&'a str> {
        match self {
            ExtractedIp::FromCdn(ip) | ExtractedIp::FromXff(ip) | ExtractedIp::FromRealIp(ip) => {
                Some(ip)
            }
            ExtractedIp::NotFound => None,
        }
    }
}

#[inline]
fn non_empty<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[inline]
fn extract_ip_from_headers(headers: &HeaderMap) -> ExtractedIp<'_> {
    if let Some(ip) = non_empty(headers, "cf-connecting-ip") {
        return ExtractedIp::FromCdn(ip);
    }

    // Format: "client, proxy1, proxy2" - we want the first (client) IP
    if let Some(forwarded) = non_empty(headers, "x-forwarded-for")
        && let Some(first) = forwarded.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return ExtractedIp::FromXff(first);
    }

    if let Some(ip) = non_empty(headers, "x-real-ip") {
        return ExtractedIp::FromRealIp(ip);
    }

    ExtractedIp::NotFound
}

/// Client IP from request headers, or [`UNKNOWN_IP`].
pub fn extract_client_ip(headers: &HeaderMap) -> Cow<'static, str> {
    match extract_ip_from_headers(headers).value() {
        Some(ip) => Cow::Owned(ip.to_string()),
        None => Cow::Borrowed(UNKNOWN_IP),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_cdn_header_wins() {
        let h = headers(&[
            ("cf-connecting-ip", "203.0.113.1"),
            ("x-forwarded-for", "198.51.100.1"),
            ("x-real-ip", "192.0.2.1"),
        ]);
        assert_eq!(extract_client_ip(&h), "203.0.113.1");
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let h = headers(&[("x-forwarded-for", " 198.51.100.1 , 10.0.0.1")]);
        assert_eq!(extract_client_ip(&h), "198.51.100.1");
    }

    #[test]
    fn test_real_ip_fallback() {
        let h = headers(&[("x-forwarded-for", ""), ("x-real-ip", "192.0.2.1")]);
        assert_eq!(extract_client_ip(&h), "192.0.2.1");
    }

    #[test]
    fn test_unknown_is_borrowed() {
        let ip = extract_client_ip(&HeaderMap::new());
        assert_eq!(ip, UNKNOWN_IP);
        assert!(matches!(ip, Cow::Borrowed(_)));
    }

    #[test]
    fn test_extracted_source() {
        let h = headers(&[("x-real-ip", "192.0.2.1")]);
        assert_eq!(extract_ip_from_headers(&h), ExtractedIp::FromRealIp("192.0.2.1"));
    }
}
