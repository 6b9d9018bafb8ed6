//! Shared utilities for handlers.

use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::geo::{Coordinate, PrivacyZones};

/// Required query parameter, or a 400 with `message`.
pub fn require_param<'a>(ctx: &'a RequestContext, name: &str, message: &str) -> AppResult<&'a str> {
    ctx.param(name)
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}

/// Whether a located item may be shown to this caller.
pub fn is_visible(
    zones: &PrivacyZones,
    ctx: &RequestContext,
    point: Option<&Coordinate>,
) -> AppResult<bool> {
    Ok(zones.point_visible(point, ctx.is_authenticated())?)
}

/// Text of a loosely typed field as a CSV cell; falsy values are empty.
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => String::new(),
        Some(other) => other.to_string(),
    }
}
