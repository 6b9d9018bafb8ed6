//! Path-to-handler dispatch for everything under `/api`.
//!
//! The route table is static and built once at startup. Each entry names
//! its path, whether it needs an authenticated caller, a synchronous
//! validation step and the async processing step. Errors from either step
//! are turned into responses here and nowhere else.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::handlers;
use crate::state::AppState;

/// Prefix stripped before matching.
pub const API_PREFIX: &str = "/api";

/// Boxed future returned by a processing step.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = AppResult<Response>> + Send + 'a>>;

/// Synchronous request validation.
pub type Validator = fn(&RequestContext) -> AppResult<()>;

/// Async request processing.
pub type Processor = for<'a> fn(&'a AppState, &'a RequestContext) -> HandlerFuture<'a>;

/// Adapt an `async fn(&AppState, &RequestContext) -> AppResult<Response>`.
#[macro_export]
macro_rules! processor {
    ($handler:path) => {{
        fn process<'a>(
            state: &'a $crate::state::AppState,
            ctx: &'a $crate::context::RequestContext,
        ) -> $crate::dispatch::HandlerFuture<'a> {
            Box::pin($handler(state, ctx))
        }
        process as $crate::dispatch::Processor
    }};
}

/// Validation step for routes that take no parameters.
pub fn no_validation(_ctx: &RequestContext) -> AppResult<()> {
    Ok(())
}

/// One row of the route table.
#[derive(Clone, Copy)]
pub struct RouteEntry {
    /// Path after `/api`, matched exactly
    pub pattern: &'static str,
    pub requires_auth: bool,
    pub validate: Validator,
    pub process: Processor,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern)
            .field("requires_auth", &self.requires_auth)
            .finish()
    }
}

/// Ordered route table; first match wins.
#[derive(Debug)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Build a table, refusing duplicate patterns.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` naming the first duplicated pattern.
    pub fn new(entries: Vec<RouteEntry>) -> AppResult<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.pattern) {
                return Err(AppError::ConfigError(format!(
                    "duplicate route pattern {}",
                    entry.pattern
                )));
            }
        }
        Ok(Self { entries })
    }

    /// The API served by this application.
    pub fn api() -> AppResult<Self> {
        Self::new(handlers::api_routes())
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Entry for a full request path, `/api` prefix included.
    pub fn lookup(&self, path: &str) -> Option<&RouteEntry> {
        let relative = path.strip_prefix(API_PREFIX)?;
        self.entries.iter().find(|e| e.pattern == relative)
    }

    /// Run the matching entry and translate its outcome into a response.
    pub async fn dispatch(&self, state: &AppState, ctx: &RequestContext) -> Response {
        match self.run(state, ctx).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> AppResult<Response> {
        let Some(entry) = self.lookup(&ctx.path) else {
            debug!(path = %ctx.path, "No API route matches");
            return Err(AppError::NotFound(format!("no route for {}", ctx.path)));
        };

        if entry.requires_auth && !ctx.is_authenticated() {
            warn!(path = %ctx.path, client_ip = %ctx.client_ip, "Protected route without valid credentials");
            return Err(AppError::Unauthorized);
        }

        (entry.validate)(ctx)?;
        (entry.process)(state, ctx).await
    }
}
