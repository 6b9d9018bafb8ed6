//! Prevalidation gate: cheap checks that run before any authentication.
//!
//! # Checks (first failure wins)
//!
//! 1. `Host` header outside a non-empty allowlist → 404
//! 2. Client address statically denied or previously banned → 403
//! 3. User agent exactly matching a denied agent → 403
//! 4. Path containing a red-flag substring → address banned, 403
//!
//! # Ban List
//!
//! Bans take effect in memory immediately. The file copy is appended by a
//! background task tracked by the application's [`TaskTracker`], one line
//! per ban written with a single `write_all`. Duplicate lines are harmless;
//! the file is deduplicated when loaded at startup.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::ip::UNKNOWN_IP;

/// Why the gate stopped a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    HostNotAllowed,
    DeniedAddress,
    DeniedUserAgent,
    RedFlag,
}

impl GateRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            GateRejection::HostNotAllowed => "host_not_allowed",
            GateRejection::DeniedAddress => "denied_address",
            GateRejection::DeniedUserAgent => "denied_user_agent",
            GateRejection::RedFlag => "red_flag",
        }
    }
}

impl From<GateRejection> for AppError {
    fn from(rejection: GateRejection) -> Self {
        match rejection {
            GateRejection::HostNotAllowed => AppError::HostNotAllowed,
            GateRejection::DeniedAddress
            | GateRejection::DeniedUserAgent
            | GateRejection::RedFlag => AppError::Forbidden,
        }
    }
}

/// Addresses banned at runtime, backed by an append-only file.
#[derive(Debug)]
pub struct BanList {
    path: PathBuf,
    addresses: RwLock<HashSet<String>>,
}

impl BanList {
    /// Load the ban file; a missing file is an empty list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists but cannot be read.
    pub async fn load(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let addresses = match fs::read_to_string(&path).await {
            Ok(raw) => parse_ban_file(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No ban list file, starting empty");
                HashSet::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), banned = addresses.len(), "Ban list loaded");
        metrics::set_banned_addresses(addresses.len());

        Ok(Self {
            path,
            addresses: RwLock::new(addresses),
        })
    }

    /// Empty list that persists to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            addresses: RwLock::new(HashSet::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, address: &str) -> bool {
        self.addresses.read().await.contains(address)
    }

    pub async fn len(&self) -> usize {
        self.addresses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.addresses.read().await.is_empty()
    }

    /// Add an address in memory. Returns `true` if it was not already banned.
    pub async fn insert(&self, address: &str) -> bool {
        let mut addresses = self.addresses.write().await;
        let added = addresses.insert(address.to_string());
        if added {
            metrics::record_address_banned(addresses.len());
        }
        added
    }
}

/// One address per line; blank lines ignored, duplicates collapsed.
fn parse_ban_file(raw: &str) -> HashSet<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Append one address line to the ban file.
pub async fn append_ban_line(path: &Path, address: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{address}\n").as_bytes()).await?;
    file.flush().await
}

/// The gate itself. Immutable apart from the shared ban list.
#[derive(Debug, Clone)]
pub struct PrevalidationGate {
    allowed_hosts: Arc<HashSet<String>>,
    denied_addresses: Arc<HashSet<String>>,
    denied_user_agents: Arc<HashSet<String>>,
    red_flags: Arc<Vec<String>>,
    bans: Arc<BanList>,
    tasks: TaskTracker,
}

impl PrevalidationGate {
    pub fn new(config: &Config, bans: Arc<BanList>, tasks: TaskTracker) -> Self {
        Self {
            allowed_hosts: Arc::new(config.allowed_hosts.iter().cloned().collect()),
            denied_addresses: Arc::new(config.disallowed_ips.iter().cloned().collect()),
            denied_user_agents: Arc::new(config.disallowed_user_agents.iter().cloned().collect()),
            red_flags: Arc::new(config.red_flags.clone()),
            bans,
            tasks,
        }
    }

    pub fn bans(&self) -> &BanList {
        &self.bans
    }

    /// Run every check against the request.
    pub async fn prevalidate(&self, ctx: &RequestContext) -> Result<(), GateRejection> {
        let result = self.check(ctx).await;
        if let Err(rejection) = result {
            metrics::record_gate_rejection(rejection.as_str());
        }
        result
    }

    async fn check(&self, ctx: &RequestContext) -> Result<(), GateRejection> {
        if !self.allowed_hosts.is_empty()
            && !ctx
                .host
                .as_deref()
                .is_some_and(|host| self.allowed_hosts.contains(host))
        {
            warn!(host = ?ctx.host, "Host is not allowed");
            return Err(GateRejection::HostNotAllowed);
        }

        let address = ctx.client_ip.as_str();
        if self.denied_addresses.contains(address) || self.bans.contains(address).await {
            warn!(client_ip = %address, "Address is not allowed");
            return Err(GateRejection::DeniedAddress);
        }

        if let Some(agent) = ctx.user_agent.as_deref()
            && self.denied_user_agents.contains(agent)
        {
            warn!(user_agent = %agent, "User agent is not allowed");
            return Err(GateRejection::DeniedUserAgent);
        }

        if let Some(flag) = self.red_flags.iter().find(|f| ctx.path.contains(f.as_str())) {
            warn!(client_ip = %address, path = %ctx.path, flag = %flag, "Red flag in path");
            self.ban(address).await;
            return Err(GateRejection::RedFlag);
        }

        Ok(())
    }

    /// Ban an address now and persist it in the background.
    async fn ban(&self, address: &str) {
        // Banning the shared fallback key would lock out every unidentified caller
        if address == UNKNOWN_IP {
            return;
        }
        if !self.bans.insert(address).await {
            return;
        }

        let path = self.bans.path().to_path_buf();
        let address = address.to_string();
        self.tasks.spawn(async move {
            match append_ban_line(&path, &address).await {
                Ok(()) => info!(client_ip = %address, "Added address to ban list"),
                Err(e) => warn!(client_ip = %address, error = %e, "Failed to persist banned address"),
            }
        });
    }
}
