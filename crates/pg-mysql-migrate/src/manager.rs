//! Connection manager: owns the lifecycle of the source and target handles.
//!
//! Exactly one handle per slot. A connect is an idempotent replacement: the
//! new handle is built and probed first, then swapped in, and the prior
//! handle (if any) is closed. A failed connect leaves the slot untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{ConnSpec, ConnectOptions, EngineKind};
use crate::core::DatabaseHandle;
use crate::drivers;
use crate::error::{MigrateError, Result};

/// Which of the two handle slots an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Source,
    Target,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Target => write!(f, "target"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "source" => Ok(Role::Source),
            "target" => Ok(Role::Target),
            other => Err(MigrateError::Config(format!(
                "Unknown database role '{}'. Valid roles: source, target",
                other
            ))),
        }
    }
}

/// Outcome of a connect attempt. Failures are carried in-band: this type is
/// the boundary past which connection errors never propagate as `Err`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineKind>,
    pub message: String,
}

/// Which slots currently hold a live handle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatus {
    pub source: Option<EngineKind>,
    pub target: Option<EngineKind>,
}

/// Owns the two database handle slots for the lifetime of the process.
pub struct ConnectionManager {
    source: RwLock<Option<Arc<dyn DatabaseHandle>>>,
    target: RwLock<Option<Arc<dyn DatabaseHandle>>>,
    source_opts: ConnectOptions,
    target_opts: ConnectOptions,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    /// Manager with the stock timeout families: 10 s for the source slot,
    /// 20 s for the target (targets are often reachable only over slower
    /// network paths).
    pub fn new() -> Self {
        let mut target_opts =
            ConnectOptions::with_timeouts(std::time::Duration::from_secs(20));
        target_opts.max_connections = Some(20);

        Self {
            source: RwLock::new(None),
            target: RwLock::new(None),
            source_opts: ConnectOptions::with_timeouts(std::time::Duration::from_secs(10)),
            target_opts,
        }
    }

    /// Override the connect options for one slot.
    pub fn with_options(mut self, role: Role, opts: ConnectOptions) -> Self {
        match role {
            Role::Source => self.source_opts = opts,
            Role::Target => self.target_opts = opts,
        }
        self
    }

    /// Connect a slot. Parses the connection string, detects the engine from
    /// the URI scheme, builds and probes the pooled handle, and swaps it in.
    pub async fn connect(&self, role: Role, conn_str: &str) -> ConnectionStatus {
        match self.try_connect(role, conn_str).await {
            Ok(engine) => ConnectionStatus {
                success: true,
                engine: Some(engine),
                message: format!("Successfully connected to {} {} database", role, engine),
            },
            Err(e) => {
                warn!("Failed to connect {} database: {}", role, e);
                ConnectionStatus {
                    success: false,
                    engine: None,
                    message: e.to_string(),
                }
            }
        }
    }

    async fn try_connect(&self, role: Role, conn_str: &str) -> Result<EngineKind> {
        let spec = ConnSpec::parse(conn_str)?;
        let opts = match role {
            Role::Source => &self.source_opts,
            Role::Target => &self.target_opts,
        };

        // drivers::connect tears its pool down on probe failure, so an Err
        // here means nothing was leaked and the slot is left as-is.
        let handle = drivers::connect(&spec, opts).await?;
        let engine = handle.engine();
        self.adopt(role, handle).await;
        Ok(engine)
    }

    /// Install an already-connected handle in a slot, closing any prior one.
    pub async fn adopt(&self, role: Role, handle: Arc<dyn DatabaseHandle>) {
        let prior = {
            let mut slot = self.slot(role).write().await;
            slot.replace(handle)
        };
        if let Some(old) = prior {
            info!("Replacing existing {} connection", role);
            old.close().await;
        }
    }

    /// Get the live handle for a slot.
    pub async fn handle(&self, role: Role) -> Result<Arc<dyn DatabaseHandle>> {
        self.slot(role)
            .read()
            .await
            .clone()
            .ok_or(MigrateError::NotConnected { role })
    }

    /// Close and clear a slot. No-op when the slot is empty.
    pub async fn disconnect(&self, role: Role) {
        let prior = self.slot(role).write().await.take();
        if let Some(handle) = prior {
            info!("Disconnecting {} database", role);
            handle.close().await;
        }
    }

    /// Report which slots hold live handles.
    pub async fn status(&self) -> ManagerStatus {
        let source = self.source.read().await.as_ref().map(|h| h.engine());
        let target = self.target.read().await.as_ref().map(|h| h.engine());
        ManagerStatus { source, target }
    }

    fn slot(&self, role: Role) -> &RwLock<Option<Arc<dyn DatabaseHandle>>> {
        match role {
            Role::Source => &self.source,
            Role::Target => &self.target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_and_display() {
        assert_eq!("source".parse::<Role>().unwrap(), Role::Source);
        assert_eq!("TARGET".parse::<Role>().unwrap(), Role::Target);
        assert!("primary".parse::<Role>().is_err());
        assert_eq!(Role::Source.to_string(), "source");
    }

    #[test]
    fn connection_status_serializes_camel_case() {
        let status = ConnectionStatus {
            success: false,
            engine: None,
            message: "nope".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["success"], serde_json::json!(false));
        assert_eq!(json["message"], serde_json::json!("nope"));
        assert!(json.get("engine").is_none());
    }

    #[tokio::test]
    async fn empty_slot_reports_not_connected() {
        let manager = ConnectionManager::new();
        let err = match manager.handle(Role::Source).await {
            Ok(_) => panic!("expected NotConnected error"),
            Err(e) => e,
        };
        assert!(matches!(err, MigrateError::NotConnected { role: Role::Source }));
        assert_eq!(err.to_string(), "source database is not connected");
    }

    #[tokio::test]
    async fn malformed_connection_string_fails_in_band() {
        let manager = ConnectionManager::new();
        let status = manager.connect(Role::Source, "definitely not a uri").await;
        assert!(!status.success);
        assert!(status.message.contains("Invalid connection string"));
        // The slot stays empty.
        assert!(manager.handle(Role::Source).await.is_err());
    }
}
