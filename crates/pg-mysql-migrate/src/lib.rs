//! # pg-mysql-migrate
//!
//! Heterogeneous table migration between PostgreSQL and MySQL-compatible
//! databases.
//!
//! The library connects a *source* and a *target* handle (each backed by
//! either engine, detected from the connection string scheme), introspects
//! their schemas, and transfers rows from a named source table into a named
//! target table while exposing live, queryable progress:
//!
//! - **Connection management** with pooled handles, a full timeout family,
//!   and classified connect errors (timeout vs DNS vs auth vs missing
//!   database)
//! - **Schema introspection** normalized across engine catalogs
//! - **Batch-capped, fail-fast row transfer** with per-row progress
//! - **Per-run progress handles** readable while the transfer is in flight
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pg_mysql_migrate::{ConnectionManager, MigrationEngine, ProgressRegistry, Role};
//!
//! #[tokio::main]
//! async fn main() -> pg_mysql_migrate::Result<()> {
//!     let manager = Arc::new(ConnectionManager::new());
//!     manager.connect(Role::Source, "mysql://app:pw@legacy-db:3306/app").await;
//!     manager.connect(Role::Target, "postgres://app:pw@new-db:5432/app?sslmode=verify-full").await;
//!
//!     let registry = Arc::new(ProgressRegistry::new());
//!     let engine = MigrationEngine::new(manager, registry);
//!     let result = engine.migrate("users", "users", None).await?;
//!     println!("Migrated {} rows", result.migrated_count);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod introspect;
pub mod manager;
pub mod progress;

// Re-exports for convenient access
pub use config::{ConnSpec, ConnectOptions, EngineKind};
pub use core::{DatabaseHandle, Row, SqlNullType, SqlValue};
pub use engine::{EngineOptions, MigrationEngine, MigrationResult, DEFAULT_BATCH_CAP};
pub use error::{ConnectKind, MigrateError, Result};
pub use introspect::{SchemaIntrospector, DEFAULT_PREVIEW_LIMIT};
pub use manager::{ConnectionManager, ConnectionStatus, ManagerStatus, Role};
pub use progress::{MigrationProgress, ProgressHandle, ProgressRegistry};
