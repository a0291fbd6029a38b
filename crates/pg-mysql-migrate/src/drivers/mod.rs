//! Database driver implementations.
//!
//! One module per engine, each implementing [`DatabaseHandle`]:
//!
//! - [`postgres`]: PostgreSQL via tokio-postgres/deadpool
//! - [`mysql`]: MySQL/MariaDB via mysql_async
//! - [`tls`]: TLS policy shared by both
//!
//! The concrete driver is selected once, at connect time, from the parsed
//! connection spec; afterwards callers only see `Arc<dyn DatabaseHandle>`.

pub mod mysql;
pub mod postgres;
pub mod tls;

use std::sync::Arc;

use crate::config::{ConnSpec, ConnectOptions, EngineKind};
use crate::core::DatabaseHandle;
use crate::error::Result;

pub use mysql::MysqlHandle;
pub use postgres::PostgresHandle;
pub use tls::SslMode;

/// Connect to the engine named by the spec and return a live handle.
pub async fn connect(spec: &ConnSpec, opts: &ConnectOptions) -> Result<Arc<dyn DatabaseHandle>> {
    match spec.engine {
        EngineKind::Postgres => {
            let handle = PostgresHandle::connect(spec, opts).await?;
            Ok(Arc::new(handle))
        }
        EngineKind::Mysql => {
            let handle = MysqlHandle::connect(spec, opts).await?;
            Ok(Arc::new(handle))
        }
    }
}
