//! The database handle abstraction.
//!
//! One trait covers the capability set the rest of the crate needs from a
//! connected database: liveness probe, catalog introspection, bounded row
//! fetch, row count, and single-row insert. Each engine implements it once;
//! the implementation is selected at connect time from the URI scheme and
//! held behind `Arc<dyn DatabaseHandle>` from then on.

use async_trait::async_trait;

use crate::config::EngineKind;
use crate::error::Result;

use super::value::Row;

/// A fully-connected database handle.
///
/// Invariant: a value of this type only exists after the connect-time
/// liveness probe has succeeded. Construction failures tear the underlying
/// pool down before surfacing the error, so no half-open handle escapes.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// The engine tag recorded at connect time.
    fn engine(&self) -> EngineKind;

    /// Lightweight liveness probe (`SELECT NOW()` or equivalent).
    async fn probe(&self) -> Result<()>;

    /// List table names from the engine catalog.
    ///
    /// Order is whatever the catalog returns; callers must not depend on it.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Fetch at most `limit` rows from `table`, unfiltered, in catalog order.
    async fn fetch_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>>;

    /// Full-table row count, independent of any fetch cap.
    async fn count_rows(&self, table: &str) -> Result<i64>;

    /// Insert a single row using the engine's parameterized placeholder
    /// style. The column list comes from the row itself.
    async fn insert_row(&self, table: &str, row: &Row) -> Result<()>;

    /// Close the connection pool. The handle is unusable afterwards.
    async fn close(&self);
}
