//! Schema introspection over either handle slot.
//!
//! Normalizes the engine-specific catalog queries (information_schema for
//! PostgreSQL, `SHOW TABLES` for MySQL) behind one role-addressed surface.
//! Metadata is re-fetched on every call; nothing is cached.

use std::sync::Arc;

use crate::core::value::Row;
use crate::error::Result;
use crate::manager::{ConnectionManager, Role};

/// Default row count for table previews.
pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

/// Lists tables and previews rows for the connected databases.
pub struct SchemaIntrospector {
    manager: Arc<ConnectionManager>,
}

impl SchemaIntrospector {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// List table names from the slot's engine catalog.
    ///
    /// Order is whatever the catalog returns and differs between engines;
    /// callers must not depend on it. Fails with a not-connected error when
    /// the slot has no live handle.
    pub async fn list_tables(&self, role: Role) -> Result<Vec<String>> {
        let handle = self.manager.handle(role).await?;
        handle.list_tables().await
    }

    /// Fetch at most `limit` rows (default 10) from `table`, unfiltered.
    ///
    /// The table name is validated and identifier-quoted by the driver, so a
    /// hostile name fails cleanly instead of being spliced into SQL.
    pub async fn preview_rows(
        &self,
        role: Role,
        table: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let handle = self.manager.handle(role).await?;
        handle
            .fetch_rows(table, limit.unwrap_or(DEFAULT_PREVIEW_LIMIT))
            .await
    }
}
