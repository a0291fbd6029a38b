//! The migration engine.
//!
//! Pulls one bounded batch of rows from the source table and replays it
//! row by row into the target, updating the run's progress handle as it
//! goes. Row-at-a-time insertion trades throughput for per-row progress
//! resolution and a simple fail-fast contract: the first insert error
//! aborts the remaining loop, and rows already inserted stay put.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::DatabaseHandle;
use crate::error::{MigrateError, Result};
use crate::manager::{ConnectionManager, Role};
use crate::progress::{ProgressHandle, ProgressRegistry};

/// Reference batch cap: rows fetched from the source per invocation.
pub const DEFAULT_BATCH_CAP: usize = 5_000;

/// Minimum interval between in-flight progress log lines.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Engine tuning. `Option` fields fall back to the reference defaults.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Maximum rows fetched from the source per invocation. Bounds the
    /// peak working set; tables larger than the cap are migrated across
    /// repeated invocations.
    pub batch_cap: Option<usize>,
}

impl EngineOptions {
    pub fn get_batch_cap(&self) -> usize {
        self.batch_cap.unwrap_or(DEFAULT_BATCH_CAP)
    }
}

/// Final summary of one migrate invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub run_id: String,
    pub success: bool,
    pub migrated_count: i64,
    pub total_count: i64,
    /// True when the batch cap truncated the source read; the caller is
    /// responsible for invoking again to continue.
    pub has_more_data: bool,
    pub message: String,
}

impl MigrationResult {
    /// Convert to a pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Drives table transfers between the manager's source and target handles.
pub struct MigrationEngine {
    manager: Arc<ConnectionManager>,
    registry: Arc<ProgressRegistry>,
    options: EngineOptions,
}

impl MigrationEngine {
    pub fn new(manager: Arc<ConnectionManager>, registry: Arc<ProgressRegistry>) -> Self {
        Self {
            manager,
            registry,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Migrate one bounded batch from `source_table` into `target_table`.
    ///
    /// Preconditions are checked before any I/O and before the progress
    /// registry is touched. After the run is registered, every exit path
    /// (success, error, cancellation) marks its progress handle complete
    /// exactly once, so no snapshot is ever left dangling mid-flight.
    pub async fn migrate(
        &self,
        source_table: &str,
        target_table: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<MigrationResult> {
        let source = self.manager.handle(Role::Source).await;
        let target = self.manager.handle(Role::Target).await;
        let (source, target) = match (source, target) {
            (Ok(s), Ok(t)) => (s, t),
            _ => {
                return Err(MigrateError::Precondition(
                    "Both source and target databases must be connected before migrating"
                        .to_string(),
                ));
            }
        };

        let progress = self.registry.begin_run();
        let cancel = cancel.unwrap_or_default();

        let outcome = self
            .run_transfer(
                source.as_ref(),
                target.as_ref(),
                source_table,
                target_table,
                &progress,
                &cancel,
            )
            .await;

        // Failure-safe finalization: the run terminates here regardless of
        // how the transfer ended.
        progress.finish();

        let (migrated, total) = outcome?;
        let has_more_data = migrated < total;
        let message = if has_more_data {
            format!(
                "Data migration completed. Migrated {} of {} records; invoke again to continue.",
                migrated, total
            )
        } else {
            format!(
                "Data migration completed. Migrated {} of {} records.",
                migrated, total
            )
        };

        Ok(MigrationResult {
            run_id: progress.run_id().to_string(),
            success: true,
            migrated_count: migrated,
            total_count: total,
            has_more_data,
            message,
        })
    }

    async fn run_transfer(
        &self,
        source: &dyn DatabaseHandle,
        target: &dyn DatabaseHandle,
        source_table: &str,
        target_table: &str,
        progress: &ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<(i64, i64)> {
        let rows = source
            .fetch_rows(source_table, self.options.get_batch_cap())
            .await?;
        info!("Fetched {} records from {}", rows.len(), source_table);

        // Full-table count, independent of the batch cap, so percentage is
        // computed against the true total.
        let total = source.count_rows(source_table).await?;
        progress.set_total(total);
        info!(
            "Starting migration of {} records out of total {}",
            rows.len(),
            total
        );

        let started = Instant::now();
        let mut last_log = Instant::now();
        let mut migrated: i64 = 0;

        for row in &rows {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled { migrated });
            }

            if let Err(e) = target.insert_row(target_table, row).await {
                return Err(MigrateError::Transfer {
                    table: target_table.to_string(),
                    migrated,
                    total,
                    message: e.to_string(),
                });
            }
            migrated = progress.record_row();

            if last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                let snapshot = progress.snapshot();
                info!(
                    "Migration progress: {} records migrated in {} seconds ({}%)",
                    snapshot.migrated_records,
                    started.elapsed().as_secs(),
                    snapshot.percentage
                );
                last_log = Instant::now();
            }
        }

        info!(
            "Migration completed: {} records migrated in {} seconds",
            migrated,
            started.elapsed().as_secs()
        );
        Ok((migrated, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_cap_defaults() {
        assert_eq!(EngineOptions::default().get_batch_cap(), 5_000);
        let opts = EngineOptions {
            batch_cap: Some(100),
        };
        assert_eq!(opts.get_batch_cap(), 100);
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = MigrationResult {
            run_id: "r".into(),
            success: true,
            migrated_count: 3,
            total_count: 3,
            has_more_data: false,
            message: "ok".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["migratedCount"], serde_json::json!(3));
        assert_eq!(json["totalCount"], serde_json::json!(3));
        assert_eq!(json["hasMoreData"], serde_json::json!(false));
        assert_eq!(json["runId"], serde_json::json!("r"));
    }
}
