//! PostgreSQL driver.
//!
//! Implements [`DatabaseHandle`] over deadpool-postgres. Values are bound as
//! text parameters with explicit SQL casts, which lets one insert path cover
//! every column type the fetch path produces.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info};

use crate::config::{ConnSpec, ConnectOptions, EngineKind};
use crate::core::identifier::quote_pg;
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::core::DatabaseHandle;
use crate::error::{ConnectKind, MigrateError, Result};

use super::tls::SslMode;

/// PostgreSQL database handle.
pub struct PostgresHandle {
    pool: Pool,
    host: String,
    port: u16,
    query_timeout: Duration,
}

impl PostgresHandle {
    /// Connect, probe, and return a live handle.
    ///
    /// On any failure the pool is closed before the error is returned, so a
    /// failed connect never leaks a half-open handle.
    pub async fn connect(spec: &ConnSpec, opts: &ConnectOptions) -> Result<Self> {
        let ssl_mode = SslMode::parse(&spec.ssl_mode)?;

        let mut pg_config = PgConfig::new();
        pg_config.host(&spec.host);
        pg_config.port(spec.port);
        pg_config.dbname(&spec.database);
        pg_config.user(&spec.user);
        pg_config.password(&spec.password);
        pg_config.connect_timeout(opts.get_connect_timeout());
        pg_config.keepalives(true);
        pg_config.options(&format!(
            "-c statement_timeout={} -c idle_in_transaction_session_timeout={}",
            opts.get_statement_timeout().as_millis(),
            opts.get_idle_in_transaction_timeout().as_millis()
        ));

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match ssl_mode.pg_connector()? {
            None => {
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(opts.get_max_connections())
                    .build()
                    .map_err(|e| MigrateError::Config(format!("building pool: {}", e)))?
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(opts.get_max_connections())
                    .build()
                    .map_err(|e| MigrateError::Config(format!("building pool: {}", e)))?
            }
        };

        let handle = Self {
            pool,
            host: spec.host.clone(),
            port: spec.port,
            query_timeout: opts.get_query_timeout(),
        };

        // Synchronous liveness probe; classify and tear down on failure.
        if let Err(e) = tokio::time::timeout(opts.get_connect_timeout(), handle.probe()).await
            .unwrap_or_else(|_| {
                Err(MigrateError::connect(
                    ConnectKind::Timeout,
                    &spec.host,
                    spec.port,
                    format!(
                        "no response within {} seconds",
                        opts.get_connect_timeout().as_secs()
                    ),
                ))
            })
        {
            handle.pool.close();
            return Err(e);
        }

        info!(
            "Connected to PostgreSQL at {}:{}/{}",
            spec.host, spec.port, spec.database
        );
        Ok(handle)
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::query("acquiring PostgreSQL connection", e))
    }

    /// Run a query future under the configured client-side timeout.
    async fn timed<T, F>(&self, context: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(MigrateError::query(context, e)),
            Err(_) => Err(MigrateError::query(
                context,
                format!("timed out after {} seconds", self.query_timeout.as_secs()),
            )),
        }
    }

    fn classify_connect_error(&self, e: &deadpool_postgres::PoolError) -> MigrateError {
        let kind = match e {
            deadpool_postgres::PoolError::Backend(pg) => classify_pg_error(pg),
            deadpool_postgres::PoolError::Timeout(_) => ConnectKind::Timeout,
            other => ConnectKind::classify(&other.to_string()),
        };
        MigrateError::connect(kind, &self.host, self.port, e)
    }
}

#[async_trait]
impl DatabaseHandle for PostgresHandle {
    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn probe(&self) -> Result<()> {
        let client = match self.pool.get().await {
            Ok(c) => c,
            Err(e) => return Err(self.classify_connect_error(&e)),
        };
        client.simple_query("SELECT NOW()").await.map_err(|e| {
            MigrateError::connect(classify_pg_error(&e), &self.host, self.port, &e)
        })?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.client().await?;
        let rows = self
            .timed(
                "listing tables",
                client.query(
                    // sql_identifier is a domain type; cast so it decodes as text.
                    "SELECT table_name::text FROM information_schema.tables \
                     WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
                    &[],
                ),
            )
            .await?;

        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn fetch_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        let client = self.client().await?;
        let sql = format!("SELECT * FROM {} LIMIT $1", quote_pg(table)?);
        let context = format!("fetching rows from {}", table);

        let rows = self
            .timed(&context, client.query(sql.as_str(), &[&(limit as i64)]))
            .await?;

        debug!("Fetched {} rows from {}", rows.len(), table);
        rows.iter().map(|r| pg_row_to_row(r, table)).collect()
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let client = self.client().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_pg(table)?);
        let context = format!("counting rows in {}", table);

        let row = self
            .timed(&context, client.query_one(sql.as_str(), &[]))
            .await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        let client = self.client().await?;
        let (sql, params) = build_insert_sql(table, row)?;
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let context = format!("inserting into {}", table);
        self.timed(&context, client.execute(sql.as_str(), &param_refs))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Classify a tokio-postgres error into a connection failure category.
///
/// Structured SQLSTATE codes first; network-level failures are dug out of
/// the error source chain as `io::Error`s.
fn classify_pg_error(e: &tokio_postgres::Error) -> ConnectKind {
    use tokio_postgres::error::SqlState;

    if let Some(code) = e.code() {
        if *code == SqlState::INVALID_PASSWORD
            || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
        {
            return ConnectKind::Auth;
        }
        if *code == SqlState::INVALID_CATALOG_NAME {
            return ConnectKind::MissingDatabase;
        }
    }

    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return classify_io_error(io);
        }
        source = err.source();
    }

    ConnectKind::classify(&e.to_string())
}

fn classify_io_error(io: &std::io::Error) -> ConnectKind {
    match io.kind() {
        std::io::ErrorKind::TimedOut => ConnectKind::Timeout,
        std::io::ErrorKind::ConnectionRefused => ConnectKind::UnreachableNetwork,
        _ => ConnectKind::classify(&io.to_string()),
    }
}

/// Build a single-row parameterized INSERT.
///
/// All values are bound as text and cast server-side, so heterogeneous
/// source types land correctly without per-type `ToSql` plumbing.
fn build_insert_sql(
    table: &str,
    row: &Row,
) -> Result<(String, Vec<Box<dyn ToSql + Sync + Send>>)> {
    let col_list = row
        .columns
        .iter()
        .map(|c| quote_pg(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let placeholders: Vec<String> = row
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| format!("${}{}", i + 1, sql_cast_for_value(v)))
        .collect();

    let params: Vec<Box<dyn ToSql + Sync + Send>> =
        row.values.iter().map(sql_value_to_param).collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_pg(table)?,
        col_list,
        placeholders.join(", ")
    );

    Ok((sql, params))
}

/// SQL cast suffix for a value's placeholder.
fn sql_cast_for_value(value: &SqlValue) -> &'static str {
    let null_type = match value {
        SqlValue::Null(t) => *t,
        SqlValue::Bool(_) => SqlNullType::Bool,
        SqlValue::I16(_) => SqlNullType::I16,
        SqlValue::I32(_) => SqlNullType::I32,
        SqlValue::I64(_) => SqlNullType::I64,
        SqlValue::F32(_) => SqlNullType::F32,
        SqlValue::F64(_) => SqlNullType::F64,
        SqlValue::Text(_) => SqlNullType::Text,
        SqlValue::Bytes(_) => SqlNullType::Bytes,
        SqlValue::Uuid(_) => SqlNullType::Uuid,
        SqlValue::Decimal(_) => SqlNullType::Decimal,
        SqlValue::DateTime(_) => SqlNullType::DateTime,
        SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
        SqlValue::Date(_) => SqlNullType::Date,
        SqlValue::Time(_) => SqlNullType::Time,
    };

    match null_type {
        SqlNullType::Bool => "::boolean",
        SqlNullType::I16 => "::int2",
        SqlNullType::I32 => "::int4",
        SqlNullType::I64 => "::int8",
        SqlNullType::F32 => "::float4",
        SqlNullType::F64 => "::float8",
        SqlNullType::Text => "::text",
        SqlNullType::Bytes => "::bytea",
        SqlNullType::Uuid => "::uuid",
        SqlNullType::Decimal => "::numeric",
        SqlNullType::DateTime => "::timestamp",
        SqlNullType::DateTimeOffset => "::timestamptz",
        SqlNullType::Date => "::date",
        SqlNullType::Time => "::time",
    }
}

/// Convert a value to a text parameter; the SQL cast does the typing.
fn sql_value_to_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null(_) => Box::new(None::<String>),
        SqlValue::Bool(b) => Box::new(if *b { "t".to_string() } else { "f".to_string() }),
        SqlValue::I16(n) => Box::new(n.to_string()),
        SqlValue::I32(n) => Box::new(n.to_string()),
        SqlValue::I64(n) => Box::new(n.to_string()),
        SqlValue::F32(n) => Box::new(n.to_string()),
        SqlValue::F64(n) => Box::new(n.to_string()),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(format!("\\x{}", hex::encode(b))),
        SqlValue::Uuid(u) => Box::new(u.to_string()),
        SqlValue::Decimal(d) => Box::new(d.to_string()),
        SqlValue::DateTime(dt) => Box::new(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        SqlValue::DateTimeOffset(dt) => Box::new(dt.to_rfc3339()),
        SqlValue::Date(d) => Box::new(d.to_string()),
        SqlValue::Time(t) => Box::new(t.to_string()),
    }
}

/// Convert a fetched row into the engine-agnostic [`Row`] shape.
fn pg_row_to_row(row: &tokio_postgres::Row, table: &str) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (i, col) in row.columns().iter().enumerate() {
        let name = col.name().to_string();
        let value = match col.type_().name() {
            "bool" => match try_get(row, i, table, &name)? {
                Some(v) => SqlValue::Bool(v),
                None => SqlValue::Null(SqlNullType::Bool),
            },
            "int2" => match try_get::<i16>(row, i, table, &name)? {
                Some(v) => SqlValue::I16(v),
                None => SqlValue::Null(SqlNullType::I16),
            },
            "int4" => match try_get::<i32>(row, i, table, &name)? {
                Some(v) => SqlValue::I32(v),
                None => SqlValue::Null(SqlNullType::I32),
            },
            "int8" => match try_get::<i64>(row, i, table, &name)? {
                Some(v) => SqlValue::I64(v),
                None => SqlValue::Null(SqlNullType::I64),
            },
            "float4" => match try_get::<f32>(row, i, table, &name)? {
                Some(v) => SqlValue::F32(v),
                None => SqlValue::Null(SqlNullType::F32),
            },
            "float8" => match try_get::<f64>(row, i, table, &name)? {
                Some(v) => SqlValue::F64(v),
                None => SqlValue::Null(SqlNullType::F64),
            },
            "numeric" => match try_get::<rust_decimal::Decimal>(row, i, table, &name)? {
                Some(v) => SqlValue::Decimal(v),
                None => SqlValue::Null(SqlNullType::Decimal),
            },
            "text" | "varchar" | "bpchar" | "name" => {
                match try_get::<String>(row, i, table, &name)? {
                    Some(v) => SqlValue::Text(v),
                    None => SqlValue::Null(SqlNullType::Text),
                }
            }
            "bytea" => match try_get::<Vec<u8>>(row, i, table, &name)? {
                Some(v) => SqlValue::Bytes(v),
                None => SqlValue::Null(SqlNullType::Bytes),
            },
            "uuid" => match try_get::<uuid::Uuid>(row, i, table, &name)? {
                Some(v) => SqlValue::Uuid(v),
                None => SqlValue::Null(SqlNullType::Uuid),
            },
            "timestamp" => match try_get::<chrono::NaiveDateTime>(row, i, table, &name)? {
                Some(v) => SqlValue::DateTime(v),
                None => SqlValue::Null(SqlNullType::DateTime),
            },
            "timestamptz" => {
                match try_get::<chrono::DateTime<chrono::Utc>>(row, i, table, &name)? {
                    Some(v) => SqlValue::DateTimeOffset(v.fixed_offset()),
                    None => SqlValue::Null(SqlNullType::DateTimeOffset),
                }
            }
            "date" => match try_get::<chrono::NaiveDate>(row, i, table, &name)? {
                Some(v) => SqlValue::Date(v),
                None => SqlValue::Null(SqlNullType::Date),
            },
            "time" => match try_get::<chrono::NaiveTime>(row, i, table, &name)? {
                Some(v) => SqlValue::Time(v),
                None => SqlValue::Null(SqlNullType::Time),
            },
            other => {
                return Err(MigrateError::query(
                    format!("reading {}", table),
                    format!("unsupported PostgreSQL type '{}' in column '{}'", other, name),
                ));
            }
        };

        columns.push(name);
        values.push(value);
    }

    Ok(Row::new(columns, values))
}

fn try_get<'a, T>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    table: &str,
    column: &str,
) -> Result<Option<T>>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        MigrateError::query(format!("decoding {}.{}", table, column), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_shape() {
        let row = Row::new(
            vec!["id".into(), "name".into(), "created_at".into()],
            vec![
                SqlValue::I64(1),
                SqlValue::Text("a".into()),
                SqlValue::Null(SqlNullType::DateTime),
            ],
        );
        let (sql, params) = build_insert_sql("users", &row).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"id\", \"name\", \"created_at\") \
             VALUES ($1::int8, $2::text, $3::timestamp)"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn insert_sql_rejects_bad_identifiers() {
        let row = Row::new(vec!["ok".into()], vec![SqlValue::I64(1)]);
        assert!(build_insert_sql("evil\0name", &row).is_err());
    }

    #[test]
    fn casts_follow_value_types() {
        assert_eq!(sql_cast_for_value(&SqlValue::Bool(true)), "::boolean");
        assert_eq!(
            sql_cast_for_value(&SqlValue::Null(SqlNullType::Uuid)),
            "::uuid"
        );
        assert_eq!(
            sql_cast_for_value(&SqlValue::Decimal(rust_decimal::Decimal::new(105, 2))),
            "::numeric"
        );
    }
}
