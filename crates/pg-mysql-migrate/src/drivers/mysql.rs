//! MySQL/MariaDB driver.
//!
//! Implements [`DatabaseHandle`] over mysql_async. Reads use the binary
//! protocol so values arrive typed; writes bind `?` placeholders with
//! native `mysql_async::Value`s.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Value};
use tracing::{debug, info};

use crate::config::{ConnSpec, ConnectOptions, EngineKind};
use crate::core::identifier::quote_mysql;
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::core::DatabaseHandle;
use crate::error::{ConnectKind, MigrateError, Result};

use super::tls::SslMode;

/// MySQL server error codes surfaced during connect.
const ER_ACCESS_DENIED: u16 = 1045;
const ER_DBACCESS_DENIED: u16 = 1044;
const ER_BAD_DB: u16 = 1049;

/// MySQL-compatible database handle.
pub struct MysqlHandle {
    pool: Pool,
    host: String,
    port: u16,
    query_timeout: Duration,
}

impl MysqlHandle {
    /// Connect, probe, and return a live handle.
    ///
    /// As with the PostgreSQL driver, a failed probe disconnects the pool
    /// before the error is returned.
    pub async fn connect(spec: &ConnSpec, opts: &ConnectOptions) -> Result<Self> {
        let ssl_mode = SslMode::parse(&spec.ssl_mode)?;

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(spec.host.as_str())
            .tcp_port(spec.port)
            .db_name(Some(spec.database.as_str()))
            .user(Some(spec.user.as_str()))
            .pass(Some(spec.password.as_str()))
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_mode.mysql_ssl_opts() {
            builder = builder.ssl_opts(ssl);
        }

        let constraints = PoolConstraints::new(1, opts.get_max_connections()).ok_or_else(|| {
            MigrateError::Config(format!(
                "Invalid pool size: {}",
                opts.get_max_connections()
            ))
        })?;
        let pool_opts = PoolOpts::new().with_constraints(constraints);

        let mysql_opts: Opts = builder.pool_opts(pool_opts).into();
        let pool = Pool::new(mysql_opts);

        let handle = Self {
            pool,
            host: spec.host.clone(),
            port: spec.port,
            query_timeout: opts.get_query_timeout(),
        };

        if let Err(e) = tokio::time::timeout(opts.get_connect_timeout(), handle.probe())
            .await
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
            handle.pool.clone().disconnect().await.ok();
            return Err(e);
        }

        info!(
            "Connected to MySQL at {}:{}/{}",
            spec.host, spec.port, spec.database
        );
        Ok(handle)
    }

    async fn conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::query("acquiring MySQL connection", e))
    }

    /// Run a query future under the configured client-side timeout.
    async fn timed<T, F>(&self, context: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, mysql_async::Error>>,
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

    fn classify_connect_error(&self, e: &mysql_async::Error) -> MigrateError {
        let kind = match e {
            mysql_async::Error::Server(server) => match server.code {
                ER_ACCESS_DENIED | ER_DBACCESS_DENIED => ConnectKind::Auth,
                ER_BAD_DB => ConnectKind::MissingDatabase,
                _ => ConnectKind::classify(&server.message),
            },
            other => ConnectKind::classify(&other.to_string()),
        };
        MigrateError::connect(kind, &self.host, self.port, e)
    }
}

#[async_trait]
impl DatabaseHandle for MysqlHandle {
    fn engine(&self) -> EngineKind {
        EngineKind::Mysql
    }

    async fn probe(&self) -> Result<()> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| self.classify_connect_error(&e))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| self.classify_connect_error(&e))?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        self.timed("listing tables", conn.query::<String, _>("SHOW TABLES"))
            .await
    }

    async fn fetch_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        let mut conn = self.conn().await?;
        let sql = format!("SELECT * FROM {} LIMIT ?", quote_mysql(table)?);
        let context = format!("fetching rows from {}", table);

        let rows: Vec<mysql_async::Row> = self
            .timed(&context, conn.exec(sql.as_str(), (limit as u64,)))
            .await?;

        debug!("Fetched {} rows from {}", rows.len(), table);
        rows.iter().map(mysql_row_to_row).collect()
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_mysql(table)?);
        let context = format!("counting rows in {}", table);

        let count: Option<i64> = self.timed(&context, conn.exec_first(sql.as_str(), ())).await?;
        count.ok_or_else(|| MigrateError::query(context, "COUNT(*) returned no rows"))
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        let mut conn = self.conn().await?;
        let (sql, params) = build_insert_sql(table, row)?;
        let context = format!("inserting into {}", table);

        self.timed(&context, conn.exec_drop(sql.as_str(), params))
            .await
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

/// Build a single-row parameterized INSERT with `?` placeholders.
fn build_insert_sql(table: &str, row: &Row) -> Result<(String, Vec<Value>)> {
    let col_list = row
        .columns
        .iter()
        .map(|c| quote_mysql(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let placeholders = vec!["?"; row.values.len()].join(", ");
    let params: Vec<Value> = row.values.iter().map(sql_value_to_mysql).collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_mysql(table)?,
        col_list,
        placeholders
    );

    Ok((sql, params))
}

/// Convert a SqlValue to a native mysql_async parameter.
fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null(_) => Value::NULL,
        SqlValue::Bool(b) => Value::from(*b),
        SqlValue::I16(i) => Value::from(*i),
        SqlValue::I32(i) => Value::from(*i),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::F32(f) => Value::from(*f),
        SqlValue::F64(f) => Value::from(*f),
        SqlValue::Text(s) => Value::from(s.as_str()),
        SqlValue::Bytes(b) => Value::from(b.as_slice()),
        SqlValue::Uuid(u) => Value::from(u.to_string()),
        SqlValue::Decimal(d) => Value::from(d.to_string()),
        SqlValue::DateTime(dt) => naive_datetime_to_value(dt),
        SqlValue::DateTimeOffset(dto) => naive_datetime_to_value(&dto.naive_utc()),
        SqlValue::Date(d) => Value::Date(
            d.year().clamp(0, i32::from(u16::MAX)) as u16,
            d.month() as u8,
            d.day() as u8,
            0,
            0,
            0,
            0,
        ),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            (t.nanosecond() / 1_000).min(999_999),
        ),
    }
}

fn naive_datetime_to_value(dt: &chrono::NaiveDateTime) -> Value {
    Value::Date(
        dt.year().clamp(0, i32::from(u16::MAX)) as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        (dt.nanosecond() / 1_000).min(999_999),
    )
}

/// Convert a fetched row into the engine-agnostic [`Row`] shape.
fn mysql_row_to_row(row: &mysql_async::Row) -> Result<Row> {
    let cols = row.columns_ref();
    let mut columns = Vec::with_capacity(cols.len());
    let mut values = Vec::with_capacity(cols.len());

    for (i, col) in cols.iter().enumerate() {
        let name = col.name_str().to_string();
        let raw = row.as_ref(i).ok_or_else(|| {
            MigrateError::query("reading MySQL row", format!("missing value for column {}", name))
        })?;
        columns.push(name);
        values.push(mysql_value_to_sql(raw, col));
    }

    Ok(Row::new(columns, values))
}

fn mysql_value_to_sql(value: &Value, col: &mysql_async::Column) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null(null_type_for(col)),
        Value::Int(i) => SqlValue::I64(*i),
        Value::UInt(u) => {
            if *u <= i64::MAX as u64 {
                SqlValue::I64(*u as i64)
            } else {
                // BIGINT UNSIGNED overflow; keep the digits as text.
                SqlValue::Text(u.to_string())
            }
        }
        Value::Float(f) => SqlValue::F32(*f),
        Value::Double(d) => SqlValue::F64(*d),
        Value::Bytes(bytes) => bytes_to_sql(bytes, col),
        Value::Date(y, mo, d, h, mi, s, us) => {
            let date = chrono::NaiveDate::from_ymd_opt(i32::from(*y), u32::from(*mo), u32::from(*d));
            match date {
                Some(date) if col.column_type() == ColumnType::MYSQL_TYPE_DATE => {
                    SqlValue::Date(date)
                }
                Some(date) => match date.and_hms_micro_opt(
                    u32::from(*h),
                    u32::from(*mi),
                    u32::from(*s),
                    *us,
                ) {
                    Some(dt) => SqlValue::DateTime(dt),
                    None => SqlValue::Null(SqlNullType::DateTime),
                },
                None => SqlValue::Null(SqlNullType::DateTime),
            }
        }
        Value::Time(_neg, days, h, m, s, us) => {
            let hours = u32::from(*h) + days * 24;
            match chrono::NaiveTime::from_hms_micro_opt(hours, u32::from(*m), u32::from(*s), *us) {
                Some(t) => SqlValue::Time(t),
                None => SqlValue::Null(SqlNullType::Time),
            }
        }
    }
}

/// Decode a Bytes payload using the column metadata: decimals, binary blobs,
/// and everything stringly-typed.
fn bytes_to_sql(bytes: &[u8], col: &mysql_async::Column) -> SqlValue {
    match col.column_type() {
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            match std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<rust_decimal::Decimal>().ok())
            {
                Some(d) => SqlValue::Decimal(d),
                None => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            }
        }
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_STRING
            if col.flags().contains(ColumnFlags::BINARY_FLAG) =>
        {
            SqlValue::Bytes(bytes.to_vec())
        }
        _ => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn null_type_for(col: &mysql_async::Column) -> SqlNullType {
    match col.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => SqlNullType::I64,
        ColumnType::MYSQL_TYPE_FLOAT => SqlNullType::F32,
        ColumnType::MYSQL_TYPE_DOUBLE => SqlNullType::F64,
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => SqlNullType::Decimal,
        ColumnType::MYSQL_TYPE_DATE => SqlNullType::Date,
        ColumnType::MYSQL_TYPE_TIME => SqlNullType::Time,
        ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => SqlNullType::DateTime,
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB => SqlNullType::Bytes,
        _ => SqlNullType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_shape() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![SqlValue::I64(1), SqlValue::Text("a".into())],
        );
        let (sql, params) = build_insert_sql("users", &row).unwrap();
        assert_eq!(sql, "INSERT INTO `users` (`id`, `name`) VALUES (?, ?)");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], Value::Int(1));
    }

    #[test]
    fn null_params_bind_as_null() {
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Null(SqlNullType::Text)),
            Value::NULL
        );
    }

    #[test]
    fn decimal_binds_as_string() {
        let d = rust_decimal::Decimal::new(1999, 2);
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Decimal(d)),
            Value::Bytes(b"19.99".to_vec())
        );
    }

    #[test]
    fn insert_sql_rejects_bad_identifiers() {
        let row = Row::new(vec!["ok".into()], vec![SqlValue::I64(1)]);
        assert!(build_insert_sql("", &row).is_err());
    }
}
