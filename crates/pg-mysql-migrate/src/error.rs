//! Error types for the migration library.

use thiserror::Error;

use crate::manager::Role;

/// Classified connection failure categories.
///
/// Connect operations report *which* infrastructure layer failed so that
/// operators can tell a firewall problem from a typo in the password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    /// No route to the host (ENETUNREACH/EHOSTUNREACH, connection refused).
    UnreachableNetwork,
    /// The connection attempt or handshake timed out.
    Timeout,
    /// Host name resolution failed.
    Dns,
    /// The server rejected the credentials.
    Auth,
    /// The named database does not exist on the server.
    MissingDatabase,
    /// Anything we could not classify further.
    Generic,
}

impl ConnectKind {
    /// Classify a driver error message into a connection failure category.
    ///
    /// Used as a fallback when the driver does not expose a structured error
    /// code (network-level failures mostly surface as wrapped `io::Error`s
    /// whose kind is lost by the time they reach us as strings).
    pub fn classify(detail: &str) -> Self {
        let lower = detail.to_lowercase();

        if lower.contains("timed out") || lower.contains("timeout") {
            ConnectKind::Timeout
        } else if lower.contains("failed to lookup address")
            || lower.contains("name or service not known")
            || lower.contains("nodename nor servname")
            || lower.contains("no such host")
        {
            ConnectKind::Dns
        } else if lower.contains("unreachable")
            || lower.contains("no route to host")
            || lower.contains("connection refused")
        {
            ConnectKind::UnreachableNetwork
        } else if lower.contains("password authentication failed")
            || lower.contains("access denied")
            || lower.contains("authentication")
        {
            ConnectKind::Auth
        } else if (lower.contains("database") && lower.contains("does not exist"))
            || lower.contains("unknown database")
        {
            ConnectKind::MissingDatabase
        } else {
            ConnectKind::Generic
        }
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (malformed connection string, invalid option).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection establishment failed, classified by infrastructure layer.
    #[error("{}", connect_message(.kind, .host, .port, .detail))]
    Connect {
        kind: ConnectKind,
        host: String,
        port: u16,
        detail: String,
    },

    /// A schema or migration operation was invoked against an empty slot.
    #[error("{role} database is not connected")]
    NotConnected { role: Role },

    /// Migration invoked without both handles present.
    #[error("{0}")]
    Precondition(String),

    /// A SQL statement failed. Wraps the driver message verbatim.
    #[error("Query failed ({context}): {message}")]
    Query { context: String, message: String },

    /// The per-row insert loop aborted. Reports exactly how far it got.
    #[error("Migration aborted for table {table} after {migrated} of {total} rows: {message}")]
    Transfer {
        table: String,
        migrated: i64,
        total: i64,
        message: String,
    },

    /// Migration was cancelled mid-loop.
    #[error("Migration cancelled after {migrated} rows")]
    Cancelled { migrated: i64 },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Query error with context about where it occurred.
    pub fn query(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        MigrateError::Query {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Create a classified Connect error from a raw driver failure.
    pub fn connect(kind: ConnectKind, host: &str, port: u16, err: impl std::fmt::Display) -> Self {
        MigrateError::Connect {
            kind,
            host: host.to_string(),
            port,
            detail: err.to_string(),
        }
    }
}

fn connect_message(kind: &ConnectKind, host: &str, port: &u16, detail: &str) -> String {
    match kind {
        ConnectKind::UnreachableNetwork => format!(
            "Unable to reach database at {}:{}. Check that the deployment environment \
             allows outbound connections to this host and port. ({})",
            host, port, detail
        ),
        ConnectKind::Timeout => format!(
            "Connection to {}:{} timed out. This may be caused by firewall rules or \
             network restrictions. ({})",
            host, port, detail
        ),
        ConnectKind::Dns => format!(
            "Could not resolve host {}. Check the connection string and DNS settings. ({})",
            host, detail
        ),
        ConnectKind::Auth => format!(
            "Authentication failed for {}:{}. Check the username and password.",
            host, port
        ),
        ConnectKind::MissingDatabase => format!(
            "Database does not exist on {}:{}. Check the database name in the connection string.",
            host, port
        ),
        ConnectKind::Generic => {
            format!("Failed to connect to {}:{}: {}", host, port, detail)
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
