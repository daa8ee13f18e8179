//! Error types for xpdb-sql
//!
//! Errors are classified so callers can decide what to do with them:
//! - Connection-level failures (backend unreachable, connection or cursor gone)
//! - Statement failures (the backend rejected the SQL)
//! - Configuration failures (unknown columns, invalid identifiers)
//!
//! The engine itself never retries except for re-allocating a cursor the
//! backend closed underneath it.

use std::fmt;
use thiserror::Error;

/// Result type for xpdb-sql operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Backend unreachable or connection lost
    Connection,
    /// Backend rejected a statement
    Statement,
    /// Caller configuration does not match the backend schema
    Configuration,
    /// Returned value could not be converted
    TypeConversion,
    /// Operation not offered by the active dialect
    Unsupported,
    /// Local I/O (script, config and trace files)
    Io,
    /// The connection has been closed
    Closed,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable by the caller
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection)
    }
}

/// Main error type for xpdb-sql
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Could not reach or authenticate to the backend
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend connection was already closed
    #[error("connection already closed")]
    ConnectionClosed,

    /// The cursor was closed by the backend
    #[error("cursor already closed")]
    CursorClosed,

    /// Backend rejected the statement (syntax or semantics)
    #[error("statement error: {message}")]
    Statement {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced column is missing from the introspected table definition
    #[error("table {table} column definition missing: {column}")]
    MissingColumnDefinition { table: String, column: String },

    /// Returned text could not be converted to the column's type
    #[error("type conversion error: {message}")]
    TypeConversion { message: String },

    /// Capability not offered by the active dialect
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// File I/O failure
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Operation attempted on a closed connection
    #[error("connection is closed")]
    Closed,
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } | Self::ConnectionClosed | Self::CursorClosed => {
                ErrorCategory::Connection
            }
            Self::Statement { .. } => ErrorCategory::Statement,
            Self::MissingColumnDefinition { .. } | Self::Configuration { .. } => {
                ErrorCategory::Configuration
            }
            Self::TypeConversion { .. } => ErrorCategory::TypeConversion,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::Io { .. } => ErrorCategory::Io,
            Self::Closed => ErrorCategory::Closed,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a statement error
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a statement error carrying the offending SQL
    pub fn statement_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a missing column definition error
    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumnDefinition {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an I/O error for a path
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The SQL text attached to a statement error, if any
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Statement { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Statement => write!(f, "statement"),
            Self::Configuration => write!(f, "configuration"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Io => write!(f, "io"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
