//! # xpdb-sql
//!
//! Row reconciliation and schema bootstrap for PostgreSQL and MySQL.
//!
//! A loader hands batches of rows to [`SqlDbConnection::reconcile`] and gets
//! back, for every row and in input order, the identifier and match columns
//! of either a newly inserted record or the record that already existed.
//! Schemas are installed from DDL scripts whose dollar-quoted procedural
//! bodies are kept intact by the [`script`] splitter.
//!
//! ## Features
//!
//! - **Insert-or-find**: one statement per batch on PostgreSQL (`RETURNING`,
//!   CTEs, existence flags, input-ordered results)
//! - **Column type catalog**: per-table casts and value conversion,
//!   introspected once per connection
//! - **Schema bootstrap**: drop and recreate from versioned scripts
//! - **SQL trace**: optional append-only statement log
//! - **Dialect probe**: detect a SQL server behind host:port
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use xpdb_sql::prelude::*;
//!
//! let config = ConnectionConfig::new(Dialect::Postgres)
//!     .with_credentials("xbrl", "secret")
//!     .with_database("xbrl_public");
//! let mut conn = SqlDbConnection::connect(config).await?;
//!
//! let request = ReconcileRequest::new(["name", "amount"], ["name"])
//!     .with_id_column("id")
//!     .with_rows(vec![
//!         vec![Value::from("Alice"), Value::from(10)],
//!         vec![Value::from("Bob"), Value::from(20)],
//!     ])
//!     .check_if_existing(true)
//!     .return_existence_status(true)
//!     .commit(true);
//!
//! for row in &conn.reconcile("entity", &request).await? {
//!     println!("{:?} existed={:?}", row.values, row.existed);
//! }
//! conn.close(false).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` - PostgreSQL support via tokio-postgres
//! - `mysql` - MySQL/MariaDB support via mysql_async

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod literal;
pub mod probe;
pub mod reconcile;
pub mod script;
pub mod trace;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Values and rows
    pub use crate::types::{Row, Value};

    // Connection and configuration
    pub use crate::config::ConnectionConfig;
    pub use crate::connection::{ExecOptions, SqlDbConnection};
    pub use crate::driver::{Cursor, Driver};

    // Dialects and catalog
    pub use crate::catalog::{ColumnDescriptor, ColumnKind, TableColumns};
    pub use crate::dialect::{dialect_for, Dialect, MySqlDialect, PostgresDialect, SqlDialect};

    // Reconciliation
    pub use crate::reconcile::{
        Comparison, ReconcileRequest, ReconcileResult, ReconciledRow,
    };

    // Scripts, tracing, probe
    pub use crate::probe::is_sql_connection;
    pub use crate::script::{split_statements, Script};
    pub use crate::trace::{FileTraceSink, TraceEvent, TraceSink};
}

// Re-export commonly used items at crate root
pub use connection::SqlDbConnection;
pub use error::{Error, Result};
pub use types::Value;
