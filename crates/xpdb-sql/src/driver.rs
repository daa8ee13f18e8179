//! Backend session traits for xpdb-sql
//!
//! - Driver: one backend session; hands out cursors and owns the transaction
//! - Cursor: executes one statement at a time and buffers its result rows
//!
//! Statement text reaching a cursor is final SQL (already out of format form).
//! Both backends are driven through their text protocols, so every returned
//! cell is the backend's text rendering.

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::types::Row;

/// A backend session
#[async_trait]
pub trait Driver: Send + Sync {
    /// Backend family of this session
    fn dialect(&self) -> Dialect;

    /// Allocate a new cursor
    async fn open_cursor(&self) -> Result<Box<dyn Cursor>>;

    /// Commit the open transaction, if any
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction, if any.
    ///
    /// Fails with [`Error::ConnectionClosed`] when the session is gone.
    async fn rollback(&self) -> Result<()>;

    /// Close the session
    async fn close(&self) -> Result<()>;

    /// Whether the session has been closed (locally or by the backend)
    fn is_closed(&self) -> bool;
}

/// A statement cursor
#[async_trait]
pub trait Cursor: Send {
    /// Execute one statement, replacing any buffered result.
    ///
    /// Fails with [`Error::CursorClosed`] once the cursor was closed.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Take the rows buffered by the last statement
    fn fetch_all(&mut self) -> Vec<Row>;

    /// Rows affected or returned by the last statement, if reported
    fn row_count(&self) -> Option<u64>;

    /// Close the cursor; closing twice is not an error
    async fn close(&mut self) -> Result<()>;

    /// Whether the cursor is closed
    fn is_closed(&self) -> bool;
}

/// Open a backend session for a configuration
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn Driver>> {
    match config.dialect {
        #[cfg(feature = "postgres")]
        Dialect::Postgres => Ok(Box::new(crate::postgres::PgDriver::connect(config).await?)),
        #[cfg(feature = "mysql")]
        Dialect::MySql => Ok(Box::new(crate::mysql::MySqlDriver::connect(config).await?)),
        #[allow(unreachable_patterns)]
        other => Err(Error::unsupported(format!(
            "xpdb-sql was built without the {} backend",
            other
        ))),
    }
}
