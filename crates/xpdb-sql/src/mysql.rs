//! MySQL backend for xpdb-sql
//!
//! Autocommit is switched off when the session starts, so statements
//! accumulate in an implicit transaction until `commit` or `rollback`.
//! Queries use the text protocol; cells are converted to their text
//! rendering to match the PostgreSQL backend.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::ConnectionConfig;
use crate::dialect::Dialect;
use crate::driver::{Cursor, Driver};
use crate::error::{Error, Result};
use crate::probe::ProbeOutcome;
use crate::types::Row;

/// Render a MySQL value as text; `None` for NULL
fn mysql_value_to_text(val: mysql_async::Value) -> Option<String> {
    match val {
        mysql_async::Value::NULL => None,
        mysql_async::Value::Bytes(b) => Some(String::from_utf8_lossy(&b).into_owned()),
        mysql_async::Value::Int(n) => Some(n.to_string()),
        mysql_async::Value::UInt(n) => Some(n.to_string()),
        mysql_async::Value::Float(f) => Some(f.to_string()),
        mysql_async::Value::Double(d) => Some(d.to_string()),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            if hour == 0 && min == 0 && sec == 0 && micro == 0 {
                Some(format!("{:04}-{:02}-{:02}", year, month, day))
            } else {
                Some(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                    year, month, day, hour, min, sec, micro
                ))
            }
        }
        mysql_async::Value::Time(neg, days, hours, minutes, seconds, micros) => {
            let total_hours = days * 24 + u32::from(hours);
            let sign = if neg { "-" } else { "" };
            Some(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, minutes, seconds, micros
            ))
        }
    }
}

fn map_mysql_error(e: mysql_async::Error, sql: &str) -> Error {
    match e {
        mysql_async::Error::Io(_) => Error::ConnectionClosed,
        mysql_async::Error::Server(server) => {
            let message = format!("{} ({}): {}", server.code, server.state, server.message);
            Error::Statement {
                message,
                sql: Some(sql.to_string()),
                source: Some(Box::new(mysql_async::Error::Server(server))),
            }
        }
        other => Error::Statement {
            message: other.to_string(),
            sql: Some(sql.to_string()),
            source: Some(Box::new(other)),
        },
    }
}

struct MySqlSession {
    conn: Mutex<Option<Conn>>,
    closed: AtomicBool,
}

impl MySqlSession {
    async fn query(&self, sql: &str) -> Result<(Vec<Row>, u64)> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(Error::ConnectionClosed)?;

        let result: Vec<mysql_async::Row> = match conn.query(sql).await {
            Ok(rows) => rows,
            Err(e) => {
                let err = map_mysql_error(e, sql);
                if matches!(err, Error::ConnectionClosed) {
                    self.closed.store(true, Ordering::Relaxed);
                    *guard = None;
                }
                return Err(err);
            }
        };
        let affected = conn.affected_rows();

        let rows = result
            .into_iter()
            .map(|row| {
                let columns: Vec<String> = row
                    .columns_ref()
                    .iter()
                    .map(|c| c.name_str().to_string())
                    .collect();
                let cells = (0..row.len())
                    .map(|i| row.as_ref(i).cloned().and_then(mysql_value_to_text))
                    .collect();
                Row::new(columns, cells)
            })
            .collect();
        Ok((rows, affected))
    }
}

/// MySQL session
pub struct MySqlDriver {
    session: Arc<MySqlSession>,
}

impl std::fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("closed", &self.session.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Statements run on every new session. Literals are rendered with `'`
/// doubled only, so backslashes must not be escape characters.
const SESSION_INIT: &[&str] = &[
    "SET autocommit=0",
    "SET SESSION sql_mode = CONCAT_WS(',', NULLIF(@@SESSION.sql_mode, ''), 'NO_BACKSLASH_ESCAPES')",
];

fn opts_for(config: &ConnectionConfig) -> OptsBuilder {
    let mut opts = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port())
        .user(Some(config.user.clone()))
        .init(SESSION_INIT.to_vec());
    if !config.password.is_empty() {
        opts = opts.pass(Some(config.password.clone()));
    }
    if !config.database.is_empty() {
        opts = opts.db_name(Some(config.database.clone()));
    }
    opts
}

impl MySqlDriver {
    /// Connect using a configuration
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let target = format!("{}:{}", config.host, config.port());
        let conn = tokio::time::timeout(config.connect_timeout(), Conn::new(opts_for(config)))
            .await
            .map_err(|_| Error::connection(format!("timed out connecting to MySQL at {}", target)))?
            .map_err(|e| {
                Error::connection_with_source(format!("failed to connect to MySQL at {}", target), e)
            })?;

        tracing::debug!(host = %config.host, port = config.port(), "connected to MySQL");
        Ok(Self::new(conn))
    }

    /// Wrap an established connection
    pub fn new(conn: Conn) -> Self {
        Self {
            session: Arc::new(MySqlSession {
                conn: Mutex::new(Some(conn)),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn open_cursor(&self) -> Result<Box<dyn Cursor>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        Ok(Box::new(MySqlCursor {
            session: Arc::clone(&self.session),
            rows: Vec::new(),
            row_count: None,
            closed: false,
        }))
    }

    async fn commit(&self) -> Result<()> {
        self.session.query("COMMIT").await.map(|_| ())
    }

    async fn rollback(&self) -> Result<()> {
        self.session.query("ROLLBACK").await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        self.session.closed.store(true, Ordering::Relaxed);
        let conn = self.session.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.disconnect().await.map_err(|e| {
                Error::connection_with_source("failed to close MySQL connection", e)
            })?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.session.closed.load(Ordering::Relaxed)
    }
}

/// MySQL cursor
pub struct MySqlCursor {
    session: Arc<MySqlSession>,
    rows: Vec<Row>,
    row_count: Option<u64>,
    closed: bool,
}

#[async_trait]
impl Cursor for MySqlCursor {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        if self.closed {
            return Err(Error::CursorClosed);
        }
        self.rows.clear();
        self.row_count = None;

        let (rows, affected) = self.session.query(sql).await?;
        self.row_count = Some(if rows.is_empty() {
            affected
        } else {
            rows.len() as u64
        });
        self.rows = rows;
        Ok(())
    }

    fn fetch_all(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// One probe attempt: a server-side rejection of the empty user name means
/// MySQL is listening
pub(crate) async fn probe(host: &str, port: u16) -> ProbeOutcome {
    let opts = OptsBuilder::default()
        .ip_or_hostname(host.to_string())
        .tcp_port(port)
        .user(Some(String::new()));
    match Conn::new(opts).await {
        Ok(conn) => {
            let _ = conn.disconnect().await;
            ProbeOutcome::Confirmed
        }
        Err(mysql_async::Error::Server(_)) => ProbeOutcome::Confirmed,
        Err(e) => {
            tracing::debug!(host, port, error = %e, "not a MySQL server");
            ProbeOutcome::Foreign
        }
    }
}
