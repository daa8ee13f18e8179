//! PostgreSQL backend for xpdb-sql
//!
//! Statements run through the simple query protocol, which accepts
//! multi-statement text and returns text cells. A transaction is opened
//! lazily before the first statement after a commit or rollback, so nothing
//! is committed until the caller asks for it.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use crate::config::ConnectionConfig;
use crate::dialect::Dialect;
use crate::driver::{Cursor, Driver};
use crate::error::{Error, Result};
use crate::probe::ProbeOutcome;
use crate::types::Row;

struct PgSession {
    client: Client,
    closed: AtomicBool,
    in_transaction: AtomicBool,
}

impl PgSession {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.client.is_closed()
    }

    async fn simple(&self, sql: &str) -> Result<Vec<SimpleQueryMessage>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.client
            .simple_query(sql)
            .await
            .map_err(|e| map_pg_error(e, sql))
    }

    async fn ensure_transaction(&self) -> Result<()> {
        if !self.in_transaction.load(Ordering::Relaxed) {
            self.simple("BEGIN").await?;
            self.in_transaction.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn finish_transaction(&self, verb: &str) -> Result<()> {
        if self.in_transaction.swap(false, Ordering::Relaxed) {
            self.simple(verb).await?;
        } else if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }
}

fn map_pg_error(e: tokio_postgres::Error, sql: &str) -> Error {
    if e.is_closed() {
        return Error::ConnectionClosed;
    }
    let message = match e.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => e.to_string(),
    };
    Error::Statement {
        message,
        sql: Some(sql.to_string()),
        source: Some(Box::new(e)),
    }
}

fn config_for(config: &ConnectionConfig) -> tokio_postgres::Config {
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port())
        .user(&config.user)
        .connect_timeout(config.connect_timeout());
    if !config.password.is_empty() {
        pg.password(&config.password);
    }
    if !config.database.is_empty() {
        pg.dbname(&config.database);
    }
    if let Some(name) = &config.application_name {
        pg.application_name(name);
    }
    pg
}

/// PostgreSQL session
pub struct PgDriver {
    session: Arc<PgSession>,
}

impl std::fmt::Debug for PgDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDriver")
            .field("closed", &self.session.is_closed())
            .field(
                "in_transaction",
                &self.session.in_transaction.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl PgDriver {
    /// Connect using a configuration
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let (client, connection) = config_for(config)
            .connect(NoTls)
            .await
            .map_err(|e| {
                Error::connection_with_source(
                    format!(
                        "failed to connect to PostgreSQL at {}:{}",
                        config.host,
                        config.port()
                    ),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "PostgreSQL connection error");
            }
        });

        tracing::debug!(host = %config.host, port = config.port(), "connected to PostgreSQL");
        Ok(Self::new(client))
    }

    /// Wrap an established client
    pub fn new(client: Client) -> Self {
        Self {
            session: Arc::new(PgSession {
                client,
                closed: AtomicBool::new(false),
                in_transaction: AtomicBool::new(false),
            }),
        }
    }
}

#[async_trait]
impl Driver for PgDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn open_cursor(&self) -> Result<Box<dyn Cursor>> {
        if self.session.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        Ok(Box::new(PgCursor {
            session: Arc::clone(&self.session),
            rows: Vec::new(),
            row_count: None,
            closed: false,
        }))
    }

    async fn commit(&self) -> Result<()> {
        self.session.finish_transaction("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.session.finish_transaction("ROLLBACK").await
    }

    async fn close(&self) -> Result<()> {
        // an open transaction is rolled back by the server when the socket drops
        self.session.in_transaction.store(false, Ordering::Relaxed);
        self.session.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

/// PostgreSQL cursor
pub struct PgCursor {
    session: Arc<PgSession>,
    rows: Vec<Row>,
    row_count: Option<u64>,
    closed: bool,
}

#[async_trait]
impl Cursor for PgCursor {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        if self.closed {
            return Err(Error::CursorClosed);
        }
        self.rows.clear();
        self.row_count = None;

        self.session.ensure_transaction().await?;
        for message in self.session.simple(sql).await? {
            match message {
                SimpleQueryMessage::Row(row) => {
                    let columns = row
                        .columns()
                        .iter()
                        .map(|c| c.name().to_string())
                        .collect();
                    let cells = (0..row.len())
                        .map(|i| row.get(i).map(str::to_string))
                        .collect();
                    self.rows.push(Row::new(columns, cells));
                }
                SimpleQueryMessage::CommandComplete(n) => self.row_count = Some(n),
                _ => {}
            }
        }
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
/// PostgreSQL is listening
pub(crate) async fn probe(host: &str, port: u16) -> ProbeOutcome {
    let mut pg = tokio_postgres::Config::new();
    pg.host(host).port(port).user("");
    match pg.connect(NoTls).await {
        Ok(_) => ProbeOutcome::Confirmed,
        Err(e) if e.as_db_error().is_some() => ProbeOutcome::Confirmed,
        Err(e) => {
            tracing::debug!(host, port, error = %e, "not a PostgreSQL server");
            ProbeOutcome::Foreign
        }
    }
}
