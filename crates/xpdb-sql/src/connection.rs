//! Connection lifecycle for xpdb-sql
//!
//! `SqlDbConnection` owns one backend session, at most one live cursor and
//! the per-table column type catalog. It is the single entry point for
//! statement execution, schema bootstrap and reconciliation.
//!
//! A connection is open until [`SqlDbConnection::close`]; afterwards every
//! operation fails with [`Error::Closed`].

use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{ColumnTypeCatalog, TableColumns};
use crate::config::ConnectionConfig;
use crate::dialect::{Dialect, SqlDialect};
use crate::driver::{self, Cursor, Driver};
use crate::error::{Error, Result};
use crate::literal::{escape_percent, unescape_percent, validate_sql_identifier};
use crate::reconcile::{ReconcileRequest, ReconcileResult};
use crate::script::split_statements;
use crate::trace::{self, FileTraceSink, TraceEvent, TraceSink};
use crate::types::Row;

/// Accession label used until one is set
pub const NO_ACCESSION: &str = "(None)";

/// Per-statement execution options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Commit after the statement
    pub commit: bool,
    /// Return the result rows
    pub fetch: bool,
    /// Release the cursor after the statement
    pub close_cursor: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            commit: false,
            fetch: true,
            close_cursor: true,
        }
    }
}

impl ExecOptions {
    /// Options for a batch of DDL statements: no fetch, no commit, keep the
    /// cursor
    pub const fn batch() -> Self {
        Self {
            commit: false,
            fetch: false,
            close_cursor: false,
        }
    }

    /// Set commit
    pub const fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    /// Set fetch
    pub const fn with_fetch(mut self, fetch: bool) -> Self {
        self.fetch = fetch;
        self
    }

    /// Set cursor release
    pub const fn with_close_cursor(mut self, close: bool) -> Self {
        self.close_cursor = close;
        self
    }
}

struct Inner {
    sql: Box<dyn SqlDialect>,
    driver: Box<dyn Driver>,
    cursor: Option<Box<dyn Cursor>>,
    catalog: ColumnTypeCatalog,
    trace: Option<Box<dyn TraceSink>>,
}

impl Inner {
    /// Live cursor, allocated on demand
    async fn cursor(&mut self) -> Result<&mut Box<dyn Cursor>> {
        if self.cursor.as_ref().map_or(true, |c| c.is_closed()) {
            self.cursor = Some(self.driver.open_cursor().await?);
        }
        self.cursor.as_mut().ok_or(Error::CursorClosed)
    }

    /// Run a statement, reallocating the cursor once if the backend closed it
    async fn run(&mut self, sql: &str) -> Result<()> {
        let outcome = self.cursor().await?.execute(sql).await;
        match outcome {
            Err(Error::CursorClosed) => {
                tracing::debug!("cursor closed underneath, retrying on a new cursor");
                self.cursor = None;
                self.cursor().await?.execute(sql).await
            }
            other => other,
        }
    }

    async fn execute(
        &mut self,
        accession: &str,
        sql: &str,
        options: ExecOptions,
    ) -> Result<Option<Vec<Row>>> {
        let sql = unescape_percent(sql);
        trace::record(
            self.trace.as_deref(),
            TraceEvent::Statement {
                accession,
                sql: &sql,
            },
        );
        tracing::debug!(accession, sql = %sql, "executing statement");

        if let Err(e) = self.run(&sql).await {
            tracing::debug!(accession, error = %e, "statement failed");
            trace::record(
                self.trace.as_deref(),
                TraceEvent::Failed {
                    accession,
                    sql: &sql,
                    error: e.to_string(),
                },
            );
            return Err(e);
        }

        let cursor = self.cursor().await?;
        let row_count = cursor.row_count();
        let rows = options.fetch.then(|| cursor.fetch_all());

        if options.commit {
            self.driver.commit().await?;
        }
        if options.close_cursor {
            self.close_cursor().await?;
        }

        trace::record(
            self.trace.as_deref(),
            TraceEvent::Completed {
                accession,
                fetched: rows.as_ref().map(Vec::len),
                row_count,
            },
        );
        Ok(rows)
    }

    /// First column of every returned row
    async fn names(&mut self, accession: &str, sql: &str) -> Result<Vec<String>> {
        let rows = self
            .execute(accession, sql, ExecOptions::default())
            .await?
            .unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0).map(str::to_string))
            .collect())
    }

    async fn close_cursor(&mut self) -> Result<()> {
        match self.cursor.take() {
            Some(mut cursor) => match cursor.close().await {
                Ok(()) | Err(Error::CursorClosed) => Ok(()),
                Err(e) => Err(e),
            },
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        match self.driver.rollback().await {
            Err(Error::ConnectionClosed) => {
                tracing::warn!("rollback skipped, backend connection already closed");
                Ok(())
            }
            other => other,
        }
    }

    async fn types_for(&mut self, accession: &str, table: &str) -> Result<Arc<TableColumns>> {
        if let Some(columns) = self.catalog.get(table) {
            return Ok(columns);
        }
        validate_sql_identifier(table)?;
        let sql = self.sql.column_types_sql(table);
        let rows = self
            .execute(accession, &sql, ExecOptions::default())
            .await?
            .unwrap_or_default();
        tracing::debug!(table, columns = rows.len(), "introspected table columns");
        Ok(self.catalog.insert(table, &rows))
    }
}

/// One logical session to one backend
pub struct SqlDbConnection {
    config: ConnectionConfig,
    dialect: Dialect,
    accession: String,
    inner: Option<Inner>,
}

impl std::fmt::Debug for SqlDbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlDbConnection")
            .field("dialect", &self.dialect)
            .field("accession", &self.accession)
            .field("closed", &self.is_closed())
            .field("config", &self.config)
            .finish()
    }
}

impl SqlDbConnection {
    /// Connect to the configured backend, opening the trace file if one is
    /// configured
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let trace: Option<Box<dyn TraceSink>> = match &config.trace_file {
            Some(path) => Some(Box::new(FileTraceSink::open(path)?)),
            None => None,
        };
        let driver = driver::connect(&config).await?;
        tracing::info!(
            dialect = %config.dialect,
            host = %config.host,
            port = config.port(),
            database = %config.database,
            "connected"
        );
        Ok(Self::with_driver(config, driver, trace))
    }

    /// Build a connection around an established driver
    pub fn with_driver(
        config: ConnectionConfig,
        driver: Box<dyn Driver>,
        trace: Option<Box<dyn TraceSink>>,
    ) -> Self {
        let dialect = driver.dialect();
        Self {
            config,
            dialect,
            accession: NO_ACCESSION.to_string(),
            inner: Some(Inner {
                sql: dialect.sql_dialect(),
                driver,
                cursor: None,
                catalog: ColumnTypeCatalog::new(),
                trace,
            }),
        }
    }

    fn parts(&mut self) -> Result<(&mut Inner, &str)> {
        let inner = self.inner.as_mut().ok_or(Error::Closed)?;
        Ok((inner, &self.accession))
    }

    /// Backend family
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Configuration the connection was built from
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Label attached to trace records
    pub fn accession(&self) -> &str {
        &self.accession
    }

    /// Set the label attached to trace records
    pub fn set_accession(&mut self, label: impl Into<String>) {
        self.accession = label.into();
    }

    /// Execute one statement.
    ///
    /// `sql` is in format form: `%%` is sent as a single `%`. Returns the
    /// result rows when `options.fetch` is set.
    pub async fn execute(&mut self, sql: &str, options: ExecOptions) -> Result<Option<Vec<Row>>> {
        let (inner, accession) = self.parts()?;
        inner.execute(accession, sql, options).await
    }

    /// Commit the open transaction
    pub async fn commit(&mut self) -> Result<()> {
        let (inner, _) = self.parts()?;
        inner.driver.commit().await
    }

    /// Roll back the open transaction; a backend connection that is already
    /// gone is not an error
    pub async fn rollback(&mut self) -> Result<()> {
        let (inner, _) = self.parts()?;
        inner.rollback().await
    }

    /// Release the live cursor, if any
    pub async fn close_cursor(&mut self) -> Result<()> {
        let (inner, _) = self.parts()?;
        inner.close_cursor().await
    }

    /// Close the cursor, optionally roll back, close the backend session and
    /// release all state.
    ///
    /// The connection is closed afterwards even when a step fails; the first
    /// failure is returned.
    pub async fn close(&mut self, rollback_first: bool) -> Result<()> {
        let mut inner = self.inner.take().ok_or(Error::Closed)?;
        let mut first_error = None;

        if let Err(e) = inner.close_cursor().await {
            first_error.get_or_insert(e);
        }
        if rollback_first {
            if let Err(e) = inner.rollback().await {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = inner.driver.close().await {
            first_error.get_or_insert(e);
        }
        drop(inner);

        tracing::debug!(accession = %self.accession, "connection closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Column descriptors of a table, introspected on first use
    pub async fn types_for(&mut self, table: &str) -> Result<Arc<TableColumns>> {
        let (inner, accession) = self.parts()?;
        inner.types_for(accession, table).await
    }

    /// Databases on the server
    pub async fn databases_in_db(&mut self) -> Result<Vec<String>> {
        let (inner, accession) = self.parts()?;
        let sql = inner.sql.databases_sql();
        inner.names(accession, sql).await
    }

    /// Tables in the current schema
    pub async fn tables_in_db(&mut self) -> Result<Vec<String>> {
        let (inner, accession) = self.parts()?;
        let sql = inner.sql.tables_sql();
        inner.names(accession, sql).await
    }

    /// Sequences (PostgreSQL) or triggers (MySQL) in the current schema
    pub async fn sequences_in_db(&mut self) -> Result<Vec<String>> {
        let (inner, accession) = self.parts()?;
        let sql = inner.sql.sequences_sql();
        inner.names(accession, sql).await
    }

    /// Drop every table in the current schema and commit
    pub async fn drop_all_tables_in_db(&mut self) -> Result<()> {
        let (inner, accession) = self.parts()?;
        let statements = match inner.sql.drop_schema_sql() {
            Some(statements) => statements,
            None => {
                let tables_sql = inner.sql.tables_sql();
                inner
                    .names(accession, tables_sql)
                    .await?
                    .iter()
                    .map(|t| escape_percent(&inner.sql.drop_table_sql(t)))
                    .collect()
            }
        };
        for sql in &statements {
            inner.execute(accession, sql, ExecOptions::batch()).await?;
        }
        inner.driver.commit().await?;
        inner.catalog = ColumnTypeCatalog::new();
        inner.close_cursor().await
    }

    /// Replace the schema: drop the whole schema where the dialect can
    /// (PostgreSQL), otherwise every table and trigger, then run the
    /// executable statements of `ddl` and commit once.
    ///
    /// `ddl` is in format form (see [`escape_percent`]). Returns the number of
    /// statements executed.
    pub async fn bootstrap_schema(&mut self, ddl: &str) -> Result<usize> {
        let (inner, accession) = self.parts()?;

        let started = Instant::now();
        if let Some(statements) = inner.sql.drop_schema_sql() {
            // functions and types go with the schema
            for sql in &statements {
                inner.execute(accession, sql, ExecOptions::batch()).await?;
            }
            tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dropped and recreated schema"
            );
        } else {
            let tables_sql = inner.sql.tables_sql();
            let tables = inner.names(accession, tables_sql).await?;
            for table in &tables {
                let sql = escape_percent(&inner.sql.drop_table_sql(table));
                inner.execute(accession, &sql, ExecOptions::batch()).await?;
            }
            let sequences_sql = inner.sql.sequences_sql();
            let sequences = inner.names(accession, sequences_sql).await?;
            for name in &sequences {
                let sql = escape_percent(&inner.sql.drop_sequence_sql(name));
                inner.execute(accession, &sql, ExecOptions::batch()).await?;
            }
            tracing::info!(
                tables = tables.len(),
                dropped = sequences.len(),
                kind = inner.sql.sequence_kind(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dropped prior schema objects"
            );
        }

        let started = Instant::now();
        let script = split_statements(ddl);
        let mut executed = 0;
        for statement in script.executable_statements() {
            let summary: String = statement
                .lines()
                .next()
                .unwrap_or_default()
                .chars()
                .take(50)
                .collect();
            tracing::debug!(statement = %summary, "schema statement");
            inner.execute(accession, statement, ExecOptions::batch()).await?;
            executed += 1;
        }
        inner.driver.commit().await?;
        inner.close_cursor().await?;
        inner.catalog = ColumnTypeCatalog::new();
        tracing::info!(
            executed,
            skipped = script.len() - executed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "created schema"
        );
        Ok(executed)
    }

    /// Bootstrap from a script in the configured schema directory
    pub async fn bootstrap_schema_file(&mut self, name: &str) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let path = self.config.schema_dir.join(name);
        let ddl = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        tracing::info!(path = %path.display(), "bootstrapping schema");
        self.bootstrap_schema(&escape_percent(&ddl)).await
    }

    /// Insert-or-find a batch of rows in `table`.
    ///
    /// Returns one row per input row, in input order: the identifier column
    /// (if requested) and the match columns of the new or pre-existing
    /// record, plus the existence flag when requested.
    pub async fn reconcile(
        &mut self,
        table: &str,
        request: &ReconcileRequest,
    ) -> Result<ReconcileResult> {
        let (inner, accession) = self.parts()?;
        if request.is_noop() {
            return Ok(ReconcileResult::empty());
        }

        let columns = inner.types_for(accession, table).await?;
        let plan = inner.sql.reconcile_plan(table, request, &columns)?;

        let last = plan.statements.len().saturating_sub(1);
        let mut rows = Vec::new();
        for (idx, sql) in plan.statements.iter().enumerate() {
            let options = ExecOptions::default()
                .with_fetch(idx == last && plan.returns_rows)
                .with_close_cursor(idx == last);
            if let Some(fetched) = inner.execute(accession, sql, options).await? {
                rows = fetched;
            }
        }
        if request.commit {
            inner.driver.commit().await?;
        }

        let result = if plan.returns_rows {
            let returning = request.returning_columns();
            let kinds = returning
                .iter()
                .map(|c| columns.descriptor(c).map(|d| d.kind))
                .collect::<Result<Vec<_>>>()?;
            ReconcileResult::from_rows(
                returning.iter().map(|c| c.to_string()).collect(),
                &kinds,
                request.return_existence_status,
                &rows,
            )?
        } else {
            tracing::warn!(
                table,
                rows = request.rows.len(),
                dialect = %inner.sql.dialect(),
                "rows staged without identifier retrieval"
            );
            ReconcileResult::empty()
        };

        trace::record(
            inner.trace.as_deref(),
            TraceEvent::Reconciled {
                accession,
                table,
                submitted: request.rows.len(),
                returned: result.len(),
            },
        );
        Ok(result)
    }
}
