//! Scripted in-memory driver shared by the crate tests
//!
//! Statements are recorded; result rows are served from canned responses
//! keyed by a substring of the statement text.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use xpdb_sql::config::ConnectionConfig;
use xpdb_sql::dialect::Dialect;
use xpdb_sql::driver::{Cursor, Driver};
use xpdb_sql::trace::{TraceEvent, TraceSink};
use xpdb_sql::types::Row;
use xpdb_sql::{Error, Result, SqlDbConnection};

/// Injected failures
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// The next statement finds its cursor closed by the backend
    pub cursor_closed_once: bool,
    /// Statements containing this text are rejected
    pub reject: Option<String>,
    /// Rollback reports the backend connection as gone
    pub rollback_connection_closed: bool,
    /// Closing the session fails
    pub close_fails: bool,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub executed: Vec<String>,
    pub commits: usize,
    pub rollbacks: usize,
    pub cursors_opened: usize,
    pub cursors_closed: usize,
    pub closed: bool,
    pub faults: Faults,
    responses: Vec<(String, Vec<Row>)>,
}

impl FakeState {
    /// Serve `rows` for statements containing `pattern`
    pub fn respond(&mut self, pattern: &str, rows: Vec<Row>) {
        self.responses.push((pattern.to_string(), rows));
    }

    /// Executed statements containing `pattern`
    pub fn executed_matching(&self, pattern: &str) -> Vec<&str> {
        self.executed
            .iter()
            .filter(|s| s.contains(pattern))
            .map(String::as_str)
            .collect()
    }
}

pub type Shared = Arc<Mutex<FakeState>>;

pub struct FakeDriver {
    dialect: Dialect,
    state: Shared,
}

impl FakeDriver {
    pub fn new(dialect: Dialect) -> (Self, Shared) {
        let state = Shared::default();
        (
            Self {
                dialect,
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn open_cursor(&self) -> Result<Box<dyn Cursor>> {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return Err(Error::ConnectionClosed);
        }
        st.cursors_opened += 1;
        Ok(Box::new(FakeCursor {
            state: Arc::clone(&self.state),
            rows: Vec::new(),
            row_count: None,
            closed: false,
        }))
    }

    async fn commit(&self) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return Err(Error::ConnectionClosed);
        }
        st.commits += 1;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.faults.rollback_connection_closed {
            return Err(Error::ConnectionClosed);
        }
        st.rollbacks += 1;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.closed = true;
        if st.faults.close_fails {
            return Err(Error::connection("socket reset while closing"));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

pub struct FakeCursor {
    state: Shared,
    rows: Vec<Row>,
    row_count: Option<u64>,
    closed: bool,
}

#[async_trait]
impl Cursor for FakeCursor {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        if self.closed {
            return Err(Error::CursorClosed);
        }
        let mut st = self.state.lock().unwrap();
        if st.faults.cursor_closed_once {
            st.faults.cursor_closed_once = false;
            self.closed = true;
            return Err(Error::CursorClosed);
        }
        st.executed.push(sql.to_string());
        if let Some(pattern) = &st.faults.reject {
            if sql.contains(pattern.as_str()) {
                return Err(Error::statement_with_sql("syntax error at or near", sql));
            }
        }
        self.rows = st
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        self.row_count = Some(self.rows.len() as u64);
        Ok(())
    }

    fn fetch_all(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().cursors_closed += 1;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Trace sink keeping rendered events in memory
#[derive(Clone, Default)]
pub struct MemoryTrace {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl TraceSink for MemoryTrace {
    fn record(&self, event: &TraceEvent<'_>) -> std::io::Result<()> {
        self.events.lock().unwrap().push(event.to_string());
        Ok(())
    }
}

/// Rows with the given column names; `None` cells are SQL NULL
pub fn rows(columns: &[&str], data: &[&[Option<&str>]]) -> Vec<Row> {
    data.iter()
        .map(|cells| {
            Row::new(
                columns.iter().map(|c| c.to_string()).collect(),
                cells.iter().map(|c| c.map(str::to_string)).collect(),
            )
        })
        .collect()
}

/// Single-column rows
pub fn names(column: &str, values: &[&str]) -> Vec<Row> {
    values
        .iter()
        .map(|v| Row::new(vec![column.to_string()], vec![Some(v.to_string())]))
        .collect()
}

/// `information_schema.columns` rows for a table definition
pub fn column_types(columns: &[(&str, &str)]) -> Vec<Row> {
    columns
        .iter()
        .map(|(name, data_type)| {
            Row::new(
                vec!["column_name".into(), "data_type".into()],
                vec![Some(name.to_string()), Some(data_type.to_string())],
            )
        })
        .collect()
}

/// Open connection over a fresh fake driver
pub fn connection(dialect: Dialect) -> (SqlDbConnection, Shared) {
    let (driver, state) = FakeDriver::new(dialect);
    let conn = SqlDbConnection::with_driver(ConnectionConfig::new(dialect), Box::new(driver), None);
    (conn, state)
}

/// Open connection with an in-memory trace
pub fn traced_connection(dialect: Dialect) -> (SqlDbConnection, Shared, MemoryTrace) {
    let (driver, state) = FakeDriver::new(dialect);
    let trace = MemoryTrace::default();
    let conn = SqlDbConnection::with_driver(
        ConnectionConfig::new(dialect),
        Box::new(driver),
        Some(Box::new(trace.clone())),
    );
    (conn, state, trace)
}
