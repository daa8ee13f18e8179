//! Diagnostic SQL trace.
//!
//! A trace sink receives every statement a connection executes, with the
//! accession label, row counts and errors. Tracing is observational: sink
//! failures are logged and never reach the caller.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// One trace record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent<'a> {
    /// A statement is about to run
    Statement {
        /// Accession label of the connection
        accession: &'a str,
        /// Final SQL text
        sql: &'a str,
    },
    /// A statement finished
    Completed {
        /// Accession label of the connection
        accession: &'a str,
        /// Rows fetched, when the statement was fetched
        fetched: Option<usize>,
        /// Rows reported by the backend
        row_count: Option<u64>,
    },
    /// A statement failed
    Failed {
        /// Accession label of the connection
        accession: &'a str,
        /// Final SQL text
        sql: &'a str,
        /// Error text
        error: String,
    },
    /// Result of a table reconciliation
    Reconciled {
        /// Accession label of the connection
        accession: &'a str,
        /// Target table
        table: &'a str,
        /// Rows submitted
        submitted: usize,
        /// Rows returned
        returned: usize,
    },
}

impl std::fmt::Display for TraceEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Statement { accession, sql } => {
                write!(f, "\n\n>>> accession {} sql:\n{}\n", accession, sql)
            }
            Self::Completed {
                accession,
                fetched,
                row_count,
            } => {
                write!(f, ">>> accession {} result:", accession)?;
                if let Some(n) = fetched {
                    write!(f, " fetched {} rows", n)?;
                }
                if let Some(n) = row_count {
                    write!(f, " row count {}", n)?;
                }
                writeln!(f)
            }
            Self::Failed {
                accession,
                sql,
                error,
            } => write!(
                f,
                "\n\n>>> accession {} error:\n{}\n>>> sql:\n{}\n",
                accession, error, sql
            ),
            Self::Reconciled {
                accession,
                table,
                submitted,
                returned,
            } => writeln!(
                f,
                ">>> accession {} table {} submitted {} rows, returned {} rows",
                accession, table, submitted, returned
            ),
        }
    }
}

/// Destination for trace records
pub trait TraceSink: Send + Sync {
    /// Record one event
    fn record(&self, event: &TraceEvent<'_>) -> std::io::Result<()>;
}

/// Append-only trace file
#[derive(Debug)]
pub struct FileTraceSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileTraceSink {
    /// Open (or create) the trace file in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Trace file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for FileTraceSink {
    fn record(&self, event: &TraceEvent<'_>) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("trace file lock poisoned"))?;
        write!(file, "{}", event)
    }
}

/// Record an event, logging (not propagating) sink failures
pub(crate) fn record(sink: Option<&dyn TraceSink>, event: TraceEvent<'_>) {
    if let Some(sink) = sink {
        if let Err(e) = sink.record(&event) {
            tracing::warn!(error = %e, "failed to write SQL trace");
        }
    }
}
