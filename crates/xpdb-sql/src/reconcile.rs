//! Reconciliation requests and results.
//!
//! A reconciliation merges a batch of candidate rows into a table keyed by a
//! subset of its columns ("match columns"): rows without an equivalent
//! already in the table are inserted, and for every input row the identifier
//! and match columns of the new or pre-existing record are returned.

use std::fmt;

use crate::catalog::{ColumnKind, TableColumns};
use crate::error::{Error, Result};
use crate::literal::{sql_literal, validate_sql_identifier};
use crate::types::{Row, Value};

/// Column carrying the input ordinal inside generated statements
pub(crate) const ROW_SEQ_COLUMN: &str = "_row_seq";

/// Column carrying the existence tag inside generated statements
pub(crate) const EXISTED_COLUMN: &str = "_existed";

/// Operator used to compare match columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparison {
    /// `=`; never matches NULL match values
    #[default]
    Equal,
    /// `IS NOT DISTINCT FROM`; matches NULLs but cannot use indexes
    NotDistinctFrom,
}

impl Comparison {
    /// SQL operator text
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotDistinctFrom => "IS NOT DISTINCT FROM",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql())
    }
}

/// A batch of rows to insert-or-find
#[derive(Debug, Clone, Default)]
pub struct ReconcileRequest {
    /// Identifier column returned first, if any
    pub id_column: Option<String>,
    /// Columns written for new rows, in row-tuple order
    pub new_columns: Vec<String>,
    /// Columns compared to detect existing rows (subset of `new_columns`)
    pub match_columns: Vec<String>,
    /// Row tuples, each in `new_columns` order
    pub rows: Vec<Vec<Value>>,
    /// Match comparison operator
    pub comparison: Comparison,
    /// Skip rows that already match instead of inserting them again
    pub check_if_existing: bool,
    /// Append an "already existed" flag to every result row
    pub return_existence_status: bool,
    /// Commit after the statements ran
    pub commit: bool,
}

impl ReconcileRequest {
    /// Create a request for the given new-value and match columns
    pub fn new<N, M>(new_columns: N, match_columns: M) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            new_columns: new_columns.into_iter().map(Into::into).collect(),
            match_columns: match_columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the identifier column
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    /// Replace the row batch
    pub fn with_rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.rows = rows;
        self
    }

    /// Append one row
    pub fn push_row<I>(&mut self, row: I)
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    /// Set the comparison operator
    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Enable or disable existence checking
    pub fn check_if_existing(mut self, check: bool) -> Self {
        self.check_if_existing = check;
        self
    }

    /// Enable or disable the per-row existence flag
    pub fn return_existence_status(mut self, status: bool) -> Self {
        self.return_existence_status = status;
        self
    }

    /// Commit after execution
    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    /// Nothing to do when rows, new columns or match columns are empty
    pub fn is_noop(&self) -> bool {
        self.rows.is_empty() || self.new_columns.is_empty() || self.match_columns.is_empty()
    }

    /// Identifier column (if any) followed by match columns, without repeats
    pub fn returning_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = Vec::with_capacity(self.match_columns.len() + 1);
        if let Some(id) = self.id_column.as_deref() {
            cols.push(id);
        }
        for col in &self.match_columns {
            if !cols.contains(&col.as_str()) {
                cols.push(col);
            }
        }
        cols
    }

    /// Check identifiers and the shape of the batch
    pub fn validate(&self) -> Result<()> {
        for col in self
            .id_column
            .iter()
            .chain(&self.new_columns)
            .chain(&self.match_columns)
        {
            validate_sql_identifier(col)?;
        }
        for col in &self.match_columns {
            if !self.new_columns.contains(col) {
                return Err(Error::config(format!(
                    "match column '{}' is not one of the new-value columns",
                    col
                )));
            }
        }
        let width = self.new_columns.len();
        if let Some((idx, row)) = self.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(Error::config(format!(
                "row {} has {} values, expected {}",
                idx,
                row.len(),
                width
            )));
        }
        Ok(())
    }
}

/// Statements produced by a dialect for one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Statements to execute in order
    pub statements: Vec<String>,
    /// Whether the last statement yields the result rows
    pub returns_rows: bool,
}

/// Render the VALUES rows of a batch.
///
/// When `with_seq` is set each row starts with its 1-based ordinal. Casts are
/// only attached to the first row; every row of one statement shares the
/// column types.
pub(crate) fn render_value_rows(
    request: &ReconcileRequest,
    casts: Option<&[Option<String>]>,
    with_seq: bool,
) -> Vec<String> {
    request
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut values: Vec<String> = Vec::with_capacity(row.len() + 1);
            if with_seq {
                values.push((idx + 1).to_string());
            }
            for (col_idx, value) in row.iter().enumerate() {
                let mut literal = sql_literal(value);
                if idx == 0 {
                    if let Some(Some(cast)) = casts.and_then(|c| c.get(col_idx)) {
                        literal.push_str(cast);
                    }
                }
                values.push(literal);
            }
            format!("({})", values.join(", "))
        })
        .collect()
}

/// Per-column casts of the new-value columns
pub(crate) fn new_column_casts(
    request: &ReconcileRequest,
    columns: &TableColumns,
) -> Result<Vec<Option<String>>> {
    request
        .new_columns
        .iter()
        .map(|c| columns.descriptor(c).map(|d| d.cast.clone()))
        .collect()
}

/// One reconciled row
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRow {
    /// Identifier (if requested) followed by match-column values
    pub values: Vec<Value>,
    /// Whether the row already existed, if requested
    pub existed: Option<bool>,
}

impl ReconciledRow {
    /// Value at a position
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

/// Ordered result of a reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileResult {
    columns: Vec<String>,
    rows: Vec<ReconciledRow>,
}

impl ReconcileResult {
    /// Empty result with no columns
    pub fn empty() -> Self {
        Self::default()
    }

    /// Convert raw backend rows through the column kinds of the returning
    /// columns; a trailing existence column always converts as boolean.
    pub fn from_rows(
        columns: Vec<String>,
        kinds: &[ColumnKind],
        with_status: bool,
        rows: &[Row],
    ) -> Result<Self> {
        let rows = rows
            .iter()
            .map(|row| {
                let values = kinds
                    .iter()
                    .enumerate()
                    .map(|(i, kind)| kind.convert(row.get(i)))
                    .collect::<Result<Vec<_>>>()?;
                let existed = if with_status {
                    match ColumnKind::Boolean.convert(row.get(kinds.len()))? {
                        Value::Bool(b) => Some(b),
                        _ => None,
                    }
                } else {
                    None
                };
                Ok(ReconciledRow { values, existed })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, rows })
    }

    /// Returned column names (without the existence flag)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a returned column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Rows in input order
    pub fn rows(&self) -> &[ReconciledRow] {
        &self.rows
    }

    /// Iterate rows
    pub fn iter(&self) -> std::slice::Iter<'_, ReconciledRow> {
        self.rows.iter()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take the rows
    pub fn into_rows(self) -> Vec<ReconciledRow> {
        self.rows
    }
}

impl<'a> IntoIterator for &'a ReconcileResult {
    type Item = &'a ReconciledRow;
    type IntoIter = std::slice::Iter<'a, ReconciledRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
