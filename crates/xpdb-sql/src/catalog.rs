//! Per-table column type catalog.
//!
//! Each table referenced by a reconciliation is introspected once through the
//! backend's `information_schema`; the resulting descriptors are cached for
//! the lifetime of the owning connection and never invalidated.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// Conversion family of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// integer, smallint, int, bigint, int2, int4, int8
    Integer,
    /// real, numeric, float4, float8, double precision
    Float,
    /// boolean
    Boolean,
    /// date, timestamp
    DateTime,
    /// Everything else: no cast, text passthrough
    Text,
}

impl ColumnKind {
    /// Convert a backend text cell into a typed value
    pub fn convert(self, cell: Option<&str>) -> Result<Value> {
        let Some(text) = cell else {
            return Ok(Value::Null);
        };
        match self {
            Self::Integer => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| Error::type_conversion(format!("'{}' is not an integer: {}", text, e))),
            Self::Float => text
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| Error::type_conversion(format!("'{}' is not a number: {}", text, e))),
            Self::Boolean => Ok(Value::Bool(parse_db_bool(text))),
            Self::DateTime => parse_db_datetime(text),
            Self::Text => Ok(Value::String(text.to_string())),
        }
    }
}

/// Boolean as reported by the backend (`t` from PostgreSQL, `1` from MySQL).
/// Anything unrecognized is false.
pub fn parse_db_bool(text: &str) -> bool {
    matches!(text.trim(), "t" | "true" | "TRUE" | "1")
}

fn parse_db_datetime(text: &str) -> Result<Value> {
    let text = text.trim();
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(Value::Date(d));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(Value::DateTime(dt));
        }
    }
    // timestamptz text, e.g. "2012-06-30 10:00:00+02"
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Ok(Value::DateTime(dt.naive_utc()));
        }
    }
    Err(Error::type_conversion(format!(
        "'{}' is not a date or timestamp",
        text
    )))
}

/// Cast suffix and conversion for one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Declared type as reported by the backend
    pub type_name: String,
    /// Cast appended to the first VALUES row, e.g. `::integer`
    pub cast: Option<String>,
    /// Conversion family
    pub kind: ColumnKind,
}

impl ColumnDescriptor {
    /// Classify a declared type.
    ///
    /// Keys off the first whitespace-delimited token, except that any type
    /// starting with `double precision` is a float.
    pub fn classify(full_type: &str) -> Self {
        let full = full_type.trim();
        let token = full.split_whitespace().next().unwrap_or_default();

        let kind = match token {
            "integer" | "smallint" | "int" | "bigint" | "int2" | "int4" | "int8" => {
                ColumnKind::Integer
            }
            "real" | "numeric" | "float4" | "float8" => ColumnKind::Float,
            "boolean" => ColumnKind::Boolean,
            "date" | "timestamp" => ColumnKind::DateTime,
            _ if full.starts_with("double precision") => ColumnKind::Float,
            _ => ColumnKind::Text,
        };

        let cast = match kind {
            ColumnKind::Text => None,
            _ if full.starts_with("double precision") => Some("::double precision".to_string()),
            _ => Some(format!("::{}", token)),
        };

        Self {
            type_name: full.to_string(),
            cast,
            kind,
        }
    }

    /// Whether the declared type is one of the known families
    pub fn is_recognized(&self) -> bool {
        self.kind != ColumnKind::Text || is_known_text_type(&self.type_name)
    }
}

fn is_known_text_type(type_name: &str) -> bool {
    let token = type_name.split_whitespace().next().unwrap_or_default();
    matches!(
        token,
        "text" | "character" | "varchar" | "char" | "name" | "tinytext" | "mediumtext" | "longtext"
    )
}

/// Column descriptors of one table, keyed by column name
#[derive(Debug, Clone, Default)]
pub struct TableColumns {
    table: String,
    columns: HashMap<String, ColumnDescriptor>,
    order: Vec<String>,
}

impl TableColumns {
    /// Build from `(column_name, data_type)` rows in ordinal order
    pub fn from_rows(table: impl Into<String>, rows: &[Row]) -> Self {
        let table = table.into();
        let mut columns = HashMap::with_capacity(rows.len());
        let mut order = Vec::with_capacity(rows.len());

        for row in rows {
            let (Some(name), Some(data_type)) = (row.get(0), row.get(1)) else {
                continue;
            };
            let descriptor = ColumnDescriptor::classify(data_type);
            if !descriptor.is_recognized() {
                tracing::debug!(
                    table = %table,
                    column = name,
                    data_type,
                    "unrecognized column type treated as text without cast"
                );
            }
            order.push(name.to_string());
            columns.insert(name.to_string(), descriptor);
        }

        Self {
            table,
            columns,
            order,
        }
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Look up a column; a missing column is a configuration error
    pub fn descriptor(&self, column: &str) -> Result<&ColumnDescriptor> {
        self.columns
            .get(column)
            .ok_or_else(|| Error::missing_column(&self.table, column))
    }

    /// Column names in ordinal order
    pub fn column_names(&self) -> &[String] {
        &self.order
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the table has no known columns
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Memoized table descriptors for one connection
#[derive(Debug, Default)]
pub struct ColumnTypeCatalog {
    tables: HashMap<String, Arc<TableColumns>>,
}

impl ColumnTypeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached descriptors for a table, if already introspected
    pub fn get(&self, table: &str) -> Option<Arc<TableColumns>> {
        self.tables.get(table).cloned()
    }

    /// Cache the introspection rows of a table and return its descriptors
    pub fn insert(&mut self, table: &str, rows: &[Row]) -> Arc<TableColumns> {
        let columns = Arc::new(TableColumns::from_rows(table, rows));
        self.tables.insert(table.to_string(), Arc::clone(&columns));
        columns
    }

    /// Whether a table has been introspected
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }
}
