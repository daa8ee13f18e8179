//! SQL dialect abstraction for xpdb-sql
//!
//! Every statement text the engine sends is generated here, one
//! implementation per backend family:
//!
//! - `PostgresDialect`: reconciliation as a single CTE statement with
//!   `RETURNING`, existence checks and input-ordered results
//! - `MySqlDialect`: staging-table bulk load only
//!
//! Statement text is produced in format form (`%%` for a literal `%`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::TableColumns;
use crate::error::{Error, Result};
use crate::literal::{escape_string_literal, validate_sql_identifier};
use crate::reconcile::{
    new_column_casts, render_value_rows, ReconcilePlan, ReconcileRequest, EXISTED_COLUMN,
    ROW_SEQ_COLUMN,
};

/// Backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL family
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL family
    #[serde(alias = "mariadb")]
    MySql,
}

impl Dialect {
    /// Default TCP port
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::MySql => 3306,
        }
    }

    /// Lowercase name as used in configuration
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// SQL generator for this dialect
    pub fn sql_dialect(self) -> Box<dyn SqlDialect> {
        dialect_for(self)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(Error::config(format!("unknown dialect '{}'", other))),
        }
    }
}

/// SQL dialect for vendor-specific SQL generation
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Backend family
    fn dialect(&self) -> Dialect;

    /// Quote an identifier (table, sequence, trigger name)
    fn quote_identifier(&self, name: &str) -> String;

    /// `(column_name, data_type)` of a table in the current schema, in
    /// ordinal order
    fn column_types_sql(&self, table: &str) -> String;

    /// One database name per row
    fn databases_sql(&self) -> &'static str;

    /// One table name per row
    fn tables_sql(&self) -> &'static str;

    /// One sequence (PostgreSQL) or trigger (MySQL) name per row
    fn sequences_sql(&self) -> &'static str;

    /// What `sequences_sql` enumerates, for log messages
    fn sequence_kind(&self) -> &'static str;

    /// Drop one table
    fn drop_table_sql(&self, table: &str) -> String;

    /// Drop one sequence or trigger
    fn drop_sequence_sql(&self, name: &str) -> String;

    /// Statements that wipe the whole schema at once, if the dialect has them
    fn drop_schema_sql(&self) -> Option<Vec<String>>;

    /// Statements reconciling a batch into `table`
    fn reconcile_plan(
        &self,
        table: &str,
        request: &ReconcileRequest,
        columns: &TableColumns,
    ) -> Result<ReconcilePlan>;
}

/// PostgreSQL dialect
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    fn match_predicate(
        request: &ReconcileRequest,
        left: &str,
        right: &str,
    ) -> String {
        let op = request.comparison.to_sql();
        request
            .match_columns
            .iter()
            .map(|c| format!("{left}.{c} {op} {right}.{c}"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn column_types_sql(&self, table: &str) -> String {
        format!(
            "SELECT c.column_name, c.data_type \
             FROM information_schema.columns c \
             WHERE c.table_name = '{}' AND c.table_schema = current_schema() \
             ORDER BY c.ordinal_position",
            escape_string_literal(table)
        )
    }

    fn databases_sql(&self) -> &'static str {
        "SELECT datname FROM pg_database"
    }

    fn tables_sql(&self) -> &'static str {
        "SELECT tablename FROM pg_tables WHERE schemaname = 'public'"
    }

    fn sequences_sql(&self) -> &'static str {
        "SELECT c.relname FROM pg_class c \
         JOIN pg_namespace n ON (n.oid = c.relnamespace) \
         WHERE c.relkind = 'S' AND n.nspname = 'public'"
    }

    fn sequence_kind(&self) -> &'static str {
        "sequences"
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", self.quote_identifier(table))
    }

    fn drop_sequence_sql(&self, name: &str) -> String {
        format!("DROP SEQUENCE IF EXISTS {} CASCADE", self.quote_identifier(name))
    }

    fn drop_schema_sql(&self) -> Option<Vec<String>> {
        Some(vec![
            "DROP SCHEMA public CASCADE".to_string(),
            "CREATE SCHEMA public".to_string(),
        ])
    }

    fn reconcile_plan(
        &self,
        table: &str,
        request: &ReconcileRequest,
        columns: &TableColumns,
    ) -> Result<ReconcilePlan> {
        validate_sql_identifier(table)?;
        request.validate()?;

        let casts = new_column_casts(request, columns)?;
        let returning = request.returning_columns();
        for col in &returning {
            columns.descriptor(col)?;
        }

        let new_cols = request.new_columns.join(", ");
        let v_new_cols = request
            .new_columns
            .iter()
            .map(|c| format!("v.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let ret_cols = returning.join(", ");
        let value_rows = render_value_rows(request, Some(&casts), true).join(",\n       ");

        let mut sql = format!(
            "WITH row_values ({ROW_SEQ_COLUMN}, {new_cols}) AS (\n\
             VALUES {value_rows}\n\
             ), insertions AS (\n\
             INSERT INTO {table} ({new_cols})\n"
        );

        if request.check_if_existing {
            let v_match_cols = request
                .match_columns
                .iter()
                .map(|c| format!("v.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let existing_match = Self::match_predicate(request, "x", "v");
            let inserted_match = Self::match_predicate(request, "i", "v");
            let x_ret = returning
                .iter()
                .map(|c| format!("x.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let i_ret = returning
                .iter()
                .map(|c| format!("i.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let status = if request.return_existence_status {
                format!(", {EXISTED_COLUMN}")
            } else {
                String::new()
            };

            sql.push_str(&format!(
                "SELECT DISTINCT ON ({v_match_cols}) {v_new_cols}\n\
                 FROM row_values v\n\
                 WHERE NOT EXISTS (SELECT 1 FROM {table} x WHERE {existing_match})\n\
                 ORDER BY {v_match_cols}, v.{ROW_SEQ_COLUMN}\n\
                 RETURNING {ret_cols}\n\
                 )\n\
                 SELECT {ret_cols}{status} FROM (\n\
                 SELECT {x_ret}, TRUE AS {EXISTED_COLUMN}, v.{ROW_SEQ_COLUMN}\n\
                 FROM {table} x JOIN row_values v ON ({existing_match})\n\
                 UNION ALL\n\
                 SELECT {i_ret}, FALSE AS {EXISTED_COLUMN}, v.{ROW_SEQ_COLUMN}\n\
                 FROM insertions i JOIN row_values v ON ({inserted_match})\n\
                 ) AS reconciled\n\
                 ORDER BY {ROW_SEQ_COLUMN};"
            ));
        } else {
            let status = if request.return_existence_status {
                format!(", FALSE AS {EXISTED_COLUMN}")
            } else {
                String::new()
            };
            sql.push_str(&format!(
                "SELECT {v_new_cols}\n\
                 FROM row_values v\n\
                 ORDER BY v.{ROW_SEQ_COLUMN}\n\
                 RETURNING {ret_cols}\n\
                 )\n\
                 SELECT {ret_cols}{status} FROM insertions;"
            ));
        }

        Ok(ReconcilePlan {
            statements: vec![sql],
            returns_rows: true,
        })
    }
}

/// Name of the temporary staging table used by MySQL reconciliation
pub const MYSQL_STAGING_TABLE: &str = "xpdb_staging_input";

/// MySQL dialect
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn column_types_sql(&self, table: &str) -> String {
        format!(
            "SELECT c.column_name, c.data_type \
             FROM information_schema.columns c \
             WHERE c.table_name = '{}' AND c.table_schema = DATABASE() \
             ORDER BY c.ordinal_position",
            escape_string_literal(table)
        )
    }

    fn databases_sql(&self) -> &'static str {
        "SHOW DATABASES"
    }

    fn tables_sql(&self) -> &'static str {
        "SHOW TABLES"
    }

    fn sequences_sql(&self) -> &'static str {
        "SHOW TRIGGERS"
    }

    fn sequence_kind(&self) -> &'static str {
        "triggers"
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table))
    }

    fn drop_sequence_sql(&self, name: &str) -> String {
        format!("DROP TRIGGER IF EXISTS {}", self.quote_identifier(name))
    }

    fn drop_schema_sql(&self) -> Option<Vec<String>> {
        None
    }

    fn reconcile_plan(
        &self,
        table: &str,
        request: &ReconcileRequest,
        columns: &TableColumns,
    ) -> Result<ReconcilePlan> {
        validate_sql_identifier(table)?;
        request.validate()?;

        if request.id_column.is_some() {
            return Err(Error::unsupported(
                "MySQL reconciliation cannot return identifier columns",
            ));
        }
        if request.check_if_existing || request.return_existence_status {
            return Err(Error::unsupported(
                "MySQL reconciliation cannot check for existing rows",
            ));
        }
        for col in &request.new_columns {
            columns.descriptor(col)?;
        }

        let value_rows = render_value_rows(request, None, false).join(", ");
        Ok(ReconcilePlan {
            statements: vec![
                // a staging table left behind by a failed batch survives rollback
                format!("DROP TEMPORARY TABLE IF EXISTS {MYSQL_STAGING_TABLE}"),
                format!("CREATE TEMPORARY TABLE {MYSQL_STAGING_TABLE} LIKE {table}"),
                format!(
                    "INSERT INTO {MYSQL_STAGING_TABLE} ({}) VALUES {value_rows}",
                    request.new_columns.join(", ")
                ),
                format!("DROP TEMPORARY TABLE {MYSQL_STAGING_TABLE}"),
            ],
            returns_rows: false,
        })
    }
}

/// Get the SQL generator for a backend family
pub fn dialect_for(dialect: Dialect) -> Box<dyn SqlDialect> {
    match dialect {
        Dialect::Postgres => Box::new(PostgresDialect),
        Dialect::MySql => Box::new(MySqlDialect),
    }
}
