//! Test helpers and utilities

use anyhow::Result;
use xpdb_sql::SqlDbConnection;

/// Initialize tracing for tests (call once at start of test)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xpdb_sql=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

/// Generate a unique table name for tests
pub fn unique_table_name(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("{}_{:08x}", prefix, nanos)
}

/// Count the rows of `table`
pub async fn count_rows(conn: &mut SqlDbConnection, table: &str) -> Result<i64> {
    let rows = conn
        .execute(
            &format!("SELECT COUNT(*) FROM {}", table),
            xpdb_sql::connection::ExecOptions::default(),
        )
        .await?
        .unwrap_or_default();
    let count = rows
        .first()
        .and_then(|row| row.get(0))
        .ok_or_else(|| anyhow::anyhow!("no count returned for {}", table))?;
    Ok(count.parse()?)
}
