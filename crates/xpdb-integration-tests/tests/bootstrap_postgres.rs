//! Schema bootstrap against a live PostgreSQL server
//!
//! Run with: cargo test -p xpdb-integration-tests --test bootstrap_postgres -- --ignored

use anyhow::Result;
use std::time::Duration;
use xpdb_integration_tests::{init_tracing, TestPostgres};
use xpdb_sql::connection::ExecOptions;
use xpdb_sql::dialect::Dialect;
use xpdb_sql::probe::is_sql_connection;

const SCHEMA: &str = "\
-- filing schema
SET client_min_messages = warning;

CREATE SEQUENCE seq_object;

CREATE TABLE filing (
    filing_id bigint DEFAULT nextval('seq_object') PRIMARY KEY,
    accession_number text NOT NULL -- 0000320193-12-000092
);

CREATE FUNCTION filing_label(p_id bigint) RETURNS text AS $$
DECLARE
    v text;
BEGIN
    SELECT accession_number INTO v FROM filing WHERE filing_id = p_id;
    RETURN coalesce(v, 'unknown');
END;
$$ LANGUAGE plpgsql STABLE;

CREATE UNIQUE INDEX filing_accession ON filing (accession_number);
GRANT SELECT ON filing TO PUBLIC;
";

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_bootstrap_replaces_existing_objects() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let mut conn = pg.connect().await?;

    conn.execute(
        "CREATE TABLE stale_report (id int)",
        ExecOptions::default().with_commit(true),
    )
    .await?;

    let executed = conn.bootstrap_schema(SCHEMA).await?;
    assert_eq!(executed, 5);
    assert_eq!(conn.tables_in_db().await?, vec!["filing"]);
    assert_eq!(conn.sequences_in_db().await?, vec!["seq_object"]);

    conn.execute(
        "INSERT INTO filing (accession_number) VALUES ('0000320193-12-000092')",
        ExecOptions::default().with_commit(true),
    )
    .await?;
    let rows = conn
        .execute(
            "SELECT filing_label(filing_id) FROM filing",
            ExecOptions::default(),
        )
        .await?
        .unwrap_or_default();
    assert_eq!(rows[0].get(0), Some("0000320193-12-000092"));

    // a second bootstrap starts from an empty schema again
    conn.bootstrap_schema(SCHEMA).await?;
    let rows = conn
        .execute("SELECT COUNT(*) FROM filing", ExecOptions::default())
        .await?
        .unwrap_or_default();
    assert_eq!(rows[0].get(0), Some("0"));

    // the function was recreated, not left over
    let rows = conn
        .execute("SELECT filing_label(1)", ExecOptions::default())
        .await?
        .unwrap_or_default();
    assert_eq!(rows[0].get(0), Some("unknown"));

    conn.close(false).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_drop_all_tables_empties_schema() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let mut conn = pg.connect().await?;

    conn.bootstrap_schema(SCHEMA).await?;
    conn.drop_all_tables_in_db().await?;

    assert!(conn.tables_in_db().await?.is_empty());
    assert!(conn.sequences_in_db().await?.is_empty());
    assert!(conn.databases_in_db().await?.contains(&"xbrl".to_string()));

    conn.close(false).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_probe_recognizes_dialect() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let timeout = Duration::from_secs(10);

    assert!(is_sql_connection(&pg.host, Some(pg.port), timeout, Dialect::Postgres).await);
    assert!(!is_sql_connection(&pg.host, Some(pg.port), timeout, Dialect::MySql).await);
    Ok(())
}
