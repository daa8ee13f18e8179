//! Schema bootstrap tests against the scripted driver

mod common;

use common::{names, FakeDriver};
use xpdb_sql::config::ConnectionConfig;
use xpdb_sql::dialect::Dialect;
use xpdb_sql::{Error, SqlDbConnection};

const DDL: &str = "\
-- xbrl public schema
SET client_min_messages = warning;

CREATE SEQUENCE seq_object;

CREATE TABLE filing (
    filing_id bigint DEFAULT nextval('seq_object') PRIMARY KEY,
    accession_number text -- SEC accession
);
ALTER TABLE ONLY filing OWNER TO xbrl;

CREATE FUNCTION filing_touch() RETURNS trigger AS $$
BEGIN
    NEW.accession_number := trim(NEW.accession_number);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE UNIQUE INDEX filing_accession ON filing (accession_number);
";

#[tokio::test]
async fn test_postgres_bootstrap_recreates_schema_then_creates() {
    let (driver, state) = FakeDriver::new(Dialect::Postgres);
    state
        .lock()
        .unwrap()
        .respond("pg_tables", names("tablename", &["filing", "old_report"]));
    let mut conn = SqlDbConnection::with_driver(
        ConnectionConfig::new(Dialect::Postgres),
        Box::new(driver),
        None,
    );

    let executed = conn.bootstrap_schema(DDL).await.unwrap();
    assert_eq!(executed, 5);

    let st = state.lock().unwrap();
    assert_eq!(st.executed[0], "DROP SCHEMA public CASCADE");
    assert_eq!(st.executed[1], "CREATE SCHEMA public");
    assert!(st.executed_matching("pg_tables").is_empty());
    assert!(st.executed_matching("DROP TABLE").is_empty());

    let created = &st.executed[2..];
    assert_eq!(created.len(), 5);
    assert_eq!(created[0], "SET client_min_messages = warning;");
    assert_eq!(created[1], "CREATE SEQUENCE seq_object;");
    assert!(created[2].starts_with("CREATE TABLE filing ("));
    assert!(!created[2].contains("SEC accession"));
    assert!(created[3].starts_with("CREATE FUNCTION filing_touch()"));
    assert!(created[3].contains("RETURN NEW;\nEND;\n$$ LANGUAGE plpgsql;"));
    assert!(created[4].starts_with("CREATE UNIQUE INDEX"));
    assert!(st.executed_matching("ALTER TABLE").is_empty());

    assert_eq!(st.commits, 1);
}

#[tokio::test]
async fn test_postgres_second_bootstrap_drops_functions_with_schema() {
    let (driver, state) = FakeDriver::new(Dialect::Postgres);
    let mut conn = SqlDbConnection::with_driver(
        ConnectionConfig::new(Dialect::Postgres),
        Box::new(driver),
        None,
    );

    conn.bootstrap_schema(DDL).await.unwrap();
    conn.bootstrap_schema(DDL).await.unwrap();

    let st = state.lock().unwrap();
    assert_eq!(st.executed.len(), 14);
    let second = &st.executed[7..];
    assert_eq!(second[0], "DROP SCHEMA public CASCADE");
    assert_eq!(second[1], "CREATE SCHEMA public");
    assert!(second[5].starts_with("CREATE FUNCTION filing_touch()"));
    assert_eq!(st.executed_matching("CREATE FUNCTION").len(), 2);
    assert_eq!(st.commits, 2);
}

#[tokio::test]
async fn test_mysql_bootstrap_drops_triggers() {
    let (driver, state) = FakeDriver::new(Dialect::MySql);
    {
        let mut st = state.lock().unwrap();
        st.respond("SHOW TABLES", names("Tables_in_xbrl", &["filing"]));
        st.respond("SHOW TRIGGERS", names("Trigger", &["filing_ins"]));
    }
    let mut conn = SqlDbConnection::with_driver(
        ConnectionConfig::new(Dialect::MySql),
        Box::new(driver),
        None,
    );

    conn.bootstrap_schema("CREATE TABLE filing (filing_id bigint);\n")
        .await
        .unwrap();

    let st = state.lock().unwrap();
    assert_eq!(
        st.executed,
        vec![
            "SHOW TABLES",
            "DROP TABLE IF EXISTS `filing`",
            "SHOW TRIGGERS",
            "DROP TRIGGER IF EXISTS `filing_ins`",
            "CREATE TABLE filing (filing_id bigint);",
        ]
    );
    assert_eq!(st.commits, 1);
}

#[tokio::test]
async fn test_bootstrap_stops_on_statement_error() {
    let (driver, state) = FakeDriver::new(Dialect::Postgres);
    state.lock().unwrap().faults.reject = Some("CREATE SEQUENCE".into());
    let mut conn = SqlDbConnection::with_driver(
        ConnectionConfig::new(Dialect::Postgres),
        Box::new(driver),
        None,
    );

    let err = conn.bootstrap_schema(DDL).await.unwrap_err();
    assert!(matches!(err, Error::Statement { .. }));
    assert_eq!(state.lock().unwrap().commits, 0);
}

#[tokio::test]
async fn test_bootstrap_schema_file_escapes_percent() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("xbrlPublicPostgresDB.ddl"),
        "CREATE TABLE unit (label text DEFAULT '100%');\n",
    )
    .unwrap();

    let (driver, state) = FakeDriver::new(Dialect::Postgres);
    let mut conn = SqlDbConnection::with_driver(
        ConnectionConfig::new(Dialect::Postgres).with_schema_dir(dir.path()),
        Box::new(driver),
        None,
    );

    let executed = conn
        .bootstrap_schema_file("xbrlPublicPostgresDB.ddl")
        .await
        .unwrap();
    assert_eq!(executed, 1);
    assert_eq!(
        state.lock().unwrap().executed.last().map(String::as_str),
        Some("CREATE TABLE unit (label text DEFAULT '100%');")
    );
}

#[tokio::test]
async fn test_bootstrap_schema_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let (driver, state) = FakeDriver::new(Dialect::Postgres);
    let mut conn = SqlDbConnection::with_driver(
        ConnectionConfig::new(Dialect::Postgres).with_schema_dir(dir.path()),
        Box::new(driver),
        None,
    );

    let err = conn.bootstrap_schema_file("missing.ddl").await.unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert!(state.lock().unwrap().executed.is_empty());
}

#[tokio::test]
async fn test_drop_all_tables_postgres_recreates_schema() {
    let (driver, state) = FakeDriver::new(Dialect::Postgres);
    let mut conn = SqlDbConnection::with_driver(
        ConnectionConfig::new(Dialect::Postgres),
        Box::new(driver),
        None,
    );

    conn.drop_all_tables_in_db().await.unwrap();

    let st = state.lock().unwrap();
    assert_eq!(
        st.executed,
        vec!["DROP SCHEMA public CASCADE", "CREATE SCHEMA public"]
    );
    assert_eq!(st.commits, 1);
}

#[tokio::test]
async fn test_drop_all_tables_mysql_drops_each_table() {
    let (driver, state) = FakeDriver::new(Dialect::MySql);
    state
        .lock()
        .unwrap()
        .respond("SHOW TABLES", names("Tables_in_xbrl", &["filing", "fact"]));
    let mut conn = SqlDbConnection::with_driver(
        ConnectionConfig::new(Dialect::MySql),
        Box::new(driver),
        None,
    );

    conn.drop_all_tables_in_db().await.unwrap();

    let st = state.lock().unwrap();
    assert_eq!(
        st.executed,
        vec![
            "SHOW TABLES",
            "DROP TABLE IF EXISTS `filing`",
            "DROP TABLE IF EXISTS `fact`",
        ]
    );
}
