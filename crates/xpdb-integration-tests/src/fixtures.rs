//! Test fixtures for integration tests
//!
//! Provides database servers and connections to them:
//! - PostgreSQL (reconciliation, bootstrap)
//! - MySQL (staging load, bootstrap)
//!
//! Each fixture starts a container unless its environment variable names a
//! connection config YAML file for an existing server
//! ([`POSTGRES_CONFIG_ENV`], [`MYSQL_CONFIG_ENV`]). An existing server's
//! database is emptied when the fixture starts, so point it at a scratch
//! database and run with `--test-threads=1`.

use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use xpdb_sql::config::ConnectionConfig;
use xpdb_sql::dialect::Dialect;
use xpdb_sql::SqlDbConnection;

const TEST_DATABASE: &str = "xbrl";
const TEST_USER: &str = "xbrl";
const TEST_PASSWORD: &str = "xbrlpass";

/// Connection config file of an existing PostgreSQL server
pub const POSTGRES_CONFIG_ENV: &str = "XPDB_TEST_PG_CONFIG";

/// Connection config file of an existing MySQL server
pub const MYSQL_CONFIG_ENV: &str = "XPDB_TEST_MYSQL_CONFIG";

/// Config of an existing server named by `var`, if set
fn existing_server(var: &str, dialect: Dialect) -> Result<Option<ConnectionConfig>> {
    let Ok(path) = std::env::var(var) else {
        return Ok(None);
    };
    let config = ConnectionConfig::from_file(&path)?;
    anyhow::ensure!(
        config.dialect == dialect,
        "{} points at a {} config, expected {}",
        var,
        config.dialect,
        dialect
    );
    Ok(Some(config))
}

/// Wait for an existing server and empty its database
async fn prepare_existing(config: &ConnectionConfig, label: &str) -> Result<()> {
    wait_for_server(config, label).await?;
    let mut conn = SqlDbConnection::connect(config.clone()).await?;
    conn.drop_all_tables_in_db().await?;
    conn.close(false).await?;
    info!("{} at {}:{} emptied for tests", label, config.host, config.port());
    Ok(())
}

async fn exposed_port<I: testcontainers::Image>(
    container: &testcontainers::ContainerAsync<I>,
    internal: u16,
    label: &str,
) -> Result<u16> {
    // Retry port retrieval to handle testcontainers race condition
    for i in 0..10 {
        match container.get_host_port_ipv4(internal).await {
            Ok(p) => return Ok(p),
            Err(e) => {
                tracing::debug!("Waiting for {} port exposure (attempt {}): {}", label, i + 1, e);
                sleep(Duration::from_millis(100 * (i + 1) as u64)).await;
            }
        }
    }
    anyhow::bail!("{} port not exposed after retries", label)
}

async fn wait_for_server(config: &ConnectionConfig, label: &str) -> Result<()> {
    for i in 0..60 {
        match SqlDbConnection::connect(config.clone()).await {
            Ok(mut conn) => {
                if conn.tables_in_db().await.is_ok() {
                    conn.close(true).await?;
                    info!("{} ready after {} attempts", label, i + 1);
                    return Ok(());
                }
                let _ = conn.close(true).await;
            }
            Err(e) => {
                tracing::debug!("Waiting for {} (attempt {}): {}", label, i + 1, e);
            }
        }
        sleep(Duration::from_millis(500)).await;
    }

    anyhow::bail!("{} did not become ready in time", label)
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL server with an empty database
pub struct TestPostgres {
    /// `None` when running against an existing server
    pub container: Option<testcontainers::ContainerAsync<testcontainers_modules::postgres::Postgres>>,
    pub host: String,
    pub port: u16,
    config: ConnectionConfig,
}

impl TestPostgres {
    /// Start a PostgreSQL container (or use the configured server) and wait
    /// until it accepts logins
    pub async fn start() -> Result<Self> {
        use testcontainers::{runners::AsyncRunner, ImageExt};
        use testcontainers_modules::postgres::Postgres;

        if let Some(config) = existing_server(POSTGRES_CONFIG_ENV, Dialect::Postgres)? {
            prepare_existing(&config, "PostgreSQL").await?;
            return Ok(Self {
                container: None,
                host: config.host.clone(),
                port: config.port(),
                config,
            });
        }

        let container = Postgres::default()
            .with_env_var("POSTGRES_DB", TEST_DATABASE)
            .with_env_var("POSTGRES_USER", TEST_USER)
            .with_env_var("POSTGRES_PASSWORD", TEST_PASSWORD)
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let port = exposed_port(&container, 5432, "PostgreSQL").await?;
        let config = ConnectionConfig::new(Dialect::Postgres)
            .with_host(host.clone())
            .with_port(port)
            .with_credentials(TEST_USER, TEST_PASSWORD)
            .with_database(TEST_DATABASE)
            .with_connect_timeout(10_000);

        wait_for_server(&config, "PostgreSQL").await?;
        Ok(Self {
            container: Some(container),
            host,
            port,
            config,
        })
    }

    /// Connection configuration for the server
    pub fn config(&self) -> ConnectionConfig {
        self.config.clone()
    }

    /// Open a new connection
    pub async fn connect(&self) -> Result<SqlDbConnection> {
        Ok(SqlDbConnection::connect(self.config()).await?)
    }
}

// ============================================================================
// MySQL Test Container
// ============================================================================

/// MySQL server with an empty database
pub struct TestMysql {
    /// `None` when running against an existing server
    pub container: Option<testcontainers::ContainerAsync<testcontainers_modules::mysql::Mysql>>,
    pub host: String,
    pub port: u16,
    config: ConnectionConfig,
}

impl TestMysql {
    /// Start a MySQL container (or use the configured server) and wait until
    /// it accepts logins
    pub async fn start() -> Result<Self> {
        use testcontainers::{runners::AsyncRunner, ImageExt};
        use testcontainers_modules::mysql::Mysql;

        if let Some(config) = existing_server(MYSQL_CONFIG_ENV, Dialect::MySql)? {
            prepare_existing(&config, "MySQL").await?;
            return Ok(Self {
                container: None,
                host: config.host.clone(),
                port: config.port(),
                config,
            });
        }

        let container = Mysql::default()
            .with_env_var("MYSQL_ROOT_PASSWORD", "rootpass")
            .with_env_var("MYSQL_DATABASE", TEST_DATABASE)
            .with_env_var("MYSQL_USER", TEST_USER)
            .with_env_var("MYSQL_PASSWORD", TEST_PASSWORD)
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let port = exposed_port(&container, 3306, "MySQL").await?;
        let config = ConnectionConfig::new(Dialect::MySql)
            .with_host(host.clone())
            .with_port(port)
            .with_credentials(TEST_USER, TEST_PASSWORD)
            .with_database(TEST_DATABASE)
            .with_connect_timeout(10_000);

        wait_for_server(&config, "MySQL").await?;
        Ok(Self {
            container: Some(container),
            host,
            port,
            config,
        })
    }

    /// Connection configuration for the server
    pub fn config(&self) -> ConnectionConfig {
        self.config.clone()
    }

    /// Open a new connection
    pub async fn connect(&self) -> Result<SqlDbConnection> {
        Ok(SqlDbConnection::connect(self.config()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_existing_server_unset() {
        std::env::remove_var("XPDB_FIXTURE_UNSET");
        assert!(existing_server("XPDB_FIXTURE_UNSET", Dialect::Postgres)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_existing_server_from_config_file() {
        let file = config_file("dialect: postgres\nhost: db.local\nport: 6432\nuser: ci\ndatabase: scratch\n");
        std::env::set_var("XPDB_FIXTURE_PG", file.path());

        let config = existing_server("XPDB_FIXTURE_PG", Dialect::Postgres)
            .unwrap()
            .unwrap();
        assert_eq!(config.host, "db.local");
        assert_eq!(config.port(), 6432);
        assert_eq!(config.database, "scratch");
    }

    #[test]
    fn test_existing_server_rejects_other_dialect() {
        let file = config_file("dialect: mysql\nhost: db.local\nuser: ci\n");
        std::env::set_var("XPDB_FIXTURE_MYSQL", file.path());

        let err = existing_server("XPDB_FIXTURE_MYSQL", Dialect::Postgres).unwrap_err();
        assert!(err.to_string().contains("expected postgres"));
    }
}
