//! xpdb CLI - Command line interface for xpdb schema management
//!
//! Probes database servers, bootstraps schemas from DDL scripts and lists
//! the objects a bootstrap would replace.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xpdb_sql::config::ConnectionConfig;
use xpdb_sql::dialect::Dialect;
use xpdb_sql::probe::is_sql_connection;
use xpdb_sql::SqlDbConnection;

#[derive(Parser)]
#[command(name = "xpdb")]
#[command(about = "xpdb - Probe SQL servers, bootstrap schemas from DDL scripts and list tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a database server of the given dialect is listening
    Probe {
        /// Dialect to probe for (postgres, mysql)
        #[arg(short, long, default_value = "postgres")]
        dialect: Dialect,

        /// Server host
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Server port (dialect default when omitted)
        #[arg(short, long)]
        port: Option<u16>,

        /// Probe ceiling in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Empty the database, then run a DDL script
    Bootstrap {
        /// Connection configuration (YAML)
        #[arg(short, long, env = "XPDB_CONFIG")]
        config: PathBuf,

        /// DDL script to execute
        ddl: PathBuf,
    },

    /// List the tables and sequences in the configured database
    Tables {
        /// Connection configuration (YAML)
        #[arg(short, long, env = "XPDB_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Probe {
            dialect,
            host,
            port,
            timeout,
        } => {
            let port_label = port.unwrap_or_else(|| dialect.default_port());
            if is_sql_connection(&host, port, Duration::from_secs(timeout), dialect).await {
                println!("✓ {} server at {}:{}", dialect, host, port_label);
            } else {
                anyhow::bail!("no {} server answered at {}:{}", dialect, host, port_label);
            }
        }

        Commands::Bootstrap { config, ddl } => {
            let (dir, name) = split_script_path(&ddl)?;
            let config = load_config(&config)?.with_schema_dir(dir);

            let mut conn = SqlDbConnection::connect(config).await?;
            let outcome = conn.bootstrap_schema_file(&name).await;
            let closed = conn.close(outcome.is_err()).await;
            let executed = outcome?;
            closed?;

            println!("✓ Executed {} statements from {}", executed, ddl.display());
        }

        Commands::Tables { config } => {
            let config = load_config(&config)?;
            let mut conn = SqlDbConnection::connect(config).await?;

            let tables = conn.tables_in_db().await;
            let sequences = conn.sequences_in_db().await;
            conn.close(true).await?;
            let (tables, sequences) = (tables?, sequences?);

            if tables.is_empty() {
                println!("No tables found");
            } else {
                println!("Tables:");
                for table in &tables {
                    println!("  • {}", table);
                }
            }
            if !sequences.is_empty() {
                println!("Sequences:");
                for sequence in &sequences {
                    println!("  • {}", sequence);
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<ConnectionConfig> {
    let config = ConnectionConfig::from_file(path)
        .with_context(|| format!("loading connection config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn split_script_path(path: &Path) -> anyhow::Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("not a script file: {}", path.display()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name.to_string()))
}
