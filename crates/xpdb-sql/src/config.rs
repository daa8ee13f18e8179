//! Connection configuration
//!
//! Loaded from YAML, with `${VAR}` and `${VAR:-default}` references expanded
//! from the environment before parsing:
//!
//! ```yaml
//! dialect: postgres
//! host: ${XPDB_HOST:-localhost}
//! user: xbrl
//! password: ${XPDB_PASSWORD}
//! database: xbrl_public
//! trace_file: /tmp/xpdb-trace.log
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// Regex for `${VAR}` and `${VAR:-default}` references
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Settings for one backend session
#[derive(Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Backend family
    pub dialect: Dialect,

    /// Host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port; the dialect's default when absent
    #[serde(default)]
    pub port: Option<u16>,

    /// User name
    #[serde(default)]
    pub user: String,

    /// Password
    #[serde(default)]
    pub password: String,

    /// Database name
    #[serde(default)]
    pub database: String,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Application name reported to PostgreSQL
    #[serde(default = "default_application_name")]
    pub application_name: Option<String>,

    /// Append-only SQL trace file
    #[serde(default)]
    pub trace_file: Option<PathBuf>,

    /// Directory holding schema scripts
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    60_000
}

fn default_application_name() -> Option<String> {
    Some("xpdb".to_string())
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("sql")
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("ConnectionConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("user", &self.user)
            .field("password", &password)
            .field("database", &self.database)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("application_name", &self.application_name)
            .field("trace_file", &self.trace_file)
            .field("schema_dir", &self.schema_dir)
            .finish()
    }
}

impl ConnectionConfig {
    /// Create configuration for a dialect with defaults everywhere else
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            host: default_host(),
            port: None,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            application_name: default_application_name(),
            trace_file: None,
            schema_dir: default_schema_dir(),
        }
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        Self::from_yaml(&content)
    }

    /// Parse YAML text, expanding environment references first
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        let config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| Error::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in the format ${VAR} or ${VAR:-default}
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str());

                std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
            })
            .to_string()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::config("connect_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Effective port
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.dialect.default_port())
    }

    /// Connection timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Set host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set user and password
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set database
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Set the trace file
    pub fn with_trace_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_file = Some(path.into());
        self
    }

    /// Set the schema script directory
    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = dir.into();
        self
    }
}
