use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Pragmas applied to every connection a context opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSettings {
    /// `PRAGMA journal_mode` (in-memory databases always report `memory`)
    pub journal_mode: String,

    /// `PRAGMA synchronous`
    pub synchronous: String,

    /// `PRAGMA foreign_keys`
    pub foreign_keys: bool,

    /// How long SQLite waits on a locked database before failing, in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            foreign_keys: true,
            busy_timeout_ms: 5000,
        }
    }
}

pub struct SqlsetConfig {
    /// Directory holding database files opened by name
    pub data_dir: String,

    /// Connection pragmas
    pub connection: ConnectionSettings,
}

const EMPTY_CONFIG: &str = r#"### sqlset configuration file

### directory for database files
# data_dir = "~/.sqlset"

### connection settings
# journal_mode = "WAL"
# synchronous = "NORMAL"
# foreign_keys = true
# busy_timeout_ms = 5000
"#;

impl Default for SqlsetConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            data_dir: format!("{}/.sqlset", home_dir),
            connection: ConnectionSettings::default(),
        }
    }
}

impl SqlsetConfig {
    /// Load the configuration
    ///
    /// Reads the TOML file at `path` (or `$HOME/.sqlset/sqlset.toml`), creating
    /// an empty template when it does not exist, then applies `SQLSET_*`
    /// environment variables on top.
    pub fn new(path: &Option<String>) -> Result<SqlsetConfig> {
        let mut builder = Config::builder();

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                let home_dir =
                    dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
                let sqlset_dir = format!("{}/.sqlset", home_dir.to_string_lossy());
                std::fs::create_dir_all(sqlset_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create sqlset directory: {}", e))?;
                let p = format!("{}/sqlset.toml", sqlset_dir);
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g., `SQLSET_DATA_DIR=/var/lib/app` sets the data directory
        builder = builder.add_source(config::Environment::with_prefix("SQLSET"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config)
    }

    /// Build a configuration from flat key/value settings, falling back to
    /// defaults for anything missing
    fn from_map(config: &HashMap<String, String>) -> Result<SqlsetConfig> {
        let defaults = SqlsetConfig::default();

        let data_dir = match config.get("data_dir") {
            Some(p) => p.clone(),
            None => defaults.data_dir,
        };

        let journal_mode = config
            .get("journal_mode")
            .cloned()
            .unwrap_or(defaults.connection.journal_mode);

        let synchronous = config
            .get("synchronous")
            .cloned()
            .unwrap_or(defaults.connection.synchronous);

        let foreign_keys = match config.get("foreign_keys") {
            Some(v) => v
                .parse()
                .map_err(|e| anyhow!("Invalid foreign_keys value '{}': {}", v, e))?,
            None => defaults.connection.foreign_keys,
        };

        let busy_timeout_ms = config
            .get("busy_timeout_ms")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.connection.busy_timeout_ms);

        Ok(SqlsetConfig {
            data_dir,
            connection: ConnectionSettings {
                journal_mode,
                synchronous,
                foreign_keys,
                busy_timeout_ms,
            },
        })
    }

    /// Path of a database file named `name` inside the data directory
    pub fn database_path(&self, name: &str) -> String {
        let data_dir = self.data_dir.trim_end_matches('/');
        format!("{}/{}.sqlite3", data_dir, name)
    }

    /// Make sure the data directory exists
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| anyhow!("Failed to create data directory '{}': {}", self.data_dir, e))
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        [
            format!("Data Directory:     {}", self.data_dir),
            format!("Journal Mode:       {}", self.connection.journal_mode),
            format!("Synchronous:        {}", self.connection.synchronous),
            format!("Foreign Keys:       {}", self.connection.foreign_keys),
            format!("Busy Timeout:       {} ms", self.connection.busy_timeout_ms),
        ]
        .join("\n")
    }
}
