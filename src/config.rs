//! YAML configuration of the server and the CLI.
//!
//! Every section is optional. Without `postgres`, the server keeps accounts
//! in memory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 1111;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name, shown by `GET /status.json`.
    #[serde(default = "default_name")]
    pub name: String,
    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(skip)]
    path: PathBuf,
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Password hashing cost.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    #[serde(skip_serializing)]
    pub telemetry: Option<Telemetry>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: default_name(),
            port: DEFAULT_PORT,
            path: PathBuf::default(),
            postgres: None,
            argon2: None,
            telemetry: None,
        }
    }
}

fn default_name() -> String {
    env!("CARGO_CRATE_NAME").to_owned()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// PostgreSQL connection. Unset credentials and database default to
/// `postgres` and `profiles`.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// `host` or `host:port`.
    pub address: String,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2id parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing, in KiB.
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
    /// Output length in bytes.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 64 * 1024,
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Telemetry exporters.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// gRPC OTLP collector, e.g. `http://localhost:4317`.
    /// Traces and logs are exported only when set.
    pub otlp_endpoint: Option<String>,
    /// Expose `GET /metrics` in Prometheus format.
    #[serde(default)]
    pub prometheus: bool,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    /// Read `path` instead of `config.yaml` from the working directory.
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Load the configuration file.
    ///
    /// A missing or invalid file is logged and yields the defaults.
    pub fn read(self) -> Arc<Self> {
        let path = if self.path.is_file() {
            self.path
        } else {
            PathBuf::from(DEFAULT_CONFIG_PATH)
        };

        let config = match Self::parse(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    path = %path.display(),
                    "cannot load configuration, using defaults"
                );
                Self::default()
            },
        };

        Arc::new(Self { path, ..config })
    }

    fn parse(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}
