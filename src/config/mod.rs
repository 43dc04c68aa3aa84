use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for the pipeline, read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres connection URL.
    pub database_url: String,

    /// Directory artifacts are written to, content-addressed by checksum.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Headless rendering engine command. The engine version is pinned by
    /// deployment; only the command name is configurable.
    #[serde(default = "default_compiler_cmd")]
    pub compiler_cmd: String,

    /// Hard timeout for one compiler invocation, in seconds.
    #[serde(default = "default_compiler_timeout_secs")]
    pub compiler_timeout_secs: u64,

    /// Cap on concurrent engine subprocesses.
    #[serde(default = "default_compiler_max_concurrent")]
    pub compiler_max_concurrent: usize,

    /// Maximum time a request may queue for an engine slot, in seconds.
    #[serde(default = "default_compiler_queue_wait_secs")]
    pub compiler_queue_wait_secs: u64,

    /// Timeout for the snapshot read, in seconds.
    #[serde(default = "default_db_timeout_secs")]
    pub db_timeout_secs: u64,

    // SMTP delivery is optional; generation works without it.
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
}

fn default_artifact_dir() -> String {
    "artifacts".to_string()
}

fn default_compiler_cmd() -> String {
    "weasyprint".to_string()
}

fn default_compiler_timeout_secs() -> u64 {
    30
}

fn default_compiler_max_concurrent() -> usize {
    4
}

fn default_compiler_queue_wait_secs() -> u64 {
    10
}

fn default_db_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Loads variables from a .env file if present, then deserializes the
    /// environment into the Config struct.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        let config = envy::from_env::<Config>()?;
        Ok(config)
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn compiler_timeout(&self) -> Duration {
        Duration::from_secs(self.compiler_timeout_secs)
    }

    pub fn compiler_queue_wait(&self) -> Duration {
        Duration::from_secs(self.compiler_queue_wait_secs)
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db_timeout_secs)
    }
}

/// Initialize environment variables and load configuration.
pub fn init() -> Result<Config> {
    dotenv().ok();
    Config::load()
}
