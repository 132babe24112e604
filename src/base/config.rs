//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use super::types::{Res, Void};

/// Default base URL of the answer API.
fn default_api_base() -> String {
    "https://gptcloud.arc53.com".to_string()
}

/// Default answer API request timeout, in seconds.
fn default_api_timeout_secs() -> u64 {
    120
}

/// Default number of retries for transient answer API failures.
fn default_api_max_retries() -> u32 {
    3
}

/// Default database endpoint (the embedded in-memory engine).
fn default_db_endpoint() -> String {
    "mem://".to_string()
}

fn default_db_namespace() -> String {
    "relay".to_string()
}

fn default_db_database() -> String {
    "bot".to_string()
}

fn default_db_table() -> String {
    "chat_history".to_string()
}

/// Default number of recent turns sent as context.
fn default_context_window() -> usize {
    10
}

fn default_memory_max_conversations() -> usize {
    10_000
}

fn default_memory_max_turns_per_conversation() -> usize {
    100
}

/// Which history store backend to use.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local history, lost on restart.
    #[default]
    Memory,
    /// SurrealDB document store.
    Surreal,
}

/// Configuration for the relay-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

/// Settings read from the config file, or from `RELAY_BOT_`-prefixed environment variables.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Answer API key (`RELAY_BOT_API_KEY`).
    #[serde(default)]
    pub api_key: String,
    /// Answer API base URL (`RELAY_BOT_API_BASE`).
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Answer API request timeout in seconds (`RELAY_BOT_API_TIMEOUT_SECS`).
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
    /// Retries for transient answer API failures (`RELAY_BOT_API_MAX_RETRIES`).
    #[serde(default = "default_api_max_retries")]
    pub api_max_retries: u32,
    /// Slack app token (`RELAY_BOT_SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token (`RELAY_BOT_SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// History store backend (`RELAY_BOT_STORAGE_BACKEND`), either `memory` or `surreal`.
    #[serde(default)]
    pub storage_backend: StorageBackend,
    /// Database endpoint URL (`RELAY_BOT_DB_ENDPOINT`), e.g. `ws://localhost:8000` or `mem://`.
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username (`RELAY_BOT_DB_USERNAME`).
    #[serde(default)]
    pub db_username: Option<String>,
    /// Database password (`RELAY_BOT_DB_PASSWORD`).
    #[serde(default)]
    pub db_password: Option<String>,
    /// Database namespace (`RELAY_BOT_DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`RELAY_BOT_DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// Table holding one document per turn (`RELAY_BOT_DB_TABLE`).
    #[serde(default = "default_db_table")]
    pub db_table: String,
    /// Number of recent turns sent as context with each question (`RELAY_BOT_CONTEXT_WINDOW`).
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Conversations kept by the memory backend before evicting the least recently used (`RELAY_BOT_MEMORY_MAX_CONVERSATIONS`).
    /// Zero disables the cap.
    #[serde(default = "default_memory_max_conversations")]
    pub memory_max_conversations: usize,
    /// Turns kept per conversation by the memory backend (`RELAY_BOT_MEMORY_MAX_TURNS_PER_CONVERSATION`).
    #[serde(default = "default_memory_max_turns_per_conversation")]
    pub memory_max_turns_per_conversation: usize,
}

impl ConfigInner {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Void {
        if self.context_window < 1 || self.context_window > 100 {
            return Err(anyhow::anyhow!("Context window must be between 1 and 100."));
        }

        if self.memory_max_turns_per_conversation < 1 {
            return Err(anyhow::anyhow!("Memory max turns per conversation must be at least 1."));
        }

        if self.api_timeout_secs < 1 {
            return Err(anyhow::anyhow!("API timeout must be at least 1 second."));
        }

        if self.db_table.is_empty() || !self.db_table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(anyhow::anyhow!("Database table name must only contain ASCII letters, digits, and underscores."));
        }

        Ok(())
    }
}

/// Environment variables override the file as `RELAY_BOT_<FIELD>`.
fn environment() -> config::Environment {
    config::Environment::default().prefix("RELAY_BOT")
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(environment());

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }
}

// Tests.
