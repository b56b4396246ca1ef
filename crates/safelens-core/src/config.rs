use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SafelensError};

/// Environment variable names read by [`SafelensConfig::apply_env_overrides`].
pub const ENV_DB_HOST: &str = "SAFELENS_DB_HOST";
pub const ENV_DB_PORT: &str = "SAFELENS_DB_PORT";
pub const ENV_DB_NAME: &str = "SAFELENS_DB_NAME";
pub const ENV_DB_USER: &str = "SAFELENS_DB_USER";
pub const ENV_DB_PASSWORD: &str = "SAFELENS_DB_PASSWORD";
pub const ENV_API_KEYS: &str = "SAFELENS_API_KEYS";
pub const ENV_MODEL: &str = "SAFELENS_MODEL";

/// Top-level configuration for safelens.
///
/// Loaded from `~/.safelens/config.toml` by default. Each section corresponds
/// to one collaborator of the query workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafelensConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl SafelensConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SafelensConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SafelensError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Override store and completion settings from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override settings using an arbitrary key lookup.
    ///
    /// Empty values are ignored. A port that does not parse is ignored with
    /// a warning and the previous value is kept.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get(ENV_DB_HOST) {
            self.store.host = host;
        }
        if let Some(port) = get(ENV_DB_PORT) {
            match port.trim().parse::<u16>() {
                Ok(p) => self.store.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid {}", ENV_DB_PORT),
            }
        }
        if let Some(database) = get(ENV_DB_NAME) {
            self.store.database = database;
        }
        if let Some(user) = get(ENV_DB_USER) {
            self.store.user = user;
        }
        if let Some(password) = get(ENV_DB_PASSWORD) {
            self.store.password = password;
        }
        if let Some(keys) = get(ENV_API_KEYS) {
            self.completion.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(model) = get(ENV_MODEL) {
            self.completion.model = model;
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for SQLite checkpoints and local datasets.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.safelens/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// API keys; one client is built per key and rotated round-robin.
    pub api_keys: Vec<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-call HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_keys: Vec::new(),
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

/// Which relational store backs the query executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Postgres,
}

/// Relational store connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file for the SQLite backend.
    pub sqlite_path: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: "~/.safelens/data/incidents.db".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database: "safety".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl StoreConfig {
    /// Postgres connection URL built from the individual parameters.
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }

    /// Connection URL with the password hidden, for logging.
    pub fn masked_url(&self) -> String {
        let password = if self.password.is_empty() { "" } else { "****" };
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, password, self.host, self.port, self.database
        )
    }
}

/// Locations of the schema catalog and per-dataset semantic metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON file mapping dataset id to schema description text.
    pub schema_path: String,
    /// Directory holding `<dataset_id>.json` column semantics.
    pub semantics_dir: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            schema_path: "~/.safelens/catalog/schemas.json".to_string(),
            semantics_dir: "~/.safelens/catalog/semantics".to_string(),
        }
    }
}

/// Where workflow checkpoints are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Checkpoint store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    pub sqlite_path: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Memory,
            sqlite_path: "~/.safelens/data/checkpoints.db".to_string(),
        }
    }
}

/// Request-level workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Deadline applied to a request when the caller supplies none.
    /// Zero disables the default deadline.
    pub request_timeout_secs: u64,
    /// Maximum turns retained per thread in the session store.
    pub max_session_turns: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            max_session_turns: 50,
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE");
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME");
        if let Ok(home) = home {
            return std::path::PathBuf::from(home).join(rest);
        }
    }
    std::path::PathBuf::from(path)
}
