//! CLI argument definitions for the safelens binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Ask natural-language questions about workplace safety incident data.
#[derive(Parser, Debug)]
#[command(name = "safelens", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Conversation thread to continue. A new one is started if omitted.
    #[arg(short = 't', long = "thread")]
    pub thread: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Ask a single question and exit.
    #[arg(short = 'q', long = "question")]
    pub question: Option<String>,

    /// Print per-node events as JSON lines while answering.
    #[arg(long = "stream")]
    pub stream: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SAFELENS_CONFIG env var > ~/.safelens/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(|key| std::env::var(key).ok())
    }

    fn resolve_config_path_with<F>(&self, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = lookup("SAFELENS_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the thread id.
    ///
    /// Priority: --thread flag > SAFELENS_THREAD env var > fresh UUID.
    pub fn resolve_thread_id(&self) -> String {
        self.resolve_thread_id_with(|key| std::env::var(key).ok())
    }

    fn resolve_thread_id_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref t) = self.thread {
            return t.clone();
        }
        if let Some(t) = lookup("SAFELENS_THREAD").filter(|t| !t.trim().is_empty()) {
            return t;
        }
        uuid::Uuid::new_v4().to_string()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".safelens").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".safelens").join("config.toml");
    }
    PathBuf::from("config.toml")
}
