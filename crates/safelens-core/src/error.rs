use thiserror::Error;

/// Error shared across safelens crates.
///
/// Node-local failures never surface here: query execution and dataset
/// resolution record their failures in workflow state instead. This type
/// covers startup (config, catalog) and persistence (sessions, checkpoints).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SafelensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for SafelensError {
    fn from(err: toml::de::Error) -> Self {
        SafelensError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SafelensError {
    fn from(err: toml::ser::Error) -> Self {
        SafelensError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SafelensError {
    fn from(err: serde_json::Error) -> Self {
        SafelensError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SafelensError>;
