//! Shared configuration, errors and workflow data model for safelens.

pub mod config;
pub mod dataset;
pub mod error;
pub mod events;
pub mod history;
pub mod types;

pub use config::SafelensConfig;
pub use dataset::{display_label, DatasetResolution, KnownDataset};
pub use error::{Result, SafelensError};
pub use events::{StreamEvent, StreamEventType};
pub use history::{History, Role, Turn};
pub use types::*;
