//! Schema catalog and per-dataset semantic metadata.
//!
//! Both sources degrade instead of failing: a missing catalog becomes a single
//! stub entry, and missing semantics become an empty map.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use safelens_core::{KnownDataset, SafelensError, SemanticContext};

const STUB_SCHEMA: &str = "Table incident_reports: id (integer), occurred_at (date), \
region (text), site (text), category (text), severity (integer 1-5), description (text)";

/// Dataset id to schema description text, supplied to prompts as opaque text.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaCatalog {
    entries: BTreeMap<String, String>,
}

impl SchemaCatalog {
    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// The single entry used when no catalog file can be read.
    pub fn default_stub() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            KnownDataset::IncidentReports.id().to_string(),
            STUB_SCHEMA.to_string(),
        );
        Self { entries }
    }

    /// Load a JSON object of `{dataset_id: "schema text"}`.
    ///
    /// Never fails; falls back to [`SchemaCatalog::default_stub`].
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(catalog) => {
                debug!(path = %path.display(), datasets = catalog.len(), "Loaded schema catalog");
                catalog
            }
            Err(e) => {
                warn!(path = %path.display(), "Schema catalog unavailable, using stub: {}", e);
                Self::default_stub()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self, SafelensError> {
        let content = std::fs::read_to_string(path)?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| SafelensError::Catalog(format!("invalid schema catalog: {}", e)))?;
        if entries.is_empty() {
            return Err(SafelensError::Catalog("schema catalog is empty".to_string()));
        }
        Ok(Self { entries })
    }

    pub fn contains(&self, dataset_id: &str) -> bool {
        self.entries.contains_key(dataset_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries rendered as prompt text, sorted by id.
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|(id, schema)| format!("- {}: {}", id, schema))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Where column semantics are read from.
#[derive(Debug, Clone)]
enum SemanticSource {
    Dir(PathBuf),
    Fixed(HashMap<String, SemanticContext>),
}

/// Loads column semantics for a resolved dataset id.
#[derive(Debug, Clone)]
pub struct SemanticLoader {
    source: SemanticSource,
}

impl SemanticLoader {
    /// Read `<dir>/<dataset_id>.json` on every lookup.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: SemanticSource::Dir(dir.into()),
        }
    }

    /// Serve semantics from a fixed in-memory table.
    pub fn from_map(map: HashMap<String, SemanticContext>) -> Self {
        Self {
            source: SemanticSource::Fixed(map),
        }
    }

    /// Semantics for `dataset_id`, or an empty map when unavailable.
    pub fn load(&self, dataset_id: &str) -> SemanticContext {
        let id = dataset_id.trim();
        if id.is_empty() {
            warn!("No dataset resolved, continuing without semantic context");
            return SemanticContext::new();
        }

        match &self.source {
            SemanticSource::Fixed(map) => map.get(id).cloned().unwrap_or_else(|| {
                warn!(dataset = id, "No semantic metadata for dataset");
                SemanticContext::new()
            }),
            SemanticSource::Dir(dir) => {
                if id.contains(['/', '\\']) || id.contains("..") {
                    warn!(dataset = id, "Rejected dataset id with path components");
                    return SemanticContext::new();
                }
                let path = dir.join(format!("{}.json", id));
                match read_semantics(&path) {
                    Ok(ctx) => {
                        debug!(dataset = id, columns = ctx.len(), "Loaded semantic context");
                        ctx
                    }
                    Err(e) => {
                        warn!(dataset = id, path = %path.display(), "Semantic metadata unavailable: {}", e);
                        SemanticContext::new()
                    }
                }
            }
        }
    }
}

fn read_semantics(path: &Path) -> Result<SemanticContext, SafelensError> {
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<serde_json::Value>(&content)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(SafelensError::Catalog(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
