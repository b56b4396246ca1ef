//! Known datasets and resolution of free-text dataset identifiers.

use serde::{Deserialize, Serialize};

/// The datasets the assistant knows how to label for users.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownDataset {
    IncidentReports,
    NearMissEvents,
    SafetyInspections,
}

impl KnownDataset {
    pub const ALL: [KnownDataset; 3] = [
        KnownDataset::IncidentReports,
        KnownDataset::NearMissEvents,
        KnownDataset::SafetyInspections,
    ];

    /// Internal identifier used by the catalog and the relational store.
    pub fn id(&self) -> &'static str {
        match self {
            KnownDataset::IncidentReports => "incident_reports",
            KnownDataset::NearMissEvents => "near_miss_events",
            KnownDataset::SafetyInspections => "safety_inspections",
        }
    }

    /// User-facing name.
    pub fn label(&self) -> &'static str {
        match self {
            KnownDataset::IncidentReports => "Incident Reports",
            KnownDataset::NearMissEvents => "Near-Miss Events",
            KnownDataset::SafetyInspections => "Safety Inspections",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.id() == id)
    }
}

/// Outcome of parsing the table resolver's answer.
///
/// Unknown identifiers are carried through unchanged; the semantic loader
/// degrades to an empty context for them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatasetResolution {
    Known(KnownDataset),
    Unknown(String),
}

impl DatasetResolution {
    /// Parse a completion-service answer into a dataset identifier.
    ///
    /// Surrounding whitespace, quotes, backticks and punctuation are
    /// stripped. Matching against known ids is case-insensitive.
    pub fn parse(raw: &str) -> Self {
        let cleaned = raw
            .trim_matches(|c: char| {
                c.is_whitespace() || matches!(c, '`' | '"' | '\'' | '.' | ',' | ';' | ':')
            })
            .to_string();

        match KnownDataset::from_id(&cleaned.to_lowercase()) {
            Some(known) => DatasetResolution::Known(known),
            None => DatasetResolution::Unknown(cleaned),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            DatasetResolution::Known(d) => d.id(),
            DatasetResolution::Unknown(id) => id,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, DatasetResolution::Known(_))
    }
}

/// Label for a dataset id, or the id itself when it is not a known dataset.
pub fn display_label(id: &str) -> &str {
    match KnownDataset::from_id(id) {
        Some(known) => known.label(),
        None => id,
    }
}
