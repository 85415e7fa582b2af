// paper.rs — Candidate papers and reference library items.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A newly announced paper awaiting a relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
    /// Written once per ranking run.
    #[serde(default)]
    pub score: Option<f64>,
}

impl Candidate {
    pub fn new(identifier: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: String::new(),
            text: text.into(),
            score: None,
        }
    }
}

/// One entry of the user's library. `added_at` stays a raw string until the
/// orchestrator parses it, so corrupt timestamps surface at ranking time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceItem {
    pub text: String,
    pub added_at: String,
}

impl ReferenceItem {
    pub fn new(text: impl Into<String>, added_at: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            added_at: added_at.into(),
        }
    }

    /// Convert a library export entry (`{"data": {"abstractNote", "dateAdded"}}`).
    /// Entries without an abstract carry no signal and are skipped.
    pub fn from_library_entry(entry: &Value) -> Option<Self> {
        let data = entry.get("data")?;
        let text = data.get("abstractNote").and_then(|v| v.as_str()).unwrap_or("").trim();
        if text.is_empty() {
            return None;
        }
        let added_at = data.get("dateAdded").and_then(|v| v.as_str()).unwrap_or("");
        Some(Self::new(text, added_at))
    }
}

/// Convert a whole library export, logging how many entries were dropped.
pub fn reference_from_library(entries: &[Value]) -> Vec<ReferenceItem> {
    let items: Vec<ReferenceItem> = entries.iter().filter_map(ReferenceItem::from_library_entry).collect();
    let skipped = entries.len() - items.len();
    if skipped > 0 {
        log::info!("Skipped {} library entries without an abstract", skipped);
    }
    items
}
