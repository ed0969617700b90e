//! Ranked-list output parsing
//!
//! The validating step must answer with entries scored 0-100. The schema is
//! derived from [`RankedList`] so the prompt, the provider's structured
//! output request and the validator all agree.

use super::CapabilityError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankedEntry {
    /// Name of the candidate
    pub name: String,
    /// Viability score, 100 is the most promising
    #[schemars(range(min = 0, max = 100))]
    pub score: u32,
    /// One or two sentences explaining the score
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankedList {
    #[schemars(length(min = 1))]
    pub entries: Vec<RankedEntry>,
}

impl RankedList {
    /// JSON schema handed to providers and used for validation
    pub fn json_schema() -> Result<Value, serde_json::Error> {
        serde_json::to_value(schemars::schema_for!(RankedList))
    }

    /// Order entries from most to least promising
    pub fn sort_descending(&mut self) {
        self.entries.sort_by(|a, b| b.score.cmp(&a.score));
    }
}

/// Drop a surrounding markdown code fence if the model added one
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and validate model output into a ranked list sorted by score
pub fn parse_ranked_list(raw: &str) -> Result<RankedList, CapabilityError> {
    let body = strip_code_fence(raw);
    let mut value: Value = serde_json::from_str(body)
        .map_err(|e| CapabilityError::Semantic(format!("ranked list is not valid JSON: {e}")))?;

    // A bare array is accepted as the entry list
    if value.is_array() {
        value = serde_json::json!({ "entries": value });
    }

    let schema = RankedList::json_schema()
        .map_err(|e| CapabilityError::Configuration(format!("ranked list schema: {e}")))?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| CapabilityError::Configuration(format!("schema compilation error: {e}")))?;

    validator.validate(&value).map_err(|errors| {
        let messages: Vec<String> = errors
            .map(|e| format!("at '{}': {}", e.instance_path, e))
            .collect();
        CapabilityError::Semantic(format!("ranked list failed validation: {}", messages.join("; ")))
    })?;

    let mut list: RankedList = serde_json::from_value(value)
        .map_err(|e| CapabilityError::Semantic(format!("ranked list has wrong shape: {e}")))?;

    // Re-checked here so the invariant holds regardless of schema keywords
    if list.entries.is_empty() {
        return Err(CapabilityError::Semantic("ranked list is empty".to_string()));
    }
    if let Some(entry) = list.entries.iter().find(|e| e.score > 100) {
        return Err(CapabilityError::Semantic(format!(
            "score {} for '{}' is outside 0-100",
            entry.score, entry.name
        )));
    }

    list.sort_descending();
    Ok(list)
}
