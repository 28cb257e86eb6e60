//! Model catalog shipped as `models.json`.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

const BUNDLED_CATALOG: &str = include_str!("../../assets/models.json");

/// One entry of the model picker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelEntry {
    /// Identifier passed to the pull command.
    pub name: String,
    /// Short human-readable description.
    pub description: String,
    /// Date the entry was last updated, as free text.
    pub updated: String,
}

/// Parse and validate a catalog document.
///
/// # Errors
///
/// Returns `AppError::Deploy` if the JSON is malformed, the catalog is
/// empty, or an entry has an empty or duplicated name.
pub fn parse_catalog(raw: &str) -> Result<Vec<ModelEntry>> {
    let entries: Vec<ModelEntry> = serde_json::from_str(raw)
        .map_err(|err| AppError::Deploy(format!("invalid model catalog: {err}")))?;

    if entries.is_empty() {
        return Err(AppError::Deploy("model catalog is empty".into()));
    }

    for (index, entry) in entries.iter().enumerate() {
        if entry.name.trim().is_empty() {
            return Err(AppError::Deploy(format!(
                "model catalog entry {index} has an empty name"
            )));
        }
        if entries[..index].iter().any(|prior| prior.name == entry.name) {
            return Err(AppError::Deploy(format!(
                "model catalog lists {} twice",
                entry.name
            )));
        }
    }

    Ok(entries)
}

/// Catalog bundled with the binary.
///
/// # Errors
///
/// Returns `AppError::Deploy` if the bundled document is invalid.
pub fn bundled_catalog() -> Result<Vec<ModelEntry>> {
    parse_catalog(BUNDLED_CATALOG)
}

/// Render a catalog as pretty-printed JSON with a trailing newline.
///
/// # Errors
///
/// Returns `AppError::Deploy` if serialization fails.
pub fn render_catalog(entries: &[ModelEntry]) -> Result<String> {
    let mut rendered = serde_json::to_string_pretty(entries)
        .map_err(|err| AppError::Deploy(format!("failed to render model catalog: {err}")))?;
    rendered.push('\n');
    Ok(rendered)
}
