//! Core types shared by the engine and the HTTP service

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel label the engine returns when it cannot decide
pub const ENGINE_UNKNOWN: &str = "unknown";

/// Label reported to callers for undecided text
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

/// Preview length for single detection requests, in characters
pub const SINGLE_PREVIEW_CHARS: usize = 100;

/// Preview length for batch items, in characters
pub const BATCH_PREVIEW_CHARS: usize = 50;

/// Lifecycle of the classification engine
///
/// Moves out of `Uninitialized` exactly once, during startup, and never
/// changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Loader has not reached a terminal state yet
    Uninitialized,
    /// Engine instantiated and ready to classify
    Loaded,
    /// Artifact missing or every instantiation strategy failed
    Unavailable,
}

impl EngineState {
    /// True only for `Loaded`
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Loaded => "loaded",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Where a detection request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A single-text request
    Single,
    /// Item at the given position of a batch request
    Batch(usize),
}

impl Origin {
    /// Maximum number of characters echoed back for this origin
    pub fn preview_limit(&self) -> usize {
        match self {
            Self::Single => SINGLE_PREVIEW_CHARS,
            Self::Batch(_) => BATCH_PREVIEW_CHARS,
        }
    }

    /// Batch index, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Single => None,
            Self::Batch(index) => Some(*index),
        }
    }
}

/// A validated request ready for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionRequest {
    /// Trimmed, non-empty text
    pub text: String,

    /// Single or batch position
    pub origin: Origin,
}

impl DetectionRequest {
    pub fn new(text: impl Into<String>, origin: Origin) -> Self {
        Self {
            text: text.into(),
            origin,
        }
    }

    /// Bounded prefix of the text for echoing back to callers
    pub fn preview(&self) -> String {
        preview(&self.text, self.origin.preview_limit())
    }
}

/// Result of classifying one text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Upper-cased language label, or `UNKNOWN`
    pub language: String,

    /// Preview of the submitted text
    pub text: String,

    /// Batch position, absent for single requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl DetectionResult {
    /// Shape a raw engine label for the given request
    pub fn from_label(request: &DetectionRequest, raw_label: &str) -> Self {
        Self {
            language: normalize_label(raw_label),
            text: request.preview(),
            index: request.origin.index(),
        }
    }
}

/// Map an engine label to the label reported to callers
///
/// The engine's sentinel becomes `UNKNOWN`; anything else is trusted and
/// upper-cased as-is.
pub fn normalize_label(raw: &str) -> String {
    if raw == ENGINE_UNKNOWN {
        UNKNOWN_LABEL.to_string()
    } else {
        raw.to_uppercase()
    }
}

/// First `limit` characters of `text`
pub fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_sentinel() {
        assert_eq!(normalize_label("unknown"), "UNKNOWN");
    }

    #[test]
    fn test_label_uppercased_verbatim() {
        assert_eq!(normalize_label("en"), "EN");
        assert_eq!(normalize_label("zh-Latn"), "ZH-LATN");
        assert_eq!(normalize_label("Unknown"), "UNKNOWN");
    }

    #[test]
    fn test_preview_bounds() {
        let text = "a".repeat(120);
        assert_eq!(preview(&text, 100).len(), 100);
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview("", 50), "");
    }

    #[test]
    fn test_preview_counts_characters() {
        let text = "é".repeat(60);
        let p = preview(&text, 50);
        assert_eq!(p.chars().count(), 50);
    }

    #[test]
    fn test_origin_preview_limits() {
        assert_eq!(Origin::Single.preview_limit(), 100);
        assert_eq!(Origin::Batch(3).preview_limit(), 50);
        assert_eq!(Origin::Batch(3).index(), Some(3));
        assert_eq!(Origin::Single.index(), None);
    }

    #[test]
    fn test_result_from_label() {
        let request = DetectionRequest::new("Bonjour tout le monde", Origin::Batch(2));
        let result = DetectionResult::from_label(&request, "fr");
        assert_eq!(result.language, "FR");
        assert_eq!(result.text, "Bonjour tout le monde");
        assert_eq!(result.index, Some(2));
    }

    #[test]
    fn test_engine_state_display() {
        assert_eq!(EngineState::Loaded.to_string(), "loaded");
        assert!(!EngineState::Unavailable.is_loaded());
    }
}
