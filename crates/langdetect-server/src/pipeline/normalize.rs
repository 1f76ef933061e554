//! Input validation ahead of the engine

use serde_json::Value;
use std::fmt;

/// Why raw input never reached the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Absent, `null`, or not a string
    MissingOrInvalid,
    /// Only whitespace
    Empty,
    /// Batch input that is not a JSON array
    NotAnArray,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::MissingOrInvalid => "Missing or invalid text parameter",
            Self::Empty => "Text cannot be empty",
            Self::NotAnArray => "texts parameter must be an array",
        };
        f.write_str(msg)
    }
}

/// Trim and validate a raw text value
///
/// The trimmed text is returned unchanged otherwise; previews are cut later,
/// when results are shaped.
pub fn normalize(raw: Option<&Value>) -> Result<String, RejectionReason> {
    let text = raw
        .and_then(Value::as_str)
        .ok_or(RejectionReason::MissingOrInvalid)?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RejectionReason::Empty);
    }
    Ok(trimmed.to_string())
}
