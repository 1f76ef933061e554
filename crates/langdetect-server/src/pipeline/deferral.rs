//! Deferral payload returned when the engine is not loaded

use serde::Serialize;

const DEFERRAL_MESSAGE: &str =
    "Language detection is processed client-side in the browser using WebAssembly";
const DEFERRAL_NOTE: &str =
    "The CLD3 WASM module can only run in a browser environment, not on this server";

/// Input echoed back in a deferral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferralContext {
    /// Preview of a single submitted text
    Text(String),
    /// Number of texts in a batch
    Count(usize),
}

/// Success-status response telling the caller to detect elsewhere
///
/// `success` is always false; callers must check it instead of the HTTP
/// status, which stays 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferralPayload {
    pub success: bool,
    pub message: String,
    pub instructions: String,
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "inputTexts", skip_serializing_if = "Option::is_none")]
    pub input_texts: Option<usize>,
}

/// Builds deferral payloads pointing at the interactive page
#[derive(Debug, Clone)]
pub struct AvailabilityResponder {
    public_url: String,
}

impl AvailabilityResponder {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
        }
    }

    pub fn deferral(&self, context: DeferralContext) -> DeferralPayload {
        let (text, input_texts) = match context {
            DeferralContext::Text(preview) => (Some(preview), None),
            DeferralContext::Count(count) => (None, Some(count)),
        };

        DeferralPayload {
            success: false,
            message: DEFERRAL_MESSAGE.to_string(),
            instructions: format!(
                "Open {} in your browser and use the web interface to detect languages",
                self.public_url
            ),
            note: DEFERRAL_NOTE.to_string(),
            text,
            input_texts,
        }
    }
}
