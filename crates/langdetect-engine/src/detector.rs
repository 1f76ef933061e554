//! Detector trait implemented by every classification backend

use langdetect_core::Result;

/// A loaded classification capability: text in, language label out
///
/// Implementations are shared across requests, so calls must be safe from
/// any thread. The returned label is the engine's raw output; mapping to the
/// caller-facing form happens in `langdetect_core::normalize_label`.
pub trait LanguageDetector: Send + Sync {
    /// Classify the given text
    fn detect(&self, text: &str) -> Result<String>;

    /// Get the detector name (the strategy that produced it)
    fn name(&self) -> &str;
}
