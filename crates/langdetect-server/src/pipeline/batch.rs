//! Batch detection

use super::deferral::{DeferralContext, DeferralPayload};
use super::detect::{classify, DetectionService};
use super::normalize::{normalize, RejectionReason};
use langdetect_core::{DetectionRequest, DetectionResult, Error, Origin};
use langdetect_engine::LanguageDetector;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

const PANIC_DETAIL: &str = "detector panicked";

/// Per-item failure inside an otherwise successful batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub index: usize,
    pub error: String,
}

impl ItemFailure {
    fn rejected(index: usize, reason: RejectionReason) -> Self {
        let error = match reason {
            RejectionReason::Empty => format!("Empty text at index {}", index),
            _ => format!("Invalid text at index {}", index),
        };
        Self { index, error }
    }

    /// Engine failure for the item at `index`
    pub fn engine(index: usize, err: &Error) -> Self {
        Self {
            index,
            error: err.detail(),
        }
    }
}

/// One element of a processed batch, in input order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry {
    Detected(DetectionResult),
    Failed(ItemFailure),
}

impl BatchEntry {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Detected(_))
    }
}

impl From<Result<DetectionResult, ItemFailure>> for BatchEntry {
    fn from(item: Result<DetectionResult, ItemFailure>) -> Self {
        match item {
            Ok(result) => Self::Detected(result),
            Err(failure) => Self::Failed(failure),
        }
    }
}

impl Serialize for BatchEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Detected(result) => {
                let mut entry = serializer.serialize_struct("BatchEntry", 4)?;
                entry.serialize_field("index", &result.index.unwrap_or_default())?;
                entry.serialize_field("success", &true)?;
                entry.serialize_field("language", &result.language)?;
                entry.serialize_field("text", &result.text)?;
                entry.end()
            }
            Self::Failed(failure) => {
                let mut entry = serializer.serialize_struct("BatchEntry", 3)?;
                entry.serialize_field("index", &failure.index)?;
                entry.serialize_field("success", &false)?;
                entry.serialize_field("error", &failure.error)?;
                entry.end()
            }
        }
    }
}

/// What happened to a batch request
#[derive(Debug)]
pub enum BatchOutcome {
    /// One entry per input element; item failures do not fail the batch
    Processed(Vec<BatchEntry>),
    /// Input was not an array
    Rejected(RejectionReason),
    /// Engine is not loaded
    Deferred(DeferralPayload),
}

/// Validated batch items waiting for the engine
pub struct PendingBatch {
    pub detector: Arc<dyn LanguageDetector>,
    /// Input order; items that failed validation are already failures
    pub items: Vec<Result<DetectionRequest, ItemFailure>>,
}

/// A batch request after validation
pub enum BatchPlan {
    /// Engine work remains, one call per valid item
    Pending(PendingBatch),
    /// Rejected or deferred without touching the engine
    Settled(BatchOutcome),
}

impl DetectionService {
    /// Validate a raw batch without calling the engine
    pub fn plan_batch(&self, raw: Option<&Value>) -> BatchPlan {
        let Some(Value::Array(items)) = raw else {
            return BatchPlan::Settled(BatchOutcome::Rejected(RejectionReason::NotAnArray));
        };

        let Some(detector) = self.engine().detector() else {
            debug!(count = items.len(), "Engine not loaded, deferring batch");
            return BatchPlan::Settled(BatchOutcome::Deferred(
                self.responder().deferral(DeferralContext::Count(items.len())),
            ));
        };

        let items = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                normalize(Some(item))
                    .map(|text| DetectionRequest::new(text, Origin::Batch(index)))
                    .map_err(|reason| ItemFailure::rejected(index, reason))
            })
            .collect();

        BatchPlan::Pending(PendingBatch {
            detector: detector.clone(),
            items,
        })
    }

    /// Classify every element of a raw batch independently, on this thread
    pub fn detect_batch(&self, raw: Option<&Value>) -> BatchOutcome {
        match self.plan_batch(raw) {
            BatchPlan::Settled(outcome) => outcome,
            BatchPlan::Pending(PendingBatch { detector, items }) => BatchOutcome::Processed(
                items
                    .into_iter()
                    .map(|item| item.and_then(|request| detect_item(detector.as_ref(), &request)))
                    .map(BatchEntry::from)
                    .collect(),
            ),
        }
    }
}

/// Classify one validated batch item
///
/// Engine errors and detector panics become a failure for this item only.
pub fn detect_item(
    detector: &dyn LanguageDetector,
    request: &DetectionRequest,
) -> Result<DetectionResult, ItemFailure> {
    let index = request.origin.index().unwrap_or_default();

    match panic::catch_unwind(AssertUnwindSafe(|| classify(detector, request))) {
        Ok(result) => result.map_err(|e| ItemFailure::engine(index, &e)),
        Err(_) => {
            error!(index, detector = detector.name(), "Detector panicked on batch item");
            Err(ItemFailure {
                index,
                error: PANIC_DETAIL.to_string(),
            })
        }
    }
}
