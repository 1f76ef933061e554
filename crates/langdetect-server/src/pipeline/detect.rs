//! Single-text detection

use super::deferral::{AvailabilityResponder, DeferralContext, DeferralPayload};
use super::normalize::{normalize, RejectionReason};
use langdetect_core::{DetectionRequest, DetectionResult, Error, Origin, Result};
use langdetect_engine::{EngineCell, LanguageDetector};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// What happened to a single detection request
#[derive(Debug)]
pub enum DetectionOutcome {
    /// Engine produced a label
    Detected(DetectionResult),
    /// Input failed validation; the engine was not consulted
    Rejected(RejectionReason),
    /// Engine is not loaded
    Deferred(DeferralPayload),
    /// Engine call failed
    Failed(Error),
}

impl DetectionOutcome {
    /// Metric label for this outcome
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Detected(_) => "detected",
            Self::Rejected(_) => "rejected",
            Self::Deferred(_) => "deferred",
            Self::Failed(_) => "failed",
        }
    }
}

/// Detection over the engine stored in the cell
///
/// Calls into the engine block the current thread; async callers run these
/// methods on the blocking pool.
#[derive(Debug, Clone)]
pub struct DetectionService {
    engine: Arc<EngineCell>,
    responder: AvailabilityResponder,
}

impl DetectionService {
    pub fn new(engine: Arc<EngineCell>, responder: AvailabilityResponder) -> Self {
        Self { engine, responder }
    }

    pub fn engine(&self) -> &EngineCell {
        &self.engine
    }

    pub(crate) fn responder(&self) -> &AvailabilityResponder {
        &self.responder
    }

    /// Validate one raw text and classify it
    ///
    /// Validation runs first, so invalid input is rejected whether or not
    /// the engine is loaded.
    pub fn detect_one(&self, raw: Option<&Value>) -> DetectionOutcome {
        let text = match normalize(raw) {
            Ok(text) => text,
            Err(reason) => return DetectionOutcome::Rejected(reason),
        };
        let request = DetectionRequest::new(text, Origin::Single);

        let Some(detector) = self.engine.detector() else {
            debug!("Engine not loaded, deferring detection");
            return DetectionOutcome::Deferred(
                self.responder
                    .deferral(DeferralContext::Text(request.preview())),
            );
        };

        match classify(detector.as_ref(), &request) {
            Ok(result) => DetectionOutcome::Detected(result),
            Err(e) => {
                warn!(detector = detector.name(), "Detection failed: {}", e);
                DetectionOutcome::Failed(e)
            }
        }
    }
}

/// Run the engine on a validated request and shape its label
pub(crate) fn classify(
    detector: &dyn LanguageDetector,
    request: &DetectionRequest,
) -> Result<DetectionResult> {
    let started = Instant::now();
    let label = detector.detect(&request.text);
    metrics::histogram!("langdetect_engine_latency_us")
        .record(started.elapsed().as_micros() as f64);

    label.map(|raw| DetectionResult::from_label(request, &raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use langdetect_engine::EngineHandle;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDetector {
        label: &'static str,
        calls: AtomicUsize,
    }

    impl FixedDetector {
        fn new(label: &'static str) -> Self {
            Self {
                label,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl LanguageDetector for FixedDetector {
        fn detect(&self, _text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label.to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct BrokenDetector;

    impl LanguageDetector for BrokenDetector {
        fn detect(&self, _text: &str) -> Result<String> {
            Err(Error::engine("unreachable executed"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn service_with(handle: Option<EngineHandle>) -> DetectionService {
        let cell = EngineCell::new();
        if let Some(handle) = handle {
            cell.initialize(handle).unwrap();
        }
        DetectionService::new(
            Arc::new(cell),
            AvailabilityResponder::new("http://localhost:3000"),
        )
    }

    #[test]
    fn test_detects_and_uppercases() {
        let service = service_with(Some(EngineHandle::loaded(Arc::new(FixedDetector::new(
            "en",
        )))));

        match service.detect_one(Some(&json!("  Hello world  "))) {
            DetectionOutcome::Detected(result) => {
                assert_eq!(result.language, "EN");
                assert_eq!(result.text, "Hello world");
                assert_eq!(result.index, None);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_sentinel_maps_to_unknown() {
        let service = service_with(Some(EngineHandle::loaded(Arc::new(FixedDetector::new(
            "unknown",
        )))));

        match service.detect_one(Some(&json!("xyz"))) {
            DetectionOutcome::Detected(result) => assert_eq!(result.language, "UNKNOWN"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_preview_is_bounded() {
        let service = service_with(Some(EngineHandle::loaded(Arc::new(FixedDetector::new(
            "en",
        )))));
        let long = "a".repeat(150);

        match service.detect_one(Some(&json!(long))) {
            DetectionOutcome::Detected(result) => assert_eq!(result.text.len(), 100),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_rejection_skips_engine() {
        let detector = Arc::new(FixedDetector::new("en"));
        let service = service_with(Some(EngineHandle::loaded(detector.clone())));

        assert!(matches!(
            service.detect_one(Some(&json!("   "))),
            DetectionOutcome::Rejected(RejectionReason::Empty)
        ));
        assert!(matches!(
            service.detect_one(None),
            DetectionOutcome::Rejected(RejectionReason::MissingOrInvalid)
        ));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rejection_wins_over_deferral() {
        let service = service_with(Some(EngineHandle::unavailable()));
        assert!(matches!(
            service.detect_one(Some(&json!(12))),
            DetectionOutcome::Rejected(RejectionReason::MissingOrInvalid)
        ));
    }

    #[test]
    fn test_defers_when_unavailable() {
        let service = service_with(Some(EngineHandle::unavailable()));

        match service.detect_one(Some(&json!("Hello"))) {
            DetectionOutcome::Deferred(payload) => {
                assert!(!payload.success);
                assert_eq!(payload.text.as_deref(), Some("Hello"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_defers_while_uninitialized() {
        let service = service_with(None);
        assert!(matches!(
            service.detect_one(Some(&json!("Hello"))),
            DetectionOutcome::Deferred(_)
        ));
    }

    #[test]
    fn test_engine_failure_is_reported() {
        let service = service_with(Some(EngineHandle::loaded(Arc::new(BrokenDetector))));

        let outcome = service.detect_one(Some(&json!("Hello")));
        assert_eq!(outcome.kind(), "failed");
        match outcome {
            DetectionOutcome::Failed(e) => assert_eq!(e.detail(), "unreachable executed"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
