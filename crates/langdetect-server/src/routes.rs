//! HTTP routes and handlers

use crate::error::AppError;
use crate::pipeline::{
    detect_item, BatchEntry, BatchOutcome, BatchPlan, DetectionOutcome, ItemFailure,
    PendingBatch, RejectionReason,
};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use langdetect_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

const PROCESSED_ON: &str = "server";

const MISSING_QUERY_TEXT: &str = "Missing text parameter. Use ?text=your_text or ?q=your_text";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectResponse {
    success: bool,
    language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<&'static str>,
    text: String,
    processed_on: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    success: bool,
    count: usize,
    results: Vec<BatchEntry>,
    processed_on: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetectQuery {
    pub text: Option<String>,
    pub q: Option<String>,
}

impl DetectQuery {
    /// `text` unless it is absent or empty, then `q`
    fn into_raw(self) -> Option<Value> {
        self.text
            .filter(|text| !text.is_empty())
            .or(self.q)
            .map(Value::String)
    }
}

/// How the text reached a single-detection handler
#[derive(Debug, Clone, Copy)]
enum DetectVia {
    Body,
    Query,
}

impl DetectVia {
    fn rejection(self, reason: RejectionReason) -> AppError {
        match (self, reason) {
            (DetectVia::Query, RejectionReason::MissingOrInvalid) => {
                AppError::Validation(MISSING_QUERY_TEXT.to_string())
            }
            (_, reason) => reason.into(),
        }
    }

    fn confidence(self) -> Option<&'static str> {
        match self {
            DetectVia::Body => None,
            DetectVia::Query => Some("high"),
        }
    }
}

/// Run one engine call on the blocking pool under the configured deadline
async fn run_blocking<T, F>(state: &AppState, job: F) -> langdetect_core::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(job);

    match tokio::time::timeout(state.config.detect_timeout(), task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("Detection task failed: {}", e);
            Err(Error::internal(e.to_string()))
        }
        Err(_) => {
            error!(
                timeout_ms = state.config.detect_timeout_ms,
                "Detection timed out"
            );
            Err(Error::Timeout)
        }
    }
}

fn detection_response(outcome: DetectionOutcome, via: DetectVia) -> Result<Response, AppError> {
    metrics::counter!("langdetect_detections_total", "outcome" => outcome.kind()).increment(1);

    match outcome {
        DetectionOutcome::Detected(result) => Ok(Json(DetectResponse {
            success: true,
            language: result.language,
            confidence: via.confidence(),
            text: result.text,
            processed_on: PROCESSED_ON,
        })
        .into_response()),
        DetectionOutcome::Deferred(payload) => Ok(Json(payload).into_response()),
        DetectionOutcome::Rejected(reason) => Err(via.rejection(reason)),
        DetectionOutcome::Failed(e) => Err(AppError::Detection(e.detail())),
    }
}

// ============================================================================
// Detection endpoints
// ============================================================================

pub async fn detect_post(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<Response, AppError> {
    metrics::counter!("langdetect_requests_total", "endpoint" => "detect").increment(1);

    let raw = body.and_then(|Json(mut body)| body.get_mut("text").map(Value::take));
    let service = state.service.clone();
    let outcome = run_blocking(&state, move || service.detect_one(raw.as_ref()))
        .await
        .map_err(AppError::detection)?;

    detection_response(outcome, DetectVia::Body)
}

pub async fn detect_get(
    State(state): State<AppState>,
    query: Option<Query<DetectQuery>>,
) -> Result<Response, AppError> {
    metrics::counter!("langdetect_requests_total", "endpoint" => "detect_get").increment(1);

    let raw = query.map(|Query(query)| query).unwrap_or_default().into_raw();
    let service = state.service.clone();
    let outcome = run_blocking(&state, move || service.detect_one(raw.as_ref()))
        .await
        .map_err(AppError::detection)?;

    detection_response(outcome, DetectVia::Query)
}

pub async fn detect_batch(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<Response, AppError> {
    metrics::counter!("langdetect_requests_total", "endpoint" => "detect_batch").increment(1);

    let raw = body.and_then(|Json(mut body)| body.get_mut("texts").map(Value::take));
    let outcome = match state.service.plan_batch(raw.as_ref()) {
        BatchPlan::Settled(outcome) => outcome,
        BatchPlan::Pending(batch) => BatchOutcome::Processed(run_batch(&state, batch).await),
    };

    match outcome {
        BatchOutcome::Processed(results) => {
            for entry in &results {
                let kind = if entry.is_success() { "detected" } else { "failed" };
                metrics::counter!("langdetect_detections_total", "outcome" => kind).increment(1);
            }
            Ok(Json(BatchResponse {
                success: true,
                count: results.len(),
                results,
                processed_on: PROCESSED_ON,
            })
            .into_response())
        }
        BatchOutcome::Deferred(payload) => {
            metrics::counter!("langdetect_detections_total", "outcome" => "deferred").increment(1);
            Ok(Json(payload).into_response())
        }
        BatchOutcome::Rejected(reason) => {
            metrics::counter!("langdetect_detections_total", "outcome" => "rejected").increment(1);
            Err(reason.into())
        }
    }
}

/// Classify batch items in order, each under its own deadline
///
/// A slow or failing item becomes a failure entry; the rest still run.
async fn run_batch(state: &AppState, batch: PendingBatch) -> Vec<BatchEntry> {
    let PendingBatch { detector, items } = batch;
    let mut entries = Vec::with_capacity(items.len());

    for item in items {
        let item = match item {
            Ok(request) => {
                let index = request.origin.index().unwrap_or_default();
                let detector = detector.clone();
                run_blocking(state, move || detect_item(detector.as_ref(), &request))
                    .await
                    .unwrap_or_else(|e| Err(ItemFailure::engine(index, &e)))
            }
            Err(failure) => Err(failure),
        };
        entries.push(BatchEntry::from(item));
    }

    entries
}

// ============================================================================
// Informational endpoints
// ============================================================================

pub async fn languages() -> impl IntoResponse {
    Json(json!({
        "supported": "The CLD3 detector supports 140+ languages including:",
        "major_languages": [
            "English", "Spanish", "French", "German", "Italian", "Portuguese",
            "Russian", "Chinese", "Japanese", "Korean", "Arabic", "Hebrew",
            "Hindi", "Bengali", "Tamil", "Telugu", "Marathi", "Gujarati",
            "Thai", "Vietnamese", "Indonesian", "Malay", "Polish", "Ukrainian",
            "Dutch", "Swedish", "Norwegian", "Danish", "Finnish", "Turkish",
            "Greek", "Czech", "Hungarian", "Romanian", "Serbo-Croatian", "Bulgarian",
            "And 100+ more languages"
        ],
        "note": "Language codes are returned in uppercase (e.g., EN, FR, etc.)"
    }))
}

pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    let base = state.config.public_url();

    Json(json!({
        "name": "CLD3 Language Detector API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Detect the language of text using Google's CLD3 library compiled to WebAssembly",
        "wasmLoaded": state.wasm_loaded(),
        "endpoints": {
            "POST /api/detect": {
                "description": "Detect language from JSON body",
                "example": "POST /api/detect with {\"text\": \"Hello world\"}",
                "response": "{\"success\": true, \"language\": \"EN\", \"text\": \"Hello world\"}"
            },
            "GET /api/detect": {
                "description": "Detect language from URL query parameter",
                "example": "GET /api/detect?text=Hello%20world OR /api/detect?q=Hello%20world",
                "response": "{\"success\": true, \"language\": \"EN\", \"confidence\": \"high\"}"
            },
            "POST /api/detect/batch": {
                "description": "Detect language for multiple texts",
                "example": "POST /api/detect/batch with {\"texts\": [\"Hello\", \"Bonjour\", \"Hola\"]}",
                "response": "{\"success\": true, \"count\": 3, \"results\": [...]}"
            },
            "GET /api/languages": {
                "description": "Get list of supported languages",
                "example": "GET /api/languages",
                "response": "{\"supported\": \"...\", \"major_languages\": [...]}"
            },
            "GET /api/health": {
                "description": "Health check endpoint",
                "example": "GET /api/health",
                "response": "{\"status\": \"healthy\", \"wasmLoaded\": false, ...}"
            },
            "GET /api/info": {
                "description": "API information and documentation",
                "example": "GET /api/info",
                "response": "{\"name\": \"CLD3 Language Detector API\", \"endpoints\": {...}}"
            }
        },
        "usage": {
            "Simple GET request": format!("curl \"{}/api/detect?text=Hello\"", base),
            "POST request": format!(
                "curl -X POST {}/api/detect -H \"Content-Type: application/json\" -d '{{\"text\": \"Bonjour\"}}'",
                base
            )
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "wasmLoaded": state.wasm_loaded(),
        "message": "CLD3 Language Detector is running"
    }))
}

pub async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}
