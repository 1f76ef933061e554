//! Langdetect Core
//!
//! Types and errors shared by the detection engine and the HTTP service.
//!
//! This crate provides:
//! - The engine lifecycle marker (`EngineState`)
//! - Request/result types with the label and preview rules
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    normalize_label, preview, DetectionRequest, DetectionResult, EngineState, Origin,
    BATCH_PREVIEW_CHARS, ENGINE_UNKNOWN, SINGLE_PREVIEW_CHARS, UNKNOWN_LABEL,
};
