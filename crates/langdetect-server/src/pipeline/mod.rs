//! Request pipeline: validation, detection and deferral
//!
//! Everything here is synchronous and independent of HTTP; route handlers
//! shape the outcomes into responses.

pub mod batch;
pub mod deferral;
pub mod detect;
pub mod normalize;

pub use batch::{detect_item, BatchEntry, BatchOutcome, BatchPlan, ItemFailure, PendingBatch};
pub use deferral::{AvailabilityResponder, DeferralContext, DeferralPayload};
pub use detect::{DetectionOutcome, DetectionService};
pub use normalize::{normalize, RejectionReason};
