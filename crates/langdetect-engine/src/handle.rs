//! Write-once engine handle shared by request handlers

use crate::detector::LanguageDetector;
use langdetect_core::{EngineState, Error, Result};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Terminal result of engine loading
///
/// A detector is present exactly when the state is `Loaded`.
#[derive(Clone)]
pub struct EngineHandle {
    state: EngineState,
    detector: Option<Arc<dyn LanguageDetector>>,
}

impl EngineHandle {
    /// Handle for a successfully instantiated engine
    pub fn loaded(detector: Arc<dyn LanguageDetector>) -> Self {
        Self {
            state: EngineState::Loaded,
            detector: Some(detector),
        }
    }

    /// Handle for a missing or failed engine
    pub fn unavailable() -> Self {
        Self {
            state: EngineState::Unavailable,
            detector: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn detector(&self) -> Option<&Arc<dyn LanguageDetector>> {
        self.detector.as_ref()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("state", &self.state)
            .field("detector", &self.detector.as_ref().map(|d| d.name().to_string()))
            .finish()
    }
}

/// Process-scoped engine slot, initialized once before serving
///
/// Reads before initialization observe `Uninitialized`; a second
/// initialization is rejected.
#[derive(Debug, Default)]
pub struct EngineCell {
    slot: OnceLock<EngineHandle>,
}

impl EngineCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the loader's result
    pub fn initialize(&self, handle: EngineHandle) -> Result<()> {
        self.slot.set(handle).map_err(|_| Error::AlreadyInitialized)
    }

    pub fn state(&self) -> EngineState {
        self.slot
            .get()
            .map(EngineHandle::state)
            .unwrap_or(EngineState::Uninitialized)
    }

    /// Detector, only when the engine is loaded
    pub fn detector(&self) -> Option<&Arc<dyn LanguageDetector>> {
        self.slot.get().and_then(EngineHandle::detector)
    }

    pub fn is_loaded(&self) -> bool {
        self.state().is_loaded()
    }
}

impl From<EngineHandle> for EngineCell {
    fn from(handle: EngineHandle) -> Self {
        let cell = Self::new();
        let _ = cell.slot.set(handle);
        cell
    }
}
