//! Langdetect Engine
//!
//! Loading and invocation of the sandboxed language classification engine.
//!
//! The engine ships as a WebAssembly artifact. At startup the
//! [`EngineLoader`] reads it and tries each [`InstantiationStrategy`] in
//! order; the outcome is an [`EngineHandle`] that is either `Loaded` with a
//! [`LanguageDetector`] or `Unavailable`. The handle is stored once in an
//! [`EngineCell`] and read by request handlers afterwards.

pub mod artifact;
pub mod detector;
pub mod handle;
pub mod host;
pub mod loader;
pub mod runtime;
pub mod strategy;

pub use artifact::{Artifact, ArtifactConfig, RuntimeLimits};
pub use detector::LanguageDetector;
pub use handle::{EngineCell, EngineHandle};
pub use host::{HostCapabilities, MinimalHost, StubBehavior};
pub use loader::EngineLoader;
pub use runtime::WasmDetector;
pub use strategy::{default_strategies, BootstrapStrategy, DirectStrategy, InstantiationStrategy};
