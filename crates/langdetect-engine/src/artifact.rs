//! Artifact configuration and loading for the wasm classification engine

use langdetect_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wasmtime::{Config, Engine, Module};

/// Default artifact file name, looked up next to the service's static files
pub const DEFAULT_ARTIFACT_FILE: &str = "cld3_wasm.wasm";

/// Default bootstrap wrapper file name, served to browsers only
pub const DEFAULT_WRAPPER_FILE: &str = "cld3_wasm.js";

/// Configuration for locating and instantiating the artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Path to the compiled wasm module
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Path to the JavaScript wrapper shipped with the module
    #[serde(default = "default_wrapper_path")]
    pub wrapper_path: PathBuf,

    /// Fuel granted to each guest call; exhaustion traps the call
    #[serde(default = "default_fuel")]
    pub fuel_per_call: u64,

    /// Wall-clock limit for one guest call, in milliseconds
    ///
    /// Not read from the engine section; the service sets it from its own
    /// request timeout.
    #[serde(skip, default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Minimum linear memory handed to the guest, in 64 KiB pages
    #[serde(default = "default_initial_pages")]
    pub initial_memory_pages: u32,

    /// Maximum linear memory when the guest declares none, in pages
    #[serde(default = "default_max_pages")]
    pub max_memory_pages: u32,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
            wrapper_path: default_wrapper_path(),
            fuel_per_call: default_fuel(),
            call_timeout_ms: default_call_timeout_ms(),
            initial_memory_pages: default_initial_pages(),
            max_memory_pages: default_max_pages(),
        }
    }
}

impl ArtifactConfig {
    /// Create a configuration for an artifact at the given path
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: path.into(),
            ..Default::default()
        }
    }

    /// Set the wrapper path
    pub fn with_wrapper(mut self, path: impl Into<PathBuf>) -> Self {
        self.wrapper_path = path.into();
        self
    }

    /// Set the per-call fuel budget
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel_per_call = fuel;
        self
    }

    /// Set the wall-clock limit for one guest call
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set guest memory limits in pages
    pub fn with_memory_pages(mut self, initial: u32, max: u32) -> Self {
        self.initial_memory_pages = initial;
        self.max_memory_pages = max;
        self
    }

    /// Resolve relative paths against `base`
    pub fn resolve_against(mut self, base: &Path) -> Self {
        if self.artifact_path.is_relative() {
            self.artifact_path = base.join(&self.artifact_path);
        }
        if self.wrapper_path.is_relative() {
            self.wrapper_path = base.join(&self.wrapper_path);
        }
        self
    }

    /// Runtime limits applied by every instantiation strategy
    pub fn limits(&self) -> RuntimeLimits {
        RuntimeLimits {
            fuel_per_call: self.fuel_per_call,
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            initial_memory_pages: self.initial_memory_pages,
            max_memory_pages: self.max_memory_pages,
        }
    }
}

/// Resource bounds for an instantiated engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLimits {
    pub fuel_per_call: u64,
    pub call_timeout: Duration,
    pub initial_memory_pages: u32,
    pub max_memory_pages: u32,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        ArtifactConfig::default().limits()
    }
}

/// Artifact bytes read fully into memory
#[derive(Debug, Clone)]
pub struct Artifact {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl Artifact {
    /// Read the artifact at `path`
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(path, bytes))
    }

    /// Wrap bytes that were obtained elsewhere
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Compile into a wasmtime engine with fuel metering and epoch
    /// interruption enabled
    pub fn compile(&self) -> Result<(Engine, Module)> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.epoch_interruption(true);

        let engine = Engine::new(&config)
            .map_err(|e| Error::loader(format!("Failed to create wasm engine: {}", e)))?;
        let module = Module::new(&engine, &self.bytes).map_err(|e| {
            Error::loader(format!("Failed to compile {}: {}", self.path.display(), e))
        })?;

        Ok((engine, module))
    }
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACT_FILE)
}

fn default_wrapper_path() -> PathBuf {
    PathBuf::from(DEFAULT_WRAPPER_FILE)
}

fn default_fuel() -> u64 {
    1_000_000_000
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

fn default_initial_pages() -> u32 {
    256
}

fn default_max_pages() -> u32 {
    512
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_config_defaults() {
        let config = ArtifactConfig::default();
        assert_eq!(config.artifact_path, PathBuf::from("cld3_wasm.wasm"));
        assert_eq!(config.wrapper_path, PathBuf::from("cld3_wasm.js"));
        assert_eq!(config.initial_memory_pages, 256);
        assert_eq!(config.max_memory_pages, 512);
        assert_eq!(config.call_timeout_ms, 5_000);
    }

    #[test]
    fn test_artifact_config_builder() {
        let config = ArtifactConfig::from_path("/srv/engine.wasm")
            .with_wrapper("/srv/engine.js")
            .with_fuel(1_000)
            .with_call_timeout(Duration::from_millis(250))
            .with_memory_pages(1, 2);

        let limits = config.limits();
        assert_eq!(limits.fuel_per_call, 1_000);
        assert_eq!(limits.call_timeout, Duration::from_millis(250));
        assert_eq!(limits.initial_memory_pages, 1);
        assert_eq!(limits.max_memory_pages, 2);
    }

    #[test]
    fn test_resolve_against_keeps_absolute_paths() {
        let config = ArtifactConfig::from_path("/abs/engine.wasm").resolve_against(Path::new("/srv"));
        assert_eq!(config.artifact_path, PathBuf::from("/abs/engine.wasm"));
        assert_eq!(config.wrapper_path, PathBuf::from("/srv/cld3_wasm.js"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: ArtifactConfig =
            serde_yaml::from_str("fuel_per_call: 42\ncall_timeout_ms: 1\n").unwrap();
        assert_eq!(config.fuel_per_call, 42);
        assert_eq!(config.call_timeout_ms, 5_000);
        assert_eq!(config.artifact_path, PathBuf::from("cld3_wasm.wasm"));
    }

    #[test]
    fn test_compile_rejects_garbage() {
        let artifact = Artifact::from_bytes("bogus.wasm", b"definitely not wasm".to_vec());
        let err = artifact.compile().err().unwrap();
        assert!(matches!(err, Error::Loader(_)));
    }
}
