//! Engine loader: ordered fallback over instantiation strategies

use crate::artifact::{Artifact, ArtifactConfig};
use crate::handle::EngineHandle;
use crate::strategy::{default_strategies, InstantiationStrategy};
use tracing::{info, warn};

/// Acquires the classification engine once at startup
///
/// Every failure is logged and turned into an `Unavailable` handle; loading
/// never returns an error.
pub struct EngineLoader {
    config: ArtifactConfig,
    strategies: Vec<Box<dyn InstantiationStrategy>>,
}

impl EngineLoader {
    /// Loader with the bootstrap and direct strategies
    pub fn new(config: ArtifactConfig) -> Self {
        let strategies = default_strategies(config.limits());
        Self { config, strategies }
    }

    /// Loader with a custom strategy list
    pub fn with_strategies(
        config: ArtifactConfig,
        strategies: Vec<Box<dyn InstantiationStrategy>>,
    ) -> Self {
        Self { config, strategies }
    }

    pub fn config(&self) -> &ArtifactConfig {
        &self.config
    }

    /// Run the loading protocol to a terminal state
    pub async fn load(&self) -> EngineHandle {
        let path = &self.config.artifact_path;

        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        if !exists {
            warn!("{} not found, running in browser-only mode", path.display());
            return EngineHandle::unavailable();
        }

        let artifact = match Artifact::read(path).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                warn!("Running in browser-only mode");
                return EngineHandle::unavailable();
            }
        };
        info!("Read {} ({} bytes)", path.display(), artifact.len());

        for strategy in &self.strategies {
            match strategy.instantiate(&artifact) {
                Ok(detector) => {
                    info!(
                        strategy = strategy.name(),
                        "Classification engine loaded on server"
                    );
                    return EngineHandle::loaded(detector);
                }
                Err(e) => {
                    warn!(
                        strategy = strategy.name(),
                        "Instantiation failed, trying next strategy: {}", e
                    );
                }
            }
        }

        warn!("All instantiation strategies failed, running in browser-only mode");
        EngineHandle::unavailable()
    }
}
