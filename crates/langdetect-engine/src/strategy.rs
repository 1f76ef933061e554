//! Instantiation strategies tried by the engine loader, in order.

use crate::artifact::{Artifact, RuntimeLimits};
use crate::detector::LanguageDetector;
use crate::host::{HostCapabilities, MinimalHost, BOOTSTRAP_IMPORTS, DIRECT_IMPORTS};
use crate::runtime::{self, ImportPolicy, InstantiateOptions};
use langdetect_core::Result;
use std::sync::Arc;

/// One way of turning artifact bytes into a detector.
///
/// The loader stops at the first strategy that succeeds. Implement this
/// trait to plug in other runtimes or test doubles.
pub trait InstantiationStrategy: Send + Sync {
    /// Strategy name used in logs
    fn name(&self) -> &str;

    /// Instantiate the pre-read artifact
    fn instantiate(&self, artifact: &Artifact) -> Result<Arc<dyn LanguageDetector>>;
}

/// Links the artifact against the canonical runtime imports and runs its
/// constructors, the way the bundled wrapper does in a browser.
pub struct BootstrapStrategy {
    limits: RuntimeLimits,
    host: Arc<dyn HostCapabilities>,
}

impl BootstrapStrategy {
    pub fn new(limits: RuntimeLimits, host: Arc<dyn HostCapabilities>) -> Self {
        Self { limits, host }
    }
}

impl InstantiationStrategy for BootstrapStrategy {
    fn name(&self) -> &str {
        "bootstrap"
    }

    fn instantiate(&self, artifact: &Artifact) -> Result<Arc<dyn LanguageDetector>> {
        let detector = runtime::instantiate(
            artifact,
            self.limits,
            self.host.clone(),
            InstantiateOptions {
                label: "bootstrap",
                policy: ImportPolicy::Strict(BOOTSTRAP_IMPORTS),
                run_constructors: true,
            },
        )?;
        Ok(Arc::new(detector))
    }
}

/// Instantiates directly with the minified import table, stubbing anything
/// it does not know.
pub struct DirectStrategy {
    limits: RuntimeLimits,
    host: Arc<dyn HostCapabilities>,
}

impl DirectStrategy {
    pub fn new(limits: RuntimeLimits, host: Arc<dyn HostCapabilities>) -> Self {
        Self { limits, host }
    }
}

impl InstantiationStrategy for DirectStrategy {
    fn name(&self) -> &str {
        "direct"
    }

    fn instantiate(&self, artifact: &Artifact) -> Result<Arc<dyn LanguageDetector>> {
        let detector = runtime::instantiate(
            artifact,
            self.limits,
            self.host.clone(),
            InstantiateOptions {
                label: "direct",
                policy: ImportPolicy::Permissive(DIRECT_IMPORTS),
                run_constructors: false,
            },
        )?;
        Ok(Arc::new(detector))
    }
}

/// Bootstrap first, then direct
pub fn default_strategies(limits: RuntimeLimits) -> Vec<Box<dyn InstantiationStrategy>> {
    let host: Arc<dyn HostCapabilities> = Arc::new(MinimalHost);
    vec![
        Box::new(BootstrapStrategy::new(limits, host.clone())),
        Box::new(DirectStrategy::new(limits, host)),
    ]
}
