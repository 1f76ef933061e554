//! Service configuration

use crate::cli::Cli;
use langdetect_engine::ArtifactConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served for the interactive page and static assets
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// URL advertised in deferral instructions and the info payload
    #[serde(default)]
    pub public_url: Option<String>,

    /// Allow cross-origin requests from anywhere
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,

    /// Wall-clock limit for one engine call; batches apply it per item
    #[serde(default = "default_detect_timeout_ms")]
    pub detect_timeout_ms: u64,

    /// Engine artifact and runtime limits
    #[serde(default)]
    pub engine: ArtifactConfig,

    /// File this configuration was read from; never served as a static file
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl ServiceConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let path = Path::new(config_path);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let mut config: Self = serde_yaml::from_str(&content)?;
            config.source = path.canonicalize().ok();
            config
        } else {
            Self::default()
        };

        // Apply CLI overrides
        if let Some(listen) = &cli.listen {
            config.listen = listen.clone();
        }

        if let Some(port) = cli.port {
            config.port = port;
        }

        if let Some(artifact) = &cli.artifact {
            config.engine.artifact_path = artifact.clone();
        }

        if let Some(static_dir) = &cli.static_dir {
            config.static_dir = static_dir.clone();
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.listen, self.port).parse()?)
    }

    pub fn public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }

    /// Engine configuration with relative paths resolved against the static
    /// directory and the call deadline taken from `detect_timeout_ms`
    pub fn artifact_config(&self) -> ArtifactConfig {
        self.engine
            .clone()
            .with_call_timeout(self.detect_timeout())
            .resolve_against(&self.static_dir)
    }

    /// True if `path` is the file this configuration was loaded from
    pub fn is_source(&self, path: &Path) -> bool {
        self.source.as_deref() == Some(path)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            static_dir: default_static_dir(),
            public_url: None,
            cors_allow_any: true,
            detect_timeout_ms: default_detect_timeout_ms(),
            engine: ArtifactConfig::default(),
            source: None,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_detect_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}
