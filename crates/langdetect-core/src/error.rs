//! Error types for the language detection service

/// Result type alias using the service's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for engine loading and detection
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The loaded engine failed while classifying a text
    #[error("engine error: {0}")]
    Engine(String),

    /// An instantiation strategy could not produce an engine
    #[error("loader error: {0}")]
    Loader(String),

    /// The artifact does not expose the exports the detector needs
    #[error("abi error: {0}")]
    Abi(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// The engine cell was written twice
    #[error("engine state already initialized")]
    AlreadyInitialized,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a new loader error
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::Loader(msg.into())
    }

    /// Create a new ABI error
    pub fn abi(msg: impl Into<String>) -> Self {
        Self::Abi(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Message without the category prefix, as shown to API callers
    pub fn detail(&self) -> String {
        match self {
            Self::Engine(msg)
            | Self::Loader(msg)
            | Self::Abi(msg)
            | Self::Internal(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_strips_prefix() {
        let err = Error::engine("guest trapped");
        assert_eq!(err.to_string(), "engine error: guest trapped");
        assert_eq!(err.detail(), "guest trapped");
    }

    #[test]
    fn test_timeout_detail() {
        assert_eq!(Error::Timeout.detail(), "operation timed out");
    }
}
