//! Error types for k2bypass.

use thiserror::Error;

/// Error type for k2bypass operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input could not be parsed into a hostname, or has no eTLD
    #[error("invalid hostname: {0}")]
    InvalidHostname(String),

    /// A node id that is not part of the current exclusions tree
    #[error("unknown exclusion id: {0}")]
    UnknownId(String),

    /// A service id the catalog does not know
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// Exclusions mode name that is neither regular nor selective
    #[error("unknown exclusions mode: {0}")]
    UnknownMode(String),

    /// Manager used before its state was loaded
    #[error("exclusions manager is not initialized")]
    NotInitialized,

    /// Settings store rejected a read or write
    #[error("settings store error: {0}")]
    Settings(String),

    /// Proxy rejected the bypass list
    #[error("proxy error: {0}")]
    Proxy(String),

    /// Public suffix list could not be loaded
    #[error("public suffix list error: {0}")]
    SuffixList(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether retrying the same call may succeed.
    ///
    /// Only collaborator failures qualify; every mutation is idempotent,
    /// so repeating it after a failed publish is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Settings(_) | Error::Proxy(_) | Error::Io(_))
    }
}

/// Result type alias for k2bypass operations.
pub type Result<T> = std::result::Result<T, Error>;
