//! Error types for the Paper-First core.
//!
//! Uses `thiserror` for public API error types with one enum per domain:
//! citation evaluation, candidate parsing, oracle transport, discovery,
//! cache persistence, and configuration.

use std::path::PathBuf;

/// Top-level error type for the Paper-First core library.
#[derive(Debug, thiserror::Error)]
pub enum PaperFirstError {
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while grading a citation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("Malformed citation: {reason}")]
    MalformedCitation { reason: String },
}

/// Errors raised while turning raw oracle text into a topic draft.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Candidate contains neither a JSON object nor labelled fields")]
    NoStructure,

    #[error("Candidate JSON is invalid: {message}")]
    InvalidJson { message: String },

    #[error("Candidate carries no well-formed citation")]
    NoCitations,
}

/// Errors from the content oracle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("Rate limited by oracle, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Oracle request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Oracle connection failed: {message}")]
    Connection { message: String },

    #[error("Oracle returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed for oracle {oracle}")]
    AuthFailed { oracle: String },

    #[error("Oracle response parse error: {message}")]
    ResponseParse { message: String },
}

impl OracleError {
    /// Whether the failure is expected to clear up on its own.
    ///
    /// Transient failures consume one discovery attempt; permanent ones
    /// (bad credentials) abort discovery immediately.
    pub fn is_transient(&self) -> bool {
        !matches!(self, OracleError::AuthFailed { .. })
    }

    /// Server-suggested wait before the next call, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            OracleError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Errors surfaced by the discovery orchestrator.
///
/// Content-quality problems never appear here: they are resolved by retrying
/// or by returning an incomplete result.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Discovery aborted after {consecutive_failures} consecutive oracle failures: {source}")]
    Aborted {
        consecutive_failures: usize,
        #[source]
        source: OracleError,
    },

    #[error("Invalid discovery request: {reason}")]
    InvalidRequest { reason: String },
}

impl DiscoveryError {
    /// Whether the caller should retry later rather than try a different topic.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, DiscoveryError::Aborted { .. })
    }
}

/// Errors from the persistent side of the result cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache entry at {path} is corrupt: {message}")]
    Corruption { path: PathBuf, message: String },

    #[error("Cache persistence failed for {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Invalid pattern for signal '{name}': {message}")]
    InvalidPattern { name: String, message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `PaperFirstError`.
pub type Result<T> = std::result::Result<T, PaperFirstError>;
