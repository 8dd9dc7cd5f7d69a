//! Shared error type across svcmetrics crates.

use thiserror::Error;

/// Coarse error classes (stable API, used by logs and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid configuration or catalog.
    BadConfig,
    /// Credentials missing or rejected.
    AuthFailed,
    /// The directory API failed or returned something unexpected.
    Directory,
    /// The monitoring API failed or broke one of our assumptions.
    Provider,
    /// Internal invariant broken.
    Internal,
}

impl ClientCode {
    /// String representation used in logs and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadConfig => "BAD_CONFIG",
            ClientCode::AuthFailed => "AUTH_FAILED",
            ClientCode::Directory => "DIRECTORY",
            ClientCode::Provider => "PROVIDER",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, SvcMetricsError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum SvcMetricsError {
    #[error("invalid config: {0}")]
    BadConfig(String),
    #[error("missing vocabulary entry for {kind} '{name}'")]
    MissingVocabulary { kind: &'static str, name: String },
    #[error("auth failed: {0}")]
    AuthFailed(String),
    #[error("directory: {0}")]
    Directory(String),
    #[error("more than {limit} metric data queries in one call: {count}")]
    BatchTooLarge { count: usize, limit: usize },
    #[error("unexpected issue fetching metric data: {0:?}")]
    ProviderWarnings(Vec<String>),
    #[error("more than one page of metric data results (expected to be unreachable)")]
    UnexpectedNextPage,
    #[error("error fetching metric data: {0}")]
    Provider(String),
    #[error("malformed exposition at line {line}: {reason}")]
    MalformedExposition { line: usize, reason: String },
    #[error("result id '{0}' does not match any submitted query")]
    UnresolvedQueryId(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl SvcMetricsError {
    /// Map an error to its stable class.
    pub fn client_code(&self) -> ClientCode {
        match self {
            SvcMetricsError::BadConfig(_) | SvcMetricsError::MissingVocabulary { .. } => {
                ClientCode::BadConfig
            }
            SvcMetricsError::AuthFailed(_) => ClientCode::AuthFailed,
            SvcMetricsError::Directory(_) => ClientCode::Directory,
            SvcMetricsError::BatchTooLarge { .. }
            | SvcMetricsError::ProviderWarnings(_)
            | SvcMetricsError::UnexpectedNextPage
            | SvcMetricsError::MalformedExposition { .. }
            | SvcMetricsError::Provider(_) => ClientCode::Provider,
            SvcMetricsError::UnresolvedQueryId(_) | SvcMetricsError::Internal(_) => {
                ClientCode::Internal
            }
        }
    }
}
