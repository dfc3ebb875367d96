use thiserror::Error;

/// Errors from provider/model configuration.
///
/// Configuration failures are client errors: they are surfaced
/// synchronously and never retried.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The credential does not match the allowed token syntax
    /// (alphanumeric, `-`, `_`).
    #[error("invalid credential format")]
    InvalidCredentialFormat,

    /// The named provider is not one of the supported kinds.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
}

/// Errors from connecting a tool server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// The launch spec was rejected before any process was spawned.
    #[error("launch denied: {0}")]
    LaunchDenied(String),

    /// The tool-server process could not be started.
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    /// The process started but did not complete the tool-advertisement
    /// handshake in time.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Errors terminating a chat request.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ChatError {
    /// No provider has been assigned yet.
    #[error("no provider configured")]
    NotConfigured,

    /// The provider transport failed mid-call. Output streamed before the
    /// failure remains valid.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
}
