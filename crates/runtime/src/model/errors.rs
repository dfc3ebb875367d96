use thiserror::Error;

/// Errors from LLM provider calls.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A network error occurred during the API call.
    #[error("network: {0}")]
    Network(String),

    /// The provider returned an error response.
    #[error("provider api: {0}")]
    Api(String),

    /// The provider stream could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}
