//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No config file at the expected path.
    #[error("config not found at {path}. Create a tiller.toml first")]
    ConfigNotFound { path: PathBuf },

    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(String),

    /// No credential in the config and none in the environment.
    #[error("no credential: set provider.credential or the TILLER_API_KEY environment variable")]
    MissingCredential,

    /// A secret_env entry names a variable absent from the environment.
    #[error("secret {key} for tool server '{server}' is not set in the environment")]
    MissingSecret { key: String, server: String },

    /// Provider/model assignment was rejected.
    #[error(transparent)]
    Assign(#[from] runtime::ConfigError),

    /// A tool server failed to connect.
    #[error(transparent)]
    Connect(#[from] runtime::ConnectError),

    /// A chat call failed outright.
    #[error(transparent)]
    Chat(#[from] runtime::ChatError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
