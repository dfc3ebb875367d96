//! Configuration loading from tiller.toml.

use crate::error::{Error, Result};
use policy::LaunchPolicy;
use runtime::LaunchSpec;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Environment fallback for the provider credential.
pub const CREDENTIAL_ENV: &str = "TILLER_API_KEY";

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Active provider selection.
    pub provider: ProviderConfig,

    /// Launch rules for tool servers.
    #[serde(default)]
    pub launch: LaunchPolicy,

    /// Tool servers to attach at startup.
    #[serde(default, rename = "tool_server")]
    pub tool_servers: Vec<ToolServerConfig>,
}

/// Provider selection.
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// Provider kind ("anthropic", "openai", "google").
    pub kind: String,

    /// Model to use.
    pub model: String,

    /// Credential. Falls back to the TILLER_API_KEY environment variable
    /// when absent, so keys can stay out of config files.
    pub credential: Option<String>,
}

/// One tool-server launch entry.
#[derive(Debug, Deserialize)]
pub struct ToolServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,

    /// Non-secret environment for the child process.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Names of secret variables to forward from this process's
    /// environment. Values never appear in the config file.
    #[serde(default)]
    pub secret_env: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Config(e.to_string()))
    }

    /// Resolve the credential from config or environment.
    pub fn credential(&self) -> Result<String> {
        if let Some(credential) = &self.provider.credential {
            return Ok(credential.clone());
        }
        std::env::var(CREDENTIAL_ENV).map_err(|_| Error::MissingCredential)
    }
}

impl ToolServerConfig {
    /// Build the launch spec, resolving secret names against the parent
    /// environment.
    pub fn launch_spec(&self) -> Result<LaunchSpec> {
        let mut secret_env = HashMap::new();
        for key in &self.secret_env {
            let value = std::env::var(key).map_err(|_| Error::MissingSecret {
                key: key.clone(),
                server: self.name.clone(),
            })?;
            secret_env.insert(key.clone(), value);
        }

        Ok(LaunchSpec {
            name: self.name.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            secret_env,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[provider]
kind = "google"
model = "gemini-2.5-flash"

[launch.allow]
commands = ["uvx"]

[[tool_server]]
name = "workspace"
command = "uvx"
args = ["workspace-mcp", "--tools", "gmail", "calendar", "drive"]
secret_env = ["GOOGLE_OAUTH_CLIENT_ID", "GOOGLE_OAUTH_CLIENT_SECRET"]
"#;

    #[test]
    fn parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.provider.kind, "google");
        assert_eq!(config.provider.model, "gemini-2.5-flash");
        assert!(config.provider.credential.is_none());

        assert_eq!(config.tool_servers.len(), 1);
        let server = &config.tool_servers[0];
        assert_eq!(server.name, "workspace");
        assert_eq!(server.secret_env.len(), 2);

        assert!(config.launch.check_launch("uvx", &server.args, []).is_allowed());
        assert!(!config.launch.check_launch("bash", &[], []).is_allowed());
    }

    #[test]
    fn missing_provider_section_is_a_config_error() {
        let err = Config::parse("[launch]\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let config = Config::parse(SAMPLE).unwrap();
        // Only set one of the two secrets.
        unsafe {
            std::env::set_var("GOOGLE_OAUTH_CLIENT_ID", "id-123");
            std::env::remove_var("GOOGLE_OAUTH_CLIENT_SECRET");
        }
        let err = config.tool_servers[0].launch_spec().unwrap_err();
        assert!(
            matches!(err, Error::MissingSecret { ref key, .. } if key == "GOOGLE_OAUTH_CLIENT_SECRET")
        );
    }
}
