//! Launch-spec validation rules.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variables that change how the loader or shell resolves
/// code. Setting these on a child is an injection vector, so they are
/// always refused regardless of the allow rules.
const DENIED_ENV: &[&str] = &["PATH", "IFS", "ENV", "BASH_ENV"];
const DENIED_ENV_PREFIXES: &[&str] = &["LD_", "DYLD_"];

/// Policy for launching tool-server processes, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchPolicy {
    #[serde(default)]
    pub allow: AllowRules,
}

/// Rules for allowed launches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowRules {
    /// Allowed commands (exact match, or `*` for any).
    #[serde(default)]
    pub commands: Vec<String>,
}

/// Result of a launch check.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn deny(reason: impl Into<String>) -> Self {
        Decision::Deny {
            reason: reason.into(),
        }
    }
}

impl LaunchPolicy {
    /// Load policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse policy from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }

    /// The default: nothing may be launched.
    pub fn restrictive() -> Self {
        Self::default()
    }

    /// Allow any command. Argument and environment checks still apply.
    pub fn permissive() -> Self {
        Self {
            allow: AllowRules {
                commands: vec!["*".to_string()],
            },
        }
    }

    /// Check one launch request: the command against the allow-list, every
    /// argument for control characters, every environment key for shape
    /// and loader-control names.
    pub fn check_launch<'a>(
        &self,
        command: &str,
        args: &[String],
        env_keys: impl IntoIterator<Item = &'a str>,
    ) -> Decision {
        if !self.command_allowed(command) {
            return Decision::deny(format!("command {command:?} not in allowlist"));
        }

        for arg in args {
            if arg.chars().any(|c| c.is_control()) {
                return Decision::deny(format!(
                    "argument {:?} contains control characters",
                    truncate(arg)
                ));
            }
        }

        for key in env_keys {
            if let Some(reason) = env_key_rejection(key) {
                return Decision::deny(reason);
            }
        }

        Decision::Allow
    }

    fn command_allowed(&self, command: &str) -> bool {
        self.allow
            .commands
            .iter()
            .any(|allowed| allowed == "*" || allowed == command)
    }
}

fn env_key_rejection(key: &str) -> Option<String> {
    let well_formed = !key.is_empty()
        && key.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !well_formed {
        return Some(format!("malformed environment key {:?}", truncate(key)));
    }

    if DENIED_ENV.contains(&key) || DENIED_ENV_PREFIXES.iter().any(|p| key.starts_with(p)) {
        return Some(format!("environment key {key:?} controls process loading"));
    }

    None
}

fn truncate(s: &str) -> String {
    if s.len() > 64 {
        format!("{}...", &s[..64])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_uvx() -> LaunchPolicy {
        LaunchPolicy {
            allow: AllowRules {
                commands: vec!["uvx".to_string()],
            },
        }
    }

    #[test]
    fn restrictive_denies_everything() {
        let policy = LaunchPolicy::restrictive();
        assert!(!policy.check_launch("uvx", &[], []).is_allowed());
    }

    #[test]
    fn allowlisted_command_passes() {
        let policy = allow_uvx();
        let args = vec!["workspace-mcp".to_string()];
        assert!(policy.check_launch("uvx", &args, []).is_allowed());
        assert!(!policy.check_launch("bash", &args, []).is_allowed());
    }

    #[test]
    fn control_characters_in_args_are_denied() {
        let policy = allow_uvx();
        let args = vec!["--flag\nvalue".to_string()];
        assert!(!policy.check_launch("uvx", &args, []).is_allowed());
    }

    #[test]
    fn loader_env_keys_are_denied() {
        let policy = allow_uvx();
        for key in ["LD_PRELOAD", "DYLD_INSERT_LIBRARIES", "PATH"] {
            assert!(
                !policy.check_launch("uvx", &[], [key]).is_allowed(),
                "{key} should be denied"
            );
        }
        assert!(
            policy
                .check_launch("uvx", &[], ["GOOGLE_OAUTH_CLIENT_ID"])
                .is_allowed()
        );
    }

    #[test]
    fn malformed_env_keys_are_denied() {
        let policy = allow_uvx();
        assert!(!policy.check_launch("uvx", &[], ["1BAD"]).is_allowed());
        assert!(!policy.check_launch("uvx", &[], ["WITH SPACE"]).is_allowed());
        assert!(!policy.check_launch("uvx", &[], [""]).is_allowed());
    }

    #[test]
    fn parse_toml() {
        let toml = r#"
[allow]
commands = ["uvx", "npx"]
"#;
        let policy = LaunchPolicy::parse(toml).unwrap();
        assert!(policy.check_launch("npx", &[], []).is_allowed());
        assert!(!policy.check_launch("python", &[], []).is_allowed());
    }
}
