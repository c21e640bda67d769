mod chat;
mod deployments;
mod observability;
mod server;
mod store;
mod tools;

pub use chat::*;
pub use deployments::*;
pub use observability::*;
pub use server::*;
pub use store::*;
pub use tools::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::agent::{Agent, DEFAULT_AGENT_ID};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub deployments: DeploymentsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Agents seeded into the store at startup, next to the built-in
    /// default agent.
    #[serde(default)]
    pub agents: Vec<Agent>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.stream.ping_interval_secs == 0 {
            errors.push(ConfigError::error(
                "server.stream.ping_interval_secs",
                "ping interval must be greater than 0",
            ));
        }
        if self.server.stream.channel_capacity == 0 {
            errors.push(ConfigError::error(
                "server.stream.channel_capacity",
                "channel capacity must be greater than 0",
            ));
        }
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        if self.chat.default_model.trim().is_empty() {
            errors.push(ConfigError::error(
                "chat.default_model",
                "default model must not be empty",
            ));
        }

        // Deployments.
        if self.deployments.providers.is_empty() {
            errors.push(ConfigError::warning(
                "deployments.providers",
                "no deployments configured; chat endpoints will reject requests",
            ));
        }
        let mut seen = HashSet::new();
        for (i, dep) in self.deployments.providers.iter().enumerate() {
            if dep.name.is_empty() {
                errors.push(ConfigError::error(
                    format!("deployments.providers[{i}].name"),
                    "deployment name must not be empty",
                ));
            } else if !seen.insert(dep.name.as_str()) {
                errors.push(ConfigError::error(
                    format!("deployments.providers[{i}].name"),
                    format!("duplicate deployment name \"{}\"", dep.name),
                ));
            }
            if dep.base_url.is_empty() {
                errors.push(ConfigError::error(
                    format!("deployments.providers[{i}].base_url"),
                    "base_url must not be empty",
                ));
            }
        }
        if let Some(default) = &self.deployments.default {
            if !seen.contains(default.as_str()) {
                errors.push(ConfigError::error(
                    "deployments.default",
                    format!("default deployment \"{default}\" is not configured"),
                ));
            }
        }

        // Agents.
        let mut agent_ids = HashSet::new();
        for (i, agent) in self.agents.iter().enumerate() {
            if agent.id == DEFAULT_AGENT_ID {
                errors.push(ConfigError::error(
                    format!("agents[{i}].id"),
                    "\"default\" is reserved for the built-in agent",
                ));
            } else if !agent_ids.insert(agent.id.as_str()) {
                errors.push(ConfigError::error(
                    format!("agents[{i}].id"),
                    format!("duplicate agent id \"{}\"", agent.id),
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(issues: &[ConfigError], field: &str) -> bool {
        issues
            .iter()
            .any(|e| e.severity == ConfigSeverity::Error && e.field == field)
    }

    #[test]
    fn default_config_only_warns() {
        let issues = Config::default().validate();
        assert!(issues.iter().all(|e| e.severity == ConfigSeverity::Warning));
        assert!(issues.iter().any(|e| e.field == "deployments.providers"));
    }

    #[test]
    fn unknown_default_deployment_is_an_error() {
        let cfg: Config = toml::from_str(
            r#"
            [deployments]
            default = "missing"

            [[deployments.providers]]
            name = "cohere"
        "#,
        )
        .unwrap();
        assert!(has_error(&cfg.validate(), "deployments.default"));
    }

    #[test]
    fn duplicate_deployment_names_are_errors() {
        let cfg: Config = toml::from_str(
            r#"
            [[deployments.providers]]
            name = "cohere"

            [[deployments.providers]]
            name = "cohere"
        "#,
        )
        .unwrap();
        assert!(has_error(&cfg.validate(), "deployments.providers[1].name"));
    }

    #[test]
    fn reserved_agent_id_is_an_error() {
        let cfg: Config = toml::from_str(
            r#"
            [[agents]]
            id = "default"
            name = "Shadow"
        "#,
        )
        .unwrap();
        assert!(has_error(&cfg.validate(), "agents[0].id"));
    }

    #[test]
    fn display_includes_severity_tag() {
        let issue = ConfigError::warning("server.cors.allowed_origins", "wildcard");
        assert_eq!(issue.to_string(), "[WARN] server.cors.allowed_origins: wildcard");
    }
}
