//! Deployment registry.
//!
//! Constructs and holds every configured deployment adapter. At startup the
//! registry reads the [`DeploymentsConfig`], resolves authentication and
//! instantiates the adapter for each deployment's `kind`.

use std::collections::HashMap;
use std::sync::Arc;

use ck_domain::config::{DeploymentKind, DeploymentsConfig};
use ck_domain::error::{Error, Result};

use crate::cohere::CohereAdapter;
use crate::traits::{DeploymentInfo, GenerationAdapter};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DeploymentRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DeploymentRegistry {
    adapters: HashMap<String, Arc<dyn GenerationAdapter>>,
    /// Configured deployments that failed to initialize, with the reason.
    failed: HashMap<String, (Vec<String>, String)>,
    default: Option<String>,
    require_header: bool,
}

impl DeploymentRegistry {
    /// An empty registry. Tests and embedders register adapters by hand.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            failed: HashMap::new(),
            default: None,
            require_header: false,
        }
    }

    /// Build the registry from config.
    ///
    /// Deployments that fail to initialize are logged and skipped rather
    /// than aborting startup; they still show up in [`list`](Self::list) as
    /// unavailable.
    pub fn from_config(config: &DeploymentsConfig) -> Self {
        let mut registry = Self::new();
        registry.default = config.default_name().map(String::from);
        registry.require_header = config.require_header;

        for dc in &config.providers {
            let result: Result<Arc<dyn GenerationAdapter>> = match dc.kind {
                DeploymentKind::Cohere => CohereAdapter::from_config(dc)
                    .map(|a| Arc::new(a) as Arc<dyn GenerationAdapter>),
            };

            match result {
                Ok(adapter) => {
                    tracing::info!(
                        deployment = %dc.name,
                        kind = ?dc.kind,
                        models = dc.models.len(),
                        "registered deployment"
                    );
                    registry.adapters.insert(dc.name.clone(), adapter);
                }
                Err(e) => {
                    tracing::warn!(
                        deployment = %dc.name,
                        kind = ?dc.kind,
                        error = %e,
                        "failed to initialize deployment, skipping"
                    );
                    registry
                        .failed
                        .insert(dc.name.clone(), (dc.models.clone(), e.to_string()));
                }
            }
        }

        if registry.adapters.is_empty() {
            tracing::warn!("no deployments initialized; chat endpoints will fail until one is configured");
        }

        registry
    }

    /// Register an adapter under its own deployment name. Returns self for
    /// chaining. The first registered adapter becomes the default unless one
    /// is already set.
    pub fn register(mut self, adapter: Arc<dyn GenerationAdapter>) -> Self {
        let name = adapter.deployment().to_owned();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.failed.remove(&name);
        self.adapters.insert(name, adapter);
        self
    }

    pub fn with_require_header(mut self, require: bool) -> Self {
        self.require_header = require;
        self
    }

    /// Look up an adapter by deployment name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Pick the adapter for a request's `Deployment-Name` header.
    ///
    /// An unknown name is an error, as is a missing header when the header
    /// is required. Otherwise a missing header selects the default.
    pub fn select(&self, header: Option<&str>) -> Result<Arc<dyn GenerationAdapter>> {
        let name = match header.map(str::trim).filter(|h| !h.is_empty()) {
            Some(name) => name,
            None if self.require_header => {
                return Err(Error::Deployment(
                    "the Deployment-Name header is required".into(),
                ))
            }
            None => self
                .default
                .as_deref()
                .ok_or_else(|| Error::Deployment("no deployment is configured".into()))?,
        };

        if let Some(adapter) = self.adapters.get(name) {
            return Ok(adapter.clone());
        }
        match self.failed.get(name) {
            Some((_, reason)) => Err(Error::Deployment(format!(
                "deployment '{name}' is not available: {reason}"
            ))),
            None => Err(Error::Deployment(format!("unknown deployment '{name}'"))),
        }
    }

    /// Every configured deployment, available or not, sorted by name.
    pub fn list(&self) -> Vec<DeploymentInfo> {
        let default = self.default.as_deref();
        let mut infos: Vec<DeploymentInfo> = self
            .adapters
            .values()
            .map(|a| DeploymentInfo {
                name: a.deployment().to_owned(),
                models: a.models().to_vec(),
                is_available: true,
                is_default: Some(a.deployment()) == default,
                error: None,
            })
            .chain(self.failed.iter().map(|(name, (models, reason))| DeploymentInfo {
                name: name.clone(),
                models: models.clone(),
                is_available: false,
                is_default: Some(name.as_str()) == default,
                error: Some(reason.clone()),
            }))
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of usable deployments.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for DeploymentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_domain::config::{AuthConfig, DeploymentConfig};

    fn deployment(name: &str, key: Option<&str>) -> DeploymentConfig {
        DeploymentConfig {
            name: name.into(),
            kind: DeploymentKind::Cohere,
            base_url: "https://api.example.com".into(),
            auth: AuthConfig {
                key: key.map(String::from),
                env: None,
            },
            models: vec!["command-r".into()],
            timeout_secs: 5,
        }
    }

    fn config(require_header: bool) -> DeploymentsConfig {
        DeploymentsConfig {
            default: None,
            require_header,
            providers: vec![deployment("primary", Some("k1")), deployment("broken", None)],
        }
    }

    #[test]
    fn failed_deployments_are_listed_unavailable() {
        let reg = DeploymentRegistry::from_config(&config(false));
        assert_eq!(reg.len(), 1);
        let list = reg.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "broken");
        assert!(!list[0].is_available);
        assert!(list[0].error.is_some());
        assert!(list[1].is_available);
        assert!(list[1].is_default);
    }

    #[test]
    fn select_by_header_and_default() {
        let reg = DeploymentRegistry::from_config(&config(false));
        assert_eq!(reg.select(Some("primary")).unwrap().deployment(), "primary");
        assert_eq!(reg.select(None).unwrap().deployment(), "primary");
        assert_eq!(reg.select(Some("  ")).unwrap().deployment(), "primary");
    }

    #[test]
    fn select_rejects_unknown_and_unavailable() {
        let reg = DeploymentRegistry::from_config(&config(false));
        let unknown = reg.select(Some("nope")).err().unwrap();
        assert!(unknown.to_string().contains("unknown deployment 'nope'"));
        let broken = reg.select(Some("broken")).err().unwrap();
        assert!(broken.to_string().contains("not available"));
    }

    #[test]
    fn select_requires_header_when_configured() {
        let reg = DeploymentRegistry::from_config(&config(true));
        assert!(matches!(reg.select(None), Err(Error::Deployment(_))));
        assert!(reg.select(Some("primary")).is_ok());
    }

    #[test]
    fn empty_registry_has_no_default() {
        let reg = DeploymentRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.select(None).is_err());
    }
}
