//! Kubernetes client for kubemcp

use std::collections::HashMap;
use std::sync::Arc;

use kube::config::KubeConfigOptions;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{K8sError, Result};
use crate::registry::{ContextEntry, ContextRegistry};
use crate::settings::Settings;

/// Kubernetes client wrapper.
///
/// Holds the context registry and one lazily built `kube::Client` per
/// context. Cheap to share behind an `Arc`.
pub struct KubeClient {
    registry: Arc<ContextRegistry>,
    settings: Settings,
    clients: RwLock<HashMap<String, kube::Client>>,
}

/// A resolved context paired with its client
pub struct Target<'a> {
    pub context: &'a ContextEntry,
    pub client: kube::Client,
}

impl Target<'_> {
    /// Explicit namespace, else the context default
    pub fn namespace_or_default<'n>(&'n self, namespace: Option<&'n str>) -> &'n str {
        match namespace {
            Some(ns) if !ns.is_empty() => ns,
            _ => self.context.default_namespace(),
        }
    }
}

impl KubeClient {
    pub fn new(registry: ContextRegistry, settings: Settings) -> Self {
        Self {
            registry: Arc::new(registry),
            settings,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve a context name without touching the network
    pub fn resolve(&self, context: &str) -> Result<&ContextEntry> {
        self.registry.resolve(context)
    }

    /// Resolve a context and return its (cached) client
    pub async fn target(&self, context: &str) -> Result<Target<'_>> {
        let entry = self.registry.resolve(context)?;
        let client = self.client_for_context(entry).await?;
        Ok(Target {
            context: entry,
            client,
        })
    }

    /// Create (or reuse) a kube::Client for a specific context
    pub async fn client_for_context(&self, entry: &ContextEntry) -> Result<kube::Client> {
        if let Some(client) = self.clients.read().get(&entry.name) {
            return Ok(client.clone());
        }

        debug!(
            "Building client for context {} from {}",
            entry.name,
            entry.source.display()
        );

        let config = kube::Config::from_custom_kubeconfig(
            (*entry.kubeconfig).clone(),
            &KubeConfigOptions {
                context: Some(entry.name.clone()),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| K8sError::Connect {
            context: entry.name.clone(),
            message: format!("failed to create config: {}", e),
        })?;

        let client = kube::Client::try_from(config).map_err(|e| K8sError::Connect {
            context: entry.name.clone(),
            message: format!("failed to create client: {}", e),
        })?;

        // Two concurrent first calls may both build; keep whichever landed first.
        let client = self
            .clients
            .write()
            .entry(entry.name.clone())
            .or_insert(client)
            .clone();

        info!("Connected client for context {}", entry.name);
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::registry_with;

    #[tokio::test]
    async fn test_unknown_context_rejected_before_connecting() {
        let (_dir, registry) = registry_with(&[("c", &["dev"])]);
        let kube = KubeClient::new(registry, Settings::default());

        let err = kube.target("prod").await.err().unwrap();
        assert!(err.is_local());
        assert!(kube.clients.read().is_empty());
    }

    #[test]
    fn test_namespace_fallback() {
        let (_dir, registry) = registry_with(&[("c", &["dev"])]);
        let kube = KubeClient::new(registry, Settings::default());
        let entry = kube.resolve("dev").unwrap();
        assert_eq!(entry.default_namespace(), "team-dev");
    }
}
