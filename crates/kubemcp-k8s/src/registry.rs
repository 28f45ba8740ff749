//! Context registry built from a directory of kubeconfig files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kube::config::Kubeconfig;
use kubemcp_types::ContextInfo;
use tracing::{debug, info, warn};

use crate::error::{K8sError, Result};

/// A context together with the kubeconfig file that defines it
#[derive(Clone, Debug)]
pub struct ContextEntry {
    pub name: String,
    pub cluster: String,
    pub user: String,
    pub namespace: Option<String>,
    pub server: Option<String>,
    pub source: PathBuf,
    pub is_current: bool,
    pub kubeconfig: Arc<Kubeconfig>,
}

impl ContextEntry {
    pub fn info(&self) -> ContextInfo {
        let mut info = ContextInfo::new(
            self.name.clone(),
            self.cluster.clone(),
            self.user.clone(),
            self.source.display().to_string(),
        );
        info.namespace = self.namespace.clone();
        info.server = self.server.clone();
        info.is_current = self.is_current;
        info
    }

    /// The context's default namespace, or `default`
    pub fn default_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }
}

/// Immutable map of every context found in the kubeconfig directory
#[derive(Debug)]
pub struct ContextRegistry {
    dir: PathBuf,
    contexts: BTreeMap<String, ContextEntry>,
}

impl ContextRegistry {
    /// Scan `path` for kubeconfig files.
    ///
    /// A path to a file is treated as its parent directory. Hidden files,
    /// non-files and files that do not parse as kubeconfig are skipped.
    /// A context name defined in two files is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dir = if path.is_file() {
            path.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            path.to_path_buf()
        };

        if !dir.is_dir() {
            return Err(K8sError::Config(format!(
                "kubeconfig directory {} does not exist",
                dir.display()
            )));
        }

        let mut files = std::fs::read_dir(&dir)
            .map_err(|e| {
                K8sError::Config(format!(
                    "cannot read kubeconfig directory {}: {}",
                    dir.display(),
                    e
                ))
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && !is_hidden(p))
            .collect::<Vec<_>>();
        files.sort();

        let mut contexts: BTreeMap<String, ContextEntry> = BTreeMap::new();
        for file in files {
            let kubeconfig = match Kubeconfig::read_from(&file) {
                Ok(kc) => kc,
                Err(e) => {
                    debug!("Skipping {}: {}", file.display(), e);
                    continue;
                }
            };

            for entry in entries_from(&file, kubeconfig) {
                if let Some(existing) = contexts.get(&entry.name) {
                    return Err(K8sError::Config(format!(
                        "duplicate context name '{}' in {} and {}",
                        entry.name,
                        existing.source.display(),
                        entry.source.display()
                    )));
                }
                contexts.insert(entry.name.clone(), entry);
            }
        }

        if contexts.is_empty() {
            return Err(K8sError::Config(format!(
                "no kubeconfig contexts found in {}",
                dir.display()
            )));
        }

        info!(
            "Loaded {} contexts from {}",
            contexts.len(),
            dir.display()
        );

        Ok(Self { dir, contexts })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.contexts.keys().cloned().collect()
    }

    /// All contexts, sorted by name
    pub fn list(&self) -> Vec<ContextInfo> {
        self.contexts.values().map(ContextEntry::info).collect()
    }

    /// Resolve a requested context name.
    ///
    /// An exact match wins; otherwise the name must be a substring of
    /// exactly one context.
    pub fn resolve(&self, requested: &str) -> Result<&ContextEntry> {
        if let Some(entry) = self.contexts.get(requested) {
            return Ok(entry);
        }

        let candidates: Vec<&ContextEntry> = if requested.is_empty() {
            Vec::new()
        } else {
            self.contexts
                .values()
                .filter(|e| e.name.contains(requested))
                .collect()
        };

        match candidates.as_slice() {
            [single] => {
                debug!("Context '{}' resolved to '{}'", requested, single.name);
                Ok(single)
            }
            [] => Err(K8sError::ContextNotFound {
                name: requested.to_string(),
                available: self.names(),
            }),
            many => {
                warn!("Context '{}' is ambiguous", requested);
                Err(K8sError::AmbiguousContext {
                    name: requested.to_string(),
                    candidates: many.iter().map(|e| e.name.clone()).collect(),
                })
            }
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn entries_from(file: &Path, kubeconfig: Kubeconfig) -> Vec<ContextEntry> {
    let kubeconfig = Arc::new(kubeconfig);
    kubeconfig
        .contexts
        .iter()
        .map(|ctx| {
            let context = ctx.context.as_ref();
            let cluster = context.map(|c| c.cluster.clone()).unwrap_or_default();
            let server = kubeconfig
                .clusters
                .iter()
                .find(|c| c.name == cluster)
                .and_then(|c| c.cluster.as_ref())
                .and_then(|c| c.server.clone());

            ContextEntry {
                name: ctx.name.clone(),
                user: context.and_then(|c| c.user.clone()).unwrap_or_default(),
                namespace: context.and_then(|c| c.namespace.clone()),
                server,
                cluster,
                source: file.to_path_buf(),
                is_current: kubeconfig.current_context.as_deref() == Some(ctx.name.as_str()),
                kubeconfig: Arc::clone(&kubeconfig),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    pub(crate) fn kubeconfig_yaml(contexts: &[&str], current: &str) -> String {
        let mut yaml = String::from("apiVersion: v1\nkind: Config\nclusters:\n");
        for ctx in contexts {
            yaml.push_str(&format!(
                "- name: {ctx}-cluster\n  cluster:\n    server: https://{ctx}.example.com:6443\n"
            ));
        }
        yaml.push_str("users:\n");
        for ctx in contexts {
            yaml.push_str(&format!("- name: {ctx}-user\n  user:\n    token: abc\n"));
        }
        yaml.push_str("contexts:\n");
        for ctx in contexts {
            yaml.push_str(&format!(
                "- name: {ctx}\n  context:\n    cluster: {ctx}-cluster\n    user: {ctx}-user\n    namespace: team-{ctx}\n"
            ));
        }
        yaml.push_str(&format!("current-context: {current}\n"));
        yaml
    }

    pub(crate) fn registry_with(files: &[(&str, &[&str])]) -> (tempfile::TempDir, ContextRegistry) {
        let dir = tempfile::tempdir().unwrap();
        for (file, contexts) in files {
            fs::write(dir.path().join(file), kubeconfig_yaml(contexts, contexts[0])).unwrap();
        }
        let registry = ContextRegistry::load(dir.path()).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_load_multiple_files() {
        let (dir, registry) = registry_with(&[
            ("prod", &["prod-eu", "prod-us"]),
            ("dev", &["dev"]),
        ]);

        assert_eq!(registry.names(), vec!["dev", "prod-eu", "prod-us"]);

        let contexts = registry.list();
        let prod_eu = &contexts[1];
        assert_eq!(prod_eu.cluster, "prod-eu-cluster");
        assert_eq!(prod_eu.user, "prod-eu-user");
        assert_eq!(prod_eu.namespace.as_deref(), Some("team-prod-eu"));
        assert_eq!(
            prod_eu.server.as_deref(),
            Some("https://prod-eu.example.com:6443")
        );
        assert!(prod_eu.is_current);
        assert!(!contexts[2].is_current);
        assert_eq!(
            prod_eu.source,
            dir.path().join("prod").display().to_string()
        );
    }

    #[test]
    fn test_duplicate_context_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), kubeconfig_yaml(&["shared"], "shared")).unwrap();
        fs::write(dir.path().join("b"), kubeconfig_yaml(&["shared"], "shared")).unwrap();

        let err = ContextRegistry::load(dir.path()).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, K8sError::Config(_)));
        assert!(msg.contains("shared"));
        assert!(msg.contains("/a") && msg.contains("/b"));
    }

    #[test]
    fn test_empty_and_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ContextRegistry::load(dir.path()),
            Err(K8sError::Config(_))
        ));
        assert!(matches!(
            ContextRegistry::load(dir.path().join("nope")),
            Err(K8sError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_and_hidden_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config"), kubeconfig_yaml(&["kind"], "kind")).unwrap();
        fs::write(dir.path().join("notes.txt"), "{{ not: yaml: at all").unwrap();
        fs::write(dir.path().join(".hidden"), kubeconfig_yaml(&["hidden"], "hidden")).unwrap();
        fs::create_dir(dir.path().join("cache")).unwrap();

        let registry = ContextRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.names(), vec!["kind"]);
    }

    #[test]
    fn test_file_path_uses_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config");
        fs::write(&file, kubeconfig_yaml(&["one"], "one")).unwrap();
        fs::write(dir.path().join("other"), kubeconfig_yaml(&["two"], "two")).unwrap();

        let registry = ContextRegistry::load(&file).unwrap();
        assert_eq!(registry.dir(), dir.path());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_resolve_exact_and_substring() {
        let (_dir, registry) = registry_with(&[("all", &["prod", "prod-eu", "staging"])]);

        // exact match beats substring ambiguity
        assert_eq!(registry.resolve("prod").unwrap().name, "prod");
        assert_eq!(registry.resolve("stag").unwrap().name, "staging");
        assert_eq!(registry.resolve("eu").unwrap().name, "prod-eu");

        match registry.resolve("pro") {
            Err(K8sError::AmbiguousContext { candidates, .. }) => {
                assert_eq!(candidates, vec!["prod", "prod-eu"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }

        match registry.resolve("qa") {
            Err(K8sError::ContextNotFound { available, .. }) => assert_eq!(available.len(), 3),
            other => panic!("expected not found, got {other:?}"),
        }

        assert!(registry.resolve("").is_err());
    }

    #[test]
    fn test_default_namespace() {
        let (_dir, registry) = registry_with(&[("c", &["kind"])]);
        assert_eq!(registry.resolve("kind").unwrap().default_namespace(), "team-kind");
    }
}
