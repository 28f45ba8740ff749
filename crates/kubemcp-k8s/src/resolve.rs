//! Resource kind resolution through API discovery

use kube::api::{Api, DynamicObject};
use kube::core::{GroupVersion, GroupVersionKind};
use kube::discovery::{self, ApiCapabilities, ApiGroup, ApiResource, Discovery, Scope};
use tracing::debug;

use crate::error::{K8sError, Result};

/// A resource kind resolved against a live cluster
#[derive(Clone, Debug)]
pub struct ResolvedKind {
    pub resource: ApiResource,
    pub capabilities: ApiCapabilities,
}

impl ResolvedKind {
    pub fn namespaced(&self) -> bool {
        matches!(self.capabilities.scope, Scope::Namespaced)
    }

    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    /// Build a dynamic Api; `None` lists across all namespaces.
    /// The namespace is ignored for cluster-scoped kinds.
    pub fn api(&self, client: &kube::Client, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if self.namespaced() => {
                Api::namespaced_with(client.clone(), ns, &self.resource)
            }
            _ => Api::all_with(client.clone(), &self.resource),
        }
    }
}

const ALIASES: &[(&[&str], &str)] = &[
    (&["deploy", "deployment"], "deployments"),
    (&["sts", "statefulset"], "statefulsets"),
    (&["ds", "daemonset"], "daemonsets"),
    (&["rs", "replicaset"], "replicasets"),
    (&["po", "pod"], "pods"),
    (&["svc", "service"], "services"),
    (&["cm", "configmap"], "configmaps"),
    (&["ns", "namespace"], "namespaces"),
    (&["no", "node"], "nodes"),
    (&["pv", "persistentvolume"], "persistentvolumes"),
    (&["pvc", "persistentvolumeclaim"], "persistentvolumeclaims"),
    (&["sa", "serviceaccount"], "serviceaccounts"),
    (&["ing", "ingress"], "ingresses"),
    (&["cj", "cronjob"], "cronjobs"),
    (&["job"], "jobs"),
    (&["hpa", "horizontalpodautoscaler"], "horizontalpodautoscalers"),
    (&["crd", "crds", "customresourcedefinition"], "customresourcedefinitions"),
    (&["ep", "endpoint"], "endpoints"),
    (&["netpol", "networkpolicy"], "networkpolicies"),
    (&["secret"], "secrets"),
    (&["ev", "event"], "events"),
];

/// Lowercase a kind and expand short names to the plural resource name
pub fn normalize_kind(kind: &str) -> String {
    let lower = kind.trim().to_lowercase();
    ALIASES
        .iter()
        .find(|(names, _)| names.contains(&lower.as_str()))
        .map(|(_, plural)| plural.to_string())
        .unwrap_or(lower)
}

/// API group a well-known resource lives in when none is given
pub fn default_group(plural: &str) -> Option<&'static str> {
    match plural {
        "deployments" | "statefulsets" | "daemonsets" | "replicasets" | "controllerrevisions" => {
            Some("apps")
        }
        "ingresses" | "networkpolicies" | "ingressclasses" => Some("networking.k8s.io"),
        "jobs" | "cronjobs" => Some("batch"),
        "horizontalpodautoscalers" => Some("autoscaling"),
        "customresourcedefinitions" => Some("apiextensions.k8s.io"),
        _ => None,
    }
}

fn matches(ar: &ApiResource, input: &str, plural: &str) -> bool {
    let kind = ar.kind.to_lowercase();
    ar.plural == plural || ar.plural == input || kind == input || kind == plural
}

fn find_in_group(
    group: &ApiGroup,
    input: &str,
    plural: &str,
) -> Option<(ApiResource, ApiCapabilities)> {
    group
        .recommended_resources()
        .into_iter()
        // subresources like pods/log are listed as separate resources
        .filter(|(ar, _)| !ar.plural.contains('/'))
        .find(|(ar, _)| matches(ar, input, plural))
}

/// Resolve a user-supplied kind (plural, singular, Kind or short name).
///
/// With a group the lookup is limited to that group (and version, when
/// given). Without one, well-known kinds use their default group and
/// everything else prefers the core group, then other groups by name.
pub async fn resolve_kind(
    client: &kube::Client,
    kind: &str,
    group: Option<&str>,
    version: Option<&str>,
) -> Result<ResolvedKind> {
    let input = kind.trim().to_lowercase();
    let plural = normalize_kind(kind);
    if input.is_empty() {
        return Err(K8sError::InvalidInput("resource kind is required".into()));
    }

    let group = group
        .filter(|g| !g.is_empty())
        .or_else(|| default_group(&plural));

    let found = match (group, version.filter(|v| !v.is_empty())) {
        (Some(g), Some(v)) => {
            let api_group = discovery::pinned_group(client, &GroupVersion::gv(g, v)).await?;
            find_in_group(&api_group, &input, &plural)
        }
        (Some(g), None) => {
            let api_group = discovery::group(client, g).await?;
            find_in_group(&api_group, &input, &plural)
        }
        (None, Some(v)) => {
            let api_group =
                discovery::pinned_group(client, &GroupVersion::gv(ApiGroup::CORE_GROUP, v))
                    .await?;
            find_in_group(&api_group, &input, &plural)
        }
        (None, None) => {
            let core = discovery::group(client, ApiGroup::CORE_GROUP).await?;
            match find_in_group(&core, &input, &plural) {
                Some(found) => Some(found),
                None => {
                    let discovery = Discovery::new(client.clone()).run().await?;
                    let mut groups: Vec<&ApiGroup> = discovery
                        .groups()
                        .filter(|g| g.name() != ApiGroup::CORE_GROUP)
                        .collect();
                    groups.sort_by(|a, b| a.name().cmp(b.name()));
                    groups
                        .into_iter()
                        .find_map(|g| find_in_group(g, &input, &plural))
                }
            }
        }
    };

    let (resource, capabilities) = found.ok_or_else(|| {
        K8sError::NotFound(format!("resource type '{}' not found in cluster", kind))
    })?;

    debug!(
        "Resolved kind {} to {}/{}",
        kind, resource.api_version, resource.plural
    );
    Ok(ResolvedKind {
        resource,
        capabilities,
    })
}

/// Resolve the exact `apiVersion` + `kind` pair of a manifest
pub async fn resolve_manifest_kind(
    client: &kube::Client,
    api_version: &str,
    kind: &str,
) -> Result<ResolvedKind> {
    let (group, version) = split_api_version(api_version);
    let gvk = GroupVersionKind::gvk(group, version, kind);
    let (resource, capabilities) = discovery::pinned_kind(client, &gvk)
        .await
        .map_err(|e| match K8sError::from(e) {
            K8sError::Api { code: 404, .. } => {
                K8sError::NotFound(format!("kind {} not served by {}", kind, api_version))
            }
            other => other,
        })?;
    Ok(ResolvedKind {
        resource,
        capabilities,
    })
}

/// `apps/v1` -> (`apps`, `v1`); `v1` -> (``, `v1`)
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}
