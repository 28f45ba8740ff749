//! Node maintenance: cordon, drain and taints

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use k8s_openapi::api::core::v1::{Node, Pod, Taint};
use kube::Api;
use kube::api::{EvictParams, ListParams, Patch, PatchParams};
use kubemcp_types::{EvictionOutcome, EvictionStatus, TaintInfo};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::client::KubeClient;
use crate::error::{Result, invalid};

pub const TAINT_EFFECTS: &[&str] = &["NoSchedule", "PreferNoSchedule", "NoExecute"];

const MIRROR_ANNOTATION: &str = "kubernetes.io/config.mirror";

/// Flags controlling which pods a drain may evict
#[derive(Clone, Copy, Debug, Default)]
pub struct DrainOptions {
    pub force: bool,
    pub ignore_daemonsets: bool,
    pub delete_local_data: bool,
    pub timeout_secs: Option<u64>,
}

/// What a drain does with a single pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DrainAction {
    Evict,
    Skip(String),
    Refuse(String),
}

/// Decide how a drain treats `pod`
pub(crate) fn classify_pod(pod: &Pod, opts: &DrainOptions) -> DrainAction {
    let meta = &pod.metadata;
    if meta
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(MIRROR_ANNOTATION))
    {
        return DrainAction::Skip("mirror pod managed by the kubelet".into());
    }

    let owners = meta.owner_references.as_deref().unwrap_or_default();
    if owners.iter().any(|o| o.kind == "DaemonSet") {
        return if opts.ignore_daemonsets {
            DrainAction::Skip("DaemonSet-managed pod".into())
        } else {
            DrainAction::Refuse("DaemonSet-managed pod (set ignore_daemonsets to skip it)".into())
        };
    }

    let has_local_storage = pod
        .spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .is_some_and(|vols| vols.iter().any(|v| v.empty_dir.is_some()));
    if has_local_storage && !opts.delete_local_data && !opts.force {
        return DrainAction::Skip(
            "has emptyDir local storage and delete_local_data not set".into(),
        );
    }

    let managed = owners.iter().any(|o| o.controller.unwrap_or(false));
    if !managed && !opts.force {
        return DrainAction::Skip("not managed by a controller and force not set".into());
    }

    DrainAction::Evict
}

fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default()
    )
}

pub fn validate_effect(effect: &str) -> Result<()> {
    if TAINT_EFFECTS.contains(&effect) {
        Ok(())
    } else {
        Err(invalid(format!(
            "invalid taint effect '{}', must be one of: {}",
            effect,
            TAINT_EFFECTS.join(", ")
        )))
    }
}

/// Add `taint`, replacing any taint with the same key and effect
pub(crate) fn upsert_taint(taints: &mut Vec<Taint>, taint: Taint) {
    match taints
        .iter_mut()
        .find(|t| t.key == taint.key && t.effect == taint.effect)
    {
        Some(existing) => *existing = taint,
        None => taints.push(taint),
    }
}

/// Remove taints with `key` (and `effect` when given); returns how many went
pub(crate) fn remove_taints(taints: &mut Vec<Taint>, key: &str, effect: Option<&str>) -> usize {
    let before = taints.len();
    taints.retain(|t| !(t.key == key && effect.is_none_or(|e| t.effect == e)));
    before - taints.len()
}

fn taint_infos(node: &Node) -> Vec<TaintInfo> {
    node.spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|taints| {
            taints
                .iter()
                .map(|t| TaintInfo {
                    key: t.key.clone(),
                    value: t.value.clone(),
                    effect: t.effect.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

impl KubeClient {
    async fn set_unschedulable(&self, context: &str, node_name: &str, value: bool) -> Result<Value> {
        let target = self.target(context).await?;
        let nodes: Api<Node> = Api::all(target.client);
        let patch = json!({"spec": {"unschedulable": value}});
        let node = nodes
            .patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        let verb = if value { "cordoned" } else { "uncordoned" };
        info!("Node {} {} in context {}", node_name, verb, target.context.name);
        Ok(json!({
            "status": "Success",
            "message": format!("Successfully {} node '{}'", verb, node_name),
            "node": {
                "name": node.metadata.name,
                "unschedulable": node.spec.and_then(|s| s.unschedulable).unwrap_or(false),
            }
        }))
    }

    /// Mark a node unschedulable
    pub async fn cordon_node(&self, context: &str, node_name: &str) -> Result<Value> {
        self.set_unschedulable(context, node_name, true).await
    }

    /// Mark a node schedulable
    pub async fn uncordon_node(&self, context: &str, node_name: &str) -> Result<Value> {
        self.set_unschedulable(context, node_name, false).await
    }

    /// Cordon a node and evict its pods through the Eviction API
    pub async fn drain_node(
        &self,
        context: &str,
        node_name: &str,
        opts: DrainOptions,
    ) -> Result<Value> {
        self.cordon_node(context, node_name).await?;

        let target = self.target(context).await?;
        let pods: Api<Pod> = Api::all(target.client.clone());
        let list = pods
            .list(&ListParams::default().fields(&format!("spec.nodeName={}", node_name)))
            .await?;

        let mut results: Vec<EvictionOutcome> = Vec::new();
        let mut pending: Vec<(String, String, String)> = Vec::new();
        for pod in &list.items {
            let key = pod_key(pod);
            match classify_pod(pod, &opts) {
                DrainAction::Evict => pending.push((
                    key,
                    pod.metadata.namespace.clone().unwrap_or_default(),
                    pod.metadata.name.clone().unwrap_or_default(),
                )),
                DrainAction::Skip(reason) => {
                    results.push(EvictionOutcome::new(key, EvictionStatus::Skipped, reason))
                }
                DrainAction::Refuse(reason) => {
                    results.push(EvictionOutcome::new(key, EvictionStatus::Error, reason))
                }
            }
        }

        debug!(
            "Draining {}: {} pods to evict, {} skipped",
            node_name,
            pending.len(),
            results.len()
        );

        let timeout = self.settings().drain_timeout(opts.timeout_secs);
        let evicted = evict_all(&target.client, &pending, timeout).await;
        for (key, _, _) in &pending {
            let outcome = evicted.get(key).cloned().unwrap_or_else(|| {
                EvictionOutcome::new(
                    key.clone(),
                    EvictionStatus::TimedOut,
                    format!("not evicted within {}s", timeout.as_secs()),
                )
            });
            results.push(outcome);
        }

        let failed = results
            .iter()
            .filter(|r| matches!(r.status, EvictionStatus::Error | EvictionStatus::TimedOut))
            .count();
        if failed > 0 {
            warn!("Drain of {} left {} pods not evicted", node_name, failed);
        }

        let status = if failed == 0 { "Success" } else { "Partial" };
        Ok(json!({
            "status": status,
            "message": format!("Node '{}' drain operation completed", node_name),
            "eviction_results": results,
        }))
    }

    /// Add or replace a taint on a node
    pub async fn taint_node(
        &self,
        context: &str,
        node_name: &str,
        key: &str,
        value: Option<&str>,
        effect: &str,
    ) -> Result<Value> {
        validate_effect(effect)?;
        if key.is_empty() {
            return Err(invalid("taint key is required"));
        }

        let target = self.target(context).await?;
        let nodes: Api<Node> = Api::all(target.client);
        let node = nodes.get(node_name).await?;

        let mut taints = node
            .spec
            .and_then(|s| s.taints)
            .unwrap_or_default();
        upsert_taint(
            &mut taints,
            Taint {
                key: key.to_string(),
                value: value.map(str::to_string),
                effect: effect.to_string(),
                time_added: None,
            },
        );

        let patch = json!({"spec": {"taints": taints}});
        let node = nodes
            .patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        Ok(json!({
            "status": "Success",
            "message": format!("Successfully added taint to node '{}'", node_name),
            "node": {"name": node.metadata.name, "taints": taint_infos(&node)},
        }))
    }

    /// Remove taints by key, optionally limited to one effect
    pub async fn untaint_node(
        &self,
        context: &str,
        node_name: &str,
        key: &str,
        effect: Option<&str>,
    ) -> Result<Value> {
        if let Some(effect) = effect {
            validate_effect(effect)?;
        }

        let target = self.target(context).await?;
        let nodes: Api<Node> = Api::all(target.client);
        let node = nodes.get(node_name).await?;

        let mut taints = node
            .spec
            .as_ref()
            .and_then(|s| s.taints.clone())
            .unwrap_or_default();
        if remove_taints(&mut taints, key, effect) == 0 {
            return Ok(json!({
                "status": "Success",
                "message": format!("Node '{}' has no taint with key '{}'", node_name, key),
                "node": {"name": node.metadata.name, "taints": taint_infos(&node)},
            }));
        }

        let patch = json!({"spec": {"taints": taints}});
        let node = nodes
            .patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        Ok(json!({
            "status": "Success",
            "message": format!("Successfully removed taint(s) from node '{}'", node_name),
            "node": {"name": node.metadata.name, "taints": taint_infos(&node)},
        }))
    }
}

/// Evict pods concurrently until done or `timeout` elapses.
/// Pods missing from the returned map did not finish in time.
async fn evict_all(
    client: &kube::Client,
    pending: &[(String, String, String)],
    timeout: Duration,
) -> HashMap<String, EvictionOutcome> {
    let mut evictions: FuturesUnordered<_> = pending
        .iter()
        .map(|(key, namespace, name)| {
            let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
            async move {
                let outcome = match pods.evict(name, &EvictParams::default()).await {
                    Ok(_) => EvictionOutcome::new(
                        key.clone(),
                        EvictionStatus::Evicted,
                        "Successfully evicted",
                    ),
                    Err(e) => EvictionOutcome::new(
                        key.clone(),
                        EvictionStatus::Error,
                        format!("Failed to evict: {}", crate::error::K8sError::from(e)),
                    ),
                };
                (key.clone(), outcome)
            }
        })
        .collect();

    let deadline = tokio::time::Instant::now() + timeout;
    let mut done = HashMap::new();
    loop {
        match tokio::time::timeout_at(deadline, evictions.next()).await {
            Ok(Some((key, outcome))) => {
                done.insert(key, outcome);
            }
            Ok(None) => break,
            Err(_) => {
                warn!("Eviction phase timed out after {}s", timeout.as_secs());
                break;
            }
        }
    }
    done
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(value: Value) -> Pod {
        serde_json::from_value(value).unwrap()
    }

    fn owned_by(kind: &str) -> Value {
        json!([{"apiVersion": "apps/v1", "kind": kind, "name": "owner", "uid": "1", "controller": true}])
    }

    #[test]
    fn test_classify_mirror_pod() {
        let p = pod(json!({"metadata": {"name": "etcd", "namespace": "kube-system",
            "annotations": {"kubernetes.io/config.mirror": "abc"}}}));
        let opts = DrainOptions { force: true, ..Default::default() };
        assert!(matches!(classify_pod(&p, &opts), DrainAction::Skip(_)));
    }

    #[test]
    fn test_classify_daemonset_pod() {
        let p = pod(json!({"metadata": {"name": "fluentd", "ownerReferences": owned_by("DaemonSet")}}));

        assert!(matches!(
            classify_pod(&p, &DrainOptions::default()),
            DrainAction::Refuse(_)
        ));
        let opts = DrainOptions { ignore_daemonsets: true, ..Default::default() };
        assert_eq!(
            classify_pod(&p, &opts),
            DrainAction::Skip("DaemonSet-managed pod".into())
        );
    }

    #[test]
    fn test_classify_local_storage() {
        let p = pod(json!({
            "metadata": {"name": "cache", "ownerReferences": owned_by("ReplicaSet")},
            "spec": {"containers": [], "volumes": [{"name": "scratch", "emptyDir": {}}]}
        }));

        assert!(matches!(
            classify_pod(&p, &DrainOptions::default()),
            DrainAction::Skip(_)
        ));
        let opts = DrainOptions { delete_local_data: true, ..Default::default() };
        assert_eq!(classify_pod(&p, &opts), DrainAction::Evict);
        let opts = DrainOptions { force: true, ..Default::default() };
        assert_eq!(classify_pod(&p, &opts), DrainAction::Evict);
    }

    #[test]
    fn test_classify_unmanaged_pod() {
        let p = pod(json!({"metadata": {"name": "bare", "namespace": "default"}}));
        assert!(matches!(
            classify_pod(&p, &DrainOptions::default()),
            DrainAction::Skip(_)
        ));
        let opts = DrainOptions { force: true, ..Default::default() };
        assert_eq!(classify_pod(&p, &opts), DrainAction::Evict);

        let managed = pod(json!({"metadata": {"name": "web-1", "ownerReferences": owned_by("ReplicaSet")}}));
        assert_eq!(classify_pod(&managed, &DrainOptions::default()), DrainAction::Evict);
        assert_eq!(pod_key(&p), "default/bare");
    }

    #[test]
    fn test_validate_effect() {
        assert!(validate_effect("NoExecute").is_ok());
        assert!(validate_effect("noschedule").is_err());
        assert!(validate_effect("Never").is_err());
    }

    fn taint(key: &str, value: Option<&str>, effect: &str) -> Taint {
        Taint {
            key: key.into(),
            value: value.map(Into::into),
            effect: effect.into(),
            time_added: None,
        }
    }

    #[test]
    fn test_upsert_taint_replaces_same_key_and_effect() {
        let mut taints = vec![taint("dedicated", Some("a"), "NoSchedule")];
        upsert_taint(&mut taints, taint("dedicated", Some("b"), "NoSchedule"));
        assert_eq!(taints.len(), 1);
        assert_eq!(taints[0].value.as_deref(), Some("b"));

        upsert_taint(&mut taints, taint("dedicated", Some("b"), "NoExecute"));
        assert_eq!(taints.len(), 2);
    }

    #[test]
    fn test_remove_taints() {
        let mut taints = vec![
            taint("gpu", None, "NoSchedule"),
            taint("gpu", None, "NoExecute"),
            taint("zone", Some("a"), "NoSchedule"),
        ];
        assert_eq!(remove_taints(&mut taints, "gpu", Some("NoExecute")), 1);
        assert_eq!(taints.len(), 2);
        assert_eq!(remove_taints(&mut taints, "gpu", None), 1);
        assert_eq!(remove_taints(&mut taints, "missing", None), 0);
        assert_eq!(taints[0].key, "zone");
    }
}
