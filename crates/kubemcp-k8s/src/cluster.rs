//! Cluster-wide read operations: namespaces, nodes, events, metrics and discovery

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Event, Namespace, Node};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::Api;
use kube::api::{ApiResource, DynamicObject, ListParams};
use kube::discovery::{Discovery, Scope};
use kubemcp_types::{
    ApiGroupInfo, ApiResourceInfo, ConditionInfo, CrdInfo, CrdVersionInfo, EventInfo,
    EventSourceInfo, NamespaceInfo, NodeInfo, NodeReadiness, ObjectRefInfo, ResourceAmounts,
};
use serde_json::{Value, json};
use tracing::debug;

use crate::client::KubeClient;
use crate::error::Result;
use crate::util;

impl KubeClient {
    /// Fetch all namespaces from the cluster
    pub async fn get_namespaces(&self, context: &str) -> Result<Vec<NamespaceInfo>> {
        let target = self.target(context).await?;
        let namespaces: Api<Namespace> = Api::all(target.client);
        let list = namespaces.list(&ListParams::default()).await?;

        Ok(list
            .items
            .into_iter()
            .map(|ns| {
                let name = ns.metadata.name.unwrap_or_default();
                let status = ns
                    .status
                    .and_then(|s| s.phase)
                    .unwrap_or_else(|| "Unknown".to_string());
                NamespaceInfo::new(name, status)
            })
            .collect())
    }

    /// Fetch all nodes with status, roles, addresses and resources
    pub async fn get_nodes(&self, context: &str) -> Result<Vec<NodeInfo>> {
        let target = self.target(context).await?;
        let nodes: Api<Node> = Api::all(target.client);
        let list = nodes.list(&ListParams::default()).await?;

        Ok(list.items.iter().map(node_to_info).collect())
    }

    /// Fetch events, newest first; `limit == 0` returns everything
    pub async fn get_events(
        &self,
        context: &str,
        namespace: &str,
        limit: usize,
    ) -> Result<Vec<EventInfo>> {
        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let events: Api<Event> = Api::namespaced(target.client, &ns);
        let list = events.list(&ListParams::default()).await?;

        Ok(newest_events(list.items, limit))
    }

    /// Node usage from metrics.k8s.io joined with node capacity
    pub async fn top_nodes(&self, context: &str) -> Result<Vec<Value>> {
        let target = self.target(context).await?;
        let metrics: Api<DynamicObject> =
            Api::all_with(target.client.clone(), &metrics_resource("NodeMetrics", "nodes"));
        let nodes: Api<Node> = Api::all(target.client);

        let lp = ListParams::default();
        let (metrics, nodes) = futures::try_join!(metrics.list(&lp), nodes.list(&lp))?;

        let by_name: BTreeMap<String, &Node> = nodes
            .items
            .iter()
            .filter_map(|n| n.metadata.name.clone().map(|name| (name, n)))
            .collect();

        Ok(metrics
            .items
            .iter()
            .map(|m| {
                let name = m.metadata.name.clone().unwrap_or_default();
                let node = by_name.get(&name);
                let status = node.and_then(|n| n.status.as_ref());
                let capacity = status
                    .and_then(|s| s.capacity.as_ref())
                    .map(amounts)
                    .unwrap_or_default();
                let conditions: Vec<Value> = status
                    .and_then(|s| s.conditions.as_ref())
                    .map(|conds| {
                        conds
                            .iter()
                            .map(|c| json!({"type": c.type_, "status": c.status, "reason": c.reason}))
                            .collect()
                    })
                    .unwrap_or_default();

                json!({
                    "name": name,
                    "usage": {
                        "cpu": m.data.pointer("/usage/cpu"),
                        "memory": m.data.pointer("/usage/memory"),
                    },
                    "capacity": capacity,
                    "conditions": conditions,
                })
            })
            .collect())
    }

    /// Per-container pod usage; all namespaces when `namespace` is None
    pub async fn top_pods(&self, context: &str, namespace: Option<&str>) -> Result<Vec<Value>> {
        let target = self.target(context).await?;
        let ar = metrics_resource("PodMetrics", "pods");
        let metrics: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(target.client, ns, &ar),
            None => Api::all_with(target.client, &ar),
        };
        let list = metrics.list(&ListParams::default()).await?;

        Ok(list
            .items
            .iter()
            .map(|pod| {
                let containers: Vec<Value> = pod
                    .data
                    .get("containers")
                    .and_then(Value::as_array)
                    .map(|cs| {
                        cs.iter()
                            .map(|c| {
                                json!({
                                    "name": c.get("name"),
                                    "usage": {
                                        "cpu": c.pointer("/usage/cpu"),
                                        "memory": c.pointer("/usage/memory"),
                                    }
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                json!({
                    "name": pod.metadata.name,
                    "namespace": pod.metadata.namespace,
                    "containers": containers,
                })
            })
            .collect())
    }

    /// API groups with their preferred-version resources
    pub async fn get_apis(&self, context: &str) -> Result<Vec<ApiGroupInfo>> {
        let target = self.target(context).await?;
        let discovery = Discovery::new(target.client).run().await?;

        let mut groups: Vec<ApiGroupInfo> = discovery
            .groups()
            .map(|group| {
                let resources = group
                    .recommended_resources()
                    .into_iter()
                    .filter(|(ar, _)| !ar.plural.contains('/'))
                    .map(|(ar, caps)| ApiResourceInfo {
                        name: ar.plural,
                        kind: ar.kind,
                        namespaced: matches!(caps.scope, Scope::Namespaced),
                        verbs: caps.operations,
                    })
                    .collect();
                ApiGroupInfo {
                    name: group.name().to_string(),
                    preferred_version: group.preferred_version_or_latest().to_string(),
                    versions: group.versions().map(str::to_string).collect(),
                    resources,
                }
            })
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Discovered {} API groups", groups.len());
        Ok(groups)
    }

    /// CustomResourceDefinitions installed in the cluster
    pub async fn get_crds(&self, context: &str) -> Result<Vec<CrdInfo>> {
        let target = self.target(context).await?;
        let crds: Api<CustomResourceDefinition> = Api::all(target.client);
        let list = crds.list(&ListParams::default()).await?;

        Ok(list.items.iter().map(crd_to_info).collect())
    }
}

fn metrics_resource(kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: "metrics.k8s.io".into(),
        version: "v1beta1".into(),
        api_version: "metrics.k8s.io/v1beta1".into(),
        kind: kind.into(),
        plural: plural.into(),
    }
}

fn amounts(map: &BTreeMap<String, Quantity>) -> ResourceAmounts {
    ResourceAmounts {
        cpu: map.get("cpu").map(|q| q.0.clone()),
        memory: map.get("memory").map(|q| q.0.clone()),
        pods: map.get("pods").map(|q| q.0.clone()),
    }
}

/// Roles from `node-role.kubernetes.io/<role>` and `kubernetes.io/role`
pub(crate) fn node_roles(labels: Option<&BTreeMap<String, String>>) -> Vec<String> {
    let mut roles: Vec<String> = labels
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| {
                    if let Some(role) = k.strip_prefix("node-role.kubernetes.io/") {
                        Some(role.to_string())
                    } else if k == "kubernetes.io/role" {
                        Some(v.clone())
                    } else {
                        None
                    }
                })
                .filter(|r| !r.is_empty())
                .collect()
        })
        .unwrap_or_default();
    roles.sort();
    roles.dedup();
    if roles.is_empty() {
        roles.push("<none>".to_string());
    }
    roles
}

/// Convert a k8s Node to NodeInfo
pub(crate) fn node_to_info(node: &Node) -> NodeInfo {
    let mut info = NodeInfo::new(node.metadata.name.clone().unwrap_or_default());
    info.roles = node_roles(node.metadata.labels.as_ref());
    info.created = util::time(&node.metadata.creation_timestamp);
    info.unschedulable = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);

    if let Some(status) = &node.status {
        info.status = status
            .conditions
            .as_ref()
            .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
            .map(|c| match c.status.as_str() {
                "True" => NodeReadiness::Ready,
                "False" => NodeReadiness::NotReady,
                _ => NodeReadiness::Unknown,
            })
            .unwrap_or(NodeReadiness::Unknown);

        if let Some(addresses) = &status.addresses {
            for addr in addresses {
                match addr.type_.as_str() {
                    "InternalIP" => info.internal_ip = Some(addr.address.clone()),
                    "ExternalIP" => info.external_ip = Some(addr.address.clone()),
                    _ => {}
                }
            }
        }

        if let Some(node_info) = &status.node_info {
            info.kubelet_version = Some(node_info.kubelet_version.clone());
            info.os = Some(node_info.operating_system.clone());
            info.architecture = Some(node_info.architecture.clone());
        }

        info.capacity = status.capacity.as_ref().map(amounts).unwrap_or_default();
        info.allocatable = status.allocatable.as_ref().map(amounts).unwrap_or_default();
    }

    info
}

fn event_time(event: &Event) -> Option<chrono::DateTime<chrono::Utc>> {
    util::time(&event.last_timestamp)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| util::time(&event.metadata.creation_timestamp))
}

pub(crate) fn event_to_info(event: &Event) -> EventInfo {
    EventInfo {
        timestamp: event_time(event),
        type_: event.type_.clone(),
        reason: event.reason.clone(),
        message: event.message.clone(),
        count: event.count,
        source: event
            .source
            .as_ref()
            .map(|s| EventSourceInfo {
                component: s.component.clone(),
                host: s.host.clone(),
            })
            .unwrap_or_default(),
        involved_object: ObjectRefInfo {
            kind: event.involved_object.kind.clone(),
            namespace: event.involved_object.namespace.clone(),
            name: event.involved_object.name.clone(),
        },
    }
}

/// Sort events newest first and keep at most `limit` (0 keeps all)
pub(crate) fn newest_events(events: Vec<Event>, limit: usize) -> Vec<EventInfo> {
    let mut events: Vec<EventInfo> = events.iter().map(event_to_info).collect();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if limit > 0 {
        events.truncate(limit);
    }
    events
}

fn crd_to_info(crd: &CustomResourceDefinition) -> CrdInfo {
    let spec = &crd.spec;
    let mut names = BTreeMap::new();
    names.insert("plural".to_string(), json!(spec.names.plural));
    names.insert("singular".to_string(), json!(spec.names.singular));
    names.insert("kind".to_string(), json!(spec.names.kind));
    names.insert("listKind".to_string(), json!(spec.names.list_kind));
    names.insert("shortNames".to_string(), json!(spec.names.short_names));

    let versions: Vec<CrdVersionInfo> = spec
        .versions
        .iter()
        .map(|v| CrdVersionInfo {
            name: v.name.clone(),
            served: v.served,
            storage: v.storage,
        })
        .collect();

    let api_version = spec
        .versions
        .iter()
        .find(|v| v.storage)
        .or_else(|| spec.versions.first())
        .map(|v| format!("{}/{}/{}", spec.group, v.name, spec.names.plural));

    let conditions = crd
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .map(|c| ConditionInfo {
                    type_: c.type_.clone(),
                    status: c.status.clone(),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                    last_transition: util::time(&c.last_transition_time),
                })
                .collect()
        })
        .unwrap_or_default();

    CrdInfo {
        name: crd.metadata.name.clone().unwrap_or_default(),
        group: spec.group.clone(),
        scope: spec.scope.clone(),
        names,
        versions,
        created: util::time(&crd.metadata.creation_timestamp),
        api_resource_path: api_version,
        conditions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(value: Value) -> Node {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_node_roles() {
        let labels: BTreeMap<String, String> = [
            ("node-role.kubernetes.io/control-plane".to_string(), "".to_string()),
            ("node-role.kubernetes.io/master".to_string(), "".to_string()),
            ("kubernetes.io/hostname".to_string(), "n1".to_string()),
        ]
        .into();
        assert_eq!(node_roles(Some(&labels)), vec!["control-plane", "master"]);
        assert_eq!(node_roles(None), vec!["<none>"]);

        let legacy: BTreeMap<String, String> =
            [("kubernetes.io/role".to_string(), "worker".to_string())].into();
        assert_eq!(node_roles(Some(&legacy)), vec!["worker"]);
    }

    #[test]
    fn test_node_to_info() {
        let n = node(json!({
            "metadata": {"name": "n1", "labels": {"node-role.kubernetes.io/worker": ""}},
            "spec": {"unschedulable": true},
            "status": {
                "conditions": [{"type": "Ready", "status": "False"}],
                "addresses": [
                    {"type": "InternalIP", "address": "10.0.0.5"},
                    {"type": "Hostname", "address": "n1"}
                ],
                "capacity": {"cpu": "4", "memory": "16Gi", "pods": "110"},
                "allocatable": {"cpu": "3800m"}
            }
        }));

        let info = node_to_info(&n);
        assert_eq!(info.name, "n1");
        assert_eq!(info.status, NodeReadiness::NotReady);
        assert_eq!(info.roles, vec!["worker"]);
        assert_eq!(info.internal_ip.as_deref(), Some("10.0.0.5"));
        assert!(info.external_ip.is_none());
        assert!(info.unschedulable);
        assert_eq!(info.capacity.pods.as_deref(), Some("110"));
        assert_eq!(info.allocatable.cpu.as_deref(), Some("3800m"));
        assert!(info.allocatable.memory.is_none());
    }

    #[test]
    fn test_events_sorted_newest_first() {
        let events: Vec<Event> = vec![
            json!({"metadata": {"name": "a", "creationTimestamp": "2024-01-01T00:00:00Z"},
                   "involvedObject": {}, "reason": "old"}),
            json!({"metadata": {"name": "b"}, "involvedObject": {},
                   "lastTimestamp": "2024-03-01T00:00:00Z", "reason": "newest"}),
            json!({"metadata": {"name": "c"}, "involvedObject": {},
                   "eventTime": "2024-02-01T00:00:00.000000Z", "reason": "middle"}),
        ]
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect();

        let sorted = newest_events(events.clone(), 0);
        let reasons: Vec<_> = sorted.iter().map(|e| e.reason.clone().unwrap()).collect();
        assert_eq!(reasons, vec!["newest", "middle", "old"]);

        assert_eq!(newest_events(events, 2).len(), 2);
    }

    #[test]
    fn test_crd_api_path_prefers_storage_version() {
        let crd: CustomResourceDefinition = serde_json::from_value(json!({
            "metadata": {"name": "widgets.example.com"},
            "spec": {
                "group": "example.com",
                "scope": "Namespaced",
                "names": {"plural": "widgets", "kind": "Widget"},
                "versions": [
                    {"name": "v1alpha1", "served": true, "storage": false},
                    {"name": "v1", "served": true, "storage": true}
                ]
            }
        }))
        .unwrap();

        let info = crd_to_info(&crd);
        assert_eq!(info.api_resource_path.as_deref(), Some("example.com/v1/widgets"));
        assert_eq!(info.versions.len(), 2);
        assert_eq!(info.names["kind"], "Widget");
    }
}
