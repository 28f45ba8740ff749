//! kubectl-describe style summaries for any resource kind

use std::fmt::Write as _;

use k8s_openapi::api::core::v1::Event;
use kube::Api;
use kube::api::ListParams;
use kubemcp_types::{ConditionInfo, EventInfo};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::client::KubeClient;
use crate::cluster::newest_events;
use crate::error::Result;
use crate::util;

const DESCRIBE_EVENTS: usize = 20;

/// Options selecting what to describe
#[derive(Clone, Debug, Default)]
pub struct DescribeOptions {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub selector: Option<String>,
    pub all_namespaces: bool,
}

fn metadata(obj: &Value) -> Value {
    let owners: Vec<Value> = obj
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .map(|r| json!({"kind": r.get("kind"), "name": r.get("name")}))
                .collect()
        })
        .unwrap_or_default();
    json!({
        "name": obj.pointer("/metadata/name"),
        "namespace": obj.pointer("/metadata/namespace"),
        "labels": obj.pointer("/metadata/labels").cloned().unwrap_or(json!({})),
        "annotations": obj.pointer("/metadata/annotations").cloned().unwrap_or(json!({})),
        "creation_timestamp": obj.pointer("/metadata/creationTimestamp"),
        "owner_references": owners,
    })
}

fn container_state(status: &Value) -> String {
    let Some(state) = status.get("state").and_then(Value::as_object) else {
        return "Unknown".to_string();
    };
    match state.iter().next() {
        Some((phase, detail)) => match detail.get("reason").and_then(Value::as_str) {
            Some(reason) => format!("{} ({})", capitalize(phase), reason),
            None => capitalize(phase),
        },
        None => "Unknown".to_string(),
    }
}

pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn pod_summary(obj: &Value) -> Value {
    let statuses = obj
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let containers: Vec<Value> = obj
        .pointer("/spec/containers")
        .and_then(Value::as_array)
        .map(|cs| {
            cs.iter()
                .map(|c| {
                    let name = c.get("name").and_then(Value::as_str).unwrap_or_default();
                    let status = statuses
                        .iter()
                        .find(|s| s.get("name").and_then(Value::as_str) == Some(name));
                    json!({
                        "name": name,
                        "image": c.get("image"),
                        "ports": c.get("ports").cloned().unwrap_or(json!([])),
                        "resources": c.get("resources").cloned().unwrap_or(json!({})),
                        "ready": status.and_then(|s| s.get("ready")).cloned().unwrap_or(json!(false)),
                        "restart_count": status.and_then(|s| s.get("restartCount")).cloned().unwrap_or(json!(0)),
                        "state": status.map(container_state).unwrap_or_else(|| "Waiting".into()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let volumes: Vec<Value> = obj
        .pointer("/spec/volumes")
        .and_then(Value::as_array)
        .map(|vs| {
            vs.iter()
                .map(|v| {
                    let kind = v
                        .as_object()
                        .and_then(|m| m.keys().find(|k| k.as_str() != "name").cloned())
                        .unwrap_or_default();
                    json!({"name": v.get("name"), "type": kind})
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "node": obj.pointer("/spec/nodeName"),
        "phase": obj.pointer("/status/phase"),
        "pod_ip": obj.pointer("/status/podIP"),
        "qos_class": obj.pointer("/status/qosClass"),
        "service_account": obj.pointer("/spec/serviceAccountName"),
        "containers": containers,
        "volumes": volumes,
    })
}

fn workload_summary(obj: &Value) -> Value {
    let images: Vec<Value> = obj
        .pointer("/spec/template/spec/containers")
        .and_then(Value::as_array)
        .map(|cs| cs.iter().filter_map(|c| c.get("image").cloned()).collect())
        .unwrap_or_default();
    json!({
        "replicas": {
            "desired": obj.pointer("/spec/replicas").or_else(|| obj.pointer("/status/desiredNumberScheduled")),
            "current": obj.pointer("/status/replicas").or_else(|| obj.pointer("/status/currentNumberScheduled")),
            "updated": obj.pointer("/status/updatedReplicas").or_else(|| obj.pointer("/status/updatedNumberScheduled")),
            "ready": obj.pointer("/status/readyReplicas").or_else(|| obj.pointer("/status/numberReady")),
            "available": obj.pointer("/status/availableReplicas").or_else(|| obj.pointer("/status/numberAvailable")),
        },
        "selector": obj.pointer("/spec/selector"),
        "strategy": obj.pointer("/spec/strategy").or_else(|| obj.pointer("/spec/updateStrategy")),
        "images": images,
        "paused": obj.pointer("/spec/paused").cloned().unwrap_or(json!(false)),
    })
}

fn service_summary(obj: &Value) -> Value {
    json!({
        "type": obj.pointer("/spec/type"),
        "cluster_ip": obj.pointer("/spec/clusterIP"),
        "external_ips": obj.pointer("/spec/externalIPs"),
        "load_balancer": obj.pointer("/status/loadBalancer/ingress"),
        "ports": obj.pointer("/spec/ports").cloned().unwrap_or(json!([])),
        "selector": obj.pointer("/spec/selector").cloned().unwrap_or(json!({})),
        "session_affinity": obj.pointer("/spec/sessionAffinity"),
    })
}

fn node_summary(obj: &Value) -> Value {
    let ready = obj
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .and_then(|cs| {
            cs.iter()
                .find(|c| c.get("type").and_then(Value::as_str) == Some("Ready"))
        })
        .and_then(|c| c.get("status").and_then(Value::as_str))
        .map(|s| if s == "True" { "Ready" } else { "NotReady" })
        .unwrap_or("Unknown");
    json!({
        "status": ready,
        "unschedulable": obj.pointer("/spec/unschedulable").cloned().unwrap_or(json!(false)),
        "taints": obj.pointer("/spec/taints").cloned().unwrap_or(json!([])),
        "addresses": obj.pointer("/status/addresses").cloned().unwrap_or(json!([])),
        "capacity": obj.pointer("/status/capacity"),
        "allocatable": obj.pointer("/status/allocatable"),
        "system_info": obj.pointer("/status/nodeInfo"),
    })
}

fn job_summary(obj: &Value) -> Value {
    json!({
        "completions": obj.pointer("/spec/completions"),
        "parallelism": obj.pointer("/spec/parallelism"),
        "active": obj.pointer("/status/active").cloned().unwrap_or(json!(0)),
        "succeeded": obj.pointer("/status/succeeded").cloned().unwrap_or(json!(0)),
        "failed": obj.pointer("/status/failed").cloned().unwrap_or(json!(0)),
        "start_time": obj.pointer("/status/startTime"),
        "completion_time": obj.pointer("/status/completionTime"),
    })
}

fn cronjob_summary(obj: &Value) -> Value {
    json!({
        "schedule": obj.pointer("/spec/schedule"),
        "suspend": obj.pointer("/spec/suspend").cloned().unwrap_or(json!(false)),
        "concurrency_policy": obj.pointer("/spec/concurrencyPolicy"),
        "last_schedule_time": obj.pointer("/status/lastScheduleTime"),
        "last_successful_time": obj.pointer("/status/lastSuccessfulTime"),
        "active_jobs": obj
            .pointer("/status/active")
            .and_then(Value::as_array)
            .map(|a| a.len())
            .unwrap_or(0),
    })
}

/// Kind-specific details, `None` for kinds without a summary
pub(crate) fn kind_summary(kind: &str, obj: &Value) -> Option<Value> {
    match kind {
        "Pod" => Some(pod_summary(obj)),
        "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" => Some(workload_summary(obj)),
        "Service" => Some(service_summary(obj)),
        "Node" => Some(node_summary(obj)),
        "Job" => Some(job_summary(obj)),
        "CronJob" => Some(cronjob_summary(obj)),
        _ => None,
    }
}

fn write_map(out: &mut String, title: &str, value: &Value) {
    match value.as_object().filter(|m| !m.is_empty()) {
        Some(map) => {
            let mut first = true;
            for (k, v) in map {
                let label = if first { format!("{}:", title) } else { String::new() };
                let v = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                let _ = writeln!(out, "{:<16}{}={}", label, k, v);
                first = false;
            }
        }
        None => {
            let _ = writeln!(out, "{:<16}<none>", format!("{}:", title));
        }
    }
}

fn write_section(out: &mut String, title: &str, value: &Value, indent: usize) {
    let pad = " ".repeat(indent);
    match value {
        Value::Object(map) => {
            let _ = writeln!(out, "{}{}:", pad, title);
            for (k, v) in map {
                write_section(out, k, v, indent + 2);
            }
        }
        Value::Array(items) if items.iter().all(|i| !i.is_object()) => {
            let list = items
                .iter()
                .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "{}{}: {}", pad, title, list);
        }
        Value::Array(items) => {
            let _ = writeln!(out, "{}{}:", pad, title);
            for (i, item) in items.iter().enumerate() {
                write_section(out, &format!("[{}]", i), item, indent + 2);
            }
        }
        Value::Null => {
            let _ = writeln!(out, "{}{}: <none>", pad, title);
        }
        Value::String(s) => {
            let _ = writeln!(out, "{}{}: {}", pad, title, s);
        }
        other => {
            let _ = writeln!(out, "{}{}: {}", pad, title, other);
        }
    }
}

/// Render a description as kubectl-like text
pub(crate) fn render_text(
    kind: &str,
    meta: &Value,
    conditions: &[ConditionInfo],
    summary: Option<&Value>,
    events: &[EventInfo],
) -> String {
    let mut out = String::new();
    let field = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "<none>".to_string())
    };
    let _ = writeln!(out, "{:<16}{}", "Name:", field(meta.get("name")));
    if meta.get("namespace").is_some_and(|ns| !ns.is_null()) {
        let _ = writeln!(out, "{:<16}{}", "Namespace:", field(meta.get("namespace")));
    }
    let _ = writeln!(out, "{:<16}{}", "Kind:", kind);
    let _ = writeln!(
        out,
        "{:<16}{}",
        "Created:",
        field(meta.get("creation_timestamp"))
    );
    write_map(&mut out, "Labels", &meta["labels"]);
    write_map(&mut out, "Annotations", &meta["annotations"]);

    if let Some(owners) = meta["owner_references"].as_array().filter(|o| !o.is_empty()) {
        let owners = owners
            .iter()
            .map(|o| format!("{}/{}", field(o.get("kind")), field(o.get("name"))))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "{:<16}{}", "Controlled By:", owners);
    }

    if let Some(Value::Object(summary)) = summary {
        for (key, value) in summary {
            write_section(&mut out, &title_case(key), value, 0);
        }
    }

    if !conditions.is_empty() {
        let _ = writeln!(out, "Conditions:");
        let _ = writeln!(out, "  {:<28}{:<8}{}", "Type", "Status", "Reason");
        for c in conditions {
            let _ = writeln!(
                out,
                "  {:<28}{:<8}{}",
                c.type_,
                c.status,
                c.reason.as_deref().unwrap_or_default()
            );
        }
    }

    if events.is_empty() {
        let _ = writeln!(out, "Events:         <none>");
    } else {
        let _ = writeln!(out, "Events:");
        let _ = writeln!(out, "  {:<8}{:<24}{:<8}{}", "Type", "Reason", "Age", "Message");
        for e in events {
            let _ = writeln!(
                out,
                "  {:<8}{:<24}{:<8}{}",
                e.type_.as_deref().unwrap_or_default(),
                e.reason.as_deref().unwrap_or_default(),
                util::age(e.timestamp),
                e.message.as_deref().unwrap_or_default().trim_end()
            );
        }
    }
    out
}

fn title_case(key: &str) -> String {
    key.split('_').map(capitalize).collect::<Vec<_>>().join(" ")
}

impl KubeClient {
    /// Describe one named object, or every object matching the filters
    pub async fn describe(
        &self,
        context: &str,
        resource_type: &str,
        opts: DescribeOptions,
    ) -> Result<Value> {
        if let Some(selector) = &opts.selector {
            util::parse_selector(selector)?;
        }

        let target = self.target(context).await?;
        let rk = self.resolve_on(&target, resource_type, None, None).await?;
        let ns = if opts.all_namespaces && opts.name.is_none() {
            None
        } else {
            Some(target.namespace_or_default(opts.namespace.as_deref()).to_string())
        };
        let api = rk.api(&target.client, ns.as_deref());

        let objects = match &opts.name {
            Some(name) => vec![api.get(name).await?],
            None => {
                let mut lp = ListParams::default();
                if let Some(selector) = opts.selector.as_deref().filter(|s| !s.is_empty()) {
                    lp = lp.labels(selector);
                }
                api.list(&lp).await?.items
            }
        };
        debug!("Describing {} {}", objects.len(), rk.resource.plural);

        let kind = rk.kind().to_string();
        let mut items = Vec::with_capacity(objects.len());
        for obj in &objects {
            let value = util::clean_object(obj)?;
            let meta = metadata(&value);
            let conditions = util::conditions(&value);
            let summary = kind_summary(&kind, &value);

            let obj_name = obj.metadata.name.clone().unwrap_or_default();
            let events_api: Api<Event> = match obj.metadata.namespace.as_deref() {
                Some(ns) => Api::namespaced(target.client.clone(), ns),
                None => Api::all(target.client.clone()),
            };
            let fields = format!(
                "involvedObject.name={},involvedObject.kind={}",
                obj_name, kind
            );
            let events = events_api
                .list(&ListParams::default().fields(&fields))
                .await
                .map(|list| newest_events(list.items, DESCRIBE_EVENTS))
                .unwrap_or_default();

            let text = render_text(&kind, &meta, &conditions, summary.as_ref(), &events);
            let mut item = Map::new();
            item.insert("metadata".into(), meta);
            item.insert("conditions".into(), serde_json::to_value(&conditions)?);
            if let Some(summary) = summary {
                item.insert(kind.to_lowercase(), summary);
            }
            item.insert("events".into(), serde_json::to_value(&events)?);
            item.insert("text".into(), Value::String(text));
            items.push(Value::Object(item));
        }

        Ok(json!({
            "kind": kind,
            "count": items.len(),
            "items": items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod() -> Value {
        json!({
            "metadata": {
                "name": "web-1",
                "namespace": "shop",
                "labels": {"app": "web"},
                "ownerReferences": [{"kind": "ReplicaSet", "name": "web-abc"}]
            },
            "spec": {
                "nodeName": "n1",
                "containers": [{"name": "app", "image": "nginx:1.25"}],
                "volumes": [{"name": "cache", "emptyDir": {}}]
            },
            "status": {
                "phase": "Running",
                "containerStatuses": [{
                    "name": "app", "ready": false, "restartCount": 3,
                    "state": {"waiting": {"reason": "CrashLoopBackOff"}}
                }],
                "conditions": [{"type": "Ready", "status": "False", "reason": "ContainersNotReady"}]
            }
        })
    }

    #[test]
    fn test_pod_summary() {
        let summary = kind_summary("Pod", &pod()).unwrap();
        assert_eq!(summary["node"], "n1");
        assert_eq!(summary["containers"][0]["state"], "Waiting (CrashLoopBackOff)");
        assert_eq!(summary["containers"][0]["restart_count"], 3);
        assert_eq!(summary["volumes"][0]["type"], "emptyDir");
    }

    #[test]
    fn test_daemonset_summary_uses_scheduled_counts() {
        let ds = json!({
            "spec": {"template": {"spec": {"containers": [{"image": "fluentd"}]}}},
            "status": {"desiredNumberScheduled": 3, "numberReady": 2}
        });
        let summary = kind_summary("DaemonSet", &ds).unwrap();
        assert_eq!(summary["replicas"]["desired"], 3);
        assert_eq!(summary["replicas"]["ready"], 2);
        assert_eq!(summary["images"][0], "fluentd");
        assert!(kind_summary("ConfigMap", &ds).is_none());
    }

    #[test]
    fn test_render_text() {
        let value = pod();
        let meta = metadata(&value);
        let conditions = util::conditions(&value);
        let summary = kind_summary("Pod", &value);
        let text = render_text("Pod", &meta, &conditions, summary.as_ref(), &[]);

        assert!(text.starts_with("Name:           web-1\n"));
        assert!(text.contains("Namespace:      shop"));
        assert!(text.contains("Labels:         app=web"));
        assert!(text.contains("Controlled By:  ReplicaSet/web-abc"));
        assert!(text.contains("ContainersNotReady"));
        assert!(text.contains("Events:         <none>"));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("pod_ip"), "Pod Ip");
        assert_eq!(title_case("node"), "Node");
    }
}
