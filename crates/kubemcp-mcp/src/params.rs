//! Tool parameter structs
//!
//! The input schema of every tool is derived from these structs. Field names
//! are the wire names, including the camelCase names of the log tool.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, ToolError};

pub fn invalid(tool: &str, message: impl Into<String>) -> ToolError {
    ToolError::InvalidParams {
        tool: tool.to_string(),
        message: message.into(),
    }
}

/// Accept a string map as a JSON object or a string holding one.
/// Scalar values are rendered as strings.
pub fn string_map(tool: &str, field: &str, value: &Value) -> Result<BTreeMap<String, String>> {
    let parsed;
    let object = match value {
        Value::Object(map) => map,
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text)
                .map_err(|e| invalid(tool, format!("{} is not valid JSON: {}", field, e)))?;
            parsed
                .as_object()
                .ok_or_else(|| invalid(tool, format!("{} must be a JSON object", field)))?
        }
        _ => return Err(invalid(tool, format!("{} must be an object", field))),
    };

    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(invalid(
                        tool,
                        format!("{}.{} must be a string", field, key),
                    ));
                }
            };
            Ok((key.clone(), value))
        })
        .collect()
}

fn default_events_limit() -> i64 {
    100
}

fn default_cpu_percent() -> i32 {
    80
}

fn default_effect() -> String {
    "NoSchedule".to_string()
}

fn default_diagnose_type() -> String {
    "deployment".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContextParams {
    /// Context name (exact or unique substring)
    pub context: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EventsParams {
    /// Context name (exact or unique substring)
    pub context: String,
    /// Namespace to read events from
    pub namespace: String,
    /// Maximum number of events (0 or less returns all)
    #[serde(default = "default_events_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TopPodsParams {
    /// Context name (exact or unique substring)
    pub context: String,
    /// Namespace; all namespaces when omitted
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetResourcesParams {
    /// Context name (exact or unique substring)
    pub context: String,
    /// Resource kind, plural or short name (e.g. pods, deploy, svc)
    pub kind: String,
    /// Namespace; all namespaces when omitted
    pub namespace: Option<String>,
    /// API group (e.g. apps)
    pub group: Option<String>,
    /// API version (e.g. v1)
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetResourceParams {
    /// Context name (exact or unique substring)
    pub context: String,
    /// Namespace (ignored for cluster-scoped kinds)
    pub namespace: Option<String>,
    pub kind: String,
    pub name: String,
    pub group: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DescribeParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub resource_type: String,
    /// Resource name; every matching object when omitted
    pub name: Option<String>,
    pub namespace: Option<String>,
    /// Label selector (k=v,k2=v2)
    pub selector: Option<String>,
    #[serde(default)]
    pub all_namespaces: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ManifestParams {
    /// Context name (exact or unique substring)
    pub context: String,
    /// YAML or JSON manifest; YAML may hold several documents
    pub yaml_content: String,
    /// Namespace overriding metadata.namespace
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PatchParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub resource_type: String,
    pub name: String,
    /// Patch as a JSON object or a JSON string
    pub patch: Value,
    pub namespace: Option<String>,
    /// merge (default) or strategic
    pub patch_type: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LabelParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub resource_type: String,
    pub name: String,
    /// Map of label keys to values, as an object or a JSON string
    pub labels: Value,
    pub namespace: Option<String>,
    /// Allow changing existing values
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnnotateParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub resource_type: String,
    pub name: String,
    /// Map of annotation keys to values, as an object or a JSON string
    pub annotations: Value,
    pub namespace: Option<String>,
    /// Allow changing existing values
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogsParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub namespace: String,
    pub pod: String,
    /// Container name; the first container when omitted
    pub container: Option<String>,
    /// Logs of the previous container instance
    #[serde(rename = "previousContainer", default)]
    pub previous_container: bool,
    /// Only logs newer than this (e.g. 30s, 5m, 2h, 1d)
    #[serde(rename = "sinceDuration")]
    pub since_duration: Option<String>,
    /// Number of lines from the end
    #[serde(rename = "tailLines")]
    pub tail_lines: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub pod_name: String,
    /// Command as a string (split on whitespace) or an argument array
    pub command: Value,
    pub container: Option<String>,
    /// Namespace; the context default when omitted
    pub namespace: Option<String>,
    #[serde(default)]
    pub stdin: bool,
    #[serde(default)]
    pub tty: bool,
    /// Timeout in seconds
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RolloutParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub namespace: String,
    /// deployment, statefulset or daemonset
    pub resource_type: String,
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UndoParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub namespace: String,
    /// deployment, statefulset or daemonset
    pub resource_type: String,
    pub name: String,
    /// Revision to roll back to; the previous one when omitted
    pub to_revision: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScaleParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub namespace: String,
    /// deployment, statefulset or replicaset
    pub resource_type: String,
    pub name: String,
    pub replicas: i32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AutoscaleParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub namespace: String,
    /// deployment, statefulset or replicaset
    pub resource_type: String,
    pub name: String,
    pub min_replicas: i32,
    pub max_replicas: i32,
    /// Target average CPU utilization, 1 to 100
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: i32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateResourcesParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub namespace: String,
    /// deployment, statefulset or daemonset
    pub resource_type: String,
    pub name: String,
    pub container: String,
    /// e.g. 64Mi
    pub memory_request: Option<String>,
    /// e.g. 256Mi
    pub memory_limit: Option<String>,
    /// e.g. 100m
    pub cpu_request: Option<String>,
    /// e.g. 500m
    pub cpu_limit: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetResourcesParams {
    /// Context name (exact or unique substring)
    pub context: String,
    /// deployment, statefulset or daemonset
    pub resource_type: String,
    pub resource_name: String,
    pub namespace: Option<String>,
    /// Containers to update; all when omitted
    #[serde(default)]
    pub containers: Vec<String>,
    /// e.g. {"cpu": "500m", "memory": "256Mi"}
    pub limits: Option<BTreeMap<String, String>>,
    /// e.g. {"cpu": "100m", "memory": "64Mi"}
    pub requests: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExposeParams {
    /// Context name (exact or unique substring)
    pub context: String,
    /// Kind of the exposed resource
    pub resource_type: String,
    pub name: String,
    pub port: i32,
    pub target_port: Option<i32>,
    pub namespace: Option<String>,
    /// TCP (default), UDP or SCTP
    pub protocol: Option<String>,
    /// Defaults to <name>-service
    pub service_name: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    /// Pod selector (k=v,k2=v2); the resource's own selector when omitted
    pub selector: Option<String>,
    /// ClusterIP, NodePort or LoadBalancer
    #[serde(rename = "type")]
    pub service_type: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NodeParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub node_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DrainParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub node_name: String,
    /// Evict pods without a controller and pods with emptyDir volumes
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub ignore_daemonsets: bool,
    #[serde(default)]
    pub delete_local_data: bool,
    /// Timeout of the eviction phase in seconds
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaintParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub node_name: String,
    pub key: String,
    pub value: Option<String>,
    /// NoSchedule (default), PreferNoSchedule or NoExecute
    #[serde(default = "default_effect")]
    pub effect: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UntaintParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub node_name: String,
    pub key: String,
    /// Only remove the taint with this effect
    pub effect: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DiagnoseParams {
    /// Context name (exact or unique substring)
    pub context: String,
    pub namespace: String,
    /// Name of the workload or service
    pub app_name: String,
    /// deployment, statefulset, daemonset, service; other kinds select pods by app=<name>
    #[serde(default = "default_diagnose_type")]
    pub resource_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::DeserializeOwned;
    use serde_json::json;

    fn parse<T: DeserializeOwned>(arguments: Value) -> T {
        serde_json::from_value(arguments).unwrap()
    }

    #[test]
    fn test_log_params_use_camel_case() {
        let params: LogsParams = parse(json!({
            "context": "dev", "namespace": "shop", "pod": "web-1",
            "previousContainer": true, "sinceDuration": "5m", "tailLines": 20
        }));
        assert!(params.previous_container);
        assert_eq!(params.since_duration.as_deref(), Some("5m"));
        assert_eq!(params.tail_lines, Some(20));
    }

    #[test]
    fn test_defaults() {
        let events: EventsParams = parse(json!({"context": "dev", "namespace": "shop"}));
        assert_eq!(events.limit, 100);

        let taint: TaintParams = parse(json!({"context": "dev", "node_name": "n1", "key": "gpu"}));
        assert_eq!(taint.effect, "NoSchedule");

        let diag: DiagnoseParams =
            parse(json!({"context": "dev", "namespace": "shop", "app_name": "web"}));
        assert_eq!(diag.resource_type, "deployment");

        let scale: AutoscaleParams = parse(json!({
            "context": "dev", "namespace": "shop", "resource_type": "deployment",
            "name": "web", "min_replicas": 1, "max_replicas": 4
        }));
        assert_eq!(scale.cpu_percent, 80);
    }

    #[test]
    fn test_missing_required_field() {
        let err = serde_json::from_value::<NodeParams>(json!({"context": "dev"})).unwrap_err();
        assert!(err.to_string().contains("node_name"));
    }

    #[test]
    fn test_schema_uses_wire_names() {
        let schema = serde_json::to_value(schemars::schema_for!(LogsParams)).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("sinceDuration"));
        assert!(properties.contains_key("tailLines"));
        assert!(!properties.contains_key("since_duration"));

        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"context"));
        assert!(required.contains(&"pod"));
        assert!(!required.contains(&"container"));
    }

    #[test]
    fn test_expose_type_field() {
        let params: ExposeParams = parse(json!({
            "context": "dev", "resource_type": "deployment", "name": "web",
            "port": 80, "type": "NodePort", "labels": {"team": "shop"}
        }));
        assert_eq!(params.service_type.as_deref(), Some("NodePort"));
        assert_eq!(params.labels.unwrap()["team"], "shop");
    }

    #[test]
    fn test_string_map() {
        let map = string_map("t", "labels", &json!({"tier": "web", "replicas": 3, "canary": true})).unwrap();
        assert_eq!(map["replicas"], "3");
        assert_eq!(map["canary"], "true");

        let map = string_map("t", "labels", &json!("{\"env\": \"prod\"}")).unwrap();
        assert_eq!(map["env"], "prod");

        assert!(string_map("t", "labels", &json!(["a"])).is_err());
        assert!(string_map("t", "labels", &json!("not json")).is_err());
        assert!(string_map("t", "labels", &json!({"nested": {"a": 1}})).is_err());
    }
}
