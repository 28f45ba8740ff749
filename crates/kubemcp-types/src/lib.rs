//! Shared types for kubemcp
//!
//! This crate contains the serializable shapes returned by the Kubernetes
//! tools. They are deliberately flat so they render well as JSON text.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Context Types
// ============================================================================

/// Kubernetes context information
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ContextInfo {
    pub name: String,
    pub cluster: String,
    pub user: String,
    pub namespace: Option<String>,
    pub server: Option<String>,
    /// Kubeconfig file the context was loaded from
    pub source: String,
    /// Whether this is the current-context of its kubeconfig file
    pub is_current: bool,
}

impl ContextInfo {
    pub fn new(name: String, cluster: String, user: String, source: String) -> Self {
        Self {
            name,
            cluster,
            user,
            namespace: None,
            server: None,
            source,
            is_current: false,
        }
    }
}

// ============================================================================
// Cluster Resource Types
// ============================================================================

/// Namespace information
#[derive(Clone, Debug, Serialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub status: String,
}

impl NamespaceInfo {
    pub fn new(name: String, status: String) -> Self {
        Self { name, status }
    }
}

/// cpu / memory / pods amounts as reported by the API server
#[derive(Clone, Debug, Default, Serialize)]
pub struct ResourceAmounts {
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub pods: Option<String>,
}

/// Node information
#[derive(Clone, Debug, Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub status: NodeReadiness,
    pub roles: Vec<String>,
    pub kubelet_version: Option<String>,
    pub internal_ip: Option<String>,
    pub external_ip: Option<String>,
    pub os: Option<String>,
    pub architecture: Option<String>,
    pub capacity: ResourceAmounts,
    pub allocatable: ResourceAmounts,
    pub unschedulable: bool,
    pub created: Option<DateTime<Utc>>,
}

impl NodeInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            status: NodeReadiness::Unknown,
            roles: Vec::new(),
            kubelet_version: None,
            internal_ip: None,
            external_ip: None,
            os: None,
            architecture: None,
            capacity: ResourceAmounts::default(),
            allocatable: ResourceAmounts::default(),
            unschedulable: false,
            created: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NodeReadiness {
    Ready,
    NotReady,
    Unknown,
}

/// A node taint
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaintInfo {
    pub key: String,
    pub value: Option<String>,
    pub effect: String,
}

/// Pod phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum PodStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodStatus {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Pod summary used by resource listings
#[derive(Clone, Debug, Serialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub status: PodStatus,
    pub ready: bool,
    pub containers: Vec<String>,
    pub pod_ip: Option<String>,
    pub node: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

/// Replica counters shared by workload summaries
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReplicaCounts {
    pub desired: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<i32>,
    pub ready: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<i32>,
}

/// Deployment summary used by resource listings
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub replicas: ReplicaCounts,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServicePortInfo {
    pub name: Option<String>,
    pub protocol: Option<String>,
    pub port: i32,
    pub target_port: Option<String>,
    pub node_port: Option<i32>,
}

/// Service summary used by resource listings
#[derive(Clone, Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub cluster_ip: Option<String>,
    pub ports: Vec<ServicePortInfo>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IngressPath {
    pub path: Option<String>,
    pub path_type: String,
    pub service: Option<String>,
    pub port: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IngressRule {
    pub host: Option<String>,
    pub paths: Vec<IngressPath>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IngressTls {
    pub hosts: Vec<String>,
    pub secret_name: Option<String>,
}

/// Ingress summary used by resource listings
#[derive(Clone, Debug, Serialize)]
pub struct IngressInfo {
    pub name: String,
    pub namespace: String,
    pub hosts: Vec<String>,
    pub tls: Vec<IngressTls>,
    pub rules: Vec<IngressRule>,
}

/// A status condition, flattened from any resource kind
#[derive(Clone, Debug, Serialize)]
pub struct ConditionInfo {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub last_transition: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct EventSourceInfo {
    pub component: Option<String>,
    pub host: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ObjectRefInfo {
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

/// Event information
#[derive(Clone, Debug, Serialize)]
pub struct EventInfo {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub count: Option<i32>,
    pub source: EventSourceInfo,
    pub involved_object: ObjectRefInfo,
}

// ============================================================================
// Rollout Types
// ============================================================================

/// One entry of a workload's revision history
#[derive(Clone, Debug, Serialize)]
pub struct RevisionInfo {
    pub revision: i64,
    /// Owning ReplicaSet or ControllerRevision name
    pub source: String,
    pub change_cause: Option<String>,
    pub images: Vec<String>,
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,
}

// ============================================================================
// Node Maintenance Types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EvictionStatus {
    Evicted,
    Skipped,
    Error,
    TimedOut,
}

/// Per-pod outcome of a drain
#[derive(Clone, Debug, Serialize)]
pub struct EvictionOutcome {
    /// `namespace/name`
    pub pod: String,
    pub status: EvictionStatus,
    pub reason: String,
}

impl EvictionOutcome {
    pub fn new(pod: impl Into<String>, status: EvictionStatus, reason: impl Into<String>) -> Self {
        Self {
            pod: pod.into(),
            status,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Diagnosis Types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

/// A problem found while diagnosing an application
#[derive(Clone, Debug, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub issue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Issue {
    pub fn warning(issue: impl Into<String>) -> Self {
        Self::new(Severity::Warning, issue)
    }

    pub fn error(issue: impl Into<String>) -> Self {
        Self::new(Severity::Error, issue)
    }

    fn new(severity: Severity, issue: impl Into<String>) -> Self {
        Self {
            severity,
            issue: issue.into(),
            message: None,
            reason: None,
            recommendation: None,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// Container state as seen by diagnostics
#[derive(Clone, Debug, Serialize)]
pub struct ContainerInfo {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
    pub image: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ContainerInfo {
    pub fn new(name: String, image: String) -> Self {
        Self {
            name,
            ready: false,
            restart_count: 0,
            image,
            state: "unknown".to_string(),
            reason: None,
            message: None,
            exit_code: None,
        }
    }
}

/// Pod state as seen by diagnostics
#[derive(Clone, Debug, Serialize)]
pub struct PodHealth {
    pub name: String,
    pub phase: Option<String>,
    pub node: Option<String>,
    pub restart_count: i32,
    pub ready: bool,
    pub containers: Vec<ContainerInfo>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LogSample {
    pub pod: String,
    pub container: String,
    pub content: String,
}

/// Full diagnosis report
#[derive(Clone, Debug, Serialize)]
pub struct Diagnosis {
    pub application: String,
    pub namespace: String,
    pub resource_type: String,
    pub health: Health,
    pub status: serde_json::Value,
    pub issues: Vec<Issue>,
    pub pods: Vec<PodHealth>,
    pub events: Vec<EventInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_sample: Option<LogSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_error: Option<String>,
}

impl Diagnosis {
    pub fn new(application: &str, namespace: &str, resource_type: &str) -> Self {
        Self {
            application: application.to_string(),
            namespace: namespace.to_string(),
            resource_type: resource_type.to_string(),
            health: Health::Healthy,
            status: serde_json::Value::Object(Default::default()),
            issues: Vec::new(),
            pods: Vec::new(),
            events: Vec::new(),
            log_sample: None,
            log_error: None,
        }
    }

    /// Derive overall health from the worst issue severity
    pub fn grade(&mut self) {
        self.health = match self.issues.iter().map(|i| i.severity).max() {
            Some(Severity::Error) => Health::Unhealthy,
            Some(Severity::Warning) => Health::Degraded,
            None => Health::Healthy,
        };
    }
}

// ============================================================================
// Discovery Types
// ============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct ApiResourceInfo {
    pub name: String,
    pub kind: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ApiGroupInfo {
    /// Empty for the core group
    pub name: String,
    pub preferred_version: String,
    pub versions: Vec<String>,
    pub resources: Vec<ApiResourceInfo>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CrdVersionInfo {
    pub name: String,
    pub served: bool,
    pub storage: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct CrdInfo {
    pub name: String,
    pub group: String,
    pub scope: String,
    pub names: BTreeMap<String, serde_json::Value>,
    pub versions: Vec<CrdVersionInfo>,
    pub created: Option<DateTime<Utc>>,
    pub api_resource_path: Option<String>,
    pub conditions: Vec<ConditionInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_status_from_phase() {
        assert_eq!(PodStatus::from("Running"), PodStatus::Running);
        assert_eq!(PodStatus::from("Evicted"), PodStatus::Unknown);
    }

    #[test]
    fn test_diagnosis_grading() {
        let mut diagnosis = Diagnosis::new("web", "default", "deployment");
        diagnosis.grade();
        assert_eq!(diagnosis.health, Health::Healthy);

        diagnosis.issues.push(Issue::warning("1/2 ready"));
        diagnosis.grade();
        assert_eq!(diagnosis.health, Health::Degraded);

        diagnosis.issues.push(Issue::error("CrashLoopBackOff"));
        diagnosis.grade();
        assert_eq!(diagnosis.health, Health::Unhealthy);
    }

    #[test]
    fn test_issue_serializes_without_empty_fields() {
        let issue = Issue::error("boom").with_recommendation("check logs");
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["severity"], "error");
        assert_eq!(value["recommendation"], "check logs");
        assert!(value.get("message").is_none());
    }
}
