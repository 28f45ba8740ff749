//! Typed workload kinds accepted by rollout, scaling and diagnosis tools

use std::fmt;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use kube::Api;
use kube::api::{Patch, PatchParams};
use serde_json::Value;

use crate::client::KubeClient;
use crate::error::{K8sError, Result, invalid};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
}

impl WorkloadKind {
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_lowercase().as_str() {
            "deployment" | "deployments" | "deploy" => Ok(Self::Deployment),
            "statefulset" | "statefulsets" | "sts" => Ok(Self::StatefulSet),
            "daemonset" | "daemonsets" | "ds" => Ok(Self::DaemonSet),
            "replicaset" | "replicasets" | "rs" => Ok(Self::ReplicaSet),
            other => Err(invalid(format!("unsupported resource type '{}'", other))),
        }
    }

    /// Lowercase singular name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
            Self::DaemonSet => "daemonset",
            Self::ReplicaSet => "replicaset",
        }
    }

    /// API `kind`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::ReplicaSet => "ReplicaSet",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn unsupported_here(input: &str, allowed: &[WorkloadKind]) -> K8sError {
    let names = allowed
        .iter()
        .map(|k| k.name())
        .collect::<Vec<_>>()
        .join(", ");
    invalid(format!(
        "resource type '{}' is not supported here, expected one of: {}",
        input.trim(),
        names
    ))
}

/// Kinds with a rollout: deployment, statefulset, daemonset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RolloutKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl RolloutKind {
    const ALLOWED: &[WorkloadKind] = &[
        WorkloadKind::Deployment,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
    ];

    pub fn parse(input: &str) -> Result<Self> {
        match WorkloadKind::parse(input)? {
            WorkloadKind::Deployment => Ok(Self::Deployment),
            WorkloadKind::StatefulSet => Ok(Self::StatefulSet),
            WorkloadKind::DaemonSet => Ok(Self::DaemonSet),
            WorkloadKind::ReplicaSet => Err(unsupported_here(input, Self::ALLOWED)),
        }
    }

    pub fn name(self) -> &'static str {
        WorkloadKind::from(self).name()
    }

    pub fn kind(self) -> &'static str {
        WorkloadKind::from(self).kind()
    }
}

impl From<RolloutKind> for WorkloadKind {
    fn from(kind: RolloutKind) -> Self {
        match kind {
            RolloutKind::Deployment => WorkloadKind::Deployment,
            RolloutKind::StatefulSet => WorkloadKind::StatefulSet,
            RolloutKind::DaemonSet => WorkloadKind::DaemonSet,
        }
    }
}

/// Kinds with a scale subresource: deployment, statefulset, replicaset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleKind {
    Deployment,
    StatefulSet,
    ReplicaSet,
}

impl ScaleKind {
    const ALLOWED: &[WorkloadKind] = &[
        WorkloadKind::Deployment,
        WorkloadKind::StatefulSet,
        WorkloadKind::ReplicaSet,
    ];

    pub fn parse(input: &str) -> Result<Self> {
        match WorkloadKind::parse(input)? {
            WorkloadKind::Deployment => Ok(Self::Deployment),
            WorkloadKind::StatefulSet => Ok(Self::StatefulSet),
            WorkloadKind::ReplicaSet => Ok(Self::ReplicaSet),
            WorkloadKind::DaemonSet => Err(unsupported_here(input, Self::ALLOWED)),
        }
    }
}

impl From<ScaleKind> for WorkloadKind {
    fn from(kind: ScaleKind) -> Self {
        match kind {
            ScaleKind::Deployment => WorkloadKind::Deployment,
            ScaleKind::StatefulSet => WorkloadKind::StatefulSet,
            ScaleKind::ReplicaSet => WorkloadKind::ReplicaSet,
        }
    }
}

impl fmt::Display for RolloutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&WorkloadKind::from(*self), f)
    }
}

impl fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&WorkloadKind::from(*self), f)
    }
}

/// Read a workload as JSON
pub(crate) async fn read_workload(
    client: &kube::Client,
    namespace: &str,
    kind: WorkloadKind,
    name: &str,
) -> Result<Value> {
    let value = match kind {
        WorkloadKind::Deployment => {
            serde_json::to_value(Api::<Deployment>::namespaced(client.clone(), namespace).get(name).await?)?
        }
        WorkloadKind::StatefulSet => {
            serde_json::to_value(Api::<StatefulSet>::namespaced(client.clone(), namespace).get(name).await?)?
        }
        WorkloadKind::DaemonSet => {
            serde_json::to_value(Api::<DaemonSet>::namespaced(client.clone(), namespace).get(name).await?)?
        }
        WorkloadKind::ReplicaSet => {
            serde_json::to_value(Api::<ReplicaSet>::namespaced(client.clone(), namespace).get(name).await?)?
        }
    };
    Ok(value)
}

/// Container names of a workload's pod template
pub(crate) fn template_containers(workload: &Value) -> Vec<String> {
    workload
        .pointer("/spec/template/spec/containers")
        .and_then(Value::as_array)
        .map(|cs| {
            cs.iter()
                .filter_map(|c| c.get("name").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

impl KubeClient {
    /// Patch a workload in the context's default namespace unless one is given
    pub(crate) async fn patch_workload(
        &self,
        context: &str,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
        patch: &Patch<Value>,
    ) -> Result<()> {
        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let params = PatchParams::default();
        let client = target.client;
        match kind {
            WorkloadKind::Deployment => {
                Api::<Deployment>::namespaced(client, &ns).patch(name, &params, patch).await?;
            }
            WorkloadKind::StatefulSet => {
                Api::<StatefulSet>::namespaced(client, &ns).patch(name, &params, patch).await?;
            }
            WorkloadKind::DaemonSet => {
                Api::<DaemonSet>::namespaced(client, &ns).patch(name, &params, patch).await?;
            }
            WorkloadKind::ReplicaSet => {
                Api::<ReplicaSet>::namespaced(client, &ns).patch(name, &params, patch).await?;
            }
        }
        Ok(())
    }
}
