//! Scaling, autoscaling, container resources and service exposure

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v1::Scale;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use kube::Api;
use kube::api::{Patch, PatchParams, PostParams};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::client::KubeClient;
use crate::error::{K8sError, Result, invalid};
use crate::resources::int_or_string;
use crate::util;
use crate::workload::{RolloutKind, ScaleKind, WorkloadKind, read_workload, template_containers};

const PROTOCOLS: &[&str] = &["TCP", "UDP", "SCTP"];
const SERVICE_TYPES: &[&str] = &["ClusterIP", "NodePort", "LoadBalancer"];

/// Requested container resources; unset fields are left untouched
#[derive(Clone, Debug, Default)]
pub struct ResourceValues {
    pub memory_request: Option<String>,
    pub memory_limit: Option<String>,
    pub cpu_request: Option<String>,
    pub cpu_limit: Option<String>,
}

impl ResourceValues {
    /// Validate and turn into a `resources` object
    fn requirements(&self) -> Result<Value> {
        let mut requests = Map::new();
        let mut limits = Map::new();
        for (field, value, resource, is_limit) in [
            ("memory_request", &self.memory_request, "memory", false),
            ("cpu_request", &self.cpu_request, "cpu", false),
            ("memory_limit", &self.memory_limit, "memory", true),
            ("cpu_limit", &self.cpu_limit, "cpu", true),
        ] {
            let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
                continue;
            };
            util::validate_quantity(field, value)?;
            let target = if is_limit { &mut limits } else { &mut requests };
            target.insert(resource.to_string(), Value::String(value.to_string()));
        }

        if requests.is_empty() && limits.is_empty() {
            return Err(invalid(
                "at least one of memory_request, memory_limit, cpu_request or cpu_limit is required",
            ));
        }
        Ok(requirements_value(requests, limits))
    }
}

fn requirements_value(requests: Map<String, Value>, limits: Map<String, Value>) -> Value {
    let mut resources = Map::new();
    if !requests.is_empty() {
        resources.insert("requests".into(), Value::Object(requests));
    }
    if !limits.is_empty() {
        resources.insert("limits".into(), Value::Object(limits));
    }
    Value::Object(resources)
}

/// Validate `limits`/`requests` maps as given to `set_resources_for_container`
pub(crate) fn requirements_from_maps(
    limits: Option<&BTreeMap<String, String>>,
    requests: Option<&BTreeMap<String, String>>,
) -> Result<Value> {
    let convert = |section: &str, map: Option<&BTreeMap<String, String>>| -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for (resource, quantity) in map.into_iter().flatten() {
            util::validate_quantity(&format!("{}.{}", section, resource), quantity)?;
            out.insert(resource.clone(), Value::String(quantity.clone()));
        }
        Ok(out)
    };
    let limits = convert("limits", limits)?;
    let requests = convert("requests", requests)?;
    if limits.is_empty() && requests.is_empty() {
        return Err(invalid("at least one of limits or requests is required"));
    }
    Ok(requirements_value(requests, limits))
}

/// Strategic merge patch setting `resources` on the named containers
pub(crate) fn container_resources_patch(containers: &[String], resources: &Value) -> Value {
    let containers: Vec<Value> = containers
        .iter()
        .map(|name| json!({"name": name, "resources": resources}))
        .collect();
    json!({"spec": {"template": {"spec": {"containers": containers}}}})
}

/// Every requested container must exist in the workload's template
pub(crate) fn require_containers(
    existing: &[String],
    requested: &[String],
    kind: RolloutKind,
    name: &str,
) -> Result<()> {
    match requested.iter().find(|c| !existing.contains(c)) {
        Some(missing) => Err(K8sError::NotFound(format!(
            "container '{}' not found in {} '{}'",
            missing, kind, name
        ))),
        None => Ok(()),
    }
}

pub(crate) fn validate_autoscale(min: i32, max: i32, cpu_percent: i32) -> Result<()> {
    if min < 1 {
        return Err(invalid("min_replicas must be at least 1"));
    }
    if max < min {
        return Err(invalid("max_replicas cannot be less than min_replicas"));
    }
    if !(1..=100).contains(&cpu_percent) {
        return Err(invalid("cpu_percent must be between 1 and 100"));
    }
    Ok(())
}

pub(crate) fn hpa_body(
    kind: ScaleKind,
    name: &str,
    namespace: &str,
    min: i32,
    max: i32,
    cpu_percent: i32,
) -> Value {
    json!({
        "apiVersion": "autoscaling/v2",
        "kind": "HorizontalPodAutoscaler",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "scaleTargetRef": {"apiVersion": "apps/v1", "kind": WorkloadKind::from(kind).kind(), "name": name},
            "minReplicas": min,
            "maxReplicas": max,
            "metrics": [{
                "type": "Resource",
                "resource": {
                    "name": "cpu",
                    "target": {"type": "Utilization", "averageUtilization": cpu_percent},
                },
            }],
        },
    })
}

/// Options for `expose_resource`
#[derive(Clone, Debug, Default)]
pub struct ExposeOptions {
    pub target_port: Option<i32>,
    pub namespace: Option<String>,
    pub protocol: Option<String>,
    pub service_name: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    pub selector: Option<String>,
    pub service_type: Option<String>,
}

impl ExposeOptions {
    fn validate(&self, port: i32) -> Result<()> {
        for (field, value) in [("port", Some(port)), ("target_port", self.target_port)] {
            if value.is_some_and(|p| !(1..=65535).contains(&p)) {
                return Err(invalid(format!("{} must be between 1 and 65535", field)));
            }
        }
        if self
            .protocol
            .as_deref()
            .is_some_and(|p| !PROTOCOLS.contains(&p))
        {
            return Err(invalid(format!(
                "protocol must be one of {}",
                PROTOCOLS.join(", ")
            )));
        }
        if self
            .service_type
            .as_deref()
            .is_some_and(|t| !SERVICE_TYPES.contains(&t))
        {
            return Err(invalid(format!(
                "type must be one of {}",
                SERVICE_TYPES.join(", ")
            )));
        }
        Ok(())
    }
}

/// The pod selector an object already carries
pub(crate) fn own_selector(kind: &str, object: &Value) -> Option<BTreeMap<String, String>> {
    let labels = match kind {
        "Pod" => object.pointer("/metadata/labels"),
        "Service" | "ReplicationController" => object.pointer("/spec/selector"),
        _ => object.pointer("/spec/selector/matchLabels"),
    };
    let map: BTreeMap<String, String> = labels
        .and_then(Value::as_object)?
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
        .collect();
    (!map.is_empty()).then_some(map)
}

pub(crate) fn service_body(
    name: &str,
    port: i32,
    opts: &ExposeOptions,
    selector: &BTreeMap<String, String>,
) -> Value {
    let mut spec = json!({
        "selector": selector,
        "ports": [{
            "port": port,
            "targetPort": opts.target_port.unwrap_or(port),
            "protocol": opts.protocol.as_deref().unwrap_or("TCP"),
        }],
    });
    if let Some(kind) = &opts.service_type {
        spec["type"] = Value::String(kind.clone());
    }

    let mut metadata = json!({"name": name});
    if let Some(labels) = opts.labels.as_ref().filter(|l| !l.is_empty()) {
        metadata["labels"] = json!(labels);
    }
    json!({"apiVersion": "v1", "kind": "Service", "metadata": metadata, "spec": spec})
}

fn scale_replicas(scale: &Scale) -> (Option<i32>, i32) {
    (
        scale.spec.as_ref().and_then(|s| s.replicas),
        scale.status.as_ref().map(|s| s.replicas).unwrap_or(0),
    )
}

impl KubeClient {
    /// Set replicas through the scale subresource
    pub async fn scale_resource(
        &self,
        context: &str,
        namespace: &str,
        resource_type: &str,
        name: &str,
        replicas: i32,
    ) -> Result<Value> {
        let kind = ScaleKind::parse(resource_type)?;
        if replicas < 0 {
            return Err(invalid("replicas cannot be negative"));
        }

        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let client = target.client;
        let params = PatchParams::default();
        let patch = Patch::Merge(json!({"spec": {"replicas": replicas}}));

        let scale = match kind {
            ScaleKind::Deployment => {
                Api::<Deployment>::namespaced(client, &ns)
                    .patch_scale(name, &params, &patch)
                    .await?
            }
            ScaleKind::StatefulSet => {
                Api::<StatefulSet>::namespaced(client, &ns)
                    .patch_scale(name, &params, &patch)
                    .await?
            }
            ScaleKind::ReplicaSet => {
                Api::<ReplicaSet>::namespaced(client, &ns)
                    .patch_scale(name, &params, &patch)
                    .await?
            }
        };

        let (desired, current) = scale_replicas(&scale);
        info!("Scaled {} {}/{} to {}", kind, ns, name, replicas);
        Ok(json!({
            "resource_type": kind.to_string(),
            "name": name,
            "namespace": ns,
            "replicas": {"desired": desired, "current": current},
        }))
    }

    /// Create or replace an autoscaling/v2 HPA targeting the workload
    pub async fn autoscale_resource(
        &self,
        context: &str,
        namespace: &str,
        resource_type: &str,
        name: &str,
        min_replicas: i32,
        max_replicas: i32,
        cpu_percent: i32,
    ) -> Result<Value> {
        let kind = ScaleKind::parse(resource_type)?;
        validate_autoscale(min_replicas, max_replicas, cpu_percent)?;

        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let api = Api::<HorizontalPodAutoscaler>::namespaced(target.client, &ns);
        let mut hpa: HorizontalPodAutoscaler = serde_json::from_value(hpa_body(
            kind,
            name,
            &ns,
            min_replicas,
            max_replicas,
            cpu_percent,
        ))?;

        let pp = PostParams::default();
        let (action, result) = match api.get_opt(name).await? {
            Some(existing) => {
                hpa.metadata.resource_version = existing.metadata.resource_version;
                ("updated", api.replace(name, &pp, &hpa).await?)
            }
            None => ("created", api.create(&pp, &hpa).await?),
        };

        info!("Autoscaler {}/{} {}", ns, name, action);
        let spec = result.spec.unwrap_or_default();
        Ok(json!({
            "action": action,
            "name": result.metadata.name,
            "namespace": result.metadata.namespace,
            "target": {
                "kind": spec.scale_target_ref.kind,
                "name": spec.scale_target_ref.name,
                "api_version": spec.scale_target_ref.api_version,
            },
            "min_replicas": spec.min_replicas,
            "max_replicas": spec.max_replicas,
            "current_replicas": result.status.and_then(|s| s.current_replicas),
            "target_cpu_percentage": cpu_percent,
        }))
    }

    /// Update requests/limits of one container
    pub async fn update_resources(
        &self,
        context: &str,
        namespace: &str,
        resource_type: &str,
        name: &str,
        container: &str,
        values: &ResourceValues,
    ) -> Result<Value> {
        let kind = RolloutKind::parse(resource_type)?;
        let resources = values.requirements()?;

        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let workload = read_workload(&target.client, &ns, kind.into(), name).await?;
        let selected = [container.to_string()];
        require_containers(&template_containers(&workload), &selected, kind, name)?;

        let patch = Patch::Strategic(container_resources_patch(&selected, &resources));
        self.patch_workload(context, &ns, kind.into(), name, &patch).await?;

        info!("Updated resources of {}/{} container {}", kind, name, container);
        Ok(json!({
            "resource_type": kind.to_string(),
            "name": name,
            "namespace": ns,
            "container": container,
            "resources": resources,
            "message": format!(
                "Resource {}/{} container {} updated with new resource constraints",
                kind, name, container
            ),
        }))
    }

    /// Apply limits/requests to some or all containers
    pub async fn set_resources_for_container(
        &self,
        context: &str,
        resource_type: &str,
        resource_name: &str,
        namespace: Option<&str>,
        containers: &[String],
        limits: Option<&BTreeMap<String, String>>,
        requests: Option<&BTreeMap<String, String>>,
    ) -> Result<Value> {
        let kind = RolloutKind::parse(resource_type)?;
        let resources = requirements_from_maps(limits, requests)?;

        let target = self.target(context).await?;
        let ns = target.namespace_or_default(namespace).to_string();
        let workload = read_workload(&target.client, &ns, kind.into(), resource_name).await?;
        let existing = template_containers(&workload);
        if existing.is_empty() {
            return Err(K8sError::NotFound(format!("{} '{}' has no containers", kind, resource_name)));
        }

        let selected: Vec<String> = if containers.is_empty() {
            existing
        } else {
            require_containers(&existing, containers, kind, resource_name)?;
            containers.to_vec()
        };

        let patch = Patch::Strategic(container_resources_patch(&selected, &resources));
        self.patch_workload(context, &ns, kind.into(), resource_name, &patch).await?;

        info!("Set resources on {}/{} for {:?}", kind, resource_name, selected);
        Ok(json!({
            "status": "Success",
            "message": format!("Successfully updated resources for {} '{}'", kind, resource_name),
            "updated_containers": selected,
        }))
    }

    /// Create a Service in front of an existing object
    pub async fn expose_resource(
        &self,
        context: &str,
        resource_type: &str,
        name: &str,
        port: i32,
        opts: &ExposeOptions,
    ) -> Result<Value> {
        opts.validate(port)?;
        let explicit = opts
            .selector
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(util::parse_selector)
            .transpose()?;

        let target = self.target(context).await?;
        let ns = target.namespace_or_default(opts.namespace.as_deref()).to_string();

        let selector = match explicit {
            Some(selector) => selector,
            None => {
                let rk = self.resolve_on(&target, resource_type, None, None).await?;
                let object = rk.api(&target.client, Some(&ns)).get(name).await?;
                own_selector(rk.kind(), &serde_json::to_value(&object)?)
                    .unwrap_or_else(|| BTreeMap::from([("app".to_string(), name.to_string())]))
            }
        };

        let service_name = opts
            .service_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{}-service", name));
        let service: Service =
            serde_json::from_value(service_body(&service_name, port, opts, &selector))?;
        let created = Api::<Service>::namespaced(target.client, &ns)
            .create(&PostParams::default(), &service)
            .await?;

        info!("Exposed {} {} as service {}", resource_type, name, service_name);
        let spec = created.spec.unwrap_or_default();
        let ports: Vec<Value> = spec
            .ports
            .unwrap_or_default()
            .iter()
            .map(|p| {
                json!({
                    "port": p.port,
                    "target_port": p.target_port.as_ref().map(int_or_string),
                    "protocol": p.protocol,
                })
            })
            .collect();
        Ok(json!({
            "status": "Success",
            "message": format!(
                "Successfully exposed {} '{}' as service '{}'",
                resource_type, name, service_name
            ),
            "service": {
                "name": created.metadata.name,
                "namespace": created.metadata.namespace,
                "type": spec.type_,
                "cluster_ip": spec.cluster_ip,
                "selector": selector,
                "ports": ports,
            },
        }))
    }
}
