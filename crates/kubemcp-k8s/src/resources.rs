//! Generic resource operations over dynamic API discovery

use std::collections::BTreeMap;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Resource};
use kubemcp_types::{
    DeploymentInfo, IngressInfo, IngressPath, IngressRule, IngressTls, PodInfo, PodStatus,
    ReplicaCounts, ServiceInfo, ServicePortInfo,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::client::{KubeClient, Target};
use crate::error::{K8sError, Result, invalid};
use crate::manifest::{Manifest, parse_manifests};
use crate::resolve::{ResolvedKind, resolve_kind, resolve_manifest_kind};
use crate::util;

/// Patch flavors accepted by `patch_resource`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchType {
    Merge,
    Strategic,
}

impl PatchType {
    pub fn parse(input: Option<&str>) -> Result<Self> {
        match input.map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("merge") => Ok(Self::Merge),
            Some("strategic") => Ok(Self::Strategic),
            Some(other) => Err(invalid(format!(
                "invalid patch_type '{}', expected merge or strategic",
                other
            ))),
        }
    }
}

/// Which metadata map a label/annotate call edits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataField {
    Labels,
    Annotations,
}

impl MetadataField {
    fn key(&self) -> &'static str {
        match self {
            Self::Labels => "labels",
            Self::Annotations => "annotations",
        }
    }

    fn singular(&self) -> &'static str {
        match self {
            Self::Labels => "label",
            Self::Annotations => "annotation",
        }
    }
}

/// Accept a patch as a JSON object or a string holding one
pub fn patch_body(patch: &Value) -> Result<Value> {
    let value = match patch {
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| invalid(format!("patch is not valid JSON: {}", e)))?,
        other => other.clone(),
    };
    if value.is_object() {
        Ok(value)
    } else {
        Err(invalid("patch must be a JSON object"))
    }
}

/// Build the merge-patch map for a label/annotate request.
///
/// Keys ending in `-` are removed. Without `overwrite`, giving an existing
/// key a different value is a conflict.
pub(crate) fn metadata_changes(
    field: MetadataField,
    existing: &BTreeMap<String, String>,
    requested: &BTreeMap<String, String>,
    overwrite: bool,
) -> Result<Map<String, Value>> {
    let mut changes = Map::new();
    for (key, value) in requested {
        if let Some(removed) = key.strip_suffix('-') {
            if removed.is_empty() {
                return Err(invalid(format!("invalid {} key '{}'", field.singular(), key)));
            }
            changes.insert(removed.to_string(), Value::Null);
            continue;
        }
        if key.is_empty() {
            return Err(invalid(format!("{} keys must not be empty", field.singular())));
        }
        if let Some(current) = existing.get(key) {
            if current != value && !overwrite {
                return Err(K8sError::Conflict(format!(
                    "'{}' already has a value ({}), and overwrite is false",
                    key, current
                )));
            }
        }
        changes.insert(key.clone(), Value::String(value.clone()));
    }
    Ok(changes)
}

fn typed<K: DeserializeOwned>(value: Value) -> Result<K> {
    Ok(serde_json::from_value(value)?)
}

fn scoped<K>(client: &kube::Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

pub(crate) fn pod_to_info(pod: &Pod) -> PodInfo {
    let status = pod.status.as_ref();
    let statuses = status.and_then(|s| s.container_statuses.as_deref()).unwrap_or_default();
    PodInfo {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        status: status
            .and_then(|s| s.phase.as_deref())
            .map(PodStatus::from)
            .unwrap_or(PodStatus::Unknown),
        ready: !statuses.is_empty() && statuses.iter().all(|cs| cs.ready),
        containers: crate::pods::container_names(pod),
        pod_ip: status.and_then(|s| s.pod_ip.clone()),
        node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        created: util::time(&pod.metadata.creation_timestamp),
    }
}

fn deployment_to_info(deploy: &Deployment) -> DeploymentInfo {
    let status = deploy.status.as_ref();
    DeploymentInfo {
        name: deploy.metadata.name.clone().unwrap_or_default(),
        namespace: deploy.metadata.namespace.clone().unwrap_or_default(),
        replicas: ReplicaCounts {
            desired: deploy.spec.as_ref().and_then(|s| s.replicas),
            ready: status.and_then(|s| s.ready_replicas),
            available: status.and_then(|s| s.available_replicas),
            ..Default::default()
        },
        created: util::time(&deploy.metadata.creation_timestamp),
    }
}

pub(crate) fn int_or_string(value: &IntOrString) -> String {
    match value {
        IntOrString::Int(i) => i.to_string(),
        IntOrString::String(s) => s.clone(),
    }
}

pub(crate) fn service_to_info(svc: &Service) -> ServiceInfo {
    let spec = svc.spec.as_ref();
    ServiceInfo {
        name: svc.metadata.name.clone().unwrap_or_default(),
        namespace: svc.metadata.namespace.clone().unwrap_or_default(),
        type_: spec.and_then(|s| s.type_.clone()),
        cluster_ip: spec.and_then(|s| s.cluster_ip.clone()),
        ports: spec
            .and_then(|s| s.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServicePortInfo {
                        name: p.name.clone(),
                        protocol: p.protocol.clone(),
                        port: p.port,
                        target_port: p.target_port.as_ref().map(int_or_string),
                        node_port: p.node_port,
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn ingress_to_info(ing: &Ingress) -> IngressInfo {
    let spec = ing.spec.as_ref();
    let rules: Vec<IngressRule> = spec
        .and_then(|s| s.rules.as_ref())
        .map(|rules| {
            rules
                .iter()
                .map(|rule| IngressRule {
                    host: rule.host.clone(),
                    paths: rule
                        .http
                        .as_ref()
                        .map(|http| {
                            http.paths
                                .iter()
                                .map(|p| {
                                    let svc = p.backend.service.as_ref();
                                    IngressPath {
                                        path: p.path.clone(),
                                        path_type: p.path_type.clone(),
                                        service: svc.map(|s| s.name.clone()),
                                        port: svc.and_then(|s| s.port.as_ref()).and_then(|port| {
                                            port.number
                                                .map(|n| n.to_string())
                                                .or_else(|| port.name.clone())
                                        }),
                                    }
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    IngressInfo {
        name: ing.metadata.name.clone().unwrap_or_default(),
        namespace: ing.metadata.namespace.clone().unwrap_or_default(),
        hosts: rules.iter().filter_map(|r| r.host.clone()).collect(),
        tls: spec
            .and_then(|s| s.tls.as_ref())
            .map(|tls| {
                tls.iter()
                    .map(|t| IngressTls {
                        hosts: t.hosts.clone().unwrap_or_default(),
                        secret_name: t.secret_name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        rules,
    }
}

/// Prefix an API error with the documents that already went through
fn with_progress(err: K8sError, done: &[String]) -> K8sError {
    if done.is_empty() {
        return err;
    }
    match err {
        K8sError::Api {
            code,
            reason,
            message,
        } => K8sError::Api {
            code,
            reason,
            message: format!("{} (already processed: {})", message, done.join(", ")),
        },
        other => other,
    }
}

impl KubeClient {
    /// Resolve a kind on the target cluster
    pub(crate) async fn resolve_on(
        &self,
        target: &Target<'_>,
        kind: &str,
        group: Option<&str>,
        version: Option<&str>,
    ) -> Result<ResolvedKind> {
        resolve_kind(&target.client, kind, group, version).await
    }

    /// List resources of a kind; all namespaces when `namespace` is None
    pub async fn get_resources(
        &self,
        context: &str,
        kind: &str,
        namespace: Option<&str>,
        group: Option<&str>,
        version: Option<&str>,
    ) -> Result<Value> {
        let target = self.target(context).await?;
        let rk = self.resolve_on(&target, kind, group, version).await?;
        let client = &target.client;
        let ns = namespace.filter(|ns| !ns.is_empty());
        let lp = ListParams::default();

        let summarized = match (
            rk.resource.group.as_str(),
            rk.resource.version.as_str(),
            rk.resource.plural.as_str(),
        ) {
            ("", "v1", "pods") => {
                let list = scoped::<Pod>(client, ns).list(&lp).await?;
                Some(serde_json::to_value(
                    list.items.iter().map(pod_to_info).collect::<Vec<_>>(),
                )?)
            }
            ("apps", "v1", "deployments") => {
                let list = scoped::<Deployment>(client, ns).list(&lp).await?;
                Some(serde_json::to_value(
                    list.items.iter().map(deployment_to_info).collect::<Vec<_>>(),
                )?)
            }
            ("", "v1", "services") => {
                let list = scoped::<Service>(client, ns).list(&lp).await?;
                Some(serde_json::to_value(
                    list.items.iter().map(service_to_info).collect::<Vec<_>>(),
                )?)
            }
            ("networking.k8s.io", "v1", "ingresses") => {
                let list = scoped::<Ingress>(client, ns).list(&lp).await?;
                Some(serde_json::to_value(
                    list.items.iter().map(ingress_to_info).collect::<Vec<_>>(),
                )?)
            }
            _ => None,
        };
        if let Some(value) = summarized {
            return Ok(value);
        }

        let list = rk.api(client, ns).list(&lp).await?;
        debug!("Listed {} {}", list.items.len(), rk.resource.plural);
        let items = list
            .items
            .iter()
            .map(util::clean_object)
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Array(items))
    }

    /// Fetch one resource by name
    pub async fn get_resource(
        &self,
        context: &str,
        namespace: Option<&str>,
        kind: &str,
        name: &str,
        group: Option<&str>,
        version: Option<&str>,
    ) -> Result<Value> {
        let target = self.target(context).await?;
        let rk = self.resolve_on(&target, kind, group, version).await?;
        let ns = target.namespace_or_default(namespace);
        let obj = rk.api(&target.client, Some(ns)).get(name).await?;
        util::clean_object(&obj)
    }

    /// Namespace a manifest lands in, writing it back into the body
    fn place(target: &Target<'_>, rk: &ResolvedKind, manifest: &mut Manifest, ns: Option<&str>) -> Option<String> {
        if !rk.namespaced() {
            return None;
        }
        let namespace = ns
            .filter(|ns| !ns.is_empty())
            .or(manifest.namespace())
            .unwrap_or_else(|| target.context.default_namespace())
            .to_string();
        manifest.set_namespace(&namespace);
        Some(namespace)
    }

    /// Create every object of a YAML/JSON manifest
    pub async fn create_resource(
        &self,
        context: &str,
        yaml_content: &str,
        namespace: Option<&str>,
    ) -> Result<Value> {
        let manifests = parse_manifests(yaml_content, false)?;
        let target = self.target(context).await?;

        let mut created = Vec::new();
        let mut done = Vec::new();
        for mut manifest in manifests {
            let rk = resolve_manifest_kind(&target.client, &manifest.api_version, &manifest.kind)
                .await
                .map_err(|e| with_progress(e, &done))?;
            let ns = Self::place(&target, &rk, &mut manifest, namespace);
            debug!("Creating {} in context {}", manifest.display_name(), target.context.name);
            let obj: DynamicObject = typed(manifest.body.clone())?;

            let result = rk
                .api(&target.client, ns.as_deref())
                .create(&PostParams::default(), &obj)
                .await
                .map_err(|e| with_progress(e.into(), &done))?;

            let name = result.metadata.name.clone().unwrap_or_default();
            info!("Created {}/{} in context {}", manifest.kind, name, target.context.name);
            done.push(format!("{}/{}", manifest.kind, name));
            created.push(json!({
                "kind": manifest.kind,
                "name": name,
                "namespace": ns,
                "action": "created",
                "resource": util::clean_object(&result)?,
            }));
        }

        Ok(json!({
            "status": "Success",
            "message": format!("Successfully created {}", done.join(", ")),
            "resources": created,
        }))
    }

    /// Server-side apply every object of a manifest
    pub async fn apply_resource(
        &self,
        context: &str,
        yaml_content: &str,
        namespace: Option<&str>,
    ) -> Result<Value> {
        let manifests = parse_manifests(yaml_content, true)?;
        let target = self.target(context).await?;
        let params = PatchParams::apply(&self.settings().field_manager).force();

        let mut applied = Vec::new();
        let mut done = Vec::new();
        for mut manifest in manifests {
            let rk = resolve_manifest_kind(&target.client, &manifest.api_version, &manifest.kind)
                .await
                .map_err(|e| with_progress(e, &done))?;
            let ns = Self::place(&target, &rk, &mut manifest, namespace);
            let name = manifest.name.clone().unwrap_or_default();
            let api = rk.api(&target.client, ns.as_deref());

            let existed = api
                .get_opt(&name)
                .await
                .map_err(|e| with_progress(e.into(), &done))?
                .is_some();
            let result = api
                .patch(&name, &params, &Patch::Apply(&manifest.body))
                .await
                .map_err(|e| with_progress(e.into(), &done))?;

            let action = if existed { "configured" } else { "created" };
            info!("{}/{} {} in context {}", manifest.kind, name, action, target.context.name);
            done.push(format!("{}/{} {}", manifest.kind, name, action));
            applied.push(json!({
                "kind": manifest.kind,
                "name": name,
                "namespace": ns,
                "action": action,
                "resource": util::clean_object(&result)?,
            }));
        }

        Ok(json!({
            "status": "Success",
            "message": format!("Successfully applied {}", done.join(", ")),
            "resources": applied,
        }))
    }

    /// Merge or strategic-merge patch a resource
    pub async fn patch_resource(
        &self,
        context: &str,
        resource_type: &str,
        name: &str,
        patch: &Value,
        namespace: Option<&str>,
        patch_type: PatchType,
    ) -> Result<Value> {
        let body = patch_body(patch)?;
        let target = self.target(context).await?;
        let rk = self.resolve_on(&target, resource_type, None, None).await?;
        let ns = target.namespace_or_default(namespace);
        let api = rk.api(&target.client, Some(ns));

        let patch = match patch_type {
            PatchType::Merge => Patch::Merge(&body),
            PatchType::Strategic => Patch::Strategic(&body),
        };
        let result = api.patch(name, &PatchParams::default(), &patch).await?;

        Ok(json!({
            "status": "Success",
            "message": format!("Successfully patched {} '{}'", rk.kind(), name),
            "resource": util::clean_object(&result)?,
        }))
    }

    /// Add, change or remove labels or annotations
    pub async fn update_metadata(
        &self,
        context: &str,
        field: MetadataField,
        resource_type: &str,
        name: &str,
        requested: &BTreeMap<String, String>,
        namespace: Option<&str>,
        overwrite: bool,
    ) -> Result<Value> {
        if requested.is_empty() {
            return Err(invalid(format!("at least one {} is required", field.singular())));
        }

        let target = self.target(context).await?;
        let rk = self.resolve_on(&target, resource_type, None, None).await?;
        let ns = target.namespace_or_default(namespace);
        let api = rk.api(&target.client, Some(ns));

        let current = api.get(name).await?;
        let existing = match field {
            MetadataField::Labels => current.metadata.labels.clone(),
            MetadataField::Annotations => current.metadata.annotations.clone(),
        }
        .unwrap_or_default();

        let changes = metadata_changes(field, &existing, requested, overwrite)?;
        let patch = json!({"metadata": {field.key(): changes}});
        let result = api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        let updated = match field {
            MetadataField::Labels => result.metadata.labels,
            MetadataField::Annotations => result.metadata.annotations,
        }
        .unwrap_or_default();

        Ok(json!({
            "status": "Success",
            "message": format!("Successfully updated {} on {} '{}'", field.key(), rk.kind(), name),
            field.key(): updated,
        }))
    }
}
