//! Rollout status, history, undo, restart, pause and resume

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::{ControllerRevision, DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::Api;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kubemcp_types::RevisionInfo;
use serde_json::{Value, json};
use tracing::info;

use crate::client::KubeClient;
use crate::error::{K8sError, Result, invalid};
use crate::util;
use crate::workload::RolloutKind;

const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";
const CHANGE_CAUSE_ANNOTATION: &str = "kubernetes.io/change-cause";
const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Whether a rollout finished and a kubectl-style message
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Progress {
    pub complete: bool,
    pub message: String,
}

impl Progress {
    fn done(message: String) -> Self {
        Self {
            complete: true,
            message,
        }
    }

    fn waiting(message: String) -> Self {
        Self {
            complete: false,
            message,
        }
    }
}

fn observed(meta: &ObjectMeta, observed_generation: Option<i64>) -> bool {
    observed_generation.unwrap_or(0) >= meta.generation.unwrap_or(0)
}

pub(crate) fn deployment_progress(deploy: &Deployment) -> Progress {
    let name = deploy.metadata.name.as_deref().unwrap_or_default();
    let Some(status) = &deploy.status else {
        return Progress::waiting("Waiting for deployment status to be reported...".into());
    };
    if !observed(&deploy.metadata, status.observed_generation) {
        return Progress::waiting("Waiting for deployment spec update to be observed...".into());
    }

    let deadline_exceeded = status.conditions.as_ref().is_some_and(|conds| {
        conds.iter().any(|c| {
            c.type_ == "Progressing" && c.reason.as_deref() == Some("ProgressDeadlineExceeded")
        })
    });
    if deadline_exceeded {
        return Progress::waiting(format!(
            "deployment \"{}\" exceeded its progress deadline",
            name
        ));
    }

    let desired = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let updated = status.updated_replicas.unwrap_or(0);
    let total = status.replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);

    if updated < desired {
        Progress::waiting(format!(
            "Waiting for deployment \"{}\" rollout to finish: {} out of {} new replicas have been updated...",
            name, updated, desired
        ))
    } else if total > updated {
        Progress::waiting(format!(
            "Waiting for deployment \"{}\" rollout to finish: {} old replicas are pending termination...",
            name,
            total - updated
        ))
    } else if available < updated {
        Progress::waiting(format!(
            "Waiting for deployment \"{}\" rollout to finish: {} of {} updated replicas are available...",
            name, available, updated
        ))
    } else {
        Progress::done(format!("deployment \"{}\" successfully rolled out", name))
    }
}

pub(crate) fn statefulset_progress(sts: &StatefulSet) -> Progress {
    let Some(status) = &sts.status else {
        return Progress::waiting("Waiting for statefulset status to be reported...".into());
    };
    if !observed(&sts.metadata, status.observed_generation) {
        return Progress::waiting("Waiting for statefulset spec update to be observed...".into());
    }

    let spec = sts.spec.as_ref();
    let strategy = spec.and_then(|s| s.update_strategy.as_ref());
    if strategy.and_then(|s| s.type_.as_deref()) == Some("OnDelete") {
        return Progress::done(
            "rollout status is only available for RollingUpdate strategy type".into(),
        );
    }

    let desired = spec.and_then(|s| s.replicas).unwrap_or(1);
    let ready = status.ready_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    if ready < desired {
        return Progress::waiting(format!(
            "Waiting for {} pods to be ready...",
            desired - ready
        ));
    }

    let partition = strategy
        .and_then(|s| s.rolling_update.as_ref())
        .and_then(|r| r.partition)
        .unwrap_or(0);
    if partition > 0 {
        let expected = (desired - partition).max(0);
        return if updated < expected {
            Progress::waiting(format!(
                "Waiting for partitioned roll out to finish: {} out of {} new pods have been updated...",
                updated, expected
            ))
        } else {
            Progress::done(format!(
                "partitioned roll out complete: {} new pods have been updated...",
                updated
            ))
        };
    }

    let current_rev = status.current_revision.as_deref().unwrap_or_default();
    let update_rev = status.update_revision.as_deref().unwrap_or_default();
    if update_rev != current_rev {
        Progress::waiting(format!(
            "waiting for statefulset rolling update to complete {} pods at revision {}...",
            updated, update_rev
        ))
    } else {
        Progress::done(format!(
            "statefulset rolling update complete {} pods at revision {}...",
            status.current_replicas.unwrap_or(0),
            current_rev
        ))
    }
}

pub(crate) fn daemonset_progress(ds: &DaemonSet) -> Progress {
    let name = ds.metadata.name.as_deref().unwrap_or_default();
    let Some(status) = &ds.status else {
        return Progress::waiting("Waiting for daemon set status to be reported...".into());
    };
    if !observed(&ds.metadata, status.observed_generation) {
        return Progress::waiting("Waiting for daemon set spec update to be observed...".into());
    }
    if ds
        .spec
        .as_ref()
        .and_then(|s| s.update_strategy.as_ref())
        .and_then(|s| s.type_.as_deref())
        == Some("OnDelete")
    {
        return Progress::done(
            "rollout status is only available for RollingUpdate strategy type".into(),
        );
    }

    let desired = status.desired_number_scheduled;
    let updated = status.updated_number_scheduled.unwrap_or(0);
    let available = status.number_available.unwrap_or(0);
    if updated < desired {
        Progress::waiting(format!(
            "Waiting for daemon set \"{}\" rollout to finish: {} out of {} new pods have been updated...",
            name, updated, desired
        ))
    } else if available < desired {
        Progress::waiting(format!(
            "Waiting for daemon set \"{}\" rollout to finish: {} of {} updated pods are available...",
            name, available, desired
        ))
    } else {
        Progress::done(format!("daemon set \"{}\" successfully rolled out", name))
    }
}

/// Merge patch that pauses or resumes a workload's rollout
pub(crate) fn pause_patch(kind: RolloutKind, paused: bool, replicas: i32) -> Value {
    match kind {
        RolloutKind::Deployment => json!({"spec": {"paused": paused}}),
        RolloutKind::StatefulSet => json!({"spec": {"updateStrategy": {
            "type": "RollingUpdate",
            "rollingUpdate": {"partition": if paused { replicas } else { 0 }},
        }}}),
        RolloutKind::DaemonSet if paused => {
            json!({"spec": {"updateStrategy": {"type": "OnDelete", "rollingUpdate": null}}})
        }
        RolloutKind::DaemonSet => {
            json!({"spec": {"updateStrategy": {"type": "RollingUpdate"}}})
        }
    }
}

/// Patch that stamps the pod template so every pod is replaced
pub(crate) fn restart_patch(now: &str) -> Value {
    json!({"spec": {"template": {"metadata": {"annotations": {RESTARTED_AT_ANNOTATION: now}}}}})
}

fn owned_by(meta: &ObjectMeta, owner: &ObjectMeta) -> bool {
    meta.owner_references.as_ref().is_some_and(|refs| {
        refs.iter().any(|r| match owner.uid.as_deref() {
            Some(uid) => r.uid == uid,
            None => Some(&r.name) == owner.name.as_ref(),
        })
    })
}

fn selector_of(selector: &LabelSelector) -> Result<String> {
    selector
        .match_labels
        .as_ref()
        .filter(|m| !m.is_empty())
        .map(util::selector_string)
        .ok_or_else(|| K8sError::Unsupported("workload has no matchLabels selector".into()))
}

fn annotation(meta: &ObjectMeta, key: &str) -> Option<String> {
    meta.annotations.as_ref().and_then(|a| a.get(key).cloned())
}

fn template_images(template: Option<&Value>) -> Vec<String> {
    template
        .and_then(|t| t.pointer("/spec/containers"))
        .and_then(Value::as_array)
        .map(|cs| {
            cs.iter()
                .filter_map(|c| c.get("image").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn replicaset_revision(rs: &ReplicaSet) -> Option<i64> {
    annotation(&rs.metadata, REVISION_ANNOTATION).and_then(|r| r.parse().ok())
}

/// Pick the revision to roll back to: the requested one, else the newest
/// revision older than `current`
pub(crate) fn pick_revision(
    available: &[i64],
    current: Option<i64>,
    requested: Option<i64>,
) -> Result<i64> {
    match requested {
        Some(r) if r <= 0 => Err(invalid("to_revision must be a positive number")),
        Some(r) => available.iter().copied().find(|v| *v == r).ok_or_else(|| {
            K8sError::NotFound(format!("unable to find specified revision {} in history", r))
        }),
        None => available
            .iter()
            .copied()
            .filter(|v| current.is_none_or(|c| *v < c))
            .max()
            .ok_or_else(|| K8sError::NotFound("no previous revision to roll back to".into())),
    }
}

impl KubeClient {
    /// Rollout progress of a deployment, statefulset or daemonset
    pub async fn rollout_status(
        &self,
        context: &str,
        namespace: &str,
        resource_type: &str,
        name: &str,
    ) -> Result<Value> {
        let kind = RolloutKind::parse(resource_type)?;
        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let client = target.client;

        let (meta, observed_generation, replicas, conditions, extra, progress) = match kind {
            RolloutKind::Deployment => {
                let d = Api::<Deployment>::namespaced(client, &ns).get(name).await?;
                let status = d.status.clone().unwrap_or_default();
                let replicas = json!({
                    "desired": d.spec.as_ref().and_then(|s| s.replicas),
                    "updated": status.updated_replicas,
                    "ready": status.ready_replicas,
                    "available": status.available_replicas,
                    "unavailable": status.unavailable_replicas,
                });
                let progress = deployment_progress(&d);
                let value = serde_json::to_value(&d)?;
                let paused = d.spec.as_ref().and_then(|s| s.paused).unwrap_or(false);
                (d.metadata, status.observed_generation, replicas, util::conditions(&value), json!({"paused": paused}), progress)
            }
            RolloutKind::StatefulSet => {
                let s = Api::<StatefulSet>::namespaced(client, &ns).get(name).await?;
                let status = s.status.clone().unwrap_or_default();
                let replicas = json!({
                    "desired": s.spec.as_ref().and_then(|s| s.replicas),
                    "current": status.current_replicas,
                    "updated": status.updated_replicas,
                    "ready": status.ready_replicas,
                    "available": status.available_replicas,
                });
                let progress = statefulset_progress(&s);
                let value = serde_json::to_value(&s)?;
                let extra = json!({
                    "current_revision": status.current_revision,
                    "update_revision": status.update_revision,
                });
                (s.metadata, status.observed_generation, replicas, util::conditions(&value), extra, progress)
            }
            RolloutKind::DaemonSet => {
                let d = Api::<DaemonSet>::namespaced(client, &ns).get(name).await?;
                let status = d.status.clone().unwrap_or_default();
                let replicas = json!({
                    "desired": status.desired_number_scheduled,
                    "current": status.current_number_scheduled,
                    "updated": status.updated_number_scheduled,
                    "ready": status.number_ready,
                    "available": status.number_available,
                    "unavailable": status.number_unavailable,
                    "misscheduled": status.number_misscheduled,
                });
                let progress = daemonset_progress(&d);
                let value = serde_json::to_value(&d)?;
                (d.metadata, status.observed_generation, replicas, util::conditions(&value), json!({}), progress)
            }
        };

        let mut result = json!({
            "kind": kind.kind(),
            "name": meta.name,
            "namespace": meta.namespace,
            "generation": meta.generation,
            "observed_generation": observed_generation,
            "replicas": replicas,
            "conditions": conditions,
            "complete": progress.complete,
            "message": progress.message,
        });
        if let (Some(obj), Value::Object(extra)) = (result.as_object_mut(), extra) {
            obj.extend(extra);
        }
        Ok(result)
    }

    async fn replicaset_history(
        &self,
        client: &kube::Client,
        ns: &str,
        deploy: &Deployment,
    ) -> Result<Vec<(RevisionInfo, ReplicaSet)>> {
        let selector = deploy
            .spec
            .as_ref()
            .map(|s| selector_of(&s.selector))
            .transpose()?
            .unwrap_or_default();
        let replica_sets = Api::<ReplicaSet>::namespaced(client.clone(), ns)
            .list(&ListParams::default().labels(&selector))
            .await?;

        let mut history: Vec<(RevisionInfo, ReplicaSet)> = replica_sets
            .items
            .into_iter()
            .filter(|rs| owned_by(&rs.metadata, &deploy.metadata))
            .filter_map(|rs| {
                let revision = replicaset_revision(&rs)?;
                let template = rs
                    .spec
                    .as_ref()
                    .and_then(|s| s.template.as_ref())
                    .and_then(|t| serde_json::to_value(t).ok());
                let info = RevisionInfo {
                    revision,
                    source: rs.metadata.name.clone().unwrap_or_default(),
                    change_cause: annotation(&rs.metadata, CHANGE_CAUSE_ANNOTATION),
                    images: template_images(template.as_ref()),
                    created: util::time(&rs.metadata.creation_timestamp),
                    ready_replicas: Some(rs.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0)),
                };
                Some((info, rs))
            })
            .collect();
        history.sort_by(|a, b| b.0.revision.cmp(&a.0.revision));
        Ok(history)
    }

    async fn controller_revision_history(
        &self,
        client: &kube::Client,
        ns: &str,
        owner: &ObjectMeta,
        selector: &LabelSelector,
    ) -> Result<Vec<(RevisionInfo, ControllerRevision)>> {
        let selector = selector_of(selector)?;
        let revisions = Api::<ControllerRevision>::namespaced(client.clone(), ns)
            .list(&ListParams::default().labels(&selector))
            .await?;

        let mut history: Vec<(RevisionInfo, ControllerRevision)> = revisions
            .items
            .into_iter()
            .filter(|rev| owned_by(&rev.metadata, owner))
            .map(|rev| {
                let template = rev.data.as_ref().and_then(|d| d.0.pointer("/spec/template"));
                let info = RevisionInfo {
                    revision: rev.revision,
                    source: rev.metadata.name.clone().unwrap_or_default(),
                    change_cause: annotation(&rev.metadata, CHANGE_CAUSE_ANNOTATION),
                    images: template_images(template),
                    created: util::time(&rev.metadata.creation_timestamp),
                    ready_replicas: None,
                };
                (info, rev)
            })
            .collect();
        history.sort_by(|a, b| b.0.revision.cmp(&a.0.revision));
        Ok(history)
    }

    /// Revision to roll a statefulset or daemonset back to, with its stored patch
    async fn controller_revision_target(
        &self,
        client: &kube::Client,
        ns: &str,
        owner: &ObjectMeta,
        selector: &LabelSelector,
        to_revision: Option<i64>,
    ) -> Result<(i64, Value)> {
        let history = self
            .controller_revision_history(client, ns, owner, selector)
            .await?;
        let available: Vec<i64> = history.iter().map(|(i, _)| i.revision).collect();
        let current = available.iter().copied().max();
        let revision = pick_revision(&available, current, to_revision)?;

        let data = history
            .into_iter()
            .find(|(i, _)| i.revision == revision)
            .and_then(|(_, rev)| rev.data)
            .ok_or_else(|| K8sError::NotFound(format!("revision {} has no template data", revision)))?;
        Ok((revision, data.0))
    }

    /// Revision history, newest first
    pub async fn rollout_history(
        &self,
        context: &str,
        namespace: &str,
        resource_type: &str,
        name: &str,
    ) -> Result<Value> {
        let kind = RolloutKind::parse(resource_type)?;
        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let client = &target.client;

        let revisions: Vec<RevisionInfo> = match kind {
            RolloutKind::Deployment => {
                let d = Api::<Deployment>::namespaced(client.clone(), &ns).get(name).await?;
                self.replicaset_history(client, &ns, &d)
                    .await?
                    .into_iter()
                    .map(|(info, _)| info)
                    .collect()
            }
            RolloutKind::StatefulSet => {
                let s = Api::<StatefulSet>::namespaced(client.clone(), &ns).get(name).await?;
                let selector = s.spec.as_ref().map(|s| s.selector.clone()).unwrap_or_default();
                self.controller_revision_history(client, &ns, &s.metadata, &selector)
                    .await?
                    .into_iter()
                    .map(|(info, _)| info)
                    .collect()
            }
            RolloutKind::DaemonSet => {
                let d = Api::<DaemonSet>::namespaced(client.clone(), &ns).get(name).await?;
                let selector = d.spec.as_ref().map(|s| s.selector.clone()).unwrap_or_default();
                self.controller_revision_history(client, &ns, &d.metadata, &selector)
                    .await?
                    .into_iter()
                    .map(|(info, _)| info)
                    .collect()
            }
        };

        Ok(json!({
            "resource": {"type": kind.name(), "name": name, "namespace": ns},
            "revisions": revisions,
        }))
    }

    /// Roll back to a previous revision
    pub async fn rollout_undo(
        &self,
        context: &str,
        namespace: &str,
        resource_type: &str,
        name: &str,
        to_revision: Option<i64>,
    ) -> Result<Value> {
        let kind = RolloutKind::parse(resource_type)?;
        if to_revision.is_some_and(|r| r <= 0) {
            return Err(invalid("to_revision must be a positive number"));
        }

        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let client = &target.client;

        let revision = match kind {
            RolloutKind::Deployment => {
                let api = Api::<Deployment>::namespaced(client.clone(), &ns);
                let mut deploy = api.get(name).await?;
                let history = self.replicaset_history(client, &ns, &deploy).await?;
                let current = annotation(&deploy.metadata, REVISION_ANNOTATION)
                    .and_then(|r| r.parse().ok());
                let available: Vec<i64> = history.iter().map(|(i, _)| i.revision).collect();
                let revision = pick_revision(&available, current, to_revision)?;

                let (_, rs) = history
                    .into_iter()
                    .find(|(i, _)| i.revision == revision)
                    .ok_or_else(|| K8sError::NotFound(format!("revision {} not found", revision)))?;
                let mut template = rs
                    .spec
                    .and_then(|s| s.template)
                    .ok_or_else(|| K8sError::NotFound("ReplicaSet has no pod template".into()))?;
                if let Some(labels) = template.metadata.as_mut().and_then(|m| m.labels.as_mut()) {
                    labels.remove("pod-template-hash");
                }

                if let Some(spec) = deploy.spec.as_mut() {
                    spec.template = template;
                }
                if let Some(cause) = annotation(&rs.metadata, CHANGE_CAUSE_ANNOTATION) {
                    deploy
                        .metadata
                        .annotations
                        .get_or_insert_with(BTreeMap::new)
                        .insert(CHANGE_CAUSE_ANNOTATION.to_string(), cause);
                }
                api.replace(name, &PostParams::default(), &deploy).await?;
                revision
            }
            RolloutKind::StatefulSet => {
                let api = Api::<StatefulSet>::namespaced(client.clone(), &ns);
                let s = api.get(name).await?;
                let selector = s.spec.map(|s| s.selector).unwrap_or_default();
                let (revision, data) = self
                    .controller_revision_target(client, &ns, &s.metadata, &selector, to_revision)
                    .await?;
                api.patch(name, &PatchParams::default(), &Patch::Strategic(&data)).await?;
                revision
            }
            RolloutKind::DaemonSet => {
                let api = Api::<DaemonSet>::namespaced(client.clone(), &ns);
                let d = api.get(name).await?;
                let selector = d.spec.map(|s| s.selector).unwrap_or_default();
                let (revision, data) = self
                    .controller_revision_target(client, &ns, &d.metadata, &selector, to_revision)
                    .await?;
                api.patch(name, &PatchParams::default(), &Patch::Strategic(&data)).await?;
                revision
            }
        };

        info!("Rolled back {} {}/{} to revision {}", kind, ns, name, revision);
        Ok(json!({
            "status": "Success",
            "message": format!("{} '{}' rolled back to revision {}", kind.kind(), name, revision),
            "revision": revision,
        }))
    }

    /// Restart all pods by stamping the template with the current time
    pub async fn rollout_restart(
        &self,
        context: &str,
        namespace: &str,
        resource_type: &str,
        name: &str,
    ) -> Result<Value> {
        let kind = RolloutKind::parse(resource_type)?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let patch = Patch::Merge(restart_patch(&now));
        self.patch_workload(context, namespace, kind.into(), name, &patch)
            .await?;

        info!("Restarted {} {}", kind, name);
        Ok(json!({
            "status": "Success",
            "message": format!("{} '{}' restarted", kind.kind(), name),
            "restarted_at": now,
        }))
    }

    /// Pause (`paused = true`) or resume a rollout
    pub async fn rollout_set_paused(
        &self,
        context: &str,
        namespace: &str,
        resource_type: &str,
        name: &str,
        paused: bool,
    ) -> Result<Value> {
        let kind = RolloutKind::parse(resource_type)?;

        let replicas = if kind == RolloutKind::StatefulSet && paused {
            let target = self.target(context).await?;
            let ns = target.namespace_or_default(Some(namespace)).to_string();
            Api::<StatefulSet>::namespaced(target.client, &ns)
                .get(name)
                .await?
                .spec
                .and_then(|s| s.replicas)
                .unwrap_or(1)
        } else {
            0
        };

        let patch = Patch::Merge(pause_patch(kind, paused, replicas));
        self.patch_workload(context, namespace, kind.into(), name, &patch)
            .await?;

        let verb = if paused { "paused" } else { "resumed" };
        info!("Rollout of {} {} {}", kind, name, verb);
        Ok(json!({
            "status": "Success",
            "message": format!("{} '{}' rollout {}", kind.kind(), name, verb),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(value: Value) -> Deployment {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deployment_progress() {
        let d = deployment(json!({
            "metadata": {"name": "web", "generation": 3},
            "spec": {"replicas": 3, "selector": {}, "template": {}},
            "status": {"observedGeneration": 3, "replicas": 3, "updatedReplicas": 3, "availableReplicas": 3}
        }));
        let p = deployment_progress(&d);
        assert!(p.complete);
        assert_eq!(p.message, "deployment \"web\" successfully rolled out");

        let d = deployment(json!({
            "metadata": {"name": "web", "generation": 4},
            "spec": {"replicas": 3, "selector": {}, "template": {}},
            "status": {"observedGeneration": 4, "replicas": 4, "updatedReplicas": 1, "availableReplicas": 3}
        }));
        let p = deployment_progress(&d);
        assert!(!p.complete);
        assert!(p.message.contains("1 out of 3 new replicas"));

        let d = deployment(json!({
            "metadata": {"name": "web", "generation": 5},
            "spec": {"replicas": 3, "selector": {}, "template": {}},
            "status": {"observedGeneration": 4}
        }));
        assert!(deployment_progress(&d).message.contains("spec update"));
    }

    #[test]
    fn test_statefulset_progress() {
        let s: StatefulSet = serde_json::from_value(json!({
            "metadata": {"name": "db", "generation": 2},
            "spec": {"replicas": 3, "selector": {}, "serviceName": "db", "template": {}},
            "status": {"observedGeneration": 2, "replicas": 3, "readyReplicas": 3, "updatedReplicas": 1,
                       "currentReplicas": 2, "currentRevision": "db-1", "updateRevision": "db-2"}
        }))
        .unwrap();
        let p = statefulset_progress(&s);
        assert!(!p.complete);
        assert!(p.message.contains("revision db-2"));
    }

    #[test]
    fn test_daemonset_progress() {
        let d: DaemonSet = serde_json::from_value(json!({
            "metadata": {"name": "agent"},
            "spec": {"selector": {}, "template": {}},
            "status": {"desiredNumberScheduled": 4, "currentNumberScheduled": 4, "numberReady": 4,
                       "numberMisscheduled": 0, "updatedNumberScheduled": 4, "numberAvailable": 4}
        }))
        .unwrap();
        assert!(daemonset_progress(&d).complete);
    }

    #[test]
    fn test_pause_patches() {
        assert_eq!(
            pause_patch(RolloutKind::Deployment, true, 0),
            json!({"spec": {"paused": true}})
        );
        assert_eq!(
            pause_patch(RolloutKind::StatefulSet, true, 5)["spec"]["updateStrategy"]["rollingUpdate"]["partition"],
            5
        );
        assert_eq!(
            pause_patch(RolloutKind::StatefulSet, false, 5)["spec"]["updateStrategy"]["rollingUpdate"]["partition"],
            0
        );
        assert_eq!(
            pause_patch(RolloutKind::DaemonSet, true, 0)["spec"]["updateStrategy"]["type"],
            "OnDelete"
        );
        assert_eq!(
            pause_patch(RolloutKind::DaemonSet, false, 0)["spec"]["updateStrategy"]["type"],
            "RollingUpdate"
        );
    }

    #[test]
    fn test_restart_patch() {
        let patch = restart_patch("2024-05-01T10:00:00Z");
        assert_eq!(
            patch["spec"]["template"]["metadata"]["annotations"]["kubectl.kubernetes.io/restartedAt"],
            "2024-05-01T10:00:00Z"
        );
    }

    #[test]
    fn test_pick_revision() {
        let available = [1, 2, 4];
        assert_eq!(pick_revision(&available, Some(4), None).unwrap(), 2);
        assert_eq!(pick_revision(&available, Some(4), Some(1)).unwrap(), 1);
        assert!(pick_revision(&available, Some(4), Some(3)).unwrap_err().is_not_found());
        assert!(pick_revision(&available, Some(4), Some(0)).unwrap_err().is_local());
        assert!(pick_revision(&[4], Some(4), None).is_err());
    }

    #[test]
    fn test_owned_by_uid() {
        let owner: ObjectMeta = serde_json::from_value(json!({"name": "web", "uid": "u-1"})).unwrap();
        let child: ObjectMeta = serde_json::from_value(json!({
            "name": "web-abc",
            "ownerReferences": [{"apiVersion": "apps/v1", "kind": "Deployment", "name": "web", "uid": "u-1"}]
        }))
        .unwrap();
        let stranger: ObjectMeta = serde_json::from_value(json!({
            "name": "web-xyz",
            "ownerReferences": [{"apiVersion": "apps/v1", "kind": "Deployment", "name": "web", "uid": "u-2"}]
        }))
        .unwrap();
        assert!(owned_by(&child, &owner));
        assert!(!owned_by(&stranger, &owner));
    }
}
