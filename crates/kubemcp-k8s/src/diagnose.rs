//! Application diagnosis: workload status, pod states, events and a log sample

use std::collections::BTreeMap;
use std::sync::LazyLock;

use futures::future::try_join_all;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ContainerStatus, Event, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::Api;
use kube::api::{ListParams, LogParams};
use kubemcp_types::{ContainerInfo, Diagnosis, EventInfo, Issue, LogSample, PodHealth};
use regex::Regex;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::KubeClient;
use crate::cluster::newest_events;
use crate::describe::capitalize;
use crate::error::{K8sError, Result};
use crate::resources::int_or_string;
use crate::util;
use crate::workload::WorkloadKind;

const DIAGNOSE_EVENTS: usize = 10;
const LOG_SAMPLE_CHARS: usize = 2000;
const RESTART_THRESHOLD: i32 = 5;

static OOM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(Out of memory|Killed|oom-kill)").expect("valid regex"));
static PERMISSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(permission denied|unauthorized|forbidden)").expect("valid regex")
});
static CONNECTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(connection refused|cannot connect|connect failed)").expect("valid regex")
});

/// What the diagnosis reads before looking at pods
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Subject {
    Deployment,
    StatefulSet,
    DaemonSet,
    Service,
    Labelled,
}

impl Subject {
    fn parse(resource_type: &str) -> Self {
        match resource_type {
            "service" | "services" | "svc" => Subject::Service,
            other => match WorkloadKind::parse(other) {
                Ok(WorkloadKind::Deployment) => Subject::Deployment,
                Ok(WorkloadKind::StatefulSet) => Subject::StatefulSet,
                Ok(WorkloadKind::DaemonSet) => Subject::DaemonSet,
                _ => Subject::Labelled,
            },
        }
    }

    fn title(&self, resource_type: &str) -> String {
        match self {
            Subject::Deployment => WorkloadKind::Deployment.kind().to_string(),
            Subject::StatefulSet => WorkloadKind::StatefulSet.kind().to_string(),
            Subject::DaemonSet => WorkloadKind::DaemonSet.kind().to_string(),
            Subject::Service => "Service".to_string(),
            Subject::Labelled => capitalize(resource_type),
        }
    }
}

/// Workload status, replica issues and pod selector
struct Reading {
    status: Value,
    issues: Vec<Issue>,
    selector: BTreeMap<String, String>,
}

fn ready_issue(kind: &str, ready: i32, desired: i32) -> Option<Issue> {
    (ready != desired).then(|| Issue::warning(format!("{} has {}/{} ready replicas", kind, ready, desired)))
}

fn match_labels(selector: &LabelSelector) -> BTreeMap<String, String> {
    selector.match_labels.clone().unwrap_or_default()
}

fn read_deployment(deploy: &Deployment) -> Reading {
    let desired = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = deploy.status.clone().unwrap_or_default();
    let ready = status.ready_replicas.unwrap_or(0);
    let unavailable = status.unavailable_replicas.unwrap_or(0);

    let mut issues = Vec::new();
    if unavailable > 0 {
        issues.push(Issue::warning(format!(
            "Deployment has {} unavailable replicas",
            unavailable
        )));
    }
    issues.extend(ready_issue("Deployment", ready, desired));

    let conditions: Vec<Value> = status
        .conditions
        .unwrap_or_default()
        .into_iter()
        .map(|c| json!({"type": c.type_, "status": c.status, "reason": c.reason, "message": c.message}))
        .collect();

    Reading {
        status: json!({
            "replicas": {
                "desired": desired,
                "ready": ready,
                "available": status.available_replicas.unwrap_or(0),
                "unavailable": unavailable,
            },
            "conditions": conditions,
        }),
        issues,
        selector: deploy.spec.as_ref().map(|s| match_labels(&s.selector)).unwrap_or_default(),
    }
}

fn read_statefulset(sts: &StatefulSet) -> Reading {
    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = sts.status.clone().unwrap_or_default();
    let ready = status.ready_replicas.unwrap_or(0);
    Reading {
        status: json!({
            "replicas": {
                "desired": desired,
                "ready": ready,
                "current": status.current_replicas.unwrap_or(0),
                "updated": status.updated_replicas.unwrap_or(0),
            },
        }),
        issues: ready_issue("StatefulSet", ready, desired).into_iter().collect(),
        selector: sts.spec.as_ref().map(|s| match_labels(&s.selector)).unwrap_or_default(),
    }
}

fn read_daemonset(ds: &DaemonSet) -> Reading {
    let status = ds.status.clone().unwrap_or_default();
    let desired = status.desired_number_scheduled;
    let ready = status.number_ready;
    Reading {
        status: json!({
            "replicas": {
                "desired": desired,
                "ready": ready,
                "available": status.number_available.unwrap_or(0),
                "unavailable": status.number_unavailable.unwrap_or(0),
            },
        }),
        issues: ready_issue("DaemonSet", ready, desired).into_iter().collect(),
        selector: ds.spec.as_ref().map(|s| match_labels(&s.selector)).unwrap_or_default(),
    }
}

fn read_service(svc: &Service) -> Reading {
    let spec = svc.spec.clone().unwrap_or_default();
    let ports: Vec<Value> = spec
        .ports
        .unwrap_or_default()
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "port": p.port,
                "target_port": p.target_port.as_ref().map(int_or_string),
                "protocol": p.protocol,
            })
        })
        .collect();
    Reading {
        status: json!({"type": spec.type_, "cluster_ip": spec.cluster_ip, "ports": ports}),
        issues: Vec::new(),
        selector: spec.selector.unwrap_or_default(),
    }
}

/// Copy the reading into the report and return its pod selector.
/// An empty selector would match every pod in the namespace, so it ends the diagnosis.
fn apply_reading(report: &mut Diagnosis, reading: Reading, title: &str) -> Option<String> {
    report.status = reading.status;
    report.issues.extend(reading.issues);
    if reading.selector.is_empty() {
        report.issues.push(
            Issue::warning(format!(
                "{} '{}' has no pod selector; pod checks were skipped",
                title, report.application
            ))
            .with_recommendation("Diagnose the workload that owns the pods instead"),
        );
        return None;
    }
    Some(util::selector_string(&reading.selector))
}

/// Classify one container status
pub(crate) fn container_health(pod: &str, status: &ContainerStatus) -> (ContainerInfo, Vec<Issue>) {
    let mut info = ContainerInfo::new(status.name.clone(), status.image.clone());
    info.ready = status.ready;
    info.restart_count = status.restart_count;
    let mut issues = Vec::new();
    let subject = format!("Container {} in pod {}", status.name, pod);

    let state = status.state.as_ref();
    if state.and_then(|s| s.running.as_ref()).is_some() {
        info.state = "running".into();
    } else if let Some(waiting) = state.and_then(|s| s.waiting.as_ref()) {
        info.state = "waiting".into();
        info.reason = waiting.reason.clone();
        info.message = waiting.message.clone();
        let problem = match waiting.reason.as_deref() {
            Some("CrashLoopBackOff") => Some("is in CrashLoopBackOff state"),
            Some("ImagePullBackOff") => Some("cannot pull image"),
            Some("ErrImagePull") => Some("has image pull error"),
            _ => None,
        };
        if let Some(problem) = problem {
            issues.push(
                Issue::error(format!("{} {}", subject, problem)).with_message(waiting.message.clone()),
            );
        }
    } else if let Some(terminated) = state.and_then(|s| s.terminated.as_ref()) {
        info.state = "terminated".into();
        info.reason = terminated.reason.clone();
        info.exit_code = Some(terminated.exit_code);
        if terminated.reason.as_deref() == Some("OOMKilled") {
            issues.push(
                Issue::error(format!(
                    "{} was terminated due to OOM (Out of Memory)",
                    subject
                ))
                .with_recommendation("Consider increasing memory limits for this container"),
            );
        } else if terminated.exit_code != 0 {
            issues.push(
                Issue::error(format!(
                    "{} terminated with exit code {}",
                    subject, terminated.exit_code
                ))
                .with_reason(terminated.reason.clone()),
            );
        }
    }

    if status.restart_count > RESTART_THRESHOLD {
        issues.push(
            Issue::warning(format!("{} has restarted {} times", subject, status.restart_count))
                .with_recommendation("Check logs for errors"),
        );
    }
    (info, issues)
}

pub(crate) fn pod_health(pod: &Pod) -> (PodHealth, Vec<Issue>) {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    let mut containers = Vec::new();
    let mut issues = Vec::new();
    for status in statuses {
        let (info, found) = container_health(&name, status);
        containers.push(info);
        issues.extend(found);
    }

    let health = PodHealth {
        phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
        node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        restart_count: statuses.iter().map(|c| c.restart_count).sum(),
        ready: statuses.iter().all(|c| c.ready),
        name,
        containers,
    };
    (health, issues)
}

/// Warning events with failure-like reasons
pub(crate) fn event_issue(event: &EventInfo) -> Option<Issue> {
    if event.type_.as_deref() != Some("Warning") {
        return None;
    }
    let reason = event.reason.as_deref()?;
    if !["Failed", "Error", "BackOff"].iter().any(|r| reason.contains(r)) {
        return None;
    }
    let object = &event.involved_object;
    Some(
        Issue::error(format!(
            "Event: {} for {}/{}",
            reason,
            object.kind.as_deref().unwrap_or_default(),
            object.name.as_deref().unwrap_or_default()
        ))
        .with_message(event.message.clone()),
    )
}

pub(crate) fn scan_logs(container: &str, logs: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    if OOM_PATTERN.is_match(logs) {
        issues.push(
            Issue::error(format!(
                "Out of Memory issue detected in logs for container {}",
                container
            ))
            .with_recommendation("Increase memory limits and/or optimize application memory usage"),
        );
    }
    if PERMISSION_PATTERN.is_match(logs) {
        issues.push(
            Issue::error(format!(
                "Permission or authorization issue detected in logs for container {}",
                container
            ))
            .with_recommendation("Check RBAC permissions or service account settings"),
        );
    }
    if CONNECTION_PATTERN.is_match(logs) {
        issues.push(
            Issue::warning(format!(
                "Connection issue detected in logs for container {}",
                container
            ))
            .with_recommendation("Check network policies, service connectivity, or firewall rules"),
        );
    }
    issues
}

/// Last `max` characters of `s`
fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    match s.char_indices().nth(count - max) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

impl KubeClient {
    /// Diagnose an application; a missing workload is reported as an issue
    pub async fn diagnose_application(
        &self,
        context: &str,
        namespace: &str,
        app_name: &str,
        resource_type: &str,
    ) -> Result<Diagnosis> {
        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let client = target.client;
        let resource_type = resource_type.trim().to_lowercase();
        let subject = Subject::parse(&resource_type);
        let mut report = Diagnosis::new(app_name, &ns, &resource_type);

        let reading = match subject {
            Subject::Deployment => Api::<Deployment>::namespaced(client.clone(), &ns)
                .get(app_name)
                .await
                .map(|d| read_deployment(&d)),
            Subject::StatefulSet => Api::<StatefulSet>::namespaced(client.clone(), &ns)
                .get(app_name)
                .await
                .map(|s| read_statefulset(&s)),
            Subject::DaemonSet => Api::<DaemonSet>::namespaced(client.clone(), &ns)
                .get(app_name)
                .await
                .map(|d| read_daemonset(&d)),
            Subject::Service => Api::<Service>::namespaced(client.clone(), &ns)
                .get(app_name)
                .await
                .map(|s| read_service(&s)),
            Subject::Labelled => {
                let selector = BTreeMap::from([("app".to_string(), app_name.to_string())]);
                Ok(Reading {
                    status: json!({"message": format!(
                        "Using default label selector for {}: app={}",
                        resource_type, app_name
                    )}),
                    issues: Vec::new(),
                    selector,
                })
            }
        };

        let reading = match reading.map_err(K8sError::from) {
            Ok(reading) => reading,
            Err(err) if err.is_not_found() => {
                report.issues.push(Issue::error(format!(
                    "{} '{}' not found in namespace '{}'",
                    subject.title(&resource_type),
                    app_name,
                    ns
                )));
                report.grade();
                return Ok(report);
            }
            Err(err) => return Err(err),
        };
        let title = subject.title(&resource_type);
        let Some(selector) = apply_reading(&mut report, reading, &title) else {
            report.grade();
            return Ok(report);
        };
        let pods_api: Api<Pod> = Api::namespaced(client.clone(), &ns);
        let pods = pods_api
            .list(&ListParams::default().labels(&selector))
            .await?
            .items;
        debug!("Diagnosing {} pods for {}/{}", pods.len(), ns, app_name);

        if pods.is_empty() {
            report.issues.push(Issue::warning(format!(
                "No pods found for {}/{} with selector {}",
                resource_type, app_name, selector
            )));
        }
        for pod in &pods {
            let (health, issues) = pod_health(pod);
            report.pods.push(health);
            report.issues.extend(issues);
        }

        let events_api: Api<Event> = Api::namespaced(client, &ns);
        let names = std::iter::once(app_name.to_string())
            .chain(pods.iter().filter_map(|p| p.metadata.name.clone()));
        let lists = try_join_all(names.map(|name| {
            let api = events_api.clone();
            async move {
                api.list(&ListParams::default().fields(&format!("involvedObject.name={}", name)))
                    .await
                    .map(|list| list.items)
            }
        }))
        .await?;
        report.events = newest_events(lists.into_iter().flatten().collect(), DIAGNOSE_EVENTS);
        let event_issues: Vec<Issue> = report.events.iter().filter_map(event_issue).collect();
        report.issues.extend(event_issues);

        let problem = report
            .pods
            .iter()
            .find(|p| !p.ready || p.restart_count > 0)
            .and_then(|p| p.containers.first().map(|c| (p.name.clone(), c.name.clone())));
        if let (Some((pod, container)), false) = (problem, report.issues.is_empty()) {
            let params = LogParams {
                container: Some(container.clone()),
                tail_lines: Some(self.settings().diagnose_log_lines),
                ..Default::default()
            };
            match pods_api.logs(&pod, &params).await {
                Ok(logs) => {
                    report.issues.extend(scan_logs(&container, &logs));
                    report.log_sample = Some(LogSample {
                        pod,
                        container,
                        content: tail_chars(&logs, LOG_SAMPLE_CHARS).to_string(),
                    });
                }
                Err(err) => report.log_error = Some(K8sError::from(err).to_string()),
            }
        }

        report.grade();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubemcp_types::{Health, ObjectRefInfo, Severity};

    fn container(value: Value) -> ContainerStatus {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_subject_parse() {
        assert_eq!(Subject::parse("deployment"), Subject::Deployment);
        assert_eq!(Subject::parse("sts"), Subject::StatefulSet);
        assert_eq!(Subject::parse("ds"), Subject::DaemonSet);
        assert_eq!(Subject::DaemonSet.title("ds"), "DaemonSet");
        assert_eq!(Subject::parse("svc"), Subject::Service);
        assert_eq!(Subject::parse("replicaset"), Subject::Labelled);
        assert_eq!(Subject::parse("job"), Subject::Labelled);
        assert_eq!(Subject::Labelled.title("job"), "Job");
    }

    #[test]
    fn test_crash_loop_container() {
        let status = container(json!({
            "name": "app", "image": "shop/app:1", "imageID": "", "ready": false, "restartCount": 9,
            "state": {"waiting": {"reason": "CrashLoopBackOff", "message": "back-off 5m0s"}}
        }));
        let (info, issues) = container_health("web-1", &status);
        assert_eq!(info.state, "waiting");
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::Error);
        assert!(issues[0].issue.contains("CrashLoopBackOff"));
        assert_eq!(issues[0].message.as_deref(), Some("back-off 5m0s"));
        assert_eq!(issues[1].severity, Severity::Warning);
        assert!(issues[1].issue.contains("restarted 9 times"));
    }

    #[test]
    fn test_image_pull_errors() {
        for (reason, text) in [
            ("ImagePullBackOff", "cannot pull image"),
            ("ErrImagePull", "image pull error"),
        ] {
            let status = container(json!({
                "name": "app", "image": "nope", "imageID": "", "ready": false, "restartCount": 0,
                "state": {"waiting": {"reason": reason}}
            }));
            let (_, issues) = container_health("web-1", &status);
            assert_eq!(issues.len(), 1);
            assert!(issues[0].issue.contains(text));
        }
    }

    #[test]
    fn test_terminated_containers() {
        let oom = container(json!({
            "name": "app", "image": "x", "imageID": "", "ready": false, "restartCount": 1,
            "state": {"terminated": {"reason": "OOMKilled", "exitCode": 137}}
        }));
        let (info, issues) = container_health("p", &oom);
        assert_eq!(info.exit_code, Some(137));
        assert!(issues[0].recommendation.is_some());

        let failed = container(json!({
            "name": "app", "image": "x", "imageID": "", "ready": false, "restartCount": 0,
            "state": {"terminated": {"reason": "Error", "exitCode": 2}}
        }));
        let (_, issues) = container_health("p", &failed);
        assert!(issues[0].issue.contains("exit code 2"));
        assert_eq!(issues[0].reason.as_deref(), Some("Error"));

        let done = container(json!({
            "name": "app", "image": "x", "imageID": "", "ready": false, "restartCount": 0,
            "state": {"terminated": {"reason": "Completed", "exitCode": 0}}
        }));
        assert!(container_health("p", &done).1.is_empty());
    }

    #[test]
    fn test_pod_health_totals() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "web-1"},
            "spec": {"nodeName": "node-a", "containers": []},
            "status": {"phase": "Running", "containerStatuses": [
                {"name": "a", "image": "x", "imageID": "", "ready": true, "restartCount": 1,
                 "state": {"running": {}}},
                {"name": "b", "image": "y", "imageID": "", "ready": false, "restartCount": 2,
                 "state": {"running": {}}}
            ]}
        }))
        .unwrap();
        let (health, issues) = pod_health(&pod);
        assert_eq!(health.restart_count, 3);
        assert!(!health.ready);
        assert_eq!(health.node.as_deref(), Some("node-a"));
        assert!(issues.is_empty());
    }

    #[test]
    fn test_event_issue() {
        let mut event = EventInfo {
            timestamp: None,
            type_: Some("Warning".into()),
            reason: Some("FailedScheduling".into()),
            message: Some("0/3 nodes are available".into()),
            count: Some(4),
            source: Default::default(),
            involved_object: ObjectRefInfo {
                kind: Some("Pod".into()),
                namespace: Some("shop".into()),
                name: Some("web-1".into()),
            },
        };
        let issue = event_issue(&event).unwrap();
        assert_eq!(issue.issue, "Event: FailedScheduling for Pod/web-1");

        event.reason = Some("Unhealthy".into());
        assert!(event_issue(&event).is_none());

        event.reason = Some("BackOff".into());
        event.type_ = Some("Normal".into());
        assert!(event_issue(&event).is_none());
    }

    #[test]
    fn test_scan_logs() {
        let logs = "starting\nERROR: dial tcp 10.0.0.1:5432: connection refused\nopen /data: Permission denied\n";
        let issues = scan_logs("app", logs);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].issue.contains("Permission"));
        assert_eq!(issues[1].severity, Severity::Warning);

        assert!(scan_logs("app", "all good").is_empty());
        assert_eq!(scan_logs("app", "process Killed")[0].severity, Severity::Error);
    }

    #[test]
    fn test_deployment_reading() {
        let deploy: Deployment = serde_json::from_value(json!({
            "metadata": {"name": "web"},
            "spec": {"replicas": 3, "selector": {"matchLabels": {"app": "web"}}, "template": {}},
            "status": {"readyReplicas": 1, "availableReplicas": 1, "unavailableReplicas": 2}
        }))
        .unwrap();
        let reading = read_deployment(&deploy);
        assert_eq!(reading.issues.len(), 2);
        assert_eq!(reading.status["replicas"]["unavailable"], 2);
        assert_eq!(util::selector_string(&reading.selector), "app=web");

        let mut report = Diagnosis::new("web", "shop", "deployment");
        report.issues = reading.issues;
        report.grade();
        assert_eq!(report.health, Health::Degraded);
    }

    #[test]
    fn test_service_without_selector_stops_early() {
        let svc: Service = serde_json::from_value(json!({
            "metadata": {"name": "external-db"},
            "spec": {"type": "ClusterIP", "ports": [{"port": 5432}]}
        }))
        .unwrap();
        let mut report = Diagnosis::new("external-db", "shop", "service");
        let selector = apply_reading(&mut report, read_service(&svc), "Service");

        assert!(selector.is_none());
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].issue.contains("no pod selector"));
        assert_eq!(report.status["ports"][0]["port"], 5432);
        report.grade();
        assert_eq!(report.health, Health::Degraded);
    }

    #[test]
    fn test_reading_selector_is_returned() {
        let svc: Service = serde_json::from_value(json!({
            "metadata": {"name": "web"},
            "spec": {"selector": {"app": "web", "tier": "front"}}
        }))
        .unwrap();
        let mut report = Diagnosis::new("web", "shop", "service");
        let selector = apply_reading(&mut report, read_service(&svc), "Service");
        assert_eq!(selector.as_deref(), Some("app=web,tier=front"));
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 3), "ab");
        assert_eq!(tail_chars("ääää", 2), "ää");
    }
}
