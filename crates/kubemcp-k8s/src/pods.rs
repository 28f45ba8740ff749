//! Pod logs and exec

use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::{AttachParams, LogParams};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::client::KubeClient;
use crate::error::{K8sError, Result, invalid};
use crate::util;

/// Options for a log request
#[derive(Clone, Debug, Default)]
pub struct LogOptions {
    pub container: Option<String>,
    pub previous: bool,
    pub since: Option<String>,
    pub tail_lines: Option<i64>,
}

/// Options for an exec request
#[derive(Clone, Debug, Default)]
pub struct ExecOptions {
    pub container: Option<String>,
    pub namespace: Option<String>,
    pub stdin: bool,
    pub tty: bool,
    pub timeout_secs: Option<u64>,
}

/// Container the logs come from, plus a note when others were passed over
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ContainerChoice {
    pub name: String,
    pub note: Option<String>,
}

pub(crate) fn container_names(pod: &Pod) -> Vec<String> {
    pod.spec
        .as_ref()
        .map(|s| s.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// Pick the container to read logs from
pub(crate) fn choose_container(
    pod_name: &str,
    containers: &[String],
    requested: Option<&str>,
) -> Result<ContainerChoice> {
    if let Some(requested) = requested {
        return if containers.iter().any(|c| c == requested) {
            Ok(ContainerChoice {
                name: requested.to_string(),
                note: None,
            })
        } else {
            Err(invalid(format!(
                "container '{}' not found in pod '{}'. Available containers: {}",
                requested,
                pod_name,
                containers.join(", ")
            )))
        };
    }

    let (first, rest) = containers
        .split_first()
        .ok_or_else(|| K8sError::NotFound(format!("pod '{}' has no containers", pod_name)))?;
    let note = (!rest.is_empty()).then(|| {
        format!(
            "Note: Pod has multiple containers, showing logs for container '{}'. Other containers: {}\n\n",
            first,
            rest.join(", ")
        )
    });
    Ok(ContainerChoice {
        name: first.clone(),
        note,
    })
}

/// Split a shell-ish command string on whitespace, or take an argv as is
pub fn command_argv(command: &Value) -> Result<Vec<String>> {
    let argv: Vec<String> = match command {
        Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("command array must contain only strings"))
            })
            .collect::<Result<_>>()?,
        _ => return Err(invalid("command must be a string or an array of strings")),
    };
    if argv.is_empty() || argv[0].is_empty() {
        return Err(invalid("command must not be empty"));
    }
    Ok(argv)
}

/// Read a stream to EOF, keeping at most `limit` bytes
async fn read_capped(stream: Option<impl AsyncRead + Unpin>, limit: u64) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut truncated = false;
    if let Some(mut stream) = stream {
        (&mut stream).take(limit).read_to_end(&mut buf).await?;
        // the remote command blocks on a full pipe, so the rest is drained and dropped
        truncated = tokio::io::copy(&mut stream, &mut tokio::io::sink()).await? > 0;
    }
    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        text.push_str(&format!("\n[output truncated at {} bytes]", limit));
    }
    Ok(text)
}

impl KubeClient {
    /// Fetch logs of one container of a pod
    pub async fn get_pod_logs(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
        opts: LogOptions,
    ) -> Result<String> {
        let since_seconds = opts.since.as_deref().map(util::parse_duration).transpose()?;
        if opts.tail_lines.is_some_and(|n| n < 0) {
            return Err(invalid("tailLines must not be negative"));
        }

        let target = self.target(context).await?;
        let ns = target.namespace_or_default(Some(namespace)).to_string();
        let pods: Api<Pod> = Api::namespaced(target.client, &ns);
        let pod_obj = pods.get_opt(pod).await?.ok_or_else(|| {
            K8sError::NotFound(format!("pod '{}' not found in namespace '{}'", pod, ns))
        })?;

        let choice = choose_container(pod, &container_names(&pod_obj), opts.container.as_deref())?;
        debug!("Reading logs of {}/{} container {}", ns, pod, choice.name);

        let params = LogParams {
            container: Some(choice.name),
            previous: opts.previous,
            since_seconds,
            tail_lines: opts.tail_lines,
            limit_bytes: Some(self.settings().log_limit_bytes),
            ..Default::default()
        };
        let logs = pods.logs(pod, &params).await?;

        Ok(match choice.note {
            Some(note) => note + &logs,
            None => logs,
        })
    }

    /// Run a command in a container over the exec subresource
    pub async fn pod_exec(
        &self,
        context: &str,
        pod_name: &str,
        command: Vec<String>,
        opts: ExecOptions,
    ) -> Result<Value> {
        if command.is_empty() {
            return Err(invalid("command must not be empty"));
        }

        let target = self.target(context).await?;
        let ns = target.namespace_or_default(opts.namespace.as_deref()).to_string();
        let pods: Api<Pod> = Api::namespaced(target.client, &ns);

        let mut params = AttachParams::default()
            .stdin(opts.stdin)
            .stdout(true)
            .stderr(!opts.tty)
            .tty(opts.tty);
        if let Some(container) = &opts.container {
            params = params.container(container.clone());
        }

        let timeout = self.settings().exec_timeout(opts.timeout_secs);
        debug!("Exec in {}/{}: {:?}", ns, pod_name, command);

        let run = async {
            let mut attached = pods.exec(pod_name, command.clone(), &params).await?;
            // nothing to send; closing stdin lets the command see EOF
            drop(attached.stdin());

            let stdout = attached.stdout();
            let stderr = attached.stderr();
            let limit = self.settings().log_limit_bytes.max(0) as u64;
            let (stdout, stderr) = tokio::join!(read_capped(stdout, limit), read_capped(stderr, limit));
            let status = match attached.take_status() {
                Some(status) => status.await,
                None => None,
            };
            attached.join().await.map_err(|e| K8sError::Connect {
                context: target.context.name.clone(),
                message: format!("exec stream failed: {}", e),
            })?;
            Ok::<_, K8sError>((stdout?, stderr?, status))
        };

        let (stdout, stderr, status) = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| {
                warn!("Exec in {}/{} timed out", ns, pod_name);
                K8sError::Timeout(format!(
                    "command in pod '{}' did not finish within {}s",
                    pod_name,
                    timeout.as_secs()
                ))
            })??;

        let (exec_status, message) = match status {
            Some(s) => (
                s.status.unwrap_or_else(|| "Unknown".to_string()),
                s.message,
            ),
            None => ("Unknown".to_string(), None),
        };

        Ok(json!({
            "status": exec_status,
            "message": message,
            "pod": pod_name,
            "namespace": ns,
            "container": opts.container.as_deref().unwrap_or("default"),
            "command": command,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_capped() {
        let text = read_capped(Some(&b"hello world"[..]), 5).await.unwrap();
        assert_eq!(text, "hello\n[output truncated at 5 bytes]");

        let text = read_capped(Some(&b"hello"[..]), 5).await.unwrap();
        assert_eq!(text, "hello");

        let text = read_capped(None::<&[u8]>, 5).await.unwrap();
        assert!(text.is_empty());
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_choose_single_container() {
        let choice = choose_container("web", &names(&["app"]), None).unwrap();
        assert_eq!(choice.name, "app");
        assert!(choice.note.is_none());
    }

    #[test]
    fn test_choose_first_of_many_with_note() {
        let choice = choose_container("web", &names(&["app", "sidecar", "proxy"]), None).unwrap();
        assert_eq!(choice.name, "app");
        let note = choice.note.unwrap();
        assert!(note.contains("'app'"));
        assert!(note.contains("sidecar, proxy"));
    }

    #[test]
    fn test_choose_named_container() {
        let containers = names(&["app", "sidecar"]);
        let choice = choose_container("web", &containers, Some("sidecar")).unwrap();
        assert_eq!(choice.name, "sidecar");
        assert!(choice.note.is_none());

        let err = choose_container("web", &containers, Some("db")).unwrap_err();
        assert!(err.is_local());
        assert!(err.to_string().contains("app, sidecar"));
    }

    #[test]
    fn test_command_argv() {
        assert_eq!(
            command_argv(&json!("ls  -la /tmp")).unwrap(),
            vec!["ls", "-la", "/tmp"]
        );
        assert_eq!(
            command_argv(&json!(["sh", "-c", "echo hi there"])).unwrap(),
            vec!["sh", "-c", "echo hi there"]
        );
        assert!(command_argv(&json!("   ")).is_err());
        assert!(command_argv(&json!([])).is_err());
        assert!(command_argv(&json!([1, 2])).is_err());
        assert!(command_argv(&json!(42)).is_err());
    }
}
