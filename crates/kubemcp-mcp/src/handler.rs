//! Tool router and MCP server handler

use std::future::Future;
use std::sync::Arc;

use kubemcp_k8s::{
    DescribeOptions, DrainOptions, ExecOptions, ExposeOptions, KubeClient, LogOptions,
    MetadataField, PatchType, ResourceValues, command_argv,
};
use rmcp::handler::server::{tool::ToolRouter, wrapper::Parameters};
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::params;

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn owned_non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Shape a tool outcome: local failures are JSON-RPC errors, cluster
/// failures are `isError` results
fn reply(
    tool: &str,
    context: &str,
    outcome: crate::error::Result<String>,
) -> Result<CallToolResult, McpError> {
    match outcome {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(err) if err.is_protocol_error() => {
            warn!("Rejected {} on context {}: {}", tool, context, err);
            Err(err.to_protocol_error())
        }
        Err(err) => {
            warn!("Tool {} failed on context {}: {}", tool, context, err);
            Ok(CallToolResult::error(vec![Content::text(err.to_string())]))
        }
    }
}

/// MCP server exposing Kubernetes tools over a shared client
#[derive(Clone)]
pub struct KubeHandler {
    client: Arc<KubeClient>,
    tool_router: ToolRouter<Self>,
}

impl KubeHandler {
    /// Await a call and return its value as pretty JSON text
    async fn run<T, E>(
        &self,
        tool: &str,
        context: &str,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<CallToolResult, McpError>
    where
        T: Serialize,
        E: Into<ToolError>,
    {
        debug!("Calling tool {} on context {}", tool, context);
        let outcome = call
            .await
            .map_err(Into::<ToolError>::into)
            .and_then(|value| serde_json::to_string_pretty(&value).map_err(ToolError::from));
        reply(tool, context, outcome)
    }
}

#[tool_router]
impl KubeHandler {
    pub fn new(client: Arc<KubeClient>) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
        }
    }

    // ===== CONTEXTS & CLUSTER INFO =====

    #[tool(description = "List all Kubernetes contexts found in the kubeconfig directory.")]
    async fn k8s_get_contexts(&self) -> Result<CallToolResult, McpError> {
        let contexts = self.client.registry().list();
        self.run("k8s_get_contexts", "-", async { Ok::<_, ToolError>(contexts) })
            .await
    }

    #[tool(description = "List all namespaces in a Kubernetes context.")]
    async fn k8s_get_namespaces(
        &self,
        Parameters(p): Parameters<params::ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run("k8s_get_namespaces", &p.context, self.client.get_namespaces(&p.context))
            .await
    }

    #[tool(description = "List the nodes of a cluster with status, roles, addresses and capacity.")]
    async fn k8s_get_nodes(
        &self,
        Parameters(p): Parameters<params::ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run("k8s_get_nodes", &p.context, self.client.get_nodes(&p.context))
            .await
    }

    #[tool(description = "List events in a namespace, newest first.")]
    async fn k8s_get_events(
        &self,
        Parameters(p): Parameters<params::EventsParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = usize::try_from(p.limit).unwrap_or(0);
        let call = self.client.get_events(&p.context, &p.namespace, limit);
        self.run("k8s_get_events", &p.context, call).await
    }

    #[tool(description = "Display CPU and memory usage of nodes (requires metrics-server).")]
    async fn k8s_top_nodes(
        &self,
        Parameters(p): Parameters<params::ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run("k8s_top_nodes", &p.context, self.client.top_nodes(&p.context))
            .await
    }

    #[tool(
        description = "Display CPU and memory usage of pods per container (requires metrics-server)."
    )]
    async fn k8s_top_pods(
        &self,
        Parameters(p): Parameters<params::TopPodsParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.top_pods(&p.context, non_empty(&p.namespace));
        self.run("k8s_top_pods", &p.context, call).await
    }

    #[tool(description = "List the API groups, versions and resources served by the cluster.")]
    async fn k8s_apis(
        &self,
        Parameters(p): Parameters<params::ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run("k8s_apis", &p.context, self.client.get_apis(&p.context))
            .await
    }

    #[tool(description = "List the CustomResourceDefinitions installed in the cluster.")]
    async fn k8s_crds(
        &self,
        Parameters(p): Parameters<params::ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run("k8s_crds", &p.context, self.client.get_crds(&p.context))
            .await
    }

    // ===== GENERIC RESOURCES =====

    #[tool(
        description = "List resources of a kind. Pods, deployments, services and ingresses are summarized; other kinds are returned in full."
    )]
    async fn k8s_get_resources(
        &self,
        Parameters(p): Parameters<params::GetResourcesParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.get_resources(
            &p.context,
            &p.kind,
            non_empty(&p.namespace),
            non_empty(&p.group),
            non_empty(&p.version),
        );
        self.run("k8s_get_resources", &p.context, call).await
    }

    #[tool(description = "Get a single resource as a complete object.")]
    async fn k8s_get_resource(
        &self,
        Parameters(p): Parameters<params::GetResourceParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.get_resource(
            &p.context,
            non_empty(&p.namespace),
            &p.kind,
            &p.name,
            non_empty(&p.group),
            non_empty(&p.version),
        );
        self.run("k8s_get_resource", &p.context, call).await
    }

    #[tool(description = "Show details of a resource or group of resources, like kubectl describe.")]
    async fn k8s_describe(
        &self,
        Parameters(p): Parameters<params::DescribeParams>,
    ) -> Result<CallToolResult, McpError> {
        let opts = DescribeOptions {
            name: owned_non_empty(p.name),
            namespace: owned_non_empty(p.namespace),
            selector: owned_non_empty(p.selector),
            all_namespaces: p.all_namespaces,
        };
        let call = self.client.describe(&p.context, &p.resource_type, opts);
        self.run("k8s_describe", &p.context, call).await
    }

    #[tool(description = "Create resources from YAML (multi-document allowed) or JSON content.")]
    async fn k8s_create_resource(
        &self,
        Parameters(p): Parameters<params::ManifestParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self
            .client
            .create_resource(&p.context, &p.yaml_content, non_empty(&p.namespace));
        self.run("k8s_create_resource", &p.context, call).await
    }

    #[tool(
        description = "Apply YAML or JSON content with server-side apply; reports created or configured per object."
    )]
    async fn k8s_apply_resource(
        &self,
        Parameters(p): Parameters<params::ManifestParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self
            .client
            .apply_resource(&p.context, &p.yaml_content, non_empty(&p.namespace));
        self.run("k8s_apply_resource", &p.context, call).await
    }

    #[tool(description = "Update fields of a resource with a merge or strategic merge patch.")]
    async fn k8s_patch_resource(
        &self,
        Parameters(p): Parameters<params::PatchParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = async {
            let patch_type = PatchType::parse(p.patch_type.as_deref())?;
            let patched = self
                .client
                .patch_resource(
                    &p.context,
                    &p.resource_type,
                    &p.name,
                    &p.patch,
                    non_empty(&p.namespace),
                    patch_type,
                )
                .await?;
            Ok::<_, ToolError>(patched)
        };
        self.run("k8s_patch_resource", &p.context, call).await
    }

    #[tool(
        description = "Add, change or remove labels on a resource. A key ending in '-' removes the label."
    )]
    async fn k8s_label_resource(
        &self,
        Parameters(p): Parameters<params::LabelParams>,
    ) -> Result<CallToolResult, McpError> {
        const TOOL: &str = "k8s_label_resource";
        let call = async {
            let labels = params::string_map(TOOL, "labels", &p.labels)?;
            let updated = self
                .client
                .update_metadata(
                    &p.context,
                    MetadataField::Labels,
                    &p.resource_type,
                    &p.name,
                    &labels,
                    non_empty(&p.namespace),
                    p.overwrite,
                )
                .await?;
            Ok::<_, ToolError>(updated)
        };
        self.run(TOOL, &p.context, call).await
    }

    #[tool(
        description = "Add, change or remove annotations on a resource. A key ending in '-' removes the annotation."
    )]
    async fn k8s_annotate_resource(
        &self,
        Parameters(p): Parameters<params::AnnotateParams>,
    ) -> Result<CallToolResult, McpError> {
        const TOOL: &str = "k8s_annotate_resource";
        let call = async {
            let annotations = params::string_map(TOOL, "annotations", &p.annotations)?;
            let updated = self
                .client
                .update_metadata(
                    &p.context,
                    MetadataField::Annotations,
                    &p.resource_type,
                    &p.name,
                    &annotations,
                    non_empty(&p.namespace),
                    p.overwrite,
                )
                .await?;
            Ok::<_, ToolError>(updated)
        };
        self.run(TOOL, &p.context, call).await
    }

    // ===== PODS =====

    #[tool(description = "Get the logs of a pod container.")]
    async fn k8s_get_pod_logs(
        &self,
        Parameters(p): Parameters<params::LogsParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Calling tool k8s_get_pod_logs on context {}", p.context);
        let opts = LogOptions {
            container: owned_non_empty(p.container),
            previous: p.previous_container,
            since: owned_non_empty(p.since_duration),
            tail_lines: p.tail_lines,
        };
        // plain text, not JSON
        let outcome = self
            .client
            .get_pod_logs(&p.context, &p.namespace, &p.pod, opts)
            .await
            .map_err(ToolError::from);
        reply("k8s_get_pod_logs", &p.context, outcome)
    }

    #[tool(
        description = "Execute a command in a pod container and return stdout, stderr and the exit status."
    )]
    async fn k8s_pod_exec(
        &self,
        Parameters(p): Parameters<params::ExecParams>,
    ) -> Result<CallToolResult, McpError> {
        let params::ExecParams {
            context,
            pod_name,
            command,
            container,
            namespace,
            stdin,
            tty,
            timeout,
        } = p;
        let opts = ExecOptions {
            container: owned_non_empty(container),
            namespace: owned_non_empty(namespace),
            stdin,
            tty,
            timeout_secs: timeout,
        };
        let call = async {
            let argv = command_argv(&command)?;
            self.client.pod_exec(&context, &pod_name, argv, opts).await
        };
        self.run("k8s_pod_exec", &context, call).await
    }

    // ===== ROLLOUTS =====

    #[tool(description = "Get the rollout status of a deployment, statefulset or daemonset.")]
    async fn k8s_rollout_status(
        &self,
        Parameters(p): Parameters<params::RolloutParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self
            .client
            .rollout_status(&p.context, &p.namespace, &p.resource_type, &p.name);
        self.run("k8s_rollout_status", &p.context, call).await
    }

    #[tool(
        description = "Get the revision history of a deployment, statefulset or daemonset, newest first."
    )]
    async fn k8s_rollout_history(
        &self,
        Parameters(p): Parameters<params::RolloutParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self
            .client
            .rollout_history(&p.context, &p.namespace, &p.resource_type, &p.name);
        self.run("k8s_rollout_history", &p.context, call).await
    }

    #[tool(description = "Roll back a deployment, statefulset or daemonset to a previous revision.")]
    async fn k8s_rollout_undo(
        &self,
        Parameters(p): Parameters<params::UndoParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.rollout_undo(
            &p.context,
            &p.namespace,
            &p.resource_type,
            &p.name,
            p.to_revision,
        );
        self.run("k8s_rollout_undo", &p.context, call).await
    }

    #[tool(description = "Restart all pods of a deployment, statefulset or daemonset.")]
    async fn k8s_rollout_restart(
        &self,
        Parameters(p): Parameters<params::RolloutParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self
            .client
            .rollout_restart(&p.context, &p.namespace, &p.resource_type, &p.name);
        self.run("k8s_rollout_restart", &p.context, call).await
    }

    #[tool(description = "Pause the rollout of a deployment, statefulset or daemonset.")]
    async fn k8s_rollout_pause(
        &self,
        Parameters(p): Parameters<params::RolloutParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self
            .client
            .rollout_set_paused(&p.context, &p.namespace, &p.resource_type, &p.name, true);
        self.run("k8s_rollout_pause", &p.context, call).await
    }

    #[tool(description = "Resume a paused rollout of a deployment, statefulset or daemonset.")]
    async fn k8s_rollout_resume(
        &self,
        Parameters(p): Parameters<params::RolloutParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self
            .client
            .rollout_set_paused(&p.context, &p.namespace, &p.resource_type, &p.name, false);
        self.run("k8s_rollout_resume", &p.context, call).await
    }

    // ===== SCALING & WORKLOAD MANAGEMENT =====

    #[tool(description = "Scale a deployment, statefulset or replicaset to a number of replicas.")]
    async fn k8s_scale_resource(
        &self,
        Parameters(p): Parameters<params::ScaleParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.scale_resource(
            &p.context,
            &p.namespace,
            &p.resource_type,
            &p.name,
            p.replicas,
        );
        self.run("k8s_scale_resource", &p.context, call).await
    }

    #[tool(description = "Create or update a HorizontalPodAutoscaler targeting CPU utilization.")]
    async fn k8s_autoscale_resource(
        &self,
        Parameters(p): Parameters<params::AutoscaleParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.autoscale_resource(
            &p.context,
            &p.namespace,
            &p.resource_type,
            &p.name,
            p.min_replicas,
            p.max_replicas,
            p.cpu_percent,
        );
        self.run("k8s_autoscale_resource", &p.context, call).await
    }

    #[tool(
        description = "Update resource requests and limits of one container in a deployment, statefulset or daemonset."
    )]
    async fn k8s_update_resources(
        &self,
        Parameters(p): Parameters<params::UpdateResourcesParams>,
    ) -> Result<CallToolResult, McpError> {
        let values = ResourceValues {
            memory_request: p.memory_request,
            memory_limit: p.memory_limit,
            cpu_request: p.cpu_request,
            cpu_limit: p.cpu_limit,
        };
        let call = self.client.update_resources(
            &p.context,
            &p.namespace,
            &p.resource_type,
            &p.name,
            &p.container,
            &values,
        );
        self.run("k8s_update_resources", &p.context, call).await
    }

    #[tool(description = "Set resource limits and requests for some or all containers of a workload.")]
    async fn k8s_set_resources_for_container(
        &self,
        Parameters(p): Parameters<params::SetResourcesParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.set_resources_for_container(
            &p.context,
            &p.resource_type,
            &p.resource_name,
            non_empty(&p.namespace),
            &p.containers,
            p.limits.as_ref(),
            p.requests.as_ref(),
        );
        self.run("k8s_set_resources_for_container", &p.context, call)
            .await
    }

    #[tool(description = "Expose a resource as a new Service.")]
    async fn k8s_expose_resource(
        &self,
        Parameters(p): Parameters<params::ExposeParams>,
    ) -> Result<CallToolResult, McpError> {
        let opts = ExposeOptions {
            target_port: p.target_port,
            namespace: owned_non_empty(p.namespace),
            protocol: owned_non_empty(p.protocol),
            service_name: p.service_name,
            labels: p.labels,
            selector: p.selector,
            service_type: owned_non_empty(p.service_type),
        };
        let call = self
            .client
            .expose_resource(&p.context, &p.resource_type, &p.name, p.port, &opts);
        self.run("k8s_expose_resource", &p.context, call).await
    }

    // ===== NODE MAINTENANCE =====

    #[tool(description = "Mark a node as unschedulable.")]
    async fn k8s_cordon_node(
        &self,
        Parameters(p): Parameters<params::NodeParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.cordon_node(&p.context, &p.node_name);
        self.run("k8s_cordon_node", &p.context, call).await
    }

    #[tool(description = "Mark a node as schedulable.")]
    async fn k8s_uncordon_node(
        &self,
        Parameters(p): Parameters<params::NodeParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.uncordon_node(&p.context, &p.node_name);
        self.run("k8s_uncordon_node", &p.context, call).await
    }

    #[tool(description = "Cordon a node and evict its pods through the Eviction API.")]
    async fn k8s_drain_node(
        &self,
        Parameters(p): Parameters<params::DrainParams>,
    ) -> Result<CallToolResult, McpError> {
        let opts = DrainOptions {
            force: p.force,
            ignore_daemonsets: p.ignore_daemonsets,
            delete_local_data: p.delete_local_data,
            timeout_secs: p.timeout,
        };
        let call = self.client.drain_node(&p.context, &p.node_name, opts);
        self.run("k8s_drain_node", &p.context, call).await
    }

    #[tool(description = "Add or replace a taint on a node.")]
    async fn k8s_taint_node(
        &self,
        Parameters(p): Parameters<params::TaintParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.taint_node(
            &p.context,
            &p.node_name,
            &p.key,
            non_empty(&p.value),
            &p.effect,
        );
        self.run("k8s_taint_node", &p.context, call).await
    }

    #[tool(description = "Remove taints with a key (and effect, when given) from a node.")]
    async fn k8s_untaint_node(
        &self,
        Parameters(p): Parameters<params::UntaintParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self
            .client
            .untaint_node(&p.context, &p.node_name, &p.key, non_empty(&p.effect));
        self.run("k8s_untaint_node", &p.context, call).await
    }

    // ===== DIAGNOSTICS =====

    #[tool(
        description = "Diagnose an application by checking workload status, pod states, events and recent logs."
    )]
    async fn k8s_diagnose_application(
        &self,
        Parameters(p): Parameters<params::DiagnoseParams>,
    ) -> Result<CallToolResult, McpError> {
        let call = self.client.diagnose_application(
            &p.context,
            &p.namespace,
            &p.app_name,
            &p.resource_type,
        );
        self.run("k8s_diagnose_application", &p.context, call).await
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for KubeHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "kubemcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Kubernetes operations across the contexts of a kubeconfig directory. \
                 Call k8s_get_contexts first; every other tool takes a context argument."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubemcp_k8s::{ContextRegistry, Settings};
    use rmcp::ServiceExt;
    use rmcp::model::ErrorCode;
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};

    /// Kubeconfig with one context per name; the servers are unreachable
    fn handler_with(contexts: &[&str]) -> (TempDir, KubeHandler) {
        let dir = TempDir::new().unwrap();
        let mut yaml = String::from("apiVersion: v1\nkind: Config\nclusters:\n");
        for ctx in contexts {
            yaml.push_str(&format!(
                "- name: {ctx}-cluster\n  cluster:\n    server: https://127.0.0.1:1\n"
            ));
        }
        yaml.push_str("users:\n");
        for ctx in contexts {
            yaml.push_str(&format!("- name: {ctx}-user\n  user:\n    token: t\n"));
        }
        yaml.push_str("contexts:\n");
        for ctx in contexts {
            yaml.push_str(&format!(
                "- name: {ctx}\n  context:\n    cluster: {ctx}-cluster\n    user: {ctx}-user\n"
            ));
        }
        std::fs::write(dir.path().join("config"), yaml).unwrap();

        let registry = ContextRegistry::load(dir.path()).unwrap();
        let client = KubeClient::new(registry, Settings::default());
        (dir, KubeHandler::new(Arc::new(client)))
    }

    fn args<T: DeserializeOwned>(value: Value) -> Parameters<T> {
        Parameters(serde_json::from_value(value).unwrap())
    }

    fn body(result: &CallToolResult) -> Value {
        serde_json::to_value(result).unwrap()
    }

    fn assert_rejected(result: Result<CallToolResult, McpError>, tool: &str) {
        match result {
            Err(err) => assert_eq!(err.code, ErrorCode::INVALID_PARAMS, "{}", tool),
            Ok(result) => panic!("{} should be rejected locally, got {}", tool, body(&result)),
        }
    }

    async fn read_message<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> Value {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn test_server_info() {
        let (_dir, handler) = handler_with(&["dev"]);
        let info = handler.get_info();
        assert_eq!(info.server_info.name, "kubemcp");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_tool_catalog() {
        let (_dir, handler) = handler_with(&["dev"]);
        let tools = handler.tool_router.list_all();
        assert_eq!(tools.len(), 35);

        for tool in &tools {
            assert!(tool.description.is_some(), "{} has no description", tool.name);
            if tool.name == "k8s_get_contexts" {
                continue;
            }
            let required = tool.input_schema.get("required").cloned().unwrap_or_default();
            assert!(
                required.as_array().is_some_and(|r| r.contains(&json!("context"))),
                "{} must require a context",
                tool.name
            );
        }

        let logs = tools.iter().find(|t| t.name == "k8s_get_pod_logs").unwrap();
        assert!(logs.input_schema["properties"].get("sinceDuration").is_some());
        assert!(tools.iter().any(|t| t.name == "k8s_drain_node"));
    }

    #[tokio::test]
    async fn test_get_contexts_needs_no_cluster() {
        let (_dir, handler) = handler_with(&["staging", "dev"]);
        let result = handler.k8s_get_contexts().await.unwrap();
        let body = body(&result);
        assert_ne!(body["isError"], json!(true));

        let text = body["content"][0]["text"].as_str().unwrap();
        let contexts: Value = serde_json::from_str(text).unwrap();
        assert_eq!(contexts[0]["name"], "dev");
        assert_eq!(contexts[1]["name"], "staging");
    }

    #[tokio::test]
    async fn test_unknown_context_is_rejected_locally() {
        let (_dir, handler) = handler_with(&["dev"]);
        let err = handler
            .k8s_get_nodes(args(json!({"context": "prod"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("Available contexts: dev"));
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_a_tool_error() {
        let (_dir, handler) = handler_with(&["dev"]);
        let result = handler
            .k8s_get_namespaces(args(json!({"context": "dev"})))
            .await
            .unwrap();
        assert_eq!(body(&result)["isError"], json!(true));

        let result = handler
            .k8s_top_nodes(args(json!({"context": "dev"})))
            .await
            .unwrap();
        assert_eq!(body(&result)["isError"], json!(true));
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        let (_dir, handler) = handler_with(&["dev"]);

        let result = handler
            .k8s_scale_resource(args(json!({"context": "dev", "namespace": "shop",
                "resource_type": "deployment", "name": "web", "replicas": -1})))
            .await;
        assert_rejected(result, "k8s_scale_resource");

        let result = handler
            .k8s_scale_resource(args(json!({"context": "dev", "namespace": "shop",
                "resource_type": "daemonset", "name": "agent", "replicas": 2})))
            .await;
        assert_rejected(result, "k8s_scale_resource");

        let result = handler
            .k8s_get_pod_logs(args(json!({"context": "dev", "namespace": "shop",
                "pod": "web-1", "sinceDuration": "5 minutes"})))
            .await;
        assert_rejected(result, "k8s_get_pod_logs");

        let result = handler
            .k8s_get_pod_logs(args(json!({"context": "dev", "namespace": "shop",
                "pod": "web-1", "sinceDuration": "5\u{e9}"})))
            .await;
        assert_rejected(result, "k8s_get_pod_logs");

        let result = handler
            .k8s_taint_node(args(json!({"context": "dev", "node_name": "n1",
                "key": "gpu", "effect": "Sometimes"})))
            .await;
        assert_rejected(result, "k8s_taint_node");

        let result = handler
            .k8s_expose_resource(args(json!({"context": "dev", "resource_type": "deployment",
                "name": "web", "port": 70000})))
            .await;
        assert_rejected(result, "k8s_expose_resource");

        let result = handler
            .k8s_update_resources(args(json!({"context": "dev", "namespace": "shop",
                "resource_type": "deployment", "name": "web", "container": "app",
                "memory_limit": "huge"})))
            .await;
        assert_rejected(result, "k8s_update_resources");

        let result = handler
            .k8s_rollout_undo(args(json!({"context": "dev", "namespace": "shop",
                "resource_type": "deployment", "name": "web", "to_revision": 0})))
            .await;
        assert_rejected(result, "k8s_rollout_undo");

        let result = handler
            .k8s_pod_exec(args(json!({"context": "dev", "pod_name": "web-1", "command": "   "})))
            .await;
        assert_rejected(result, "k8s_pod_exec");

        let result = handler
            .k8s_create_resource(args(json!({"context": "dev", "yaml_content": "kind: Pod\n"})))
            .await;
        assert_rejected(result, "k8s_create_resource");

        let result = handler
            .k8s_label_resource(args(json!({"context": "dev", "resource_type": "pod",
                "name": "web-1", "labels": ["tier"]})))
            .await;
        assert_rejected(result, "k8s_label_resource");
    }

    #[tokio::test]
    async fn test_stdio_session() {
        let (_dir, handler) = handler_with(&["dev"]);
        let (client, server) = tokio::io::duplex(1 << 16);
        let running = tokio::spawn(async move {
            let service = handler.serve(tokio::io::split(server)).await?;
            service.waiting().await?;
            Ok::<_, anyhow::Error>(())
        });

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut lines = BufReader::new(client_read).lines();
        let initialize = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "session-test", "version": "0.0.1"}
        }});
        client_write
            .write_all(format!("{}\n", initialize).as_bytes())
            .await
            .unwrap();
        let init = read_message(&mut lines).await;
        assert_eq!(init["id"], 1);
        assert_eq!(init["result"]["serverInfo"]["name"], "kubemcp");

        let followups = [
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
                "name": "k8s_scale_resource", "arguments": {"context": "dev"}
            }}),
        ];
        for message in &followups {
            client_write
                .write_all(format!("{}\n", message).as_bytes())
                .await
                .unwrap();
        }
        let mut replies = vec![read_message(&mut lines).await, read_message(&mut lines).await];
        replies.sort_by_key(|r| r["id"].as_i64());
        assert_eq!(replies[0]["result"]["tools"].as_array().unwrap().len(), 35);
        assert_eq!(replies[1]["error"]["code"], -32602);

        drop(client_write);
        drop(lines);
        running.await.unwrap().unwrap();
    }
}
