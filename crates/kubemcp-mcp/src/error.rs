//! Errors raised while running a tool

use kubemcp_k8s::K8sError;
use rmcp::ErrorData as McpError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments for {tool}: {message}")]
    InvalidParams { tool: String, message: String },

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Kube(#[from] K8sError),
}

impl ToolError {
    /// Local failures become JSON-RPC errors; cluster failures become
    /// `isError` tool results
    pub fn is_protocol_error(&self) -> bool {
        match self {
            ToolError::InvalidParams { .. } => true,
            ToolError::Encode(_) => false,
            ToolError::Kube(err) => err.is_local(),
        }
    }

    /// JSON-RPC error for a failure that never reached a cluster
    pub fn to_protocol_error(&self) -> McpError {
        McpError::invalid_params(self.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::ErrorCode;

    #[test]
    fn test_local_errors_are_protocol_errors() {
        let err = ToolError::InvalidParams {
            tool: "k8s_label_resource".into(),
            message: "labels must be an object".into(),
        };
        assert!(err.is_protocol_error());

        let err = ToolError::Kube(K8sError::InvalidInput("replicas cannot be negative".into()));
        assert!(err.is_protocol_error());
        let protocol = err.to_protocol_error();
        assert_eq!(protocol.code, ErrorCode::INVALID_PARAMS);
        assert!(protocol.message.contains("replicas cannot be negative"));
    }

    #[test]
    fn test_cluster_errors_are_tool_results() {
        let err = ToolError::Kube(K8sError::Api {
            code: 403,
            reason: "Forbidden".into(),
            message: "nodes is forbidden".into(),
        });
        assert!(!err.is_protocol_error());
        assert!(err.to_string().contains("403"));

        let err = ToolError::Kube(K8sError::NotFound("container 'db' not found".into()));
        assert!(!err.is_protocol_error());
    }
}
