//! Error type shared by every Kubernetes operation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, K8sError>;

#[derive(Debug, Error)]
pub enum K8sError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("context '{name}' not found. Available contexts: {}", .available.join(", "))]
    ContextNotFound { name: String, available: Vec<String> },

    #[error("context '{name}' is ambiguous, it matches: {}", .candidates.join(", "))]
    AmbiguousContext {
        name: String,
        candidates: Vec<String>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to connect to context '{context}': {message}")]
    Connect { context: String, message: String },

    #[error("Kubernetes API error ({code} {reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    #[error("Kubernetes client error: {0}")]
    Kube(kube::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<kube::Error> for K8sError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => K8sError::Api {
                code: response.code,
                reason: response.reason,
                message: response.message,
            },
            other => K8sError::Kube(other),
        }
    }
}

impl K8sError {
    /// Whether the error was raised before anything reached a cluster
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            K8sError::InvalidInput(_)
                | K8sError::ContextNotFound { .. }
                | K8sError::AmbiguousContext { .. }
        )
    }

    /// HTTP status of an API error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            K8sError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, K8sError::NotFound(_)) || self.status_code() == Some(404)
    }
}

/// Shorthand used by parameter validation
pub(crate) fn invalid(msg: impl Into<String>) -> K8sError {
    K8sError::InvalidInput(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_not_found_lists_available() {
        let err = K8sError::ContextNotFound {
            name: "prod".into(),
            available: vec!["dev".into(), "staging".into()],
        };
        assert_eq!(
            err.to_string(),
            "context 'prod' not found. Available contexts: dev, staging"
        );
        assert!(err.is_local());
    }

    #[test]
    fn test_api_error_from_kube() {
        let err: K8sError = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "pods \"web\" not found".into(),
            reason: "NotFound".into(),
            code: 404,
        })
        .into();
        assert!(err.is_not_found());
        assert!(!err.is_local());
        assert!(err.to_string().contains("404"));
    }
}
