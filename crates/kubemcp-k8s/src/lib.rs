//! Kubernetes operations for kubemcp
//!
//! This crate loads every kubeconfig in a directory into a context registry
//! and implements the cluster operations the MCP tools expose: reads,
//! manifest create/apply, patching, pod logs and exec, rollouts, scaling,
//! node maintenance and application diagnosis.

mod client;
mod cluster;
mod describe;
mod diagnose;
mod error;
mod manifest;
mod nodes;
mod pods;
mod registry;
mod resolve;
mod resources;
mod rollout;
mod scaling;
mod settings;
mod util;
mod workload;

pub use client::KubeClient;
pub use describe::DescribeOptions;
pub use error::{K8sError, Result};
pub use nodes::{DrainOptions, TAINT_EFFECTS};
pub use pods::{ExecOptions, LogOptions, command_argv};
pub use registry::{ContextEntry, ContextRegistry};
pub use resources::{MetadataField, PatchType};
pub use scaling::{ExposeOptions, ResourceValues};
pub use settings::Settings;

// Re-export types that are used in our public API
pub use kubemcp_types::{
    ContextInfo, CrdInfo, Diagnosis, EventInfo, NamespaceInfo, NodeInfo, RevisionInfo,
};
