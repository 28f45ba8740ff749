//! MCP (Model Context Protocol) server for kubemcp
//!
//! Built on `rmcp`. Every tool except `k8s_get_contexts` takes a `context`
//! argument naming one of the kubeconfig contexts loaded by `kubemcp-k8s`.

pub mod error;
mod handler;
pub mod params;

pub use error::ToolError;
pub use handler::KubeHandler;
