//! Runtime tunables for Kubernetes operations

use std::time::Duration;

/// Tunables resolved from the CLI and the optional config file
#[derive(Clone, Debug)]
pub struct Settings {
    /// Field manager used for server-side apply
    pub field_manager: String,
    pub exec_timeout_secs: u64,
    pub drain_timeout_secs: u64,
    /// Upper bound on bytes returned by a single log request
    pub log_limit_bytes: i64,
    /// Log lines sampled by application diagnosis
    pub diagnose_log_lines: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            field_manager: "kubemcp".to_string(),
            exec_timeout_secs: 60,
            drain_timeout_secs: 300,
            log_limit_bytes: 1024 * 1024,
            diagnose_log_lines: 50,
        }
    }
}

impl Settings {
    pub fn exec_timeout(&self, override_secs: Option<u64>) -> Duration {
        Duration::from_secs(override_secs.unwrap_or(self.exec_timeout_secs))
    }

    pub fn drain_timeout(&self, override_secs: Option<u64>) -> Duration {
        Duration::from_secs(override_secs.unwrap_or(self.drain_timeout_secs))
    }
}
