//! Optional TOML configuration file

use std::path::{Path, PathBuf};

use kubemcp_k8s::{K8sError, Settings};
use serde::Deserialize;

/// Contents of the config file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub kubeconfig_dir: Option<PathBuf>,
    pub field_manager: Option<String>,
    pub exec_timeout_secs: Option<u64>,
    pub drain_timeout_secs: Option<u64>,
    pub log_limit_bytes: Option<i64>,
    pub diagnose_log_lines: Option<i64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, K8sError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            K8sError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
            .map_err(|e| K8sError::Config(format!("invalid config file {}: {}", path.display(), e)))
    }

    fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay file values onto the defaults
    pub fn settings(&self) -> Result<Settings, K8sError> {
        let mut settings = Settings::default();
        if let Some(manager) = &self.field_manager {
            if manager.trim().is_empty() {
                return Err(K8sError::Config("field_manager must not be empty".into()));
            }
            settings.field_manager = manager.clone();
        }
        if let Some(secs) = self.exec_timeout_secs {
            settings.exec_timeout_secs = secs;
        }
        if let Some(secs) = self.drain_timeout_secs {
            settings.drain_timeout_secs = secs;
        }
        if let Some(bytes) = self.log_limit_bytes {
            if bytes <= 0 {
                return Err(K8sError::Config("log_limit_bytes must be positive".into()));
            }
            settings.log_limit_bytes = bytes;
        }
        if let Some(lines) = self.diagnose_log_lines {
            if lines <= 0 {
                return Err(K8sError::Config("diagnose_log_lines must be positive".into()));
            }
            settings.diagnose_log_lines = lines;
        }
        Ok(settings)
    }
}

/// Kubeconfig directory: flag/env first, then the file, then `~/.kube`
pub fn kubeconfig_dir(cli: Option<PathBuf>, file: &FileConfig) -> Result<PathBuf, K8sError> {
    if let Some(dir) = cli.or_else(|| file.kubeconfig_dir.clone()) {
        return Ok(expand_home(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".kube"))
        .ok_or_else(|| K8sError::Config("cannot determine home directory; set KUBECONFIG_DIR".into()))
}

fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_keeps_defaults() {
        let config = FileConfig::parse("").unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.field_manager, "kubemcp");
        assert_eq!(settings.exec_timeout_secs, 60);
        assert_eq!(settings.drain_timeout_secs, 300);
        assert_eq!(settings.log_limit_bytes, 1024 * 1024);
        assert_eq!(settings.diagnose_log_lines, 50);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let config = FileConfig::parse(
            r#"
kubeconfig_dir = "/etc/kube"
field_manager = "ops-bot"
exec_timeout_secs = 15
diagnose_log_lines = 200
"#,
        )
        .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.field_manager, "ops-bot");
        assert_eq!(settings.exec_timeout_secs, 15);
        assert_eq!(settings.drain_timeout_secs, 300);
        assert_eq!(settings.diagnose_log_lines, 200);
        assert_eq!(config.kubeconfig_dir, Some(PathBuf::from("/etc/kube")));
    }

    #[test]
    fn test_invalid_files() {
        assert!(FileConfig::parse("exec_timeout_secs = \"soon\"").is_err());
        assert!(FileConfig::parse("kubeconfig = \"/tmp\"").is_err());

        let config = FileConfig::parse("log_limit_bytes = 0").unwrap();
        assert!(config.settings().is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kubemcp.toml");
        std::fs::write(&path, "drain_timeout_secs = [1]").unwrap();

        let err = FileConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("kubemcp.toml"));
    }

    #[test]
    fn test_kubeconfig_dir_precedence() {
        let file = FileConfig {
            kubeconfig_dir: Some(PathBuf::from("/from/file")),
            ..Default::default()
        };
        let dir = kubeconfig_dir(Some(PathBuf::from("/from/cli")), &file).unwrap();
        assert_eq!(dir, PathBuf::from("/from/cli"));

        let dir = kubeconfig_dir(None, &file).unwrap();
        assert_eq!(dir, PathBuf::from("/from/file"));
    }
}
