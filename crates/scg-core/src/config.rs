//! Settings read from the environment (after loading `.env`).
//!
//! | Variable                   | Default                      |
//! |----------------------------|------------------------------|
//! | `SCG_PROJECT_ROOT`         | current directory            |
//! | `SCG_SPECS_DIR`            | `<root>/specs`               |
//! | `SCG_REPORTS_DIR`          | `<root>/reports`             |
//! | `SCG_TASKS_DIR`            | unset (builtin tasks only)   |
//! | `SCG_LOG_FILE`             | `<root>/scg.log`             |
//! | `SCG_STREAM_DEADLINE_SECS` | unset (no deadline)          |
//! | `COPILOT_CLI_PATH`         | `copilot`                    |
//! | `COPILOT_CLI_URL`          | unset (spawn the CLI)        |
//! | `COPILOT_LOG_LEVEL`        | `info`                       |
//! | `SCG_PERMISSION_POLICY`    | `approve-all` (or `deny-all`) |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::copilot::{ClientOptions, PermissionPolicy, TransportConfig};
use crate::error::{Result, ScgError};
use crate::workflow::TaskRegistry;

pub const CURRENT_SPEC_FILE: &str = "UART_current.pdf";
pub const LATEST_SPEC_FILE: &str = "UART_latest.pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScgConfig {
    pub project_root: PathBuf,
    pub specs_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub tasks_dir: Option<PathBuf>,
    pub log_file: PathBuf,
    pub stream_deadline: Option<Duration>,
    pub cli_path: String,
    pub cli_url: Option<String>,
    pub cli_log_level: String,
    pub permission_policy: PermissionPolicy,
}

impl ScgConfig {
    /// Load `.env` from the current directory (or a parent) if present.
    /// Variables already in the environment win.
    pub fn load_dotenv() -> Option<PathBuf> {
        match dotenvy::dotenv() {
            Ok(path) => {
                tracing::info!("[Config] Loaded environment from '{}'", path.display());
                Some(path)
            }
            Err(e) if e.not_found() => None,
            Err(e) => {
                tracing::warn!("[Config] Failed to load .env: {}", e);
                None
            }
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let project_root = match get("SCG_PROJECT_ROOT") {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir()?,
        };

        let stream_deadline = get("SCG_STREAM_DEADLINE_SECS")
            .map(|raw| {
                raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                    ScgError::Config(format!("SCG_STREAM_DEADLINE_SECS='{}': {}", raw, e))
                })
            })
            .transpose()?;

        let permission_policy = match get("SCG_PERMISSION_POLICY").as_deref().map(str::trim) {
            None | Some("approve-all") => PermissionPolicy::ApproveAll,
            Some("deny-all") => PermissionPolicy::DenyAll,
            Some(other) => {
                return Err(ScgError::Config(format!(
                    "SCG_PERMISSION_POLICY='{}': expected approve-all or deny-all",
                    other
                )))
            }
        };

        let config = Self {
            specs_dir: get("SCG_SPECS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| project_root.join("specs")),
            reports_dir: get("SCG_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| project_root.join("reports")),
            tasks_dir: get("SCG_TASKS_DIR").map(PathBuf::from),
            log_file: get("SCG_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| project_root.join("scg.log")),
            stream_deadline,
            cli_path: get("COPILOT_CLI_PATH").unwrap_or_else(|| "copilot".to_string()),
            cli_url: get("COPILOT_CLI_URL"),
            cli_log_level: get("COPILOT_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            permission_policy,
            project_root,
        };
        tracing::debug!("[Config] PROJECT_ROOT path is: {}", config.project_root.display());
        Ok(config)
    }

    pub fn current_spec(&self) -> PathBuf {
        self.specs_dir.join(CURRENT_SPEC_FILE)
    }

    pub fn latest_spec(&self) -> PathBuf {
        self.specs_dir.join(LATEST_SPEC_FILE)
    }

    pub fn client_options(&self) -> ClientOptions {
        let transport = match &self.cli_url {
            Some(url) => TransportConfig::Tcp { url: url.clone() },
            None => TransportConfig::Stdio {
                cli_path: self.cli_path.clone(),
                extra_args: Vec::new(),
                cwd: Some(self.project_root.clone()),
                log_level: self.cli_log_level.clone(),
            },
        };
        ClientOptions {
            transport,
            permission_policy: self.permission_policy,
            ..ClientOptions::default()
        }
    }

    /// Placeholder values available to task prompt templates.
    pub fn prompt_variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("project_root".to_string(), display(&self.project_root));
        vars.insert("specs_dir".to_string(), display(&self.specs_dir));
        vars.insert("reports_dir".to_string(), display(&self.reports_dir));
        vars
    }

    pub fn task_registry(&self) -> Result<TaskRegistry> {
        match &self.tasks_dir {
            Some(dir) => TaskRegistry::with_dir(dir),
            None => Ok(TaskRegistry::builtin()),
        }
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_derive_from_project_root() {
        let config = ScgConfig::from_lookup(lookup_from(&[("SCG_PROJECT_ROOT", "/work/uart")])).unwrap();
        assert_eq!(config.specs_dir, PathBuf::from("/work/uart/specs"));
        assert_eq!(config.reports_dir, PathBuf::from("/work/uart/reports"));
        assert_eq!(config.log_file, PathBuf::from("/work/uart/scg.log"));
        assert_eq!(config.latest_spec(), PathBuf::from("/work/uart/specs/UART_latest.pdf"));
        assert_eq!(config.current_spec(), PathBuf::from("/work/uart/specs/UART_current.pdf"));
        assert_eq!(config.cli_path, "copilot");
        assert!(config.cli_url.is_none());
        assert!(config.stream_deadline.is_none());
        assert_eq!(config.client_options().permission_policy, PermissionPolicy::ApproveAll);
        assert!(matches!(
            config.client_options().transport,
            TransportConfig::Stdio { .. }
        ));
    }

    #[test]
    fn test_overrides_and_tcp_transport() {
        let config = ScgConfig::from_lookup(lookup_from(&[
            ("SCG_PROJECT_ROOT", "/work/uart"),
            ("SCG_REPORTS_DIR", "/tmp/out"),
            ("SCG_STREAM_DEADLINE_SECS", "90"),
            ("COPILOT_CLI_URL", "localhost:4321"),
        ]))
        .unwrap();
        assert_eq!(config.reports_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.stream_deadline, Some(Duration::from_secs(90)));
        match config.client_options().transport {
            TransportConfig::Tcp { url } => assert_eq!(url, "localhost:4321"),
            other => panic!("unexpected transport: {:?}", other),
        }
        assert_eq!(config.prompt_variables()["reports_dir"], "/tmp/out");
    }

    #[test]
    fn test_permission_policy_from_env() {
        let config = ScgConfig::from_lookup(lookup_from(&[
            ("SCG_PROJECT_ROOT", "/work"),
            ("SCG_PERMISSION_POLICY", "deny-all"),
        ]))
        .unwrap();
        assert_eq!(config.client_options().permission_policy, PermissionPolicy::DenyAll);

        let err = ScgConfig::from_lookup(lookup_from(&[
            ("SCG_PROJECT_ROOT", "/work"),
            ("SCG_PERMISSION_POLICY", "ask"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ScgError::Config(_)));
    }

    #[test]
    fn test_bad_deadline_is_config_error() {
        let err = ScgConfig::from_lookup(lookup_from(&[
            ("SCG_PROJECT_ROOT", "/work"),
            ("SCG_STREAM_DEADLINE_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ScgError::Config(_)));
    }
}
