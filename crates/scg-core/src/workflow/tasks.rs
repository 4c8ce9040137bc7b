//! Task definitions — named prompt templates with default timeouts.
//!
//! Builtin tasks ship with the crate. Extra tasks (or overrides of the
//! builtin ones) can be dropped into a directory as YAML:
//!
//! ```yaml
//! name: "scg_register_audit"
//! description: "List register map differences only"
//! default_timeout_secs: 900
//! system_preamble: |
//!   You are a design verification lead.
//! prompt_template: |
//!   Compare the attached specifications ... save the result in ${reports_dir}.
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::prompts;
use crate::error::{Result, ScgError};

pub const DELTA_REPORT: &str = "scg_delta_report";
pub const BUILD_UVM_TB: &str = "scg_build_uvm_tb";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Appended to the assistant's system message.
    pub system_preamble: String,

    /// User prompt; `${var}` placeholders are filled at run time.
    pub prompt_template: String,

    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl TaskDefinition {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ScgError::Config(format!("Failed to parse task YAML: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScgError::Config(format!("Failed to read task file '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content).map_err(|e| {
            ScgError::Config(format!("{} ({})", e, path.display()))
        })
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Fill `${name}` placeholders from `variables`. Unknown names stay as
    /// they are.
    pub fn render_prompt(&self, variables: &HashMap<String, String>) -> String {
        let re = placeholder_regex();
        re.replace_all(&self.prompt_template, |caps: &Captures| {
            let key = &caps[1];
            variables
                .get(key)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9_.]+)\}").expect("placeholder regex is valid"))
}

/// Immutable name → task mapping, built once and shared with the driver.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, TaskDefinition>,
}

impl TaskRegistry {
    pub fn new(tasks: impl IntoIterator<Item = TaskDefinition>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_tasks())
    }

    /// Builtin tasks plus every `*.yaml` / `*.yml` file in `dir`; files win
    /// over builtins with the same name.
    pub fn with_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(ScgError::Config(format!(
                "Task directory '{}' does not exist",
                dir.display()
            )));
        }

        let mut tasks: BTreeMap<String, TaskDefinition> = builtin_tasks()
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        for path in entries {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !matches!(ext, "yaml" | "yml") {
                continue;
            }
            let task = TaskDefinition::from_file(&path)?;
            tracing::info!("[TaskRegistry] Loaded task: {} ({})", task.name, path.display());
            tasks.insert(task.name.clone(), task);
        }

        Ok(Self { tasks })
    }

    pub fn get(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn builtin_tasks() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition {
            name: DELTA_REPORT.to_string(),
            description: Some(
                "Compare two versions of a device specification and report new features".to_string(),
            ),
            system_preamble: prompts::DELTA_REPORT_PREAMBLE.to_string(),
            prompt_template: prompts::DELTA_REPORT_PROMPT.to_string(),
            default_timeout_secs: 600,
        },
        TaskDefinition {
            name: BUILD_UVM_TB.to_string(),
            description: Some(
                "Generate a UVM testbench skeleton from a device specification".to_string(),
            ),
            system_preamble: prompts::BUILD_UVM_TB_PREAMBLE.to_string(),
            prompt_template: prompts::BUILD_UVM_TB_PROMPT.to_string(),
            default_timeout_secs: 1800,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tasks() {
        let registry = TaskRegistry::builtin();
        assert_eq!(registry.len(), 2);
        let delta = registry.get(DELTA_REPORT).unwrap();
        assert_eq!(delta.default_timeout(), Duration::from_secs(600));
        let tb = registry.get(BUILD_UVM_TB).unwrap();
        assert_eq!(tb.default_timeout(), Duration::from_secs(1800));
        assert!(registry.get("scg_nonexistent").is_none());
    }

    #[test]
    fn test_render_prompt_fills_known_variables_only() {
        let task = TaskDefinition {
            name: "t".to_string(),
            description: None,
            system_preamble: String::new(),
            prompt_template: "Save to ${reports_dir}/x.md, keep ${unknown} as is.".to_string(),
            default_timeout_secs: 10,
        };
        let mut vars = HashMap::new();
        vars.insert("reports_dir".to_string(), "/work/reports".to_string());
        assert_eq!(
            task.render_prompt(&vars),
            "Save to /work/reports/x.md, keep ${unknown} as is."
        );
    }

    #[test]
    fn test_parse_task_yaml_with_default_timeout() {
        let yaml = r#"
name: "scg_register_audit"
system_preamble: "You audit registers."
prompt_template: |
  List register differences.
"#;
        let task = TaskDefinition::from_yaml(yaml).unwrap();
        assert_eq!(task.name, "scg_register_audit");
        assert_eq!(task.default_timeout_secs, 600);
        assert!(task.description.is_none());
        assert!(task.prompt_template.contains("register differences"));
    }

    #[test]
    fn test_with_dir_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("delta.yaml"),
            "name: scg_delta_report\nsystem_preamble: short\nprompt_template: compare\ndefault_timeout_secs: 42\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("extra.yml"),
            "name: scg_extra\nsystem_preamble: p\nprompt_template: q\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = TaskRegistry::with_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(DELTA_REPORT).unwrap().default_timeout_secs, 42);
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["scg_build_uvm_tb", "scg_delta_report", "scg_extra"]
        );
    }

    #[test]
    fn test_with_dir_rejects_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "name: [unclosed").unwrap();
        let err = TaskRegistry::with_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ScgError::Config(_)));
    }

    #[test]
    fn test_with_dir_missing_directory() {
        let err = TaskRegistry::with_dir(Path::new("/nonexistent/scg-tasks")).unwrap_err();
        assert!(matches!(err, ScgError::Config(_)));
    }
}
