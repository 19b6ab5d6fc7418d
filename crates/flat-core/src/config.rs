use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// EditorConfig
// ---------------------------------------------------------------------------

/// Settings read from `.flat/config.yaml`. Every field has a default, so a
/// project without the file behaves as if an empty file existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default = "default_workflow")]
    pub workflow: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_runs_on")]
    pub default_runs_on: String,
    #[serde(default = "default_validate")]
    pub validate: bool,
}

fn default_workflow() -> PathBuf {
    PathBuf::from(paths::DEFAULT_WORKFLOW)
}

fn default_poll_interval_ms() -> u64 {
    800
}

pub fn default_runs_on() -> String {
    "ubuntu-latest".to_string()
}

fn default_validate() -> bool {
    true
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            workflow: default_workflow(),
            poll_interval_ms: default_poll_interval_ms(),
            default_runs_on: default_runs_on(),
            validate: default_validate(),
        }
    }
}

impl EditorConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: EditorConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn workflow_path(&self, root: &Path) -> PathBuf {
        paths::workflow_path(root, &self.workflow)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn validate_fields(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.workflow.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                field: "workflow".to_string(),
                message: "workflow path is empty".to_string(),
            });
        }
        if self.poll_interval_ms < 50 {
            warnings.push(ConfigWarning {
                field: "poll_interval_ms".to_string(),
                message: format!(
                    "poll interval of {}ms is very short; external saves will be re-read constantly",
                    self.poll_interval_ms
                ),
            });
        }
        if self.default_runs_on.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "default_runs_on".to_string(),
                message: "default runner is empty".to_string(),
            });
        }
        warnings
    }
}
