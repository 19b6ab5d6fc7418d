use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const FLAT_DIR: &str = ".flat";
pub const CONFIG_FILE: &str = ".flat/config.yaml";

/// Default workflow document, relative to the project root.
pub const DEFAULT_WORKFLOW: &str = "flat.yml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn flat_dir(root: &Path) -> PathBuf {
    root.join(FLAT_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a workflow path from config. Absolute paths are used as-is.
pub fn workflow_path(root: &Path, workflow: &Path) -> PathBuf {
    if workflow.is_absolute() {
        workflow.to_path_buf()
    } else {
        root.join(workflow)
    }
}
