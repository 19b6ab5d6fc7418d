use crate::output::print_json;
use anyhow::Context;
use flat_core::config::EditorConfig;
use flat_core::{io, paths, serialize, FlatState};
use std::path::Path;

/// Create `.flat/config.yaml` and a starter workflow. Existing files are
/// left alone, so running it twice is harmless.
pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config_path = paths::config_path(root);
    let config_created = !config_path.exists();
    let config = if config_created {
        let cfg = EditorConfig::default();
        cfg.save(root).context("failed to write .flat/config.yaml")?;
        cfg
    } else {
        EditorConfig::load(root).context("failed to load .flat/config.yaml")?
    };

    let workflow = config.workflow_path(root);
    let starter = serialize(&FlatState::stub()).context("failed to render starter workflow")?;
    let workflow_created = io::write_if_missing(&workflow, starter.as_bytes())
        .with_context(|| format!("failed to write {}", workflow.display()))?;

    if json {
        return print_json(&serde_json::json!({
            "root": root,
            "config": { "path": config_path, "created": config_created },
            "workflow": { "path": workflow, "created": workflow_created },
        }));
    }

    println!("Initializing Flat in: {}", root.display());
    let status = |created: bool| if created { "created:" } else { "exists: " };
    println!("  {} {}", status(config_created), paths::CONFIG_FILE);
    println!("  {} {}", status(workflow_created), config.workflow.display());
    Ok(())
}
