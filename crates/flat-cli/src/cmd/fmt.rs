use crate::output::print_json;
use anyhow::{bail, Context};
use flat_core::document::{DocumentController, FileStore, ReplaceOutcome};
use flat_core::serialize;
use std::path::Path;

/// Rewrite the workflow in the form the editor itself writes. Comments,
/// key order and quoting outside that form are not preserved.
pub fn run(root: &Path, check: bool, json: bool) -> anyhow::Result<()> {
    let loaded = super::load(root)?;
    // A missing or blank document stays that way until someone edits it.
    let canonical = if loaded.text.trim().is_empty() {
        loaded.text.clone()
    } else {
        serialize(&loaded.state).context("failed to render workflow")?
    };
    let formatted = canonical == loaded.text;

    if check {
        if json {
            print_json(&serde_json::json!({ "formatted": formatted }))?;
        }
        if !formatted {
            bail!("{} is not in canonical form", loaded.path.display());
        }
        if !json {
            println!("{}: ok", loaded.path.display());
        }
        return Ok(());
    }

    let mut doc = DocumentController::open(FileStore::new(&loaded.path))
        .with_context(|| format!("failed to open {}", loaded.path.display()))?;
    let outcome = doc
        .apply_replace(&canonical)
        .with_context(|| format!("failed to write {}", loaded.path.display()))?;
    let rewritten = outcome == ReplaceOutcome::Replaced;

    if json {
        print_json(&serde_json::json!({ "rewritten": rewritten }))?;
    } else if rewritten {
        println!("Formatted {}", loaded.path.display());
    } else {
        println!("{}: already formatted", loaded.path.display());
    }
    Ok(())
}
