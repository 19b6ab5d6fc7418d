use crate::output::print_json;
use anyhow::bail;
use flat_core::validation::{RuleValidator, Validator};
use std::path::Path;

/// Exits non-zero when the document does not parse or has diagnostics.
pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let loaded = super::load(root)?;
    for warning in loaded.config.validate_fields() {
        tracing::warn!(field = %warning.field, "{}", warning.message);
    }
    let diagnostics = RuleValidator.validate(&loaded.state).err().unwrap_or_default();

    if json {
        print_json(&serde_json::json!({
            "valid": diagnostics.is_empty(),
            "diagnostics": diagnostics,
        }))?;
    } else if diagnostics.is_empty() {
        println!("{}: ok", loaded.path.display());
    } else {
        for d in &diagnostics {
            println!("{}: {}", d.path, d.message);
        }
    }

    if !diagnostics.is_empty() {
        bail!("{} problem(s) found", diagnostics.len());
    }
    Ok(())
}
