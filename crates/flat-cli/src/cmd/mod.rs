pub mod edit;
pub mod fmt;
pub mod init;
pub mod job;
pub mod show;
pub mod step;
pub mod trigger;
pub mod ui;
pub mod validate;
pub mod watch;

use anyhow::{anyhow, bail, Context};
use flat_core::config::EditorConfig;
use flat_core::document::{DocumentController, FileStore};
use flat_core::session::{Session, SessionEvent, SessionOptions};
use flat_core::{deserialize, FlatState};
use std::path::{Path, PathBuf};

/// A parsed workflow, read without starting a session.
pub struct Loaded {
    pub config: EditorConfig,
    pub path: PathBuf,
    pub text: String,
    pub state: FlatState,
}

pub fn load(root: &Path) -> anyhow::Result<Loaded> {
    let config = EditorConfig::load(root).context("failed to load .flat/config.yaml")?;
    let path = config.workflow_path(root);
    let text = flat_core::io::read_or_empty(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let state = deserialize(&text).map_err(|e| anyhow!("{} does not parse: {e}", path.display()))?;
    Ok(Loaded {
        config,
        path,
        text,
        state,
    })
}

/// Result of [`mutate`].
pub struct Applied {
    pub changed: bool,
    pub state: FlatState,
}

/// Apply an edit through a short-lived session, so the CLI writes the
/// document exactly the way the editor does. A document that does not parse
/// is never overwritten.
pub fn mutate<F>(root: &Path, edit: F) -> anyhow::Result<Applied>
where
    F: FnOnce(&mut FlatState) -> flat_core::Result<()> + Send + 'static,
{
    let loaded = load(root)?;
    let controller = DocumentController::open(FileStore::new(&loaded.path))
        .with_context(|| format!("failed to open {}", loaded.path.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let session = Session::start(
            controller,
            SessionOptions {
                validator: None,
                ..SessionOptions::default()
            },
        );
        let handle = session.handle();
        handle.flush().await?;

        let mut events = handle.events();
        let version = handle.modify(edit).await?;
        let snap = handle.flush().await?;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::WriteFailed { error, .. } = event {
                bail!("failed to write {}: {error}", loaded.path.display());
            }
        }
        session.shutdown().await;

        Ok(Applied {
            changed: version.is_some(),
            state: snap.state,
        })
    })
}

/// One-line confirmation for a mutating command.
pub fn report(applied: &Applied, done: &str, json: bool) -> anyhow::Result<()> {
    if json {
        crate::output::print_json(&serde_json::json!({
            "changed": applied.changed,
            "state": applied.state,
        }))
    } else {
        if applied.changed {
            println!("{done}");
        } else {
            println!("No change.");
        }
        Ok(())
    }
}
