use anyhow::{bail, Context};
use flat_core::config::EditorConfig;
use flat_core::document::{DocumentController, FileStore};
use flat_core::message::OpenEditorOptions;
use flat_core::session::{Session, SessionEvent, SessionOptions, SystemOpener};
use std::path::Path;

/// Ask the host to open the raw workflow file, the same `openEditor`
/// request the HTTP editor sends.
pub fn run(root: &Path, preview: bool, side: bool) -> anyhow::Result<()> {
    let config = EditorConfig::load(root).context("failed to load .flat/config.yaml")?;
    let path = config.workflow_path(root);
    if !path.exists() {
        bail!("{} does not exist; run `flat init` first", path.display());
    }
    let controller = DocumentController::open(FileStore::new(&path))
        .with_context(|| format!("failed to open {}", path.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let session = Session::start(
            controller,
            SessionOptions {
                validator: None,
                opener: Box::new(SystemOpener),
                ..SessionOptions::default()
            },
        );
        let handle = session.handle();
        let mut events = handle.events();
        handle
            .open_editor(OpenEditorOptions {
                is_preview: preview,
                on_side: side,
            })
            .await?;
        handle.flush().await?;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::EditorOpenFailed { error } = event {
                bail!("could not open {}: {error}", path.display());
            }
        }
        session.shutdown().await;
        println!("Opened {}", path.display());
        Ok(())
    })
}
