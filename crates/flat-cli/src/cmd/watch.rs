use crate::output::print_json;
use anyhow::Context;
use flat_core::session::SessionEvent;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;

/// Follow the workflow file until interrupted, printing one line per
/// session event (or one JSON object per line with `--json`).
pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let root = root.to_path_buf();

    // A broken document is still worth watching; it may be fixed on disk.
    if let Err(e) = super::load(&root) {
        tracing::warn!("{e:#}");
    }

    rt.block_on(async move {
        let session = flat_server::start_session(&root)?;
        let handle = session.handle();
        let mut events = handle.events();
        let snap = handle.flush().await.context("session stopped")?;
        if !json {
            println!(
                "Watching {} job(s); press Ctrl-C to stop.",
                snap.state.jobs.len()
            );
        }

        loop {
            tokio::select! {
                ev = events.recv() => match ev {
                    Ok(ev) => emit(&ev, json)?,
                    Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event stream lagged"),
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        session.shutdown().await;
        Ok(())
    })
}

fn emit(event: &SessionEvent, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(event);
    }
    match event {
        SessionEvent::ExternalChange => println!("document changed on disk"),
        SessionEvent::RefreshApplied { revision, state } => println!(
            "refreshed (revision {revision}): {} job(s), triggers: {}",
            state.jobs.len(),
            super::show::describe_triggers(&state.on)
        ),
        SessionEvent::RefreshUnchanged => println!("refreshed: no structural change"),
        SessionEvent::RefreshDiscarded { based_on, version } => {
            println!("refresh based on version {based_on} superseded by version {version}")
        }
        SessionEvent::ParseFailed { failure } => println!("document does not parse: {failure}"),
        SessionEvent::TextWritten { version } => println!("wrote version {version}"),
        SessionEvent::WriteFailed { version, error } => {
            println!("write of version {version} failed: {error}")
        }
        // Bookkeeping events stay quiet in text mode.
        SessionEvent::RefreshSent { .. }
        | SessionEvent::TextUnchanged { .. }
        | SessionEvent::EditorOpened { .. }
        | SessionEvent::EditorOpenFailed { .. } => {}
    }
    Ok(())
}
