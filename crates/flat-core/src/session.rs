//! The running sync loop.
//!
//! A [`Session`] owns one tokio task that hosts both ends of the message
//! channel: the state side ([`StateStore`]) and the document side
//! ([`DocumentController`]). The two sides only talk through their queues.
//! Callers drive the session through a cloneable [`SessionHandle`].
//!
//! ```text
//!  handle.update() ──▶ StateStore ──updateText──▶ document side ──▶ apply_replace
//!                          ▲                            │
//!                          └────────refresh─────────────┘ (external save seen by poll)
//! ```

use crate::config::EditorConfig;
use crate::deserialize::{deserialize, ParseFailure};
use crate::document::{DocumentController, ReplaceOutcome, Subscription};
use crate::error::{FlatError, Result};
use crate::message::{self, coalesce, Inbox, OpenEditorOptions, Outbox, ToDocument, ToState};
use crate::model::FlatState;
use crate::serialize::serialize;
use crate::store::{RefreshOutcome, StateStore, StoreSnapshot};
use crate::sync::{SyncEvent, SyncPhase};
use crate::validation::{RuleValidator, ValidationReport, ValidationRunner, Validator};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

// ---------------------------------------------------------------------------
// Editor opener
// ---------------------------------------------------------------------------

/// Host hook for `openEditor` requests.
pub trait EditorOpener: Send {
    fn open(&mut self, path: Option<&Path>, options: OpenEditorOptions) -> std::io::Result<()>;
}

/// Opens the document with the system's default application.
#[derive(Debug, Default)]
pub struct SystemOpener;

impl EditorOpener for SystemOpener {
    fn open(&mut self, path: Option<&Path>, _options: OpenEditorOptions) -> std::io::Result<()> {
        match path {
            Some(p) => open::that(p),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "document has no file to open",
            )),
        }
    }
}

/// Ignores open requests apart from logging them.
#[derive(Debug, Default)]
pub struct NoopOpener;

impl EditorOpener for NoopOpener {
    fn open(&mut self, path: Option<&Path>, options: OpenEditorOptions) -> std::io::Result<()> {
        tracing::info!(?path, ?options, "open editor requested");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Observable things the loop did, broadcast to anyone listening.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    TextWritten { version: u64 },
    TextUnchanged { version: u64 },
    WriteFailed { version: u64, error: String },
    ExternalChange,
    RefreshSent { based_on: u64 },
    RefreshApplied { revision: u64, state: FlatState },
    RefreshUnchanged,
    RefreshDiscarded { based_on: u64, version: u64 },
    ParseFailed { failure: ParseFailure },
    EditorOpened { options: OpenEditorOptions },
    EditorOpenFailed { error: String },
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

pub struct SessionOptions {
    /// How often to re-read the document for external saves. `None` disables
    /// polling; [`SessionHandle::check_external`] still works.
    pub poll_interval: Option<Duration>,
    pub validator: Option<Arc<dyn Validator>>,
    pub opener: Box<dyn EditorOpener>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: None,
            validator: Some(Arc::new(RuleValidator)),
            opener: Box::new(NoopOpener),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            poll_interval: Some(config.poll_interval()),
            validator: config
                .validate
                .then(|| Arc::new(RuleValidator) as Arc<dyn Validator>),
            opener: Box::new(SystemOpener),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

type Mutation = Box<dyn FnOnce(&mut FlatState) -> Result<()> + Send>;

enum Command {
    Update {
        state: FlatState,
        reply: oneshot::Sender<Option<u64>>,
    },
    Modify {
        f: Mutation,
        reply: oneshot::Sender<Result<Option<u64>>>,
    },
    OpenEditor {
        options: OpenEditorOptions,
        reply: oneshot::Sender<()>,
    },
    CheckExternal {
        reply: oneshot::Sender<Result<bool>>,
    },
    Flush {
        reply: oneshot::Sender<StoreSnapshot>,
    },
    DocumentText {
        reply: oneshot::Sender<String>,
    },
}

#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<StoreSnapshot>,
    sync: watch::Receiver<SyncPhase>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| FlatError::SessionClosed)?;
        rx.await.map_err(|_| FlatError::SessionClosed)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.clone()
    }

    pub fn sync_phase(&self) -> SyncPhase {
        *self.sync.borrow()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Replace the whole state. Returns the new version, or `None` if the
    /// state was already equal.
    pub async fn update(&self, state: FlatState) -> Result<Option<u64>> {
        self.call(|reply| Command::Update { state, reply }).await
    }

    /// Edit the current state in place; see [`StateStore::modify`].
    pub async fn modify<F>(&self, f: F) -> Result<Option<u64>>
    where
        F: FnOnce(&mut FlatState) -> Result<()> + Send + 'static,
    {
        self.call(|reply| Command::Modify {
            f: Box::new(f),
            reply,
        })
        .await?
    }

    pub async fn open_editor(&self, options: OpenEditorOptions) -> Result<()> {
        self.call(|reply| Command::OpenEditor { options, reply })
            .await
    }

    /// Look for an external save now instead of waiting for the next poll.
    pub async fn check_external(&self) -> Result<bool> {
        self.call(|reply| Command::CheckExternal { reply }).await?
    }

    /// Process every queued message in both directions, then return the
    /// resulting snapshot.
    pub async fn flush(&self) -> Result<StoreSnapshot> {
        self.call(|reply| Command::Flush { reply }).await
    }

    /// The document text as the controller last read or wrote it.
    pub async fn document_text(&self) -> Result<String> {
        self.call(|reply| Command::DocumentText { reply }).await
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A running sync loop. Dropping it stops the loop.
pub struct Session {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl Session {
    /// Start the loop on the current tokio runtime. The document's current
    /// text is parsed before the loop starts and seeds the store, so the
    /// first command always sees the loaded state. A document that does not
    /// parse leaves the store on the stub.
    pub fn start(controller: DocumentController, options: SessionOptions) -> Session {
        let (state_end, doc_end) = message::channel();
        let (events, _) = broadcast::channel(64);
        let (sync_tx, sync_rx) = watch::channel(SyncPhase::Idle);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let (runner, validation_rx) = match options.validator {
            Some(v) => {
                let (runner, rx) = ValidationRunner::new(v);
                (Some(runner), rx)
            }
            None => {
                let (_tx, rx) = mpsc::unbounded_channel();
                (None, rx)
            }
        };
        let store = match deserialize(controller.read()) {
            Ok(state) => {
                let is_stub = controller.read().trim().is_empty();
                StateStore::with_initial(state_end.outbox, runner, state, is_stub)
            }
            Err(failure) => {
                tracing::warn!(error = %failure, "document does not parse; starting from stub");
                let _ = events.send(SessionEvent::ParseFailed { failure });
                StateStore::new(state_end.outbox, runner)
            }
        };
        let snapshots = store.subscribe();

        let document = DocumentSide::new(controller, doc_end.outbox, options.opener, events.clone());

        let runtime = Runtime {
            store,
            document,
            state_inbox: state_end.inbox,
            doc_inbox: doc_end.inbox,
            validation_rx,
            commands: cmd_rx,
            events: events.clone(),
            sync: sync_tx,
            poll: options.poll_interval.map(|d| {
                let mut interval = tokio::time::interval(d);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            }),
        };
        let task = tokio::spawn(runtime.run());

        Session {
            handle: SessionHandle {
                commands: cmd_tx,
                snapshots,
                sync: sync_rx,
                events,
            },
            task,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Document side
// ---------------------------------------------------------------------------

struct DocumentSide {
    controller: DocumentController,
    /// Version of the newest `updateText` handled; stamps refreshes.
    seen_version: Arc<AtomicU64>,
    opener: Box<dyn EditorOpener>,
    events: broadcast::Sender<SessionEvent>,
    _subscription: Subscription,
}

/// Parse `text` and send it to the state side, or report why not.
fn send_refresh(
    text: &str,
    outbox: &Outbox<ToState>,
    seen_version: &AtomicU64,
    events: &broadcast::Sender<SessionEvent>,
) {
    match deserialize(text) {
        Ok(state) => {
            let based_on = seen_version.load(Ordering::SeqCst);
            outbox.post(ToState::Refresh {
                data: state,
                based_on,
            });
            let _ = events.send(SessionEvent::RefreshSent { based_on });
        }
        Err(failure) => {
            tracing::warn!(error = %failure, "document does not parse; keeping last good state");
            let _ = events.send(SessionEvent::ParseFailed { failure });
        }
    }
}

impl DocumentSide {
    fn new(
        controller: DocumentController,
        outbox: Outbox<ToState>,
        opener: Box<dyn EditorOpener>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let seen_version = Arc::new(AtomicU64::new(0));
        let subscription = {
            let seen = Arc::clone(&seen_version);
            let events = events.clone();
            controller.on_external_change(move |text| {
                let _ = events.send(SessionEvent::ExternalChange);
                send_refresh(text, &outbox, &seen, &events);
            })
        };
        Self {
            controller,
            seen_version,
            opener,
            events,
            _subscription: subscription,
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Handle a batch of messages. Returns the version of the write that
    /// settled, if the batch held an `updateText`.
    fn handle_batch(&mut self, batch: Vec<ToDocument>) -> Option<u64> {
        let mut settled = None;
        for msg in coalesce(batch) {
            match msg {
                ToDocument::UpdateText { data, version } => {
                    self.write(&data, version);
                    settled = Some(version);
                }
                ToDocument::OpenEditor { data } => self.open(data),
            }
        }
        settled
    }

    fn write(&mut self, state: &FlatState, version: u64) {
        self.seen_version.fetch_max(version, Ordering::SeqCst);
        let result = serialize(state).and_then(|text| self.controller.apply_replace(&text));
        match result {
            Ok(ReplaceOutcome::Replaced) => {
                tracing::info!(version, "document written");
                self.emit(SessionEvent::TextWritten { version });
            }
            Ok(ReplaceOutcome::Unchanged) => {
                tracing::debug!(version, "document already up to date");
                self.emit(SessionEvent::TextUnchanged { version });
            }
            Err(e) => {
                tracing::warn!(version, error = %e, "document write failed");
                self.emit(SessionEvent::WriteFailed {
                    version,
                    error: e.to_string(),
                });
            }
        }
    }

    fn open(&mut self, options: OpenEditorOptions) {
        match self.opener.open(self.controller.path(), options) {
            Ok(()) => self.emit(SessionEvent::EditorOpened { options }),
            Err(e) => {
                tracing::warn!(error = %e, "could not open editor");
                self.emit(SessionEvent::EditorOpenFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Returns whether an external change was found.
    fn poll(&mut self) -> Result<bool> {
        Ok(self.controller.poll_external()?.is_some())
    }
}

// ---------------------------------------------------------------------------
// Runtime loop
// ---------------------------------------------------------------------------

struct Runtime {
    store: StateStore,
    document: DocumentSide,
    state_inbox: Inbox<ToState>,
    doc_inbox: Inbox<ToDocument>,
    validation_rx: mpsc::UnboundedReceiver<ValidationReport>,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<SessionEvent>,
    sync: watch::Sender<SyncPhase>,
    poll: Option<Interval>,
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Runtime {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(msg) = self.doc_inbox.recv() => {
                    let mut batch = vec![msg];
                    batch.extend(self.doc_inbox.drain());
                    self.handle_document_batch(batch);
                }
                Some(msg) = self.state_inbox.recv() => self.handle_state(msg),
                Some(report) = self.validation_rx.recv() => {
                    self.store.apply_validation(report);
                }
                _ = next_tick(&mut self.poll) => {
                    if let Err(e) = self.check_external() {
                        tracing::warn!(error = %e, "could not re-read document");
                    }
                }
            }
        }
        tracing::debug!("session loop stopped");
    }

    fn transition(&self, event: SyncEvent) {
        self.sync.send_modify(|phase| *phase = phase.on(event));
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Update { state, reply } => {
                let version = self.store.update(state);
                if let Some(version) = version {
                    self.transition(SyncEvent::LocalMutation { version });
                }
                let _ = reply.send(version);
            }
            Command::Modify { f, reply } => {
                let result = self.store.modify(f);
                if let Ok(Some(version)) = result {
                    self.transition(SyncEvent::LocalMutation { version });
                }
                let _ = reply.send(result);
            }
            Command::OpenEditor { options, reply } => {
                self.store.open_editor(options);
                let _ = reply.send(());
            }
            Command::CheckExternal { reply } => {
                let _ = reply.send(self.check_external());
            }
            Command::Flush { reply } => {
                self.drain();
                let _ = reply.send(self.store.snapshot());
            }
            Command::DocumentText { reply } => {
                let _ = reply.send(self.document.controller.read().to_string());
            }
        }
    }

    fn handle_document_batch(&mut self, batch: Vec<ToDocument>) {
        if let Some(version) = self.document.handle_batch(batch) {
            self.transition(SyncEvent::WriteSettled { version });
        }
    }

    fn handle_state(&mut self, msg: ToState) {
        let ToState::Refresh { based_on, .. } = &msg;
        let based_on = *based_on;
        let event = match self.store.handle(msg) {
            RefreshOutcome::Applied => SessionEvent::RefreshApplied {
                revision: self.store.revision(),
                state: self.store.state().clone(),
            },
            RefreshOutcome::Unchanged => SessionEvent::RefreshUnchanged,
            RefreshOutcome::Stale => SessionEvent::RefreshDiscarded {
                based_on,
                version: self.store.version(),
            },
        };
        let _ = self.events.send(event);
        self.transition(SyncEvent::RefreshSettled);
    }

    /// Poll once. The refresh (if the text parsed) is already queued when
    /// the poll returns, so it is delivered here too.
    fn check_external(&mut self) -> Result<bool> {
        let changed = self.document.poll()?;
        if changed {
            self.transition(SyncEvent::ExternalChange);
            while let Some(msg) = self.state_inbox.try_recv() {
                self.handle_state(msg);
            }
            // A document that failed to parse sends no refresh.
            self.transition(SyncEvent::RefreshSettled);
        }
        Ok(changed)
    }

    /// Run both queues until neither has anything left.
    fn drain(&mut self) {
        loop {
            let mut progressed = false;
            let batch = self.doc_inbox.drain();
            if !batch.is_empty() {
                progressed = true;
                self.handle_document_batch(batch);
            }
            while let Some(msg) = self.state_inbox.try_recv() {
                progressed = true;
                self.handle_state(msg);
            }
            if !progressed {
                break;
            }
        }
    }
}
