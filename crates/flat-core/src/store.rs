use crate::error::Result;
use crate::message::{OpenEditorOptions, Outbox, ToDocument, ToState};
use crate::model::FlatState;
use crate::validation::{Diagnostic, ValidationReport, ValidationRunner};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// What subscribers see after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub state: FlatState,
    /// Bumped by local mutations only; stamps outgoing `updateText`.
    pub version: u64,
    /// Bumped by every change, local or refresh.
    pub revision: u64,
    /// True until the state has come from a document or a user edit.
    pub is_stub: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Revision the diagnostics belong to, once validation has reported.
    pub validated_revision: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Applied,
    Unchanged,
    /// A local mutation happened after the document was parsed.
    Stale,
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Owner of the canonical [`FlatState`]. Every change replaces the whole
/// value; there are no field-level patches.
pub struct StateStore {
    state: FlatState,
    version: u64,
    revision: u64,
    is_stub: bool,
    diagnostics: Vec<Diagnostic>,
    validated_revision: Option<u64>,
    outbox: Outbox<ToDocument>,
    validation: Option<ValidationRunner>,
    snapshots: watch::Sender<StoreSnapshot>,
}

impl StateStore {
    /// A store holding the stub state at version 0.
    pub fn new(outbox: Outbox<ToDocument>, validation: Option<ValidationRunner>) -> Self {
        Self::with_initial(outbox, validation, FlatState::stub(), true)
    }

    /// A store seeded with the state parsed from the document at load time.
    /// Seeding is not a change: version and revision both start at 0 and
    /// nothing is posted to the document.
    pub fn with_initial(
        outbox: Outbox<ToDocument>,
        validation: Option<ValidationRunner>,
        state: FlatState,
        is_stub: bool,
    ) -> Self {
        let (snapshots, _) = watch::channel(StoreSnapshot {
            state: state.clone(),
            version: 0,
            revision: 0,
            is_stub,
            diagnostics: Vec::new(),
            validated_revision: None,
        });
        let store = Self {
            state,
            version: 0,
            revision: 0,
            is_stub,
            diagnostics: Vec::new(),
            validated_revision: None,
            outbox,
            validation,
            snapshots,
        };
        store.launch_validation();
        store
    }

    pub fn state(&self) -> &FlatState {
        &self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            state: self.state.clone(),
            version: self.version,
            revision: self.revision,
            is_stub: self.is_stub,
            diagnostics: self.diagnostics.clone(),
            validated_revision: self.validated_revision,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.subscribe()
    }

    /// Replace the state from user input. Returns the new version, or `None`
    /// when `next` equals the current state.
    pub fn update(&mut self, next: FlatState) -> Option<u64> {
        if next == self.state {
            return None;
        }
        self.state = next;
        self.version += 1;
        self.revision += 1;
        self.is_stub = false;
        tracing::debug!(version = self.version, "local state update");

        self.outbox.post(ToDocument::UpdateText {
            data: self.state.clone(),
            version: self.version,
        });
        self.launch_validation();
        self.publish();
        Some(self.version)
    }

    /// Edit a copy of the state and commit it with [`Self::update`]. If `f`
    /// fails the store is left untouched.
    pub fn modify<F>(&mut self, f: F) -> Result<Option<u64>>
    where
        F: FnOnce(&mut FlatState) -> Result<()>,
    {
        let mut next = self.state.clone();
        f(&mut next)?;
        Ok(self.update(next))
    }

    pub fn handle(&mut self, msg: ToState) -> RefreshOutcome {
        match msg {
            ToState::Refresh { data, based_on } => self.apply_refresh(data, based_on),
        }
    }

    /// Take a state parsed from the document. Never posts `updateText`: the
    /// document already holds this content.
    pub fn apply_refresh(&mut self, next: FlatState, based_on: u64) -> RefreshOutcome {
        if based_on < self.version {
            tracing::debug!(
                based_on,
                version = self.version,
                "discarding refresh older than local state"
            );
            return RefreshOutcome::Stale;
        }
        if next == self.state {
            return RefreshOutcome::Unchanged;
        }
        self.state = next;
        self.revision += 1;
        self.is_stub = false;
        tracing::info!(revision = self.revision, "state refreshed from document");
        self.launch_validation();
        self.publish();
        RefreshOutcome::Applied
    }

    /// Attach diagnostics if they belong to the current revision. Reports for
    /// superseded revisions are dropped.
    pub fn apply_validation(&mut self, report: ValidationReport) -> bool {
        if report.revision != self.revision {
            return false;
        }
        self.diagnostics = report.diagnostics;
        self.validated_revision = Some(report.revision);
        self.publish();
        true
    }

    pub fn open_editor(&self, options: OpenEditorOptions) {
        self.outbox.post(ToDocument::OpenEditor { data: options });
    }

    fn launch_validation(&self) {
        if let Some(runner) = &self.validation {
            runner.launch(self.state.clone(), self.revision);
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}
