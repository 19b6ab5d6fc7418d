use serde::Serialize;

/// Where the sync loop is between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    /// A local mutation at `version` has not been written yet.
    PendingWrite { version: u64 },
    /// An external change was seen and its refresh has not settled.
    PendingRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    LocalMutation { version: u64 },
    /// The write for `version` finished: written, equal, or failed.
    WriteSettled { version: u64 },
    ExternalChange,
    /// The refresh was applied, was a no-op, was stale, or never came.
    RefreshSettled,
}

impl SyncPhase {
    pub fn on(self, event: SyncEvent) -> SyncPhase {
        use SyncEvent::*;
        use SyncPhase::*;
        match (self, event) {
            // Local mutations always win, including over an in-flight refresh.
            (_, LocalMutation { version }) => PendingWrite { version },
            (PendingWrite { version: pending }, WriteSettled { version }) if version >= pending => {
                Idle
            }
            // A pending write supersedes the external text anyway; the
            // refresh will be judged stale by its version stamp.
            (PendingWrite { .. }, ExternalChange) => self,
            (_, ExternalChange) => PendingRefresh,
            (PendingRefresh, RefreshSettled) => Idle,
            (phase, _) => phase,
        }
    }

    pub fn is_idle(self) -> bool {
        self == SyncPhase::Idle
    }
}
