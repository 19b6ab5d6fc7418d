//! Typed messages between the state side and the document side.
//!
//! Each direction is its own single-consumer queue. Nothing depends on the
//! relative order of the two directions: every handler acts only on the
//! newest message it has seen for its own direction.

use crate::model::FlatState;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenEditorOptions {
    #[serde(default)]
    pub is_preview: bool,
    #[serde(default)]
    pub on_side: bool,
}

/// State side -> document side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToDocument {
    /// Make the document match `serialize(data)`.
    UpdateText {
        data: FlatState,
        #[serde(default)]
        version: u64,
    },
    /// Show the raw text instead of the structured editor.
    OpenEditor { data: OpenEditorOptions },
}

/// Document side -> state side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToState {
    /// Freshly parsed state after the document changed outside the editor.
    /// `based_on` is the newest state version the document side had written
    /// when it parsed; older than the store's version means stale.
    Refresh {
        data: FlatState,
        #[serde(default, rename = "basedOn")]
        based_on: u64,
    },
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Outbox<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Outbox<T> {
    /// Queue a message. Returns false when the other side has gone away.
    pub fn post(&self, msg: T) -> bool {
        if self.tx.send(msg).is_err() {
            tracing::debug!("message dropped: receiving side closed");
            return false;
        }
        true
    }
}

#[derive(Debug)]
pub struct Inbox<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Inbox<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take everything currently queued.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(msg) = self.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// The state side's ends: sends to the document, receives refreshes.
#[derive(Debug)]
pub struct StateEndpoint {
    pub outbox: Outbox<ToDocument>,
    pub inbox: Inbox<ToState>,
}

/// The document side's ends: sends refreshes, receives text updates.
#[derive(Debug)]
pub struct DocumentEndpoint {
    pub outbox: Outbox<ToState>,
    pub inbox: Inbox<ToDocument>,
}

pub fn channel() -> (StateEndpoint, DocumentEndpoint) {
    let (to_doc_tx, to_doc_rx) = mpsc::unbounded_channel();
    let (to_state_tx, to_state_rx) = mpsc::unbounded_channel();
    (
        StateEndpoint {
            outbox: Outbox { tx: to_doc_tx },
            inbox: Inbox { rx: to_state_rx },
        },
        DocumentEndpoint {
            outbox: Outbox { tx: to_state_tx },
            inbox: Inbox { rx: to_doc_rx },
        },
    )
}

/// Collapse a batch of document-bound messages: only the newest `updateText`
/// survives, since each one replaces the whole document. `openEditor`
/// requests keep their order.
pub fn coalesce(batch: Vec<ToDocument>) -> Vec<ToDocument> {
    let last_update = batch
        .iter()
        .rposition(|m| matches!(m, ToDocument::UpdateText { .. }));
    batch
        .into_iter()
        .enumerate()
        .filter(|(i, m)| !matches!(m, ToDocument::UpdateText { .. }) || Some(*i) == last_update)
        .map(|(_, m)| m)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shapes() {
        let msg = ToDocument::OpenEditor {
            data: OpenEditorOptions::default(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "openEditor", "data": {"isPreview": false, "onSide": false}})
        );

        let update: ToDocument = serde_json::from_value(json!({
            "type": "updateText",
            "data": {"name": "Flat", "on": {"workflow_dispatch": true}, "jobs": []}
        }))
        .unwrap();
        assert!(matches!(update, ToDocument::UpdateText { version: 0, .. }));

        let refresh = ToState::Refresh {
            data: FlatState::stub(),
            based_on: 3,
        };
        let v = serde_json::to_value(&refresh).unwrap();
        assert_eq!(v["type"], "refresh");
        assert_eq!(v["basedOn"], 3);
        assert_eq!(v["data"]["name"], "Flat");
    }

    #[tokio::test]
    async fn each_direction_is_ordered() {
        let (state, mut doc) = channel();
        for version in 1..=3 {
            state.outbox.post(ToDocument::UpdateText {
                data: FlatState::stub(),
                version,
            });
        }
        let versions: Vec<u64> = doc
            .inbox
            .drain()
            .into_iter()
            .map(|m| match m {
                ToDocument::UpdateText { version, .. } => version,
                ToDocument::OpenEditor { .. } => 0,
            })
            .collect();
        assert_eq!(versions, [1, 2, 3]);
        assert!(doc.inbox.try_recv().is_none());
    }

    #[test]
    fn post_after_close_reports_false() {
        let (state, doc) = channel();
        drop(doc);
        assert!(!state.outbox.post(ToDocument::OpenEditor {
            data: OpenEditorOptions::default()
        }));
    }

    #[test]
    fn coalesce_keeps_newest_update_and_all_opens() {
        let open = ToDocument::OpenEditor {
            data: OpenEditorOptions {
                is_preview: true,
                on_side: false,
            },
        };
        let update = |version| ToDocument::UpdateText {
            data: FlatState::stub(),
            version,
        };
        let out = coalesce(vec![update(1), open.clone(), update(2), update(3)]);
        assert_eq!(out, vec![open, update(3)]);
    }
}
