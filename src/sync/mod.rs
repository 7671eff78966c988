//! Synchronization layer: three change streams plus a polling fallback.
//!
//! Remote mutations arrive as already-persisted change notifications on three
//! independent streams (conversations, label attachments, label catalog).
//! Each event is merged into the shared [`projection`] — streams carry no
//! ordering guarantee between each other, so every merge must be safe to
//! apply out of order and to replay. The [`poller`] sweeps the conversations
//! table on a timer to pick up anything the streams dropped.

pub mod poller;
pub mod projection;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::{DbAttachment, DbConversation, DbLabel};
use crate::state::EngineState;
use crate::taxonomy::{is_canonical_name, is_human_source};
use crate::transition::recompute_manual_lock;

// ---------------------------------------------------------------------------
// Wire events
// ---------------------------------------------------------------------------

/// Conversation stream payload. Upserts cover creation, update, and removal
/// (removal arrives as an upsert with `legacy_status = "removed"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConversationEvent {
    Upsert { conversation: DbConversation },
}

/// Attachment stream payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AttachmentEvent {
    Insert {
        attachment: DbAttachment,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        conversation_id: String,
        label_id: String,
    },
}

/// Label catalog stream payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LabelEvent {
    Upsert {
        label: DbLabel,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        label_id: String,
    },
}

// ---------------------------------------------------------------------------
// Merge handlers
// ---------------------------------------------------------------------------

/// Merge a conversation event into the projection.
///
/// Stale events (an `updated_at` older than what an optimistic local
/// mutation already projected, or than a removal) are dropped inside the
/// projection. The first upsert for a conversation also hydrates its
/// persisted attachments — the attachment stream may have delivered them
/// before the conversation itself existed locally.
pub fn apply_conversation_event(state: &EngineState, event: ConversationEvent) {
    let ConversationEvent::Upsert { conversation } = event;
    if conversation.workspace_id != state.projection.workspace_id() {
        return;
    }
    let id = conversation.id.clone();
    let first_seen = !state.projection.contains(&id);
    if state.projection.upsert_conversation(conversation) && first_seen {
        hydrate_attachments(state, &id);
    }
}

/// Re-read a conversation's attachments from storage and settle its lock.
/// Streams deliver already-persisted changes, so storage is authoritative
/// for anything that streamed in before the conversation was projected.
fn hydrate_attachments(state: &EngineState, conversation_id: &str) {
    let attachments = match state.with_db(|db| db.get_attachments(conversation_id)) {
        Ok(attachments) => attachments,
        Err(e) => {
            log::warn!("Attachment hydrate for {} failed: {}", conversation_id, e);
            return;
        }
    };
    for att in &attachments {
        state.projection.attach(conversation_id, &att.label_id);
    }
    if let Err(e) = recompute_manual_lock(state, conversation_id) {
        log::warn!(
            "Manual-lock recompute for {} after hydrate failed: {}",
            conversation_id,
            e
        );
    }
}

/// Merge an attachment event into the projection and settle the
/// manual-override lock.
///
/// Only the one provably monotonic case takes a fast path: a human-sourced
/// insert of a known canonical label can only engage the lock. Everything
/// else that might touch canonical state — an automatic insert, a delete,
/// or a label the catalog stream hasn't delivered yet — settles with the
/// full recompute from storage.
pub fn apply_attachment_event(state: &EngineState, event: AttachmentEvent) {
    match event {
        AttachmentEvent::Insert { attachment } => {
            if attachment.workspace_id != state.projection.workspace_id() {
                return;
            }
            state
                .projection
                .attach(&attachment.conversation_id, &attachment.label_id);
            if !state.projection.contains(&attachment.conversation_id) {
                return;
            }
            match canonical_in_map(state, &attachment.label_id) {
                Some(true) if is_human_source(&attachment.source) => {
                    state
                        .projection
                        .set_manual_lock(&attachment.conversation_id, true);
                }
                Some(false) => {}
                // Canonical with a machine source, or a label the map does
                // not know yet
                _ => settle_lock(state, &attachment.conversation_id),
            }
        }
        AttachmentEvent::Delete {
            conversation_id,
            label_id,
        } => {
            let maybe_canonical = canonical_in_map(state, &label_id).unwrap_or(true);
            state.projection.detach(&conversation_id, &label_id);
            if maybe_canonical && state.projection.contains(&conversation_id) {
                settle_lock(state, &conversation_id);
            }
        }
    }
}

/// Merge a label catalog event into the projection.
pub fn apply_label_event(state: &EngineState, event: LabelEvent) {
    match event {
        LabelEvent::Upsert { label } => {
            if label.workspace_id != state.projection.workspace_id() {
                return;
            }
            state.projection.upsert_label(label);
        }
        LabelEvent::Delete { label_id } => {
            state.projection.remove_label(&label_id);
        }
    }
}

/// Whether the projected label map knows this label to be canonical.
/// `None` when the catalog stream has not delivered the label yet.
fn canonical_in_map(state: &EngineState, label_id: &str) -> Option<bool> {
    state
        .projection
        .get_label(label_id)
        .map(|l| is_canonical_name(&l.name))
}

fn settle_lock(state: &EngineState, conversation_id: &str) {
    if let Err(e) = recompute_manual_lock(state, conversation_id) {
        log::warn!(
            "Manual-lock recompute for {} failed: {}",
            conversation_id,
            e
        );
    }
}

// ---------------------------------------------------------------------------
// Subscription tasks
// ---------------------------------------------------------------------------

/// Spawn one task per change stream. Each task decodes raw JSON payloads,
/// skips malformed ones with a warning, and merges the rest. Tasks exit when
/// their stream closes.
pub fn spawn_subscriptions(
    state: Arc<EngineState>,
    conversations: mpsc::Receiver<serde_json::Value>,
    attachments: mpsc::Receiver<serde_json::Value>,
    labels: mpsc::Receiver<serde_json::Value>,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_stream(state.clone(), "conversations", conversations, |s, e| {
            apply_conversation_event(s, e)
        }),
        spawn_stream(state.clone(), "attachments", attachments, |s, e| {
            apply_attachment_event(s, e)
        }),
        spawn_stream(state, "labels", labels, |s, e| apply_label_event(s, e)),
    ]
}

fn spawn_stream<E>(
    state: Arc<EngineState>,
    name: &'static str,
    mut rx: mpsc::Receiver<serde_json::Value>,
    apply: impl Fn(&EngineState, E) + Send + 'static,
) -> JoinHandle<()>
where
    E: for<'de> Deserialize<'de> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            match serde_json::from_value::<E>(value) {
                Ok(event) => apply(&state, event),
                Err(e) => {
                    log::warn!("Dropping malformed {} event: {}", name, e);
                }
            }
        }
        log::info!("{} stream closed, subscription task exiting", name);
    })
}
