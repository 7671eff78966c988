//! Shared in-memory projection of one workspace.
//!
//! Replaces the per-screen caches of the old dashboard: one map of
//! conversations (with attached label ids and the derived manual lock) and
//! one label map, maintained by the change streams and read by every
//! consumer. All access goes through short read/write sections on a single
//! non-poisoning lock; callers get cloned snapshots, never references into
//! the projection.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::Serialize;

use crate::classifier::{classify, Classification};
use crate::db::{DbConversation, DbLabel, LeadDb};
use crate::util::compare_timestamps;

/// One conversation's projected state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub conversation: DbConversation,
    pub attached: HashSet<String>,
    /// Advisory: true iff any canonical attachment was made by a human.
    pub manual_lock: bool,
}

/// Undo snapshot captured before an optimistic mutation. Restoring it puts
/// the projection back exactly where it was.
pub type ConversationSnapshot = ConversationView;

#[derive(Default)]
struct ProjectionInner {
    conversations: HashMap<String, ConversationView>,
    labels: HashMap<String, DbLabel>,
    /// Removal tombstones: conversation id → `updated_at` of the removal.
    /// An at-least-once stream can replay the pre-removal upsert; without
    /// the tombstone that replay would resurrect the evicted conversation.
    tombstones: HashMap<String, String>,
}

/// Workspace-scoped projection shared by the transition engine, sync layer,
/// ranking, and export.
pub struct Projection {
    workspace_id: String,
    inner: RwLock<ProjectionInner>,
}

impl Projection {
    pub fn new(workspace_id: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            inner: RwLock::new(ProjectionInner::default()),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Load the full workspace state from the database. Called once per
    /// session before subscriptions start; the streams keep it current from
    /// then on.
    pub fn bootstrap(&self, db: &LeadDb) -> Result<(), crate::db::DbError> {
        let conversations = db.get_workspace_conversations(&self.workspace_id)?;
        let labels = db.get_workspace_labels(&self.workspace_id)?;
        let attachments = db.get_workspace_attachments(&self.workspace_id)?;

        let label_map: HashMap<String, DbLabel> =
            labels.into_iter().map(|l| (l.id.clone(), l)).collect();

        let mut views: HashMap<String, ConversationView> = conversations
            .into_iter()
            .map(|c| {
                (
                    c.id.clone(),
                    ConversationView {
                        conversation: c,
                        attached: HashSet::new(),
                        manual_lock: false,
                    },
                )
            })
            .collect();

        for att in attachments {
            if let Some(view) = views.get_mut(&att.conversation_id) {
                let canonical = label_map
                    .get(&att.label_id)
                    .map(|l| crate::taxonomy::is_canonical_name(&l.name))
                    .unwrap_or(false);
                if canonical && crate::taxonomy::is_human_source(&att.source) {
                    view.manual_lock = true;
                }
                view.attached.insert(att.label_id);
            }
        }

        let mut inner = self.inner.write();
        inner.conversations = views;
        inner.labels = label_map;
        inner.tombstones.clear();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Merge operations (called by the sync layer and the poller)
    // -----------------------------------------------------------------------

    /// Idempotent conversation upsert. Returns false when the event was
    /// stale (older `updated_at` than the projected row) or an eviction.
    ///
    /// The stale check is what keeps an at-least-once, out-of-order stream
    /// from regressing a newer local optimistic update: optimistic mutations
    /// bump the projected `updated_at`, so a replayed older row is dropped.
    pub fn upsert_conversation(&self, conv: DbConversation) -> bool {
        let mut inner = self.inner.write();

        if let Some(removed_at) = inner.tombstones.get(&conv.id) {
            if compare_timestamps(&conv.updated_at, removed_at) != Ordering::Greater {
                log::debug!(
                    "Projection: dropped replay of removed conversation {}",
                    conv.id
                );
                return false;
            }
            // Newer than the removal: the conversation came back.
            if conv.legacy_status != "removed" {
                inner.tombstones.remove(&conv.id);
            }
        }

        if conv.legacy_status == "removed" {
            inner.tombstones.insert(conv.id.clone(), conv.updated_at.clone());
            if inner.conversations.remove(&conv.id).is_some() {
                log::debug!("Projection: evicted conversation {}", conv.id);
            }
            return false;
        }

        match inner.conversations.get_mut(&conv.id) {
            Some(view) => {
                if compare_timestamps(&conv.updated_at, &view.conversation.updated_at)
                    == Ordering::Less
                {
                    log::debug!(
                        "Projection: dropped stale event for {} ({} < {})",
                        conv.id,
                        conv.updated_at,
                        view.conversation.updated_at
                    );
                    return false;
                }
                view.conversation = conv;
                true
            }
            None => {
                inner.conversations.insert(
                    conv.id.clone(),
                    ConversationView {
                        conversation: conv,
                        attached: HashSet::new(),
                        manual_lock: false,
                    },
                );
                true
            }
        }
    }

    /// Add a label id to a conversation's attached set. No-op for unknown
    /// conversations (the conversation stream may simply not have caught up).
    pub fn attach(&self, conversation_id: &str, label_id: &str) {
        let mut inner = self.inner.write();
        if let Some(view) = inner.conversations.get_mut(conversation_id) {
            view.attached.insert(label_id.to_string());
        }
    }

    /// Remove a label id from a conversation's attached set.
    pub fn detach(&self, conversation_id: &str, label_id: &str) {
        let mut inner = self.inner.write();
        if let Some(view) = inner.conversations.get_mut(conversation_id) {
            view.attached.remove(label_id);
        }
    }

    pub fn upsert_label(&self, label: DbLabel) {
        self.inner.write().labels.insert(label.id.clone(), label);
    }

    /// Remove a label from the shared map. Attached sets keep the dangling
    /// id; the classifier tolerates ids with no label row.
    pub fn remove_label(&self, label_id: &str) {
        self.inner.write().labels.remove(label_id);
    }

    pub fn set_manual_lock(&self, conversation_id: &str, locked: bool) {
        let mut inner = self.inner.write();
        if let Some(view) = inner.conversations.get_mut(conversation_id) {
            view.manual_lock = locked;
        }
    }

    // -----------------------------------------------------------------------
    // Optimistic mutation support (called by the transition engine)
    // -----------------------------------------------------------------------

    /// Clone a conversation's projected state for use as an undo snapshot.
    pub fn snapshot(&self, conversation_id: &str) -> Option<ConversationSnapshot> {
        self.inner.read().conversations.get(conversation_id).cloned()
    }

    /// Restore a previously captured snapshot, discarding whatever optimistic
    /// state replaced it.
    pub fn restore(&self, snapshot: ConversationSnapshot) {
        let mut inner = self.inner.write();
        inner
            .conversations
            .insert(snapshot.conversation.id.clone(), snapshot);
    }

    /// Apply an optimistic label swap: remove `to_remove`, attach `to_add`,
    /// optionally mirror a new legacy status, and bump `updated_at` so stale
    /// stream events cannot regress this update.
    pub fn apply_optimistic(
        &self,
        conversation_id: &str,
        to_remove: &[String],
        to_add: Option<&str>,
        legacy_status: Option<&str>,
    ) {
        let mut inner = self.inner.write();
        if let Some(view) = inner.conversations.get_mut(conversation_id) {
            for id in to_remove {
                view.attached.remove(id);
            }
            if let Some(id) = to_add {
                view.attached.insert(id.to_string());
            }
            if let Some(status) = legacy_status {
                view.conversation.legacy_status = status.to_string();
            }
            view.conversation.updated_at = chrono::Utc::now().to_rfc3339();
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn manual_lock(&self, conversation_id: &str) -> bool {
        self.inner
            .read()
            .conversations
            .get(conversation_id)
            .map(|v| v.manual_lock)
            .unwrap_or(false)
    }

    /// Classify one projected conversation. `None` for unknown ids.
    pub fn classify(&self, conversation_id: &str) -> Option<Classification> {
        let inner = self.inner.read();
        let view = inner.conversations.get(conversation_id)?;
        Some(classify(
            &view.attached,
            &inner.labels,
            &view.conversation.legacy_status,
        ))
    }

    /// Label ids attached to a conversation that are canonical for the given
    /// dimension check, resolved through the current label map.
    pub fn attached_matching(
        &self,
        conversation_id: &str,
        pred: impl Fn(&DbLabel) -> bool,
    ) -> Vec<String> {
        let inner = self.inner.read();
        let Some(view) = inner.conversations.get(conversation_id) else {
            return Vec::new();
        };
        view.attached
            .iter()
            .filter(|id| inner.labels.get(*id).map(&pred).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Cloned view of every projected conversation.
    pub fn conversations(&self) -> Vec<ConversationView> {
        self.inner.read().conversations.values().cloned().collect()
    }

    /// Cloned label map.
    pub fn labels(&self) -> HashMap<String, DbLabel> {
        self.inner.read().labels.clone()
    }

    pub fn get_label(&self, label_id: &str) -> Option<DbLabel> {
        self.inner.read().labels.get(label_id).cloned()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.inner.read().conversations.contains_key(conversation_id)
    }
}
