//! State transition engine for canonical labels.
//!
//! Enforces "at most one phase label, at most one temperature label" per
//! conversation, applies optimistic projection updates with an undo snapshot,
//! and mirrors `legacy_status` for backward-compatible readers. Persistence
//! failures restore the snapshot and surface a transient error — no retries,
//! no compensating writes.

use chrono::Utc;

use crate::catalog::{ensure_canonical, CanonicalKey};
use crate::classifier::Classification;
use crate::db::DbAttachment;
use crate::error::EngineError;
use crate::state::EngineState;
use crate::sync::projection::ConversationSnapshot;
use crate::taxonomy::{
    is_human_source, stage_for_label_name, temperature_for_label_name, CanonicalKind,
    FunnelStage, LegacyStatus, SOURCE_MANUAL, SOURCE_RECLASSIFICATION,
};
use crate::types::{Actor, ActorRole};

/// Result of a successful mutation. Carries the undo snapshot so callers can
/// roll a view back without re-deriving prior state.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub classification: Classification,
    pub removed_label_ids: Vec<String>,
    pub attached_label_id: Option<String>,
    pub undo: ConversationSnapshot,
}

/// Set a conversation's funnel phase.
///
/// Ensures the canonical label exists (a missing label an actor cannot create
/// is a `Configuration` error), removes every other canonical phase
/// attachment, attaches the target with source=manual, and mirrors
/// `legacy_status`. The projection is updated optimistically before the
/// write and restored from the undo snapshot if persistence fails.
pub fn set_phase(
    state: &EngineState,
    conversation_id: &str,
    target: &str,
    actor: &Actor,
) -> Result<TransitionOutcome, EngineError> {
    let stage = FunnelStage::parse(target)
        .ok_or_else(|| EngineError::Validation(format!("Unknown funnel phase: {target}")))?;
    let mirror = LegacyStatus::mirror_of(stage).as_str();

    apply_canonical_swap(
        state,
        conversation_id,
        Some(CanonicalKey::Phase(stage)),
        CanonicalKind::Phase,
        Some(mirror),
        actor,
    )
}

/// Set or clear a conversation's temperature. `None` removes every
/// temperature attachment and adds nothing; `legacy_status` is untouched
/// either way.
pub fn set_temperature(
    state: &EngineState,
    conversation_id: &str,
    target: Option<&str>,
    actor: &Actor,
) -> Result<TransitionOutcome, EngineError> {
    let key = match target {
        Some(t) => Some(CanonicalKey::parse(CanonicalKind::Temperature, t)?),
        None => None,
    };
    apply_canonical_swap(
        state,
        conversation_id,
        key,
        CanonicalKind::Temperature,
        None,
        actor,
    )
}

/// Shared shape of both mutators: serialize, ensure, diff, optimistic apply,
/// persist, rollback-on-failure.
fn apply_canonical_swap(
    state: &EngineState,
    conversation_id: &str,
    target: Option<CanonicalKey>,
    kind: CanonicalKind,
    mirror: Option<&str>,
    actor: &Actor,
) -> Result<TransitionOutcome, EngineError> {
    // Same-session serialization: hold the per-conversation lock for the
    // whole mutation so a second call waits rather than interleaving.
    let lock = state.mutation_lock(conversation_id);
    let _guard = lock
        .lock()
        .map_err(|_| EngineError::TransientNetwork("mutation lock poisoned".into()))?;

    // Resolve or create the target label before touching any state.
    let target_label = match target {
        Some(key) => {
            let workspace_id = state.projection.workspace_id().to_string();
            let label = {
                let guard = state
                    .db
                    .lock()
                    .map_err(|_| EngineError::TransientNetwork("database lock poisoned".into()))?;
                let db = guard
                    .as_ref()
                    .ok_or_else(|| EngineError::TransientNetwork("database unavailable".into()))?;
                match ensure_canonical(db, &workspace_id, key, actor) {
                    Ok(l) => l,
                    // Creation was needed and this actor cannot do it: the
                    // workspace is missing required setup, not the caller.
                    Err(EngineError::PermissionDenied(msg)) => {
                        return Err(EngineError::Configuration(msg))
                    }
                    Err(e) => return Err(e),
                }
            };
            // Make the label visible to the projection immediately; the
            // catalog stream will deliver the same upsert later, idempotently.
            state.projection.upsert_label(label.clone());
            Some(label)
        }
        None => None,
    };

    let snapshot = hydrate_conversation(state, conversation_id)?;
    if !actor.can_mutate(snapshot.conversation.assigned_operator_id.as_deref()) {
        return Err(EngineError::PermissionDenied(format!(
            "Conversation {} is assigned to another operator",
            conversation_id
        )));
    }

    // Canonical attachments of this dimension, minus the target itself.
    let target_id = target_label.as_ref().map(|l| l.id.clone());
    let to_remove = state.projection.attached_matching(conversation_id, |l| {
        let canonical = match kind {
            CanonicalKind::Phase => stage_for_label_name(&l.name).is_some(),
            CanonicalKind::Temperature => temperature_for_label_name(&l.name).is_some(),
        };
        canonical && Some(&l.id) != target_id.as_ref()
    });

    let source = match actor.role {
        ActorRole::Automation => SOURCE_RECLASSIFICATION,
        _ => SOURCE_MANUAL,
    };

    // Optimistic local update, snapshot retained for rollback.
    state
        .projection
        .apply_optimistic(conversation_id, &to_remove, target_id.as_deref(), mirror);
    if target_id.is_some() && is_human_source(source) {
        state.projection.set_manual_lock(conversation_id, true);
    }

    // Persist. One transaction; a failure leaves storage untouched and the
    // snapshot puts the projection back where it was.
    let workspace_id = state.projection.workspace_id().to_string();
    let persisted = state.with_db(|db| {
        db.with_transaction(|tx| {
            for label_id in &to_remove {
                tx.delete_attachment(conversation_id, label_id)?;
            }
            if let Some(ref label_id) = target_id {
                // INSERT OR IGNORE: re-attaching the current label is success.
                tx.insert_attachment(&DbAttachment {
                    conversation_id: conversation_id.to_string(),
                    label_id: label_id.clone(),
                    workspace_id: workspace_id.clone(),
                    source: source.to_string(),
                    created_by: Some(actor.id.clone()),
                    created_at: Utc::now().to_rfc3339(),
                })?;
            }
            if let Some(status) = mirror {
                tx.update_legacy_status(conversation_id, status)?;
            }
            Ok(())
        })
    });

    if let Err(e) = persisted {
        log::warn!(
            "Transition for {} failed, rolling back projection: {}",
            conversation_id,
            e
        );
        state.projection.restore(snapshot);
        return Err(e);
    }

    // The optimistic lock value was a fast-path guess; settle it from the
    // persisted attachment rows. Non-fatal on failure — the attachment
    // stream will converge it.
    if let Err(e) = recompute_manual_lock(state, conversation_id) {
        log::warn!(
            "Manual-lock recompute for {} failed after persist: {}",
            conversation_id,
            e
        );
    }

    let classification = state
        .projection
        .classify(conversation_id)
        .unwrap_or(Classification {
            phase: FunnelStage::NewLead,
            temperature: None,
        });

    log::info!(
        "Transition: {} {:?} -> {:?} by {} (removed {})",
        conversation_id,
        kind,
        target_id,
        actor.id,
        to_remove.len()
    );

    Ok(TransitionOutcome {
        classification,
        removed_label_ids: to_remove,
        attached_label_id: target_id,
        undo: snapshot,
    })
}

/// Advisory manual-override lock for one conversation.
pub fn manual_lock(state: &EngineState, conversation_id: &str) -> bool {
    state.projection.manual_lock(conversation_id)
}

/// Full recompute of the manual lock from persisted attachments.
///
/// Must be a full re-read, not a monotonic flag set: removing the last
/// human-sourced attachment legitimately clears the lock. Advisory only —
/// nothing in the engine blocks on it.
pub fn recompute_manual_lock(
    state: &EngineState,
    conversation_id: &str,
) -> Result<bool, EngineError> {
    let locked = state.with_db(|db| {
        let attachments = db.get_attachments(conversation_id)?;
        for att in attachments {
            if !is_human_source(&att.source) {
                continue;
            }
            let canonical = match state.projection.get_label(&att.label_id) {
                Some(label) => crate::taxonomy::is_canonical_name(&label.name),
                None => db
                    .get_label(&att.label_id)?
                    .map(|l| crate::taxonomy::is_canonical_name(&l.name))
                    .unwrap_or(false),
            };
            if canonical {
                return Ok(true);
            }
        }
        Ok(false)
    })?;

    state.projection.set_manual_lock(conversation_id, locked);
    Ok(locked)
}

/// Fetch the conversation into the projection if the streams have not
/// delivered it yet, and return its pre-mutation snapshot.
fn hydrate_conversation(
    state: &EngineState,
    conversation_id: &str,
) -> Result<ConversationSnapshot, EngineError> {
    if let Some(snapshot) = state.projection.snapshot(conversation_id) {
        return Ok(snapshot);
    }

    let conv = state
        .with_db(|db| db.get_conversation(conversation_id))?
        .ok_or_else(|| {
            EngineError::Validation(format!("Unknown conversation: {conversation_id}"))
        })?;
    if conv.legacy_status == "removed" {
        return Err(EngineError::Validation(format!(
            "Conversation {conversation_id} has been removed"
        )));
    }

    state.projection.upsert_conversation(conv);
    let attachments = state.with_db(|db| db.get_attachments(conversation_id))?;
    for att in &attachments {
        state.projection.attach(conversation_id, &att.label_id);
    }
    // Settle the lock now that attachments are hydrated
    let _ = recompute_manual_lock(state, conversation_id);

    state
        .projection
        .snapshot(conversation_id)
        .ok_or_else(|| EngineError::TransientNetwork("projection lost hydrated row".into()))
}
