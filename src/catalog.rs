//! Per-workspace label catalog.
//!
//! Resolves and lazily creates the canonical labels that represent funnel
//! phases and temperatures. Creation is race-safe: a uniqueness violation on
//! insert means another writer created the label first, so we re-read and
//! return the winning row rather than erroring.

use chrono::Utc;
use uuid::Uuid;

use crate::db::{DbError, DbLabel, LeadDb};
use crate::error::EngineError;
use crate::taxonomy::{
    normalize_label_name, CanonicalKind, FunnelStage, LabelPreset, Temperature,
};
use crate::types::Actor;

/// A canonical target: either a funnel stage or a temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalKey {
    Phase(FunnelStage),
    Temperature(Temperature),
}

impl CanonicalKey {
    pub fn kind(&self) -> CanonicalKind {
        match self {
            Self::Phase(_) => CanonicalKind::Phase,
            Self::Temperature(_) => CanonicalKind::Temperature,
        }
    }

    fn preset(&self) -> LabelPreset {
        match self {
            Self::Phase(stage) => stage.preset(),
            Self::Temperature(temp) => temp.preset(),
        }
    }

    /// Parse a caller-supplied target string against the alias table.
    pub fn parse(kind: CanonicalKind, key: &str) -> Result<Self, EngineError> {
        match kind {
            CanonicalKind::Phase => FunnelStage::parse(key)
                .map(Self::Phase)
                .ok_or_else(|| EngineError::Validation(format!("Unknown funnel phase: {key}"))),
            CanonicalKind::Temperature => Temperature::parse(key)
                .map(Self::Temperature)
                .ok_or_else(|| EngineError::Validation(format!("Unknown temperature: {key}"))),
        }
    }
}

/// Find the canonical label for a stage/temperature if any alias of it exists
/// in the workspace.
pub fn resolve_canonical(
    db: &LeadDb,
    workspace_id: &str,
    key: CanonicalKey,
) -> Result<Option<DbLabel>, DbError> {
    let aliases: &[&str] = match key {
        CanonicalKey::Phase(stage) => stage.aliases(),
        CanonicalKey::Temperature(temp) => temp.aliases(),
    };
    // The preset name is the preferred spelling; check it first, then the
    // remaining accepted variants.
    let preset_norm = normalize_label_name(key.preset().name);
    if let Some(label) = db.find_label_by_normalized_name(workspace_id, &preset_norm)? {
        return Ok(Some(label));
    }
    for alias in aliases {
        if let Some(label) = db.find_label_by_normalized_name(workspace_id, alias)? {
            return Ok(Some(label));
        }
    }
    Ok(None)
}

/// Return the canonical label for `key`, creating it from its preset when
/// absent.
///
/// Creation requires a privileged actor; an unprivileged actor gets
/// `PermissionDenied` only when creation is actually needed. Idempotent under
/// races: a uniqueness violation on insert is treated as success and the
/// existing row is re-read and returned.
pub fn ensure_canonical(
    db: &LeadDb,
    workspace_id: &str,
    key: CanonicalKey,
    actor: &Actor,
) -> Result<DbLabel, EngineError> {
    if let Some(label) = resolve_canonical(db, workspace_id, key)? {
        return Ok(label);
    }

    if !actor.can_create_labels() {
        return Err(EngineError::PermissionDenied(format!(
            "Creating the '{}' label requires an administrator",
            key.preset().name
        )));
    }

    let preset = key.preset();
    let label = DbLabel {
        id: format!("lbl-{}", Uuid::new_v4()),
        workspace_id: workspace_id.to_string(),
        name: preset.name.to_string(),
        color: Some(preset.color.to_string()),
        icon: Some(preset.icon.to_string()),
        classification_hint: Some(preset.hint.to_string()),
        created_at: Utc::now().to_rfc3339(),
    };

    match db.insert_label(&label) {
        Ok(()) => {
            log::info!(
                "Catalog: created canonical label '{}' in workspace {}",
                preset.name,
                workspace_id
            );
            Ok(label)
        }
        Err(e) if e.is_unique_violation() => {
            // Lost the creation race — the winner's row is the canonical one.
            log::debug!(
                "Catalog: creation race on '{}' in workspace {}, re-reading",
                preset.name,
                workspace_id
            );
            resolve_canonical(db, workspace_id, key)?.ok_or_else(|| {
                EngineError::Conflict(format!(
                    "Label '{}' vanished after uniqueness conflict",
                    preset.name
                ))
            })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::taxonomy::CanonicalKind;

    #[test]
    fn test_resolve_missing_is_none() {
        let db = test_db();
        let key = CanonicalKey::Phase(FunnelStage::Won);
        assert!(resolve_canonical(&db, "ws1", key).expect("query").is_none());
    }

    #[test]
    fn test_ensure_creates_from_preset() {
        let db = test_db();
        let admin = Actor::admin("boss");
        let key = CanonicalKey::Temperature(Temperature::Hot);

        let label = ensure_canonical(&db, "ws1", key, &admin).expect("ensure");
        assert_eq!(label.name, "Hot Lead");
        assert_eq!(label.color.as_deref(), Some("#DC2626"));
        assert!(label.classification_hint.is_some());

        // Second call resolves the same row, no new creation
        let again = ensure_canonical(&db, "ws1", key, &admin).expect("ensure again");
        assert_eq!(again.id, label.id);
        assert_eq!(db.get_workspace_labels("ws1").expect("labels").len(), 1);
    }

    #[test]
    fn test_ensure_resolves_admin_created_alias() {
        let db = test_db();
        // An administrator created "booked call" by hand; ensure() must find
        // it instead of creating a duplicate "Call booked".
        db.insert_label(&DbLabel {
            id: "l-manual".to_string(),
            workspace_id: "ws1".to_string(),
            name: "booked call".to_string(),
            color: None,
            icon: None,
            classification_hint: None,
            created_at: Utc::now().to_rfc3339(),
        })
        .expect("seed");

        let op = Actor::operator("op-1");
        let key = CanonicalKey::Phase(FunnelStage::CallBooked);
        let label = ensure_canonical(&db, "ws1", key, &op).expect("resolve");
        assert_eq!(label.id, "l-manual");
    }

    #[test]
    fn test_unprivileged_actor_cannot_create() {
        let db = test_db();
        let op = Actor::operator("op-1");
        let key = CanonicalKey::Phase(FunnelStage::NoShow);
        let err = ensure_canonical(&db, "ws1", key, &op).expect_err("denied");
        assert!(matches!(err, EngineError::PermissionDenied(_)));
        assert!(db.get_workspace_labels("ws1").expect("labels").is_empty());
    }

    #[test]
    fn test_creation_race_returns_winner() {
        let db = test_db();
        let admin = Actor::admin("boss");
        let key = CanonicalKey::Phase(FunnelStage::NoShow);

        // The winning row already exists under a different id; ensure()
        // must return it, never create a second one.
        let winner = DbLabel {
            id: "l-winner".to_string(),
            workspace_id: "ws1".to_string(),
            name: "No show".to_string(),
            color: None,
            icon: None,
            classification_hint: None,
            created_at: Utc::now().to_rfc3339(),
        };
        db.insert_label(&winner).expect("winner insert");

        let got = ensure_canonical(&db, "ws1", key, &admin).expect("ensure");
        assert_eq!(got.id, "l-winner");
        // Exactly one row exists
        assert_eq!(db.get_workspace_labels("ws1").expect("labels").len(), 1);
    }

    #[test]
    fn test_parse_rejects_unknown_target() {
        let err = CanonicalKey::parse(CanonicalKind::Phase, "sideways").expect_err("invalid");
        assert!(matches!(err, EngineError::Validation(_)));
        let ok = CanonicalKey::parse(CanonicalKind::Temperature, "warm").expect("valid");
        assert_eq!(ok, CanonicalKey::Temperature(Temperature::Warm));
    }
}
