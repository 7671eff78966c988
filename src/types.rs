//! Shared engine-surface types.

use serde::{Deserialize, Serialize};

/// Who is asking for a mutation. Carried through the catalog and transition
/// engine for permission checks and attachment provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Workspace administrator: may create canonical labels and mutate any
    /// conversation.
    Admin,
    /// Operator: may mutate conversations that are unassigned or assigned to
    /// them.
    Operator,
    /// The external auto-classifier. Trusted like an administrator for
    /// canonical-label creation so it can classify into a label no one has
    /// materialized yet.
    Automation,
}

impl Actor {
    pub fn admin(id: &str) -> Self {
        Self {
            id: id.to_string(),
            role: ActorRole::Admin,
        }
    }

    pub fn operator(id: &str) -> Self {
        Self {
            id: id.to_string(),
            role: ActorRole::Operator,
        }
    }

    /// Canonical-label creation is reserved to administrators and the
    /// auto-classifier; operators get the labels an administrator (or the
    /// catalog, lazily) set up.
    pub fn can_create_labels(&self) -> bool {
        matches!(self.role, ActorRole::Admin | ActorRole::Automation)
    }

    /// Whether this actor may mutate a conversation with the given
    /// assignment. Unassigned conversations are open to every operator.
    pub fn can_mutate(&self, assigned_operator_id: Option<&str>) -> bool {
        match self.role {
            ActorRole::Admin | ActorRole::Automation => true,
            ActorRole::Operator => {
                assigned_operator_id.is_none() || assigned_operator_id == Some(self.id.as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_assignment_gate() {
        let op = Actor::operator("op-1");
        assert!(op.can_mutate(None));
        assert!(op.can_mutate(Some("op-1")));
        assert!(!op.can_mutate(Some("op-2")));
        assert!(!op.can_create_labels());
    }

    #[test]
    fn test_admin_is_unrestricted() {
        let admin = Actor::admin("boss");
        assert!(admin.can_mutate(Some("op-2")));
        assert!(admin.can_create_labels());
    }

    #[test]
    fn test_automation_can_materialize_labels() {
        let bot = Actor {
            id: "auto-classifier".to_string(),
            role: ActorRole::Automation,
        };
        assert!(bot.can_create_labels());
        assert!(bot.can_mutate(Some("op-1")));
    }
}
