//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

impl DbError {
    /// True when the underlying SQLite error is a uniqueness violation.
    /// The label catalog treats these as "another writer won the race".
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

/// A row from the `conversations` table.
///
/// `legacy_status` is the only column this engine writes; everything else is
/// owned by the inbound-message ingestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConversation {
    pub id: String,
    pub workspace_id: String,
    pub contact_name: Option<String>,
    pub assigned_operator_id: Option<String>,
    pub legacy_status: String,
    pub last_inbound_at: Option<String>,
    pub last_outbound_at: Option<String>,
    pub priority: bool,
    pub spam: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `labels` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbLabel {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    /// Guidance for the external auto-classifier on when this label applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_hint: Option<String>,
    pub created_at: String,
}

/// A row from the `label_attachments` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAttachment {
    pub conversation_id: String,
    pub label_id: String,
    pub workspace_id: String,
    pub source: String,
    pub created_by: Option<String>,
    pub created_at: String,
}

/// A row from the read-only `alerts` feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAlert {
    pub id: String,
    pub workspace_id: String,
    pub conversation_id: String,
    pub alert_type: String,
    pub overdue_minutes: i64,
    pub recommended_action: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl DbAlert {
    pub fn is_open(&self) -> bool {
        self.status == "open"
    }
}
