//! SQLite-backed access to the externally-owned lead tables.
//!
//! The database lives at `~/.leadflow/leadflow.db`. Conversations, labels,
//! attachments, and the alert feed are owned by out-of-scope collaborators;
//! this layer is the engine's read/write window onto them. The engine writes
//! only `conversations.legacy_status`, the `labels` table (via the catalog),
//! and `label_attachments`.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

pub mod alerts;
pub mod conversations;
pub mod labels;

pub struct LeadDb {
    conn: Connection,
}

impl LeadDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at `~/.leadflow/leadflow.db` and apply
    /// the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.leadflow/leadflow.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".leadflow").join("leadflow.db"))
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use chrono::Utc;

    use super::{DbConversation, LeadDb};

    /// Create a temporary database for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of
    /// the test. Test temp dirs are cleaned up by the OS.
    pub fn test_db() -> LeadDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        LeadDb::open_at(path).expect("Failed to open test database")
    }

    /// A minimal open conversation for seeding tests.
    pub fn sample_conversation(id: &str, workspace_id: &str) -> DbConversation {
        let now = Utc::now().to_rfc3339();
        DbConversation {
            id: id.to_string(),
            workspace_id: workspace_id.to_string(),
            contact_name: Some("Jane Doe".to_string()),
            assigned_operator_id: None,
            legacy_status: "open".to_string(),
            last_inbound_at: None,
            last_outbound_at: None,
            priority: false,
            spam: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
