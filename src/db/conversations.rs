use chrono::Utc;
use rusqlite::params;

use super::*;

impl LeadDb {
    // =========================================================================
    // Conversations
    // =========================================================================

    fn map_conversation_row(row: &rusqlite::Row<'_>) -> Result<DbConversation, rusqlite::Error> {
        Ok(DbConversation {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            contact_name: row.get(2)?,
            assigned_operator_id: row.get(3)?,
            legacy_status: row.get(4)?,
            last_inbound_at: row.get(5)?,
            last_outbound_at: row.get(6)?,
            priority: row.get::<_, i64>(7)? != 0,
            spam: row.get::<_, i64>(8)? != 0,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    const CONVERSATION_COLS: &'static str =
        "id, workspace_id, contact_name, assigned_operator_id, legacy_status,
         last_inbound_at, last_outbound_at, priority, spam, created_at, updated_at";

    /// Fetch a single conversation by id.
    pub fn get_conversation(&self, id: &str) -> Result<Option<DbConversation>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM conversations WHERE id = ?1",
            Self::CONVERSATION_COLS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_conversation_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All non-removed conversations for a workspace, newest update first.
    pub fn get_workspace_conversations(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<DbConversation>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM conversations
             WHERE workspace_id = ?1 AND legacy_status != 'removed'
             ORDER BY updated_at DESC",
            Self::CONVERSATION_COLS
        ))?;
        let rows = stmt.query_map(params![workspace_id], Self::map_conversation_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Conversations updated at or after `since`. Feeds the polling fallback;
    /// includes removed rows so eviction converges too.
    pub fn get_conversations_updated_since(
        &self,
        workspace_id: &str,
        since: &str,
    ) -> Result<Vec<DbConversation>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM conversations
             WHERE workspace_id = ?1 AND updated_at >= ?2
             ORDER BY updated_at ASC",
            Self::CONVERSATION_COLS
        ))?;
        let rows = stmt.query_map(params![workspace_id, since], Self::map_conversation_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Insert or replace a conversation row. The ingestion collaborator owns
    /// creation; the engine only calls this from tests and import tooling.
    pub fn upsert_conversation(&self, conv: &DbConversation) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO conversations
                (id, workspace_id, contact_name, assigned_operator_id, legacy_status,
                 last_inbound_at, last_outbound_at, priority, spam, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                contact_name = excluded.contact_name,
                assigned_operator_id = excluded.assigned_operator_id,
                legacy_status = excluded.legacy_status,
                last_inbound_at = excluded.last_inbound_at,
                last_outbound_at = excluded.last_outbound_at,
                priority = excluded.priority,
                spam = excluded.spam,
                updated_at = excluded.updated_at",
            params![
                conv.id,
                conv.workspace_id,
                conv.contact_name,
                conv.assigned_operator_id,
                conv.legacy_status,
                conv.last_inbound_at,
                conv.last_outbound_at,
                conv.priority as i64,
                conv.spam as i64,
                conv.created_at,
                conv.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Mirror a phase change into `legacy_status` for backward-compatible
    /// readers. The single conversation column this engine writes.
    pub fn update_legacy_status(&self, id: &str, status: &str) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE conversations SET legacy_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, now, id],
        )?;
        Ok(())
    }
}
