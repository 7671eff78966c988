use rusqlite::params;

use super::*;
use crate::taxonomy::normalize_label_name;

impl LeadDb {
    // =========================================================================
    // Labels
    // =========================================================================

    fn map_label_row(row: &rusqlite::Row<'_>) -> Result<DbLabel, rusqlite::Error> {
        Ok(DbLabel {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            name: row.get(2)?,
            color: row.get(3)?,
            icon: row.get(4)?,
            classification_hint: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    const LABEL_COLS: &'static str =
        "id, workspace_id, name, color, icon, classification_hint, created_at";

    /// Insert a label. Fails with a uniqueness violation if another label in
    /// the workspace normalizes to the same name — the catalog treats that as
    /// "someone else created it first".
    pub fn insert_label(&self, label: &DbLabel) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO labels
                (id, workspace_id, name, normalized_name, color, icon,
                 classification_hint, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                label.id,
                label.workspace_id,
                label.name,
                normalize_label_name(&label.name),
                label.color,
                label.icon,
                label.classification_hint,
                label.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_label(&self, id: &str) -> Result<Option<DbLabel>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM labels WHERE id = ?1",
            Self::LABEL_COLS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_label_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Exact match on the normalized name within a workspace.
    pub fn find_label_by_normalized_name(
        &self,
        workspace_id: &str,
        normalized: &str,
    ) -> Result<Option<DbLabel>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM labels WHERE workspace_id = ?1 AND normalized_name = ?2",
            Self::LABEL_COLS
        ))?;
        let mut rows = stmt.query_map(params![workspace_id, normalized], Self::map_label_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn get_workspace_labels(&self, workspace_id: &str) -> Result<Vec<DbLabel>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM labels WHERE workspace_id = ?1 ORDER BY name",
            Self::LABEL_COLS
        ))?;
        let rows = stmt.query_map(params![workspace_id], Self::map_label_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // =========================================================================
    // Label attachments
    // =========================================================================

    fn map_attachment_row(row: &rusqlite::Row<'_>) -> Result<DbAttachment, rusqlite::Error> {
        Ok(DbAttachment {
            conversation_id: row.get(0)?,
            label_id: row.get(1)?,
            workspace_id: row.get(2)?,
            source: row.get(3)?,
            created_by: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    const ATTACHMENT_COLS: &'static str =
        "conversation_id, label_id, workspace_id, source, created_by, created_at";

    /// Attach a label to a conversation. `INSERT OR IGNORE`: re-attaching an
    /// already-attached label is success, not an error. Returns true when a
    /// row was actually written.
    pub fn insert_attachment(&self, att: &DbAttachment) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO label_attachments
                (conversation_id, label_id, workspace_id, source, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                att.conversation_id,
                att.label_id,
                att.workspace_id,
                att.source,
                att.created_by,
                att.created_at,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Detach one label from a conversation.
    pub fn delete_attachment(&self, conversation_id: &str, label_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM label_attachments WHERE conversation_id = ?1 AND label_id = ?2",
            params![conversation_id, label_id],
        )?;
        Ok(())
    }

    /// All attachments on one conversation.
    pub fn get_attachments(&self, conversation_id: &str) -> Result<Vec<DbAttachment>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM label_attachments WHERE conversation_id = ?1 ORDER BY created_at",
            Self::ATTACHMENT_COLS
        ))?;
        let rows = stmt.query_map(params![conversation_id], Self::map_attachment_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// All attachments in a workspace, for projection bootstrap.
    pub fn get_workspace_attachments(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<DbAttachment>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM label_attachments WHERE workspace_id = ?1",
            Self::ATTACHMENT_COLS
        ))?;
        let rows = stmt.query_map(params![workspace_id], Self::map_attachment_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::db::test_utils::test_db;
    use crate::db::{DbAttachment, DbLabel};

    fn sample_label(id: &str, ws: &str, name: &str) -> DbLabel {
        DbLabel {
            id: id.to_string(),
            workspace_id: ws.to_string(),
            name: name.to_string(),
            color: Some("#10B981".to_string()),
            icon: None,
            classification_hint: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    fn sample_attachment(conv: &str, label: &str, source: &str) -> DbAttachment {
        DbAttachment {
            conversation_id: conv.to_string(),
            label_id: label.to_string(),
            workspace_id: "ws1".to_string(),
            source: source.to_string(),
            created_by: Some("op-1".to_string()),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_normalized_name_lookup() {
        let db = test_db();
        db.insert_label(&sample_label("l1", "ws1", "Hot  Lead"))
            .expect("insert");

        let found = db
            .find_label_by_normalized_name("ws1", "hot lead")
            .expect("query");
        assert_eq!(found.map(|l| l.id), Some("l1".to_string()));

        // Same name in another workspace is absent
        assert!(db
            .find_label_by_normalized_name("ws2", "hot lead")
            .expect("query")
            .is_none());
    }

    #[test]
    fn test_duplicate_normalized_name_is_unique_violation() {
        let db = test_db();
        db.insert_label(&sample_label("l1", "ws1", "Qualified"))
            .expect("insert");
        let err = db
            .insert_label(&sample_label("l2", "ws1", "qualified"))
            .expect_err("duplicate should fail");
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_attachment_insert_is_idempotent() {
        let db = test_db();
        assert!(db
            .insert_attachment(&sample_attachment("c1", "l1", "manual"))
            .expect("first"));
        // Second insert hits the primary key and is ignored
        assert!(!db
            .insert_attachment(&sample_attachment("c1", "l1", "manual"))
            .expect("second"));
        assert_eq!(db.get_attachments("c1").expect("query").len(), 1);
    }

    #[test]
    fn test_delete_attachment() {
        let db = test_db();
        db.insert_attachment(&sample_attachment("c1", "l1", "automatic"))
            .expect("insert");
        db.delete_attachment("c1", "l1").expect("delete");
        assert!(db.get_attachments("c1").expect("query").is_empty());
    }
}
