use rusqlite::params;

use super::*;

impl LeadDb {
    // =========================================================================
    // Alerts (read-only feed)
    // =========================================================================

    fn map_alert_row(row: &rusqlite::Row<'_>) -> Result<DbAlert, rusqlite::Error> {
        Ok(DbAlert {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            conversation_id: row.get(2)?,
            alert_type: row.get(3)?,
            overdue_minutes: row.get(4)?,
            recommended_action: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    const ALERT_COLS: &'static str =
        "id, workspace_id, conversation_id, alert_type, overdue_minutes,
         recommended_action, status, created_at";

    /// Open alerts for a workspace, most overdue first.
    pub fn get_open_alerts(&self, workspace_id: &str) -> Result<Vec<DbAlert>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM alerts
             WHERE workspace_id = ?1 AND status = 'open'
             ORDER BY overdue_minutes DESC, created_at ASC",
            Self::ALERT_COLS
        ))?;
        let rows = stmt.query_map(params![workspace_id], Self::map_alert_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Upsert an alert row. The feed is owned by an external collaborator;
    /// this exists for tests and replay tooling.
    pub fn upsert_alert(&self, alert: &DbAlert) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO alerts
                (id, workspace_id, conversation_id, alert_type, overdue_minutes,
                 recommended_action, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                overdue_minutes = excluded.overdue_minutes,
                recommended_action = excluded.recommended_action,
                status = excluded.status",
            params![
                alert.id,
                alert.workspace_id,
                alert.conversation_id,
                alert.alert_type,
                alert.overdue_minutes,
                alert.recommended_action,
                alert.status,
                alert.created_at,
            ],
        )?;
        Ok(())
    }
}
