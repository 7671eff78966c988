//! Schema migration framework.
//!
//! Numbered SQL migrations run exactly once, tracked by the `schema_version`
//! table. The engine does not own these tables conceptually — conversations,
//! labels, attachments, and alerts belong to external collaborators — but it
//! needs a concrete store to read and write, so the baseline schema lives
//! here.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const BASELINE: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    contact_name TEXT,
    assigned_operator_id TEXT,
    legacy_status TEXT NOT NULL DEFAULT 'open',
    last_inbound_at TEXT,
    last_outbound_at TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    spam INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversations_workspace
    ON conversations(workspace_id, updated_at);

CREATE TABLE IF NOT EXISTS labels (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    name TEXT NOT NULL,
    normalized_name TEXT NOT NULL,
    color TEXT,
    icon TEXT,
    classification_hint TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(workspace_id, normalized_name)
);

CREATE TABLE IF NOT EXISTS label_attachments (
    conversation_id TEXT NOT NULL,
    label_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'manual',
    created_by TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (conversation_id, label_id)
);
CREATE INDEX IF NOT EXISTS idx_attachments_label
    ON label_attachments(label_id);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    overdue_minutes INTEGER NOT NULL DEFAULT 0,
    recommended_action TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_workspace_status
    ON alerts(workspace_id, status);
";

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: BASELINE,
}];

/// Create the `schema_version` table if it doesn't exist.
fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Apply all pending migrations, each in its own transaction.
pub fn run_migrations(conn: &Connection) -> Result<(), String> {
    ensure_schema_version_table(conn)?;
    let applied = current_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version <= applied {
            continue;
        }

        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| format!("Failed to begin migration tx: {}", e))?;

        let result = conn
            .execute_batch(migration.sql)
            .map_err(|e| format!("Migration {} failed: {}", migration.version, e))
            .and_then(|_| {
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [migration.version],
                )
                .map_err(|e| format!("Failed to record migration {}: {}", migration.version, e))
            });

        match result {
            Ok(_) => {
                conn.execute_batch("COMMIT")
                    .map_err(|e| format!("Failed to commit migration: {}", e))?;
                log::info!("Applied schema migration v{}", migration.version);
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        }
    }

    Ok(())
}
