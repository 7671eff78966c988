//! Shared engine state.
//!
//! One `EngineState` per session: the database handle, the workspace
//! projection, the loaded config, and the per-conversation mutation locks
//! that serialize same-session writes.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::db::{DbError, LeadDb};
use crate::error::EngineError;
use crate::sync::projection::Projection;

pub struct EngineState {
    /// `None` when the database failed to open; every engine call then
    /// surfaces a transient error instead of panicking.
    pub db: Mutex<Option<LeadDb>>,
    pub projection: Arc<Projection>,
    pub config: RwLock<EngineConfig>,
    /// Per-conversation mutation locks. A second set_phase/set_temperature
    /// against the same conversation from this session waits here instead of
    /// interleaving with the first.
    pub(crate) mutation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EngineState {
    /// Open the database, load config, and bootstrap the projection for the
    /// configured workspace.
    pub fn new() -> Self {
        let config = match crate::config::load_config() {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Config unavailable ({e}); using defaults");
                EngineConfig::default()
            }
        };

        let db = match LeadDb::open() {
            Ok(db) => Some(db),
            Err(e) => {
                log::warn!("Failed to open lead database: {e}. Engine calls will fail transiently.");
                None
            }
        };

        let projection = Arc::new(Projection::new(&config.workspace_id));
        if let Some(ref db) = db {
            if let Err(e) = projection.bootstrap(db) {
                log::warn!("Projection bootstrap failed: {e}");
            }
        }

        Self {
            db: Mutex::new(db),
            projection,
            config: RwLock::new(config),
            mutation_locks: DashMap::new(),
        }
    }

    /// Build state around an explicit database (tests, embedded callers).
    pub fn with_db_handle(db: LeadDb, config: EngineConfig) -> Self {
        let projection = Arc::new(Projection::new(&config.workspace_id));
        if let Err(e) = projection.bootstrap(&db) {
            log::warn!("Projection bootstrap failed: {e}");
        }
        Self {
            db: Mutex::new(Some(db)),
            projection,
            config: RwLock::new(config),
            mutation_locks: DashMap::new(),
        }
    }

    /// Run a closure against the database, mapping unavailability and lock
    /// poisoning to a transient error the caller can surface.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&LeadDb) -> Result<T, DbError>,
    ) -> Result<T, EngineError> {
        let guard = self
            .db
            .lock()
            .map_err(|_| EngineError::TransientNetwork("database lock poisoned".into()))?;
        let db = guard
            .as_ref()
            .ok_or_else(|| EngineError::TransientNetwork("database unavailable".into()))?;
        f(db).map_err(EngineError::from)
    }

    /// The serialization lock for one conversation. Held for the duration of
    /// a mutation so a second same-session call waits instead of
    /// interleaving.
    pub(crate) fn mutation_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.mutation_locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reload configuration from disk.
    pub fn reload_config(&self) -> Result<EngineConfig, String> {
        let config = crate::config::load_config()?;
        *self.config.write() = config.clone();
        Ok(config)
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::db::test_utils::test_db;

    /// Engine state over a temp database, scoped to workspace "ws1".
    pub fn test_state() -> EngineState {
        let config = EngineConfig {
            workspace_id: "ws1".to_string(),
            ..EngineConfig::default()
        };
        EngineState::with_db_handle(test_db(), config)
    }
}
