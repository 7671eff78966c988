//! Polling fallback for the conversation stream.
//!
//! Change streams can silently drop events. The poller sweeps the
//! conversations table on a timer for rows with `updated_at` at or past a
//! low-water mark and replays them through the same merge path the stream
//! uses. The mark only moves forward, and each sweep re-reads a clock-skew
//! window behind it, so a dropped event is at worst late, never lost.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::error::EngineError;
use crate::state::EngineState;
use crate::sync::{apply_conversation_event, ConversationEvent};
use crate::util::compare_timestamps;

pub struct ConversationPoller {
    state: Arc<EngineState>,
    active: AtomicBool,
    in_flight: AtomicBool,
    low_water_mark: Mutex<String>,
}

impl ConversationPoller {
    /// The initial mark sits a clock-skew window in the past so rows written
    /// just before startup are still swept.
    pub fn new(state: Arc<EngineState>) -> Self {
        let skew = state.config.read().poll_clock_skew_secs;
        let mark = (Utc::now() - ChronoDuration::seconds(skew)).to_rfc3339();
        Self {
            state,
            active: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
            low_water_mark: Mutex::new(mark),
        }
    }

    /// Pause or resume sweeping. The loop keeps ticking while paused so a
    /// resume takes effect on the next tick without rescheduling.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run the sweep loop. Ticks at the configured interval; a tick is
    /// skipped if the poller is paused or the previous sweep is still
    /// running.
    pub async fn run(self: Arc<Self>) {
        loop {
            let interval = self.state.config.read().poll_interval_secs;
            tokio::time::sleep(Duration::from_secs(interval)).await;

            if !self.active.load(Ordering::SeqCst) {
                continue;
            }
            if self.in_flight.swap(true, Ordering::SeqCst) {
                log::debug!("Previous sweep still in flight, skipping tick");
                continue;
            }
            if let Err(e) = self.poll_once() {
                log::warn!("Conversation sweep failed: {}", e);
            }
            self.in_flight.store(false, Ordering::SeqCst);
        }
    }

    /// One sweep: fetch rows at or past the mark, replay them as upsert
    /// events, and advance the mark to the newest `updated_at` observed.
    pub fn poll_once(&self) -> Result<usize, EngineError> {
        let since = self.low_water_mark.lock().clone();
        let workspace_id = self.state.projection.workspace_id().to_string();
        let rows = self
            .state
            .with_db(|db| db.get_conversations_updated_since(&workspace_id, &since))?;

        let count = rows.len();
        let mut newest = since;
        for conv in rows {
            if compare_timestamps(&conv.updated_at, &newest) == CmpOrdering::Greater {
                newest = conv.updated_at.clone();
            }
            apply_conversation_event(
                &self.state,
                ConversationEvent::Upsert { conversation: conv },
            );
        }

        // Monotonic: a sweep never moves the mark backwards.
        let mut mark = self.low_water_mark.lock();
        if compare_timestamps(&newest, &mark) == CmpOrdering::Greater {
            *mark = newest;
        }

        if count > 0 {
            log::debug!("Sweep merged {} conversations, mark now {}", count, *mark);
        }
        Ok(count)
    }

    #[cfg(test)]
    fn mark(&self) -> String {
        self.low_water_mark.lock().clone()
    }

    #[cfg(test)]
    fn set_mark(&self, mark: &str) {
        *self.low_water_mark.lock() = mark.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::sample_conversation;
    use crate::state::test_utils::test_state;

    #[test]
    fn test_sweep_merges_and_advances_mark() {
        let state = Arc::new(test_state());
        let poller = ConversationPoller::new(state.clone());
        poller.set_mark("2026-01-01T00:00:00+00:00");

        let mut conv = sample_conversation("c1", "ws1");
        conv.updated_at = "2026-01-02T10:00:00+00:00".to_string();
        state
            .with_db(|db| db.upsert_conversation(&conv))
            .expect("seed");

        let merged = poller.poll_once().expect("sweep");
        assert_eq!(merged, 1);
        assert!(state.projection.contains("c1"));
        assert_eq!(poller.mark(), "2026-01-02T10:00:00+00:00");
    }

    #[test]
    fn test_sweep_picks_up_removal() {
        let state = Arc::new(test_state());
        let poller = ConversationPoller::new(state.clone());
        poller.set_mark("2026-01-01T00:00:00+00:00");

        state
            .projection
            .upsert_conversation(sample_conversation("c1", "ws1"));
        let mut conv = sample_conversation("c1", "ws1");
        conv.legacy_status = "removed".to_string();
        conv.updated_at = "2026-01-02T10:00:00+00:00".to_string();
        state
            .with_db(|db| db.upsert_conversation(&conv))
            .expect("seed");

        poller.poll_once().expect("sweep");
        assert!(!state.projection.contains("c1"));
    }

    #[test]
    fn test_mark_never_moves_backwards() {
        let state = Arc::new(test_state());
        let poller = ConversationPoller::new(state.clone());
        poller.set_mark("2026-03-01T00:00:00+00:00");

        // An empty sweep leaves the mark alone.
        let merged = poller.poll_once().expect("sweep");
        assert_eq!(merged, 0);
        assert_eq!(poller.mark(), "2026-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_mark_advances_by_instant_not_string_order() {
        let state = Arc::new(test_state());
        let poller = ConversationPoller::new(state.clone());
        poller.set_mark("2026-01-01T00:00:00+00:00");

        // Lexicographically the Z-suffixed value sorts above the fractional
        // one; chronologically it is 100ms older.
        let mut older = sample_conversation("c1", "ws1");
        older.updated_at = "2026-01-02T10:00:00Z".to_string();
        let mut newer = sample_conversation("c2", "ws1");
        newer.updated_at = "2026-01-02T10:00:00.100+00:00".to_string();
        state
            .with_db(|db| db.upsert_conversation(&older))
            .expect("seed older");
        state
            .with_db(|db| db.upsert_conversation(&newer))
            .expect("seed newer");

        poller.poll_once().expect("sweep");
        assert_eq!(poller.mark(), "2026-01-02T10:00:00.100+00:00");
    }

    #[test]
    fn test_rows_outside_workspace_are_not_merged() {
        let state = Arc::new(test_state());
        let poller = ConversationPoller::new(state.clone());
        poller.set_mark("2026-01-01T00:00:00+00:00");

        let mut conv = sample_conversation("c1", "ws-other");
        conv.updated_at = "2026-01-02T10:00:00+00:00".to_string();
        state
            .with_db(|db| db.upsert_conversation(&conv))
            .expect("seed");

        let merged = poller.poll_once().expect("sweep");
        // The query is workspace-scoped, so the row never surfaces.
        assert_eq!(merged, 0);
        assert!(!state.projection.contains("c1"));
    }

    #[test]
    fn test_inactive_poller_flag() {
        let state = Arc::new(test_state());
        let poller = ConversationPoller::new(state);
        assert!(poller.is_active());
        poller.set_active(false);
        assert!(!poller.is_active());
    }
}
