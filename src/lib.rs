//! Lead classification & prioritization engine.
//!
//! Derives a canonical funnel phase and temperature for each conversation
//! from its attached labels, keeps that derived state consistent across
//! three independently delivered change streams plus a polling fallback,
//! lets automated reclassification coexist with human overrides, and ranks
//! open action items deterministically.
//!
//! Collaborators (ingestion, UI, alert generation) sit outside this crate;
//! they reach it through [`classify`], the [`set_phase`]/[`set_temperature`]
//! mutators, [`manual_lock`], [`ranked_queue`], and
//! [`export_classified_csv`].

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
mod migrations;
pub mod ranking;
pub mod state;
pub mod sync;
pub mod taxonomy;
pub mod transition;
pub mod types;
pub mod util;

pub use catalog::{ensure_canonical, resolve_canonical, CanonicalKey};
pub use classifier::{classify, Classification};
pub use config::EngineConfig;
pub use error::EngineError;
pub use export::export_classified_csv;
pub use ranking::{ranked_queue, QueueCategory, QueueItem};
pub use state::EngineState;
pub use sync::poller::ConversationPoller;
pub use sync::spawn_subscriptions;
pub use transition::{manual_lock, recompute_manual_lock, set_phase, set_temperature, TransitionOutcome};
pub use types::{Actor, ActorRole};
