//! Deterministic priority ranking of open action items.
//!
//! Combines classifier output, the external alert feed, and manual flags
//! into one scored queue. Scoring is additive and fixed; ties break on
//! recency, then conversation id, so two sessions over the same data always
//! produce the same ordering.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{Duration, Utc};

use crate::classifier::Classification;
use crate::db::DbAlert;
use crate::error::EngineError;
use crate::state::EngineState;
use crate::sync::projection::ConversationView;
use crate::taxonomy::{FunnelStage, Temperature};
use crate::util::compare_timestamps;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Why an item is in the queue. Alerts carry a category in their
/// `alert_type`; engine-assembled candidates get one directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCategory {
    Hot,
    Qualified,
    Call,
    Reschedule,
    NoShow,
    FollowUp,
}

impl QueueCategory {
    /// Unknown alert types stay uncategorized; the alert bonus still
    /// applies, the category bonuses do not.
    pub fn from_alert_type(alert_type: &str) -> Option<Self> {
        match alert_type {
            "hot" => Some(Self::Hot),
            "qualified" => Some(Self::Qualified),
            "call" => Some(Self::Call),
            "reschedule" => Some(Self::Reschedule),
            "no_show" | "noshow" => Some(Self::NoShow),
            "follow_up" | "followup" => Some(Self::FollowUp),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Queue items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub conversation_id: String,
    pub contact_name: Option<String>,
    pub classification: Classification,
    pub category: Option<QueueCategory>,
    pub score: i64,
    pub recommended_action: Option<String>,
    pub overdue_minutes: Option<i64>,
    /// max(last_inbound_at, last_outbound_at, created_at); the tie-breaker.
    pub last_activity_at: String,
}

fn last_activity(view: &ConversationView) -> String {
    let conv = &view.conversation;
    let mut latest = conv.created_at.clone();
    for ts in [&conv.last_inbound_at, &conv.last_outbound_at] {
        if let Some(ts) = ts {
            if compare_timestamps(ts, &latest) == Ordering::Greater {
                latest = ts.clone();
            }
        }
    }
    latest
}

fn awaiting_reply(view: &ConversationView) -> bool {
    match (
        &view.conversation.last_inbound_at,
        &view.conversation.last_outbound_at,
    ) {
        (Some(inbound), Some(outbound)) => {
            compare_timestamps(inbound, outbound) == Ordering::Greater
        }
        (Some(_), None) => true,
        _ => false,
    }
}

fn score(
    classification: &Classification,
    category: Option<QueueCategory>,
    alert: Option<&DbAlert>,
    priority: bool,
) -> i64 {
    let mut score = 0;
    if classification.temperature == Some(Temperature::Hot)
        || category == Some(QueueCategory::Hot)
    {
        score += 1000;
    }
    if classification.phase == FunnelStage::Qualified || category == Some(QueueCategory::Qualified)
    {
        score += 700;
    }
    if matches!(
        category,
        Some(QueueCategory::Call) | Some(QueueCategory::Reschedule)
    ) {
        score += 600;
    }
    if category == Some(QueueCategory::NoShow) {
        score += 520;
    }
    if let Some(alert) = alert {
        score += 250 + (alert.overdue_minutes / 10).min(180);
    }
    if priority {
        score += 120;
    }
    if category == Some(QueueCategory::FollowUp) {
        score += 100;
    }
    score
}

// ---------------------------------------------------------------------------
// Queue assembly
// ---------------------------------------------------------------------------

/// Build the ranked queue: open alerts, conversations awaiting a reply, and
/// qualified conversations gone quiet. Spam and removed conversations never
/// appear. `limit` defaults to the configured queue size.
pub fn ranked_queue(
    state: &EngineState,
    limit: Option<usize>,
) -> Result<Vec<QueueItem>, EngineError> {
    let workspace_id = state.projection.workspace_id().to_string();
    let alerts = state.with_db(|db| db.get_open_alerts(&workspace_id))?;

    // Most-overdue alert per conversation; get_open_alerts orders them so.
    let mut alert_by_conversation: HashMap<String, DbAlert> = HashMap::new();
    for alert in alerts {
        alert_by_conversation
            .entry(alert.conversation_id.clone())
            .or_insert(alert);
    }

    let config = state.config.read().clone();
    let inactive_cutoff =
        (Utc::now() - Duration::hours(config.qualified_inactive_hours)).to_rfc3339();

    let mut candidates: Vec<QueueItem> = Vec::new();
    for view in state.projection.conversations() {
        if view.conversation.spam {
            continue;
        }
        let id = view.conversation.id.clone();
        let classification = state
            .projection
            .classify(&id)
            .unwrap_or(Classification {
                phase: FunnelStage::NewLead,
                temperature: None,
            });
        let alert = alert_by_conversation.get(&id);
        let activity = last_activity(&view);

        let mut push = |category: Option<QueueCategory>| {
            candidates.push(QueueItem {
                conversation_id: id.clone(),
                contact_name: view.conversation.contact_name.clone(),
                classification: classification.clone(),
                category,
                score: score(&classification, category, alert, view.conversation.priority),
                recommended_action: alert.and_then(|a| a.recommended_action.clone()),
                overdue_minutes: alert.map(|a| a.overdue_minutes),
                last_activity_at: activity.clone(),
            });
        };

        if let Some(alert) = alert {
            push(QueueCategory::from_alert_type(&alert.alert_type));
        }
        if awaiting_reply(&view) {
            push(Some(QueueCategory::FollowUp));
        }
        if classification.phase == FunnelStage::Qualified
            && compare_timestamps(&activity, &inactive_cutoff) == Ordering::Less
        {
            push(Some(QueueCategory::Qualified));
        }
    }

    // Highest score first; newer activity first among equals; id breaks the
    // final tie so the ordering is total.
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| compare_timestamps(&b.last_activity_at, &a.last_activity_at))
            .then_with(|| a.conversation_id.cmp(&b.conversation_id))
    });

    let limit = limit.unwrap_or(config.queue_limit);
    let mut seen: Vec<String> = Vec::new();
    let mut queue: Vec<QueueItem> = Vec::new();
    for item in candidates {
        if seen.contains(&item.conversation_id) {
            continue;
        }
        seen.push(item.conversation_id.clone());
        queue.push(item);
        if queue.len() >= limit {
            break;
        }
    }

    log::debug!("Ranked queue built: {} items (limit {})", queue.len(), limit);
    Ok(queue)
}
