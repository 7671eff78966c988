//! Pure lead classification.
//!
//! Maps {attached label ids, legacy status} to {funnel phase, temperature}.
//! No I/O, fully deterministic, never errors. This is the single copy of
//! logic that previously existed three times with subtly different behavior
//! across the list, detail, and export surfaces.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::db::DbLabel;
use crate::taxonomy::{
    stage_for_label_name, temperature_for_label_name, FunnelStage, LegacyStatus, Temperature,
    STAGE_SCAN_ORDER, TEMPERATURE_SCAN_ORDER,
};

/// Derived classification for one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Never absent — an unlabeled open conversation is a new lead.
    pub phase: FunnelStage,
    /// Absent when no temperature label is attached.
    pub temperature: Option<Temperature>,
}

/// Classify a conversation from its attached label ids and legacy status.
///
/// Phase precedence:
/// 1. legacy "qualified" / "disqualified" override any labels
/// 2. first canonical-order stage with a matching attached label
/// 3. default `NewLead`
///
/// Temperature: hot > warm > cold, else `None`. When several stage or
/// temperature labels are simultaneously attached (an integrity anomaly the
/// transition engine normally prevents), scan order decides — never
/// attachment recency.
pub fn classify(
    attached: &HashSet<String>,
    labels: &HashMap<String, DbLabel>,
    legacy_status: &str,
) -> Classification {
    let attached_stages: HashSet<FunnelStage> = attached
        .iter()
        .filter_map(|id| labels.get(id))
        .filter_map(|l| stage_for_label_name(&l.name))
        .collect();
    let attached_temps: HashSet<Temperature> = attached
        .iter()
        .filter_map(|id| labels.get(id))
        .filter_map(|l| temperature_for_label_name(&l.name))
        .collect();

    let phase = match LegacyStatus::parse(legacy_status) {
        LegacyStatus::Qualified => FunnelStage::Qualified,
        LegacyStatus::Disqualified => FunnelStage::Unqualified,
        _ => STAGE_SCAN_ORDER
            .iter()
            .copied()
            .find(|s| attached_stages.contains(s))
            .unwrap_or(FunnelStage::NewLead),
    };

    let temperature = TEMPERATURE_SCAN_ORDER
        .iter()
        .copied()
        .find(|t| attached_temps.contains(t));

    Classification { phase, temperature }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn label(id: &str, name: &str) -> DbLabel {
        DbLabel {
            id: id.to_string(),
            workspace_id: "ws1".to_string(),
            name: name.to_string(),
            color: None,
            icon: None,
            classification_hint: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    fn fixture(names: &[(&str, &str)]) -> (HashSet<String>, HashMap<String, DbLabel>) {
        let mut attached = HashSet::new();
        let mut labels = HashMap::new();
        for (id, name) in names {
            attached.insert(id.to_string());
            labels.insert(id.to_string(), label(id, name));
        }
        (attached, labels)
    }

    #[test]
    fn test_unlabeled_open_defaults_to_new_lead() {
        let (attached, labels) = fixture(&[]);
        let c = classify(&attached, &labels, "open");
        assert_eq!(c.phase, FunnelStage::NewLead);
        assert_eq!(c.temperature, None);
    }

    #[test]
    fn test_qualified_label_with_hot_temperature() {
        let (attached, labels) = fixture(&[("l1", "Qualified"), ("l2", "Hot Lead")]);
        let c = classify(&attached, &labels, "open");
        assert_eq!(c.phase, FunnelStage::Qualified);
        assert_eq!(c.temperature, Some(Temperature::Hot));
    }

    #[test]
    fn test_legacy_status_overrides_labels() {
        let (attached, labels) = fixture(&[("l1", "Won")]);
        let c = classify(&attached, &labels, "qualified");
        assert_eq!(c.phase, FunnelStage::Qualified);

        let c = classify(&attached, &labels, "disqualified");
        assert_eq!(c.phase, FunnelStage::Unqualified);
    }

    #[test]
    fn test_scan_order_breaks_stage_ties() {
        // Both qualified and call_booked attached: qualified wins because it
        // comes first in canonical order, regardless of attachment order.
        let (attached, labels) = fixture(&[("l2", "Call booked"), ("l1", "Qualified")]);
        let c = classify(&attached, &labels, "open");
        assert_eq!(c.phase, FunnelStage::Qualified);
    }

    #[test]
    fn test_hot_beats_warm_and_cold() {
        let (attached, labels) =
            fixture(&[("l1", "Cold Lead"), ("l2", "Warm Lead"), ("l3", "Hot Lead")]);
        let c = classify(&attached, &labels, "open");
        assert_eq!(c.temperature, Some(Temperature::Hot));
    }

    #[test]
    fn test_free_form_labels_are_ignored() {
        let (attached, labels) = fixture(&[("l1", "VIP"), ("l2", "Spanish speaker")]);
        let c = classify(&attached, &labels, "open");
        assert_eq!(c.phase, FunnelStage::NewLead);
        assert_eq!(c.temperature, None);
    }

    #[test]
    fn test_attached_id_without_label_row_is_tolerated() {
        let (mut attached, labels) = fixture(&[("l1", "Won")]);
        attached.insert("missing-label".to_string());
        let c = classify(&attached, &labels, "open");
        assert_eq!(c.phase, FunnelStage::Won);
    }

    #[test]
    fn test_unknown_legacy_status_reads_as_open() {
        let (attached, labels) = fixture(&[("l1", "In contact")]);
        let c = classify(&attached, &labels, "archived-weird-value");
        assert_eq!(c.phase, FunnelStage::InContact);
    }
}
