//! Canonical funnel taxonomy: stages, temperatures, and the single alias table.
//!
//! Label-name aliasing used to live in three separate string-matching blocks
//! (classification, ranking, export). This module is the one shared mapping:
//! a normalized label name either resolves to a `FunnelStage` / `Temperature`
//! or the label is free-form and invisible to classification.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Funnel stages
// ---------------------------------------------------------------------------

/// Canonical lead-progress category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    NewLead,
    InContact,
    Qualified,
    Unqualified,
    CallBooked,
    Won,
    NoShow,
}

/// Canonical scan order. Classification precedence is position in this array,
/// never attachment recency.
pub const STAGE_SCAN_ORDER: [FunnelStage; 7] = [
    FunnelStage::NewLead,
    FunnelStage::InContact,
    FunnelStage::Qualified,
    FunnelStage::Unqualified,
    FunnelStage::CallBooked,
    FunnelStage::Won,
    FunnelStage::NoShow,
];

impl FunnelStage {
    /// Stable snake_case key, used in config, events, and CSV output.
    pub fn key(&self) -> &'static str {
        match self {
            Self::NewLead => "new_lead",
            Self::InContact => "in_contact",
            Self::Qualified => "qualified",
            Self::Unqualified => "unqualified",
            Self::CallBooked => "call_booked",
            Self::Won => "won",
            Self::NoShow => "no_show",
        }
    }

    /// Accepted name variants, pre-normalized (see [`normalize_label_name`]).
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::NewLead => &["new lead", "new", "new_lead"],
            Self::InContact => &["in contact", "contacted", "in_contact"],
            Self::Qualified => &["qualified"],
            // legacy_status says "disqualified"; the canonical label says
            // "Unqualified". Both spellings map here — do not unify them.
            Self::Unqualified => &["unqualified", "disqualified"],
            Self::CallBooked => &["call booked", "booked call", "call", "call_booked"],
            Self::Won => &["won", "closed won"],
            Self::NoShow => &["no show", "noshow", "no_show"],
        }
    }

    /// Parse a stage key or alias.
    pub fn parse(value: &str) -> Option<Self> {
        let norm = normalize_label_name(value);
        STAGE_SCAN_ORDER
            .iter()
            .copied()
            .find(|s| s.key() == norm || s.aliases().contains(&norm.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Temperatures
// ---------------------------------------------------------------------------

/// Urgency category. Optional — a conversation may carry no temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temperature {
    Hot,
    Warm,
    Cold,
}

/// Precedence order when multiple temperature labels are attached (a
/// data-integrity anomaly the classifier tolerates): hot > warm > cold.
pub const TEMPERATURE_SCAN_ORDER: [Temperature; 3] =
    [Temperature::Hot, Temperature::Warm, Temperature::Cold];

impl Temperature {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Hot => &["hot lead", "hot"],
            Self::Warm => &["warm lead", "warm"],
            Self::Cold => &["cold lead", "cold"],
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let norm = normalize_label_name(value);
        TEMPERATURE_SCAN_ORDER
            .iter()
            .copied()
            .find(|t| t.key() == norm || t.aliases().contains(&norm.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Canonical kinds + presets
// ---------------------------------------------------------------------------

/// Which canonical dimension a label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalKind {
    Phase,
    Temperature,
}

/// Static creation preset for a canonical label.
pub struct LabelPreset {
    pub name: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
    pub hint: &'static str,
}

impl FunnelStage {
    /// Preset used when the catalog must create this label lazily.
    pub fn preset(&self) -> LabelPreset {
        match self {
            Self::NewLead => LabelPreset {
                name: "New lead",
                color: "#3B82F6",
                icon: "sparkles",
                hint: "Fresh inbound conversation, no reply sent yet",
            },
            Self::InContact => LabelPreset {
                name: "In contact",
                color: "#8B5CF6",
                icon: "chat",
                hint: "An operator has replied at least once",
            },
            Self::Qualified => LabelPreset {
                name: "Qualified",
                color: "#10B981",
                icon: "badge-check",
                hint: "Fits the offer and shows buying intent",
            },
            Self::Unqualified => LabelPreset {
                name: "Unqualified",
                color: "#6B7280",
                icon: "x-circle",
                hint: "Does not fit the offer",
            },
            Self::CallBooked => LabelPreset {
                name: "Call booked",
                color: "#F59E0B",
                icon: "phone",
                hint: "A call is scheduled",
            },
            Self::Won => LabelPreset {
                name: "Won",
                color: "#059669",
                icon: "trophy",
                hint: "Closed won",
            },
            Self::NoShow => LabelPreset {
                name: "No show",
                color: "#EF4444",
                icon: "calendar-x",
                hint: "Missed a booked call",
            },
        }
    }
}

impl Temperature {
    pub fn preset(&self) -> LabelPreset {
        match self {
            Self::Hot => LabelPreset {
                name: "Hot Lead",
                color: "#DC2626",
                icon: "flame",
                hint: "Act now — high urgency",
            },
            Self::Warm => LabelPreset {
                name: "Warm Lead",
                color: "#F97316",
                icon: "sun",
                hint: "Engaged but not urgent",
            },
            Self::Cold => LabelPreset {
                name: "Cold Lead",
                color: "#0EA5E9",
                icon: "snowflake",
                hint: "Low engagement",
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Legacy status
// ---------------------------------------------------------------------------

/// The backward-compatible `legacy_status` column on conversations.
///
/// Older readers only understand this field, so the transition engine keeps
/// mirroring it on every phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyStatus {
    Open,
    Qualified,
    Disqualified,
    Removed,
}

impl LegacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Qualified => "qualified",
            Self::Disqualified => "disqualified",
            Self::Removed => "removed",
        }
    }

    /// Unknown values read as Open rather than erroring — the classifier is
    /// total over whatever the conversation table contains.
    pub fn parse(value: &str) -> Self {
        match value {
            "qualified" => Self::Qualified,
            "disqualified" => Self::Disqualified,
            "removed" => Self::Removed,
            _ => Self::Open,
        }
    }

    /// The mirror value a phase maps to: qualified→qualified,
    /// unqualified→disqualified, anything else→open.
    pub fn mirror_of(stage: FunnelStage) -> Self {
        match stage {
            FunnelStage::Qualified => Self::Qualified,
            FunnelStage::Unqualified => Self::Disqualified,
            _ => Self::Open,
        }
    }
}

// ---------------------------------------------------------------------------
// Attachment provenance
// ---------------------------------------------------------------------------

pub const SOURCE_MANUAL: &str = "manual";
pub const SOURCE_AUTOMATIC: &str = "automatic";
pub const SOURCE_RECLASSIFICATION: &str = "reclassification";
pub const SOURCE_IMPORT: &str = "import";

/// True when an attachment source counts toward the manual-override lock.
/// The source set is open-ended; anything not explicitly machine-originated
/// is treated as a human decision.
pub fn is_human_source(source: &str) -> bool {
    !matches!(source, SOURCE_AUTOMATIC | SOURCE_RECLASSIFICATION)
}

// ---------------------------------------------------------------------------
// Name normalization
// ---------------------------------------------------------------------------

/// Normalize a label name for alias matching: lowercase, trimmed, inner
/// whitespace collapsed.
pub fn normalize_label_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Resolve a label name to the funnel stage it denotes, if canonical.
pub fn stage_for_label_name(name: &str) -> Option<FunnelStage> {
    let norm = normalize_label_name(name);
    STAGE_SCAN_ORDER
        .iter()
        .copied()
        .find(|s| s.aliases().contains(&norm.as_str()) || s.key() == norm)
}

/// Resolve a label name to the temperature it denotes, if canonical.
pub fn temperature_for_label_name(name: &str) -> Option<Temperature> {
    let norm = normalize_label_name(name);
    TEMPERATURE_SCAN_ORDER
        .iter()
        .copied()
        .find(|t| t.aliases().contains(&norm.as_str()) || t.key() == norm)
}

/// True when a label name maps to either canonical dimension.
pub fn is_canonical_name(name: &str) -> bool {
    stage_for_label_name(name).is_some() || temperature_for_label_name(name).is_some()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_aliases_resolve() {
        assert_eq!(stage_for_label_name("New lead"), Some(FunnelStage::NewLead));
        assert_eq!(stage_for_label_name("NEW"), Some(FunnelStage::NewLead));
        assert_eq!(
            stage_for_label_name("booked call"),
            Some(FunnelStage::CallBooked)
        );
        assert_eq!(stage_for_label_name("Closed  Won"), Some(FunnelStage::Won));
        assert_eq!(stage_for_label_name("noshow"), Some(FunnelStage::NoShow));
    }

    #[test]
    fn test_disqualified_alias_maps_to_unqualified() {
        assert_eq!(
            stage_for_label_name("disqualified"),
            Some(FunnelStage::Unqualified)
        );
        assert_eq!(
            stage_for_label_name("Unqualified"),
            Some(FunnelStage::Unqualified)
        );
    }

    #[test]
    fn test_temperature_aliases_resolve() {
        assert_eq!(
            temperature_for_label_name("Hot Lead"),
            Some(Temperature::Hot)
        );
        assert_eq!(temperature_for_label_name("warm"), Some(Temperature::Warm));
        assert_eq!(temperature_for_label_name("Sales"), None);
    }

    #[test]
    fn test_free_form_names_are_not_canonical() {
        assert!(!is_canonical_name("VIP"));
        assert!(!is_canonical_name("Spanish speaker"));
        assert!(is_canonical_name("Qualified"));
        assert!(is_canonical_name("cold lead"));
    }

    #[test]
    fn test_legacy_mirror() {
        assert_eq!(
            LegacyStatus::mirror_of(FunnelStage::Qualified),
            LegacyStatus::Qualified
        );
        assert_eq!(
            LegacyStatus::mirror_of(FunnelStage::Unqualified),
            LegacyStatus::Disqualified
        );
        assert_eq!(
            LegacyStatus::mirror_of(FunnelStage::Won),
            LegacyStatus::Open
        );
    }

    #[test]
    fn test_human_source() {
        assert!(is_human_source(SOURCE_MANUAL));
        assert!(is_human_source(SOURCE_IMPORT));
        assert!(is_human_source("csv_backfill"));
        assert!(!is_human_source(SOURCE_AUTOMATIC));
        assert!(!is_human_source(SOURCE_RECLASSIFICATION));
    }
}
