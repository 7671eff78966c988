//! CSV export of the classified conversation view.
//!
//! Standard quoting: a field containing a comma, quote, or newline is
//! wrapped in double quotes and internal quotes are doubled. Rows are
//! ordered by conversation id so consecutive exports diff cleanly.

use std::cmp::Ordering;

use crate::state::EngineState;
use crate::sync::projection::ConversationView;
use crate::util::compare_timestamps;

const HEADER: &str = "conversation_id,contact,phase,temperature,assignee,last_interaction";

/// Render every non-spam conversation in the projection as one CSV document.
pub fn export_classified_csv(state: &EngineState) -> String {
    let mut views: Vec<ConversationView> = state
        .projection
        .conversations()
        .into_iter()
        .filter(|v| !v.conversation.spam)
        .collect();
    views.sort_by(|a, b| a.conversation.id.cmp(&b.conversation.id));

    let mut out = String::from(HEADER);
    out.push('\n');
    for view in &views {
        let classification = state.projection.classify(&view.conversation.id);
        let (phase, temperature) = match classification {
            Some(c) => (
                c.phase.key().to_string(),
                c.temperature.map(|t| t.key().to_string()).unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };
        let last_interaction = last_interaction(view);
        let fields = [
            view.conversation.id.as_str(),
            view.conversation.contact_name.as_deref().unwrap_or(""),
            &phase,
            &temperature,
            view.conversation.assigned_operator_id.as_deref().unwrap_or(""),
            &last_interaction,
        ];
        let row: Vec<String> = fields.iter().map(|f| quote_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    log::debug!("Exported {} conversations to CSV", views.len());
    out
}

fn last_interaction(view: &ConversationView) -> String {
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

fn quote_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::sample_conversation;
    use crate::db::DbLabel;
    use crate::state::test_utils::test_state;
    use chrono::Utc;

    /// Minimal conforming CSV line parser, enough to verify the quote rules.
    fn parse_line(line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut chars = line.chars().peekable();
        let mut quoted = false;
        while let Some(c) = chars.next() {
            match c {
                '"' if quoted => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        quoted = false;
                    }
                }
                '"' if field.is_empty() => quoted = true,
                ',' if !quoted => {
                    fields.push(std::mem::take(&mut field));
                }
                c => field.push(c),
            }
        }
        fields.push(field);
        fields
    }

    #[test]
    fn test_quote_round_trip() {
        let state = test_state();
        let mut conv = sample_conversation("c1", "ws1");
        conv.contact_name = Some("Doe, \"Jane\"".to_string());
        state.projection.upsert_conversation(conv);

        let csv = export_classified_csv(&state);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "conversation_id,contact,phase,temperature,assignee,last_interaction"
        );

        let fields = parse_line(lines[1]);
        assert_eq!(fields[0], "c1");
        assert_eq!(fields[1], "Doe, \"Jane\"");
        assert_eq!(fields[2], "new_lead");
        assert_eq!(fields[3], "");
    }

    #[test]
    fn test_classified_columns() {
        let state = test_state();
        let mut conv = sample_conversation("c1", "ws1");
        conv.assigned_operator_id = Some("op-7".to_string());
        state.projection.upsert_conversation(conv);
        state.projection.upsert_label(DbLabel {
            id: "l-hot".to_string(),
            workspace_id: "ws1".to_string(),
            name: "Hot Lead".to_string(),
            color: None,
            icon: None,
            classification_hint: None,
            created_at: Utc::now().to_rfc3339(),
        });
        state.projection.attach("c1", "l-hot");

        let csv = export_classified_csv(&state);
        let fields = parse_line(csv.lines().nth(1).expect("row"));
        assert_eq!(fields[2], "new_lead");
        assert_eq!(fields[3], "hot");
        assert_eq!(fields[4], "op-7");
    }

    #[test]
    fn test_spam_excluded_and_rows_sorted() {
        let state = test_state();
        state
            .projection
            .upsert_conversation(sample_conversation("c2", "ws1"));
        state
            .projection
            .upsert_conversation(sample_conversation("c1", "ws1"));
        let mut spam = sample_conversation("c0", "ws1");
        spam.spam = true;
        state.projection.upsert_conversation(spam);

        let csv = export_classified_csv(&state);
        let ids: Vec<String> = csv
            .lines()
            .skip(1)
            .map(|l| parse_line(l)[0].clone())
            .collect();
        assert_eq!(ids, vec!["c1".to_string(), "c2".to_string()]);
    }
}
