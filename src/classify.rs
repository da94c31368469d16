//! Record classification — status folding, priority keywords, and the
//! subject/preview shaping every source runs its records through.
//!
//! Classification is deterministic and depends only on the record's own
//! fields, never on fetch order, so repeated fetches over unchanged backend
//! data yield identical snapshots.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::model::{EmailStatus, Priority};

/// High-priority keywords, checked first. A record matching both sets is
/// always `High`.
const HIGH_PRIORITY: &[&str] = &[
    "urgent", "asap", "emergency", "critical", "important", "deadline",
];

/// Medium-priority keywords, checked only when no high keyword matched.
const MEDIUM_PRIORITY: &[&str] = &["meeting", "call", "schedule", "request", "question"];

/// Reply/forward prefixes stripped from subjects, once per occurrence.
const SUBJECT_PREFIXES: &[&str] = &["Re:", "Fwd:", "FW:", "RE:", "FWD:"];

const SUBJECT_MAX: usize = 60;
const PREVIEW_MAX: usize = 100;

/// Tool names that count as a scheduled meeting in the rollup.
const SCHEDULING_TOOLS: &[&str] = &["schedule_meeting", "send_calendar_invite"];

fn notification_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(notification|alert)\b").expect("static regex"))
}

/// Fold an unrecognized backend-native status into the canonical taxonomy.
///
/// This default-to-`WaitingAction` rule is what guarantees the aggregator
/// never drops a record for having a status string it has not seen before.
/// Backend adapters call this after their own alias tables miss.
pub fn fold_unknown_status(native: &str) -> EmailStatus {
    match native.to_lowercase().as_str() {
        "processed" => EmailStatus::Processed,
        "hitl" => EmailStatus::Hitl,
        "ignored" => EmailStatus::Ignored,
        _ => EmailStatus::WaitingAction,
    }
}

/// Determine priority from the normalized subject and body preview.
///
/// The high set is scanned before the medium set; first match wins.
pub fn classify_priority(subject: &str, body_preview: &str) -> Priority {
    let subject = subject.to_lowercase();
    let body = body_preview.to_lowercase();

    for keyword in HIGH_PRIORITY {
        if subject.contains(keyword) || body.contains(keyword) {
            return Priority::High;
        }
    }
    for keyword in MEDIUM_PRIORITY {
        if subject.contains(keyword) || body.contains(keyword) {
            return Priority::Medium;
        }
    }
    Priority::Low
}

/// Normalize a subject line: strip reply/forward prefixes (once per
/// occurrence, so "Re: Re: x" loses both) and cap the result at 60 chars,
/// truncating to 57 + "...".
pub fn format_subject(subject: &str) -> String {
    let mut subject = subject.trim();
    if subject.is_empty() {
        return "No Subject".to_string();
    }

    'strip: loop {
        for prefix in SUBJECT_PREFIXES {
            if let Some(rest) = subject.strip_prefix(prefix) {
                subject = rest.trim_start();
                continue 'strip;
            }
        }
        break;
    }

    if subject.chars().count() > SUBJECT_MAX {
        let truncated: String = subject.chars().take(SUBJECT_MAX - 3).collect();
        format!("{truncated}...")
    } else {
        subject.to_string()
    }
}

/// Collapse whitespace and cap the body preview at 100 chars.
pub fn content_preview(content: &str) -> String {
    if content.is_empty() {
        return "No content".to_string();
    }

    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= PREVIEW_MAX {
        normalized
    } else {
        let truncated: String = normalized.chars().take(PREVIEW_MAX).collect();
        format!("{truncated}...")
    }
}

/// Whether an invoked tool counts as a meeting-scheduling action.
pub fn is_scheduling_tool(tool: &str) -> bool {
    SCHEDULING_TOOLS.iter().any(|t| tool.eq_ignore_ascii_case(t))
}

/// Whether the subject/preview carries a notification keyword.
pub fn is_notification(subject: &str, body_preview: &str) -> bool {
    let re = notification_regex();
    re.is_match(subject) || re.is_match(body_preview)
}

/// Parse a source-native timestamp, trying RFC 3339 then RFC 2822 (the two
/// formats the backends and Gmail `Date` headers actually emit).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Bare "YYYY-MM-DDTHH:MM:SS(.ffffff)" without an offset.
    if let Ok(naive) = raw.parse::<chrono::NaiveDateTime>() {
        return Some(naive.and_utc());
    }
    None
}
