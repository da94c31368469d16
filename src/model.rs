//! Canonical data model — the one schema every backend is folded into.
//!
//! Backend adapters must fully populate these records or fail with
//! `SourceError::Protocol`; raw backend JSON never passes through to the
//! dashboard layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Status taxonomy ─────────────────────────────────────────────────

/// Canonical processing status of an email record.
///
/// `New` is used only for freshly ingested mail on its way to the
/// ingestion target. Backend classification never produces it — unknown
/// backend-native statuses fold to `WaitingAction` so no record is ever
/// dropped for carrying an unrecognized status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    New,
    Processed,
    Hitl,
    Ignored,
    WaitingAction,
}

impl EmailStatus {
    /// Short label for logging and wire payloads.
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processed => "processed",
            Self::Hitl => "hitl",
            Self::Ignored => "ignored",
            Self::WaitingAction => "waiting_action",
        }
    }
}

/// Email priority, derived from subject/body keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Outcome of one workflow execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Interrupted,
    Failed,
    Running,
}

/// Connectivity of a backend source, classified purely on transport/HTTP
/// outcome by its probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Degraded,
    Disconnected,
}

// ── Records ─────────────────────────────────────────────────────────

/// One logical email/thread, normalized from whichever backend produced it.
///
/// `id` + `source_name` together are unique within one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Stable id, unique within its source.
    pub id: String,
    /// Thread the message belongs to (may equal `id`).
    pub thread_id: String,
    /// Raw subject as the source reported it.
    pub subject_raw: String,
    /// Normalized subject — reply/forward prefixes stripped, length-capped.
    pub subject: String,
    pub from: String,
    pub to: String,
    /// Source-native timestamp string, preserved verbatim.
    pub sent_at_raw: String,
    /// Parsed form of `sent_at_raw`, when parseable.
    pub sent_at: Option<DateTime<Utc>>,
    /// Whitespace-normalized, length-capped body preview.
    pub body_preview: String,
    pub status: EmailStatus,
    pub priority: Priority,
    /// Name of the automated action taken on this record, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_invoked: Option<String>,
    /// Which backend source produced this record.
    pub source_name: String,
}

/// One execution attempt of the workflow against an email.
///
/// Only emitted by backends that expose execution history. `email_id` is a
/// back-reference, not ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub email_id: String,
    pub outcome: RunOutcome,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Derived from the timestamps; `None` when either is missing.
    pub duration_ms: Option<i64>,
}

impl RunRecord {
    /// Derive the duration from start/end timestamps.
    pub fn derive_duration(
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Option<i64> {
        match (started_at, ended_at) {
            (Some(s), Some(e)) => Some((e - s).num_milliseconds()),
            _ => None,
        }
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Rollup counts over one snapshot's email list.
///
/// Always recomputed from the final merged list in a single pass — never
/// copied from a backend's self-reported totals, so the displayed counts
/// can never drift from the displayed list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub processed: usize,
    pub hitl: usize,
    pub ignored: usize,
    pub waiting_action: usize,
    pub scheduled_meetings: usize,
    pub notifications: usize,
}

/// Immutable aggregate view handed to the presentation layer.
///
/// Replaced wholesale on the next successful aggregation, never mutated in
/// place. Callers must treat it as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Newest first.
    pub emails: Vec<EmailRecord>,
    pub statistics: Statistics,
    /// Recent workflow executions, for sources that expose them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_runs: Vec<RunRecord>,
    /// Name of the backend (or fallback tier) that produced this snapshot.
    pub source_used: String,
    pub connection_state: ConnectionState,
    pub generated_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    /// The canonical empty snapshot: zero counts, no emails, disconnected.
    ///
    /// Returned when every configured backend is unreachable, so the
    /// presentation layer never has to special-case "no data".
    pub fn empty() -> Self {
        Self {
            emails: Vec::new(),
            statistics: Statistics::default(),
            recent_runs: Vec::new(),
            source_used: "fallback".to_string(),
            connection_state: ConnectionState::Disconnected,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels() {
        assert_eq!(EmailStatus::Processed.label(), "processed");
        assert_eq!(EmailStatus::Hitl.label(), "hitl");
        assert_eq!(EmailStatus::WaitingAction.label(), "waiting_action");
        assert_eq!(EmailStatus::New.label(), "new");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(EmailStatus::WaitingAction).unwrap();
        assert_eq!(json, "waiting_action");
    }

    #[test]
    fn duration_derived_only_with_both_timestamps() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(1500);
        assert_eq!(RunRecord::derive_duration(Some(start), Some(end)), Some(1500));
        assert_eq!(RunRecord::derive_duration(Some(start), None), None);
        assert_eq!(RunRecord::derive_duration(None, Some(end)), None);
    }

    #[test]
    fn empty_snapshot_is_canonical() {
        let snap = DashboardSnapshot::empty();
        assert!(snap.emails.is_empty());
        assert_eq!(snap.statistics, Statistics::default());
        assert_eq!(snap.source_used, "fallback");
        assert_eq!(snap.connection_state, ConnectionState::Disconnected);
    }

    #[test]
    fn snapshot_omits_empty_runs_in_json() {
        let json = serde_json::to_string(&DashboardSnapshot::empty()).unwrap();
        assert!(!json.contains("recent_runs"));
    }
}
