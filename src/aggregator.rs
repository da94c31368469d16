//! Source aggregation — the fallback chain over the configured backends
//! and the statistics rollup.
//!
//! `get_snapshot()` is a total function over all environment states: any
//! combination of down, slow, unauthorized, or unconfigured backends still
//! yields a well-formed snapshot, so the presentation layer never has to
//! special-case "no data".

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::classify::{is_notification, is_scheduling_tool};
use crate::error::SourceError;
use crate::model::{
    ConnectionState, DashboardSnapshot, EmailRecord, EmailStatus, RunRecord, Statistics,
};
use crate::sources::BackendSource;

/// Cap on emails carried in one snapshot (most recent win).
const MAX_EMAILS: usize = 50;

/// Compute rollup statistics in a single pass over the final email list.
///
/// Counts are never copied from a backend's self-reported totals — they
/// are always re-derived from the list actually being displayed, so the
/// two can never drift apart. Each record lands in exactly one status
/// bucket; freshly ingested `new` records (which never appear in backend
/// snapshots) fold into the waiting bucket.
pub fn compute_statistics(emails: &[EmailRecord]) -> Statistics {
    let mut stats = Statistics {
        total: emails.len(),
        ..Statistics::default()
    };

    for email in emails {
        match email.status {
            EmailStatus::Processed => stats.processed += 1,
            EmailStatus::Hitl => stats.hitl += 1,
            EmailStatus::Ignored => stats.ignored += 1,
            EmailStatus::WaitingAction | EmailStatus::New => stats.waiting_action += 1,
        }

        if email
            .tool_invoked
            .as_deref()
            .is_some_and(is_scheduling_tool)
        {
            stats.scheduled_meetings += 1;
        }
        if is_notification(&email.subject, &email.body_preview) {
            stats.notifications += 1;
        }
    }

    stats
}

/// De-duplicate on (id, source) and order newest-first with an id
/// tie-break, so repeated aggregations over unchanged backend data are
/// byte-identical. Records without a parseable timestamp sink to the end.
fn normalize_records(mut emails: Vec<EmailRecord>) -> Vec<EmailRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    emails.retain(|e| seen.insert((e.id.clone(), e.source_name.clone())));

    emails.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then_with(|| a.id.cmp(&b.id)));
    emails.truncate(MAX_EMAILS);
    emails
}

/// Assemble a well-formed snapshot from one source's records.
pub fn snapshot_from_records(
    source: &str,
    emails: Vec<EmailRecord>,
    recent_runs: Vec<RunRecord>,
) -> DashboardSnapshot {
    let emails = normalize_records(emails);
    let statistics = compute_statistics(&emails);
    DashboardSnapshot {
        emails,
        statistics,
        recent_runs,
        source_used: source.to_string(),
        connection_state: ConnectionState::Connected,
        generated_at: Utc::now(),
    }
}

/// Owns the ordered backend list and applies the fallback chain.
pub struct SourceAggregator {
    /// Backends in fixed priority order.
    sources: Vec<Arc<dyn BackendSource>>,
}

impl SourceAggregator {
    pub fn new(sources: Vec<Arc<dyn BackendSource>>) -> Self {
        Self { sources }
    }

    /// Names of the configured backends, in priority order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Probe every backend concurrently and report each one's state.
    pub async fn connection_states(&self) -> Vec<(String, ConnectionState)> {
        let probes = self.sources.iter().map(|source| async move {
            (source.name().to_string(), source.test_connection().await)
        });
        futures::future::join_all(probes).await
    }

    /// Produce the current dashboard snapshot. Never fails.
    ///
    /// Backends are tried in priority order; the first reachable one wins
    /// verbatim (statistics re-derived, see `compute_statistics`). When
    /// every backend is out, the canonical empty snapshot is returned.
    pub async fn get_snapshot(&self) -> DashboardSnapshot {
        for source in &self.sources {
            match source.fetch_snapshot().await {
                Ok(snapshot) => {
                    info!(
                        source = source.name(),
                        emails = snapshot.emails.len(),
                        "Snapshot produced"
                    );
                    let statistics = compute_statistics(&snapshot.emails);
                    return DashboardSnapshot {
                        statistics,
                        source_used: source.name().to_string(),
                        connection_state: ConnectionState::Connected,
                        ..snapshot
                    };
                }
                Err(SourceError::Unavailable { name, reason }) => {
                    // Expected — this is what the fallback chain is for.
                    debug!(source = %name, %reason, "Source unavailable, trying next");
                }
                Err(SourceError::Protocol { name, detail }) => {
                    warn!(source = %name, %detail, "Source schema mismatch, trying next");
                }
            }
        }

        debug!("All sources unavailable, returning empty snapshot");
        DashboardSnapshot::empty()
    }
}
