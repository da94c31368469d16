//! End-to-end behavior of the aggregation fallback chain and the ingest
//! scheduler, exercised through the public API with mock backends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use inbox_monitor::aggregator::{snapshot_from_records, SourceAggregator};
use inbox_monitor::config::SchedulerConfig;
use inbox_monitor::error::{MailError, SourceError};
use inbox_monitor::gmail::source::{FetchBatch, FetchQuery, MailSource};
use inbox_monitor::model::{
    ConnectionState, DashboardSnapshot, EmailRecord, EmailStatus, Priority, Statistics,
};
use inbox_monitor::scheduler::IngestScheduler;
use inbox_monitor::sources::{BackendSource, IngestTarget};

fn record(id: &str, status: EmailStatus, sent_at: Option<&str>) -> EmailRecord {
    EmailRecord {
        id: id.to_string(),
        thread_id: id.to_string(),
        subject_raw: "Status update".into(),
        subject: "Status update".into(),
        from: "alice@example.com".into(),
        to: "ops@example.com".into(),
        sent_at: sent_at.and_then(inbox_monitor::classify::parse_timestamp),
        sent_at_raw: sent_at.unwrap_or_default().to_string(),
        body_preview: "body".into(),
        status,
        priority: Priority::Low,
        tool_invoked: None,
        source_name: "mock".into(),
    }
}

struct MockBackend {
    name: &'static str,
    available: bool,
    records: Vec<EmailRecord>,
}

#[async_trait]
impl BackendSource for MockBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn test_connection(&self) -> ConnectionState {
        if self.available {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn fetch_snapshot(&self) -> Result<DashboardSnapshot, SourceError> {
        if !self.available {
            return Err(SourceError::unavailable(self.name, "connection refused"));
        }
        Ok(snapshot_from_records(self.name, self.records.clone(), Vec::new()))
    }
}

fn backend(name: &'static str, available: bool, records: Vec<EmailRecord>) -> Arc<dyn BackendSource> {
    Arc::new(MockBackend {
        name,
        available,
        records,
    })
}

#[tokio::test]
async fn fallback_chain_skips_down_backends() {
    let aggregator = SourceAggregator::new(vec![
        backend("primary", false, vec![]),
        backend("secondary", false, vec![]),
        backend(
            "tertiary",
            true,
            vec![
                record("a", EmailStatus::Processed, Some("2026-08-01T10:00:00Z")),
                record("b", EmailStatus::WaitingAction, Some("2026-08-01T11:00:00Z")),
            ],
        ),
    ]);

    let snapshot = aggregator.get_snapshot().await;
    assert_eq!(snapshot.source_used, "tertiary");
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert_eq!(snapshot.emails.len(), 2);
    // Statistics are re-derived from the visible list, never trusted.
    assert_eq!(snapshot.statistics.total, 2);
    assert_eq!(snapshot.statistics.processed, 1);
    assert_eq!(snapshot.statistics.waiting_action, 1);
}

#[tokio::test]
async fn every_backend_down_still_yields_a_snapshot() {
    let aggregator = SourceAggregator::new(vec![
        backend("primary", false, vec![]),
        backend("secondary", false, vec![]),
    ]);

    let snapshot = aggregator.get_snapshot().await;
    assert_eq!(snapshot.source_used, "fallback");
    assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
    assert!(snapshot.emails.is_empty());
    assert_eq!(snapshot.statistics, Statistics::default());
}

#[tokio::test]
async fn repeated_snapshots_over_stable_data_agree() {
    let aggregator = SourceAggregator::new(vec![backend(
        "only",
        true,
        vec![
            record("a", EmailStatus::Hitl, Some("2026-08-01T10:00:00Z")),
            record("b", EmailStatus::Ignored, Some("2026-08-01T09:00:00Z")),
        ],
    )]);

    let first = aggregator.get_snapshot().await;
    let second = aggregator.get_snapshot().await;

    let first_ids: Vec<&str> = first.emails.iter().map(|e| e.id.as_str()).collect();
    let second_ids: Vec<&str> = second.emails.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(first.statistics, second.statistics);
    assert_eq!(first.source_used, second.source_used);
}

// ── Scheduler ───────────────────────────────────────────────────────

struct StaticMail {
    records: Vec<EmailRecord>,
}

#[async_trait]
impl MailSource for StaticMail {
    async fn fetch(&self, _query: &FetchQuery) -> Result<FetchBatch, MailError> {
        Ok(FetchBatch {
            records: self.records.clone(),
            failed: 0,
        })
    }
}

#[derive(Default)]
struct RecordingTarget {
    submitted: Mutex<Vec<String>>,
}

#[async_trait]
impl IngestTarget for RecordingTarget {
    fn name(&self) -> &str {
        "recording_target"
    }

    async fn submit(&self, record: &EmailRecord) -> Result<(), SourceError> {
        self.submitted.lock().unwrap().push(record.id.clone());
        Ok(())
    }
}

fn scheduler(
    records: Vec<EmailRecord>,
    target: Arc<RecordingTarget>,
) -> Arc<IngestScheduler> {
    let query = FetchQuery {
        address: "ops@example.com".into(),
        since_minutes: 5,
        include_read: false,
        limit: 50,
        early_stop: false,
    };
    let config = SchedulerConfig {
        poll_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
        cycle_timeout: Duration::from_secs(5),
    };
    Arc::new(IngestScheduler::new(
        Arc::new(StaticMail { records }),
        target,
        query,
        config,
    ))
}

#[tokio::test]
async fn trigger_now_delivers_and_reports_counts() {
    let target = Arc::new(RecordingTarget::default());
    let sched = scheduler(
        vec![
            record("m1", EmailStatus::New, None),
            record("m2", EmailStatus::New, None),
        ],
        Arc::clone(&target),
    );

    let outcome = sched.trigger_now().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.processed_count, 2);
    assert_eq!(outcome.failed_count, 0);
    assert_eq!(
        target.submitted.lock().unwrap().as_slice(),
        ["m1".to_string(), "m2".to_string()]
    );
}

#[tokio::test]
async fn only_one_loop_runs_at_a_time() {
    let sched = scheduler(vec![], Arc::new(RecordingTarget::default()));

    assert!(sched.start());
    assert!(!sched.start());

    sched.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!sched.status().running);
}

#[tokio::test]
async fn scheduled_loop_runs_cycles_until_stopped() {
    let target = Arc::new(RecordingTarget::default());
    let sched = scheduler(
        vec![record("m1", EmailStatus::New, None)],
        Arc::clone(&target),
    );

    sched.start();
    tokio::time::sleep(Duration::from_millis(80)).await;
    sched.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = sched.status();
    assert!(!status.running);
    assert!(status.cycle_count >= 1);
    assert!(status.last_run_at.is_some());
    assert!(!target.submitted.lock().unwrap().is_empty());
}
