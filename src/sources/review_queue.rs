//! Review-queue source — the human-in-the-loop inbox the workflow writes
//! to. Doubles as the ingestion target for freshly fetched mail.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::aggregator::snapshot_from_records;
use crate::classify::{
    classify_priority, content_preview, fold_unknown_status, format_subject, parse_timestamp,
};
use crate::config::ReviewQueueConfig;
use crate::error::SourceError;
use crate::model::{ConnectionState, DashboardSnapshot, EmailRecord};
use crate::sources::{
    BackendSource, IngestTarget, classify_probe, http_client, FETCH_TIMEOUT_SECS,
    PROBE_TIMEOUT_SECS,
};

pub const REVIEW_QUEUE_SOURCE_NAME: &str = "review_queue";

/// Backend adapter for the review-queue service.
pub struct ReviewQueueSource {
    config: ReviewQueueConfig,
    probe_client: reqwest::Client,
    fetch_client: reqwest::Client,
}

// ── Native wire types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ThreadsResponse {
    #[serde(default)]
    threads: Vec<ReviewThread>,
}

/// A thread as the review queue reports it. `thread_id` is mandatory — a
/// thread without an id cannot be keyed into a snapshot, so its absence is
/// a protocol error rather than something to paper over.
#[derive(Debug, Deserialize)]
struct ReviewThread {
    thread_id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    tool_invoked: Option<String>,
}

impl ReviewQueueSource {
    /// Inherent so call sites stay unambiguous — this type carries both the
    /// `BackendSource` and `IngestTarget` roles, and both traits declare
    /// `name`.
    pub fn name(&self) -> &str {
        REVIEW_QUEUE_SOURCE_NAME
    }

    pub fn new(config: ReviewQueueConfig) -> Self {
        Self {
            config,
            probe_client: http_client(PROBE_TIMEOUT_SECS),
            fetch_client: http_client(FETCH_TIMEOUT_SECS),
        }
    }

    fn record_from_thread(&self, thread: ReviewThread) -> EmailRecord {
        let subject_raw = thread.subject.unwrap_or_else(|| "No Subject".to_string());
        let subject = format_subject(&subject_raw);
        let body_preview = content_preview(&thread.body.unwrap_or_default());
        let priority = classify_priority(&subject, &body_preview);
        let status = fold_unknown_status(thread.status.as_deref().unwrap_or("unknown"));
        let sent_at_raw = thread.timestamp.unwrap_or_default();

        EmailRecord {
            id: thread.thread_id.clone(),
            thread_id: thread.thread_id,
            subject_raw,
            subject,
            from: thread.from.unwrap_or_else(|| "Unknown".to_string()),
            to: thread.to.unwrap_or_else(|| "Unknown".to_string()),
            sent_at: parse_timestamp(&sent_at_raw),
            sent_at_raw,
            body_preview,
            status,
            priority,
            tool_invoked: thread.tool_invoked,
            source_name: REVIEW_QUEUE_SOURCE_NAME.to_string(),
        }
    }
}

#[async_trait]
impl BackendSource for ReviewQueueSource {
    fn name(&self) -> &str {
        REVIEW_QUEUE_SOURCE_NAME
    }

    async fn test_connection(&self) -> ConnectionState {
        let result = self
            .probe_client
            .get(format!("{}/api/health", self.config.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await;
        classify_probe(result).await
    }

    async fn fetch_snapshot(&self) -> Result<DashboardSnapshot, SourceError> {
        let state = self.test_connection().await;
        if state != ConnectionState::Connected {
            return Err(SourceError::unavailable(
                self.name(),
                format!("probe reported {state:?}"),
            ));
        }

        let response = self
            .fetch_client
            .get(format!("{}/api/threads", self.config.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| SourceError::unavailable(self.name(), e))?;

        if !response.status().is_success() {
            return Err(SourceError::unavailable(
                self.name(),
                format!("thread listing returned {}", response.status()),
            ));
        }

        let listing: ThreadsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::protocol(self.name(), e))?;

        debug!(threads = listing.threads.len(), "Fetched review-queue threads");

        let emails: Vec<EmailRecord> = listing
            .threads
            .into_iter()
            .map(|t| self.record_from_thread(t))
            .collect();

        Ok(snapshot_from_records(self.name(), emails, Vec::new()))
    }
}

#[async_trait]
impl IngestTarget for ReviewQueueSource {
    fn name(&self) -> &str {
        REVIEW_QUEUE_SOURCE_NAME
    }

    async fn submit(&self, record: &EmailRecord) -> Result<(), SourceError> {
        let payload = serde_json::json!({
            "email_id": record.id,
            "thread_id": record.thread_id,
            "from": record.from,
            "to": record.to,
            "subject": record.subject_raw,
            "body": record.body_preview,
            "timestamp": record.sent_at_raw,
            "status": record.status.label(),
            "metadata": {
                "source": record.source_name,
                "inbox_id": self.config.inbox_id,
                "ingested_at": Utc::now().to_rfc3339(),
                "provider_message_id": record.id,
            },
        });

        let response = self
            .fetch_client
            .post(format!("{}/api/threads", self.config.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| SourceError::unavailable(self.name(), e))?;

        if response.status().is_success() {
            debug!(email_id = %record.id, "Submitted record to review queue");
            Ok(())
        } else {
            Err(SourceError::unavailable(
                self.name(),
                format!("submit returned {}", response.status()),
            ))
        }
    }
}
