//! Workflow-platform source — lists the deployed graph's threads and folds
//! the platform's status aliases into the canonical taxonomy.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::aggregator::snapshot_from_records;
use crate::classify::{classify_priority, content_preview, format_subject, parse_timestamp};
use crate::config::WorkflowConfig;
use crate::error::SourceError;
use crate::model::{ConnectionState, DashboardSnapshot, EmailRecord, EmailStatus};
use crate::sources::{
    BackendSource, classify_probe, http_client, FETCH_TIMEOUT_SECS, PROBE_TIMEOUT_SECS,
};

pub const WORKFLOW_SOURCE_NAME: &str = "workflow_platform";

/// Fold a platform-native thread status into the canonical taxonomy.
///
/// The platform has grown several aliases per state; anything unrecognized
/// (including states added after this table was written) folds to
/// `WaitingAction` so the record is never dropped.
pub fn fold_thread_status(native: &str) -> EmailStatus {
    match native.to_lowercase().as_str() {
        "processed" | "completed" | "done" => EmailStatus::Processed,
        "hitl" | "human_in_the_loop" | "waiting_human" => EmailStatus::Hitl,
        "ignored" | "skipped" => EmailStatus::Ignored,
        _ => EmailStatus::WaitingAction,
    }
}

/// Backend adapter for the workflow-execution platform.
pub struct WorkflowPlatformSource {
    config: WorkflowConfig,
    probe_client: reqwest::Client,
    fetch_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ThreadsResponse {
    #[serde(default)]
    threads: Vec<WorkflowThread>,
}

#[derive(Debug, Deserialize)]
struct WorkflowThread {
    thread_id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    tool_invoked: Option<String>,
}

impl WorkflowPlatformSource {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            probe_client: http_client(PROBE_TIMEOUT_SECS),
            fetch_client: http_client(FETCH_TIMEOUT_SECS),
        }
    }

    fn record_from_thread(&self, thread: WorkflowThread) -> EmailRecord {
        let subject_raw = thread.subject.unwrap_or_else(|| "No Subject".to_string());
        let subject = format_subject(&subject_raw);
        let body_preview = content_preview(&thread.body.unwrap_or_default());
        let priority = classify_priority(&subject, &body_preview);
        let status = fold_thread_status(thread.status.as_deref().unwrap_or("unknown"));
        let sent_at_raw = thread.created_at.unwrap_or_default();

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
            source_name: WORKFLOW_SOURCE_NAME.to_string(),
        }
    }
}

#[async_trait]
impl BackendSource for WorkflowPlatformSource {
    fn name(&self) -> &str {
        WORKFLOW_SOURCE_NAME
    }

    async fn test_connection(&self) -> ConnectionState {
        let result = self
            .probe_client
            .get(format!("{}/health", self.config.endpoint))
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

        let url = format!(
            "{}/graphs/{}/threads",
            self.config.endpoint, self.config.graph_id
        );
        let response = self
            .fetch_client
            .get(url)
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

        debug!(
            graph_id = %self.config.graph_id,
            threads = listing.threads.len(),
            "Fetched workflow-platform threads"
        );

        let emails: Vec<EmailRecord> = listing
            .threads
            .into_iter()
            .map(|t| self.record_from_thread(t))
            .collect();

        Ok(snapshot_from_records(self.name(), emails, Vec::new()))
    }
}
