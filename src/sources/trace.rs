//! Trace-analytics source — searches the project's workflow runs, folds
//! them into email records, and carries the raw executions along as
//! `RunRecord`s for the recent-activity feed.
//!
//! Unlike the other backends this service authenticates with an
//! `x-api-key` header and only exposes a POST search endpoint.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::aggregator::snapshot_from_records;
use crate::classify::{classify_priority, content_preview, format_subject, parse_timestamp};
use crate::config::TraceConfig;
use crate::error::SourceError;
use crate::model::{
    ConnectionState, DashboardSnapshot, EmailRecord, EmailStatus, RunOutcome, RunRecord,
};
use crate::sources::{
    BackendSource, http_client, FETCH_TIMEOUT_SECS, PROBE_TIMEOUT_SECS,
};

pub const TRACE_SOURCE_NAME: &str = "trace_service";

const SEARCH_LIMIT: usize = 50;

/// Fold a trace-service run status into the canonical taxonomy.
pub fn fold_run_status(native: &str) -> EmailStatus {
    match native.to_lowercase().as_str() {
        "completed" => EmailStatus::Processed,
        "interrupted" | "waiting_human" => EmailStatus::Hitl,
        "failed" | "skipped" => EmailStatus::Ignored,
        _ => EmailStatus::WaitingAction,
    }
}

/// Map a run status onto an execution outcome. Anything not terminal is
/// considered still running.
pub fn fold_run_outcome(native: &str) -> RunOutcome {
    match native.to_lowercase().as_str() {
        "completed" => RunOutcome::Completed,
        "interrupted" => RunOutcome::Interrupted,
        "failed" => RunOutcome::Failed,
        _ => RunOutcome::Running,
    }
}

/// Backend adapter for the trace-analytics service.
pub struct TraceServiceSource {
    config: TraceConfig,
    probe_client: reqwest::Client,
    fetch_client: reqwest::Client,
}

// ── Native wire types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RunsResponse {
    #[serde(default)]
    runs: Vec<TraceRun>,
}

#[derive(Debug, Deserialize)]
struct TraceRun {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    inputs: RunInputs,
    #[serde(default)]
    outputs: RunOutputs,
}

#[derive(Debug, Default, Deserialize)]
struct RunInputs {
    #[serde(default)]
    email_input: Option<EmailInput>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailInput {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RunOutputs {
    #[serde(default)]
    email_content: Option<String>,
}

impl TraceRun {
    /// The run's inputs bury the email under a few possible shapes; try
    /// them most-specific first.
    fn email_body(&self) -> String {
        let nested = self.inputs.email_input.as_ref();
        nested
            .and_then(|e| e.body.clone())
            .or_else(|| self.inputs.body.clone())
            .or_else(|| self.inputs.content.clone())
            .or_else(|| self.outputs.email_content.clone())
            .unwrap_or_else(|| "No content available".to_string())
    }

    fn email_subject(&self) -> String {
        let nested = self.inputs.email_input.as_ref();
        nested
            .and_then(|e| e.subject.clone())
            .or_else(|| self.inputs.subject.clone())
            .unwrap_or_else(|| "No Subject".to_string())
    }

    fn email_from(&self) -> String {
        let nested = self.inputs.email_input.as_ref();
        nested
            .and_then(|e| e.from.clone())
            .or_else(|| self.inputs.from.clone())
            .unwrap_or_else(|| "Unknown Sender".to_string())
    }

    fn email_to(&self) -> String {
        let nested = self.inputs.email_input.as_ref();
        nested
            .and_then(|e| e.to.clone())
            .or_else(|| self.inputs.to.clone())
            .unwrap_or_else(|| "Unknown Recipient".to_string())
    }
}

impl TraceServiceSource {
    pub fn new(config: TraceConfig) -> Self {
        Self {
            config,
            probe_client: http_client(PROBE_TIMEOUT_SECS),
            fetch_client: http_client(FETCH_TIMEOUT_SECS),
        }
    }

    fn record_from_run(&self, run: &TraceRun) -> EmailRecord {
        let subject_raw = run.email_subject();
        let subject = format_subject(&subject_raw);
        let body_preview = content_preview(&run.email_body());
        let priority = classify_priority(&subject, &body_preview);
        let status = fold_run_status(run.status.as_deref().unwrap_or("unknown"));
        let sent_at_raw = run.start_time.clone().unwrap_or_default();

        EmailRecord {
            id: run.id.clone(),
            thread_id: run.id.clone(),
            subject_raw,
            subject,
            from: run.email_from(),
            to: run.email_to(),
            sent_at: parse_timestamp(&sent_at_raw),
            sent_at_raw,
            body_preview,
            status,
            priority,
            tool_invoked: None,
            source_name: TRACE_SOURCE_NAME.to_string(),
        }
    }

    fn run_record(&self, run: &TraceRun) -> RunRecord {
        let started_at = run.start_time.as_deref().and_then(parse_timestamp);
        let ended_at = run.end_time.as_deref().and_then(parse_timestamp);
        RunRecord {
            id: run.id.clone(),
            email_id: run.id.clone(),
            outcome: fold_run_outcome(run.status.as_deref().unwrap_or("unknown")),
            started_at,
            ended_at,
            duration_ms: RunRecord::derive_duration(started_at, ended_at),
        }
    }

    fn search_body(&self, limit: usize) -> serde_json::Value {
        serde_json::json!({
            "project": self.config.project,
            "limit": limit,
        })
    }
}

#[async_trait]
impl BackendSource for TraceServiceSource {
    fn name(&self) -> &str {
        TRACE_SOURCE_NAME
    }

    async fn test_connection(&self) -> ConnectionState {
        // The search endpoint is the one the fetch path actually uses, so
        // probe it directly with a minimal query.
        let result = self
            .probe_client
            .post(format!("{}/runs/search", self.config.endpoint))
            .header("x-api-key", self.config.api_key.expose_secret())
            .json(&self.search_body(1))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
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
            .post(format!("{}/runs/search", self.config.endpoint))
            .header("x-api-key", self.config.api_key.expose_secret())
            .json(&self.search_body(SEARCH_LIMIT))
            .send()
            .await
            .map_err(|e| SourceError::unavailable(self.name(), e))?;

        if !response.status().is_success() {
            return Err(SourceError::unavailable(
                self.name(),
                format!("run search returned {}", response.status()),
            ));
        }

        let listing: RunsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::protocol(self.name(), e))?;

        debug!(
            project = %self.config.project,
            runs = listing.runs.len(),
            "Fetched trace-service runs"
        );

        let emails: Vec<EmailRecord> =
            listing.runs.iter().map(|r| self.record_from_run(r)).collect();
        let recent_runs: Vec<RunRecord> =
            listing.runs.iter().map(|r| self.run_record(r)).collect();

        Ok(snapshot_from_records(self.name(), emails, recent_runs))
    }
}
