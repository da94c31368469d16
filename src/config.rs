//! Configuration, built from environment variables.
//!
//! Backend configs return `None` from `from_env()` when their required
//! variables are absent — an unconfigured backend simply does not join the
//! fallback chain.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Gmail ingestion configuration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// Address whose mail is ingested (matched as sender or recipient).
    pub address: String,
    /// Inline JSON token bundle, tried before the token file.
    pub token_json: Option<String>,
    /// Token file fallback path.
    pub token_path: PathBuf,
    /// Only fetch mail newer than this many minutes (0 = unbounded).
    pub since_minutes: u32,
    /// Include already-read mail.
    pub include_read: bool,
    /// Maximum messages per cycle.
    pub limit: usize,
}

impl GmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `INGEST_EMAIL_ADDRESS` is not set (ingestion disabled).
    pub fn from_env() -> Option<Self> {
        let address = std::env::var("INGEST_EMAIL_ADDRESS").ok()?;

        let token_json = std::env::var("GMAIL_TOKEN").ok().filter(|s| !s.is_empty());

        let token_path = std::env::var("GMAIL_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".secrets/token.json"));

        let since_minutes: u32 = std::env::var("INGEST_MINUTES_SINCE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let include_read = std::env::var("INGEST_INCLUDE_READ")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let limit: usize = std::env::var("INGEST_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);

        Some(Self {
            address,
            token_json,
            token_path,
            since_minutes,
            include_read,
            limit,
        })
    }
}

/// Review-queue service configuration (human-in-the-loop inbox).
#[derive(Debug, Clone)]
pub struct ReviewQueueConfig {
    pub base_url: String,
    /// Inbox the workflow writes to.
    pub inbox_id: String,
    pub api_key: SecretString,
}

impl ReviewQueueConfig {
    /// Returns `None` if `REVIEW_QUEUE_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("REVIEW_QUEUE_URL").ok()?;
        let inbox_id = std::env::var("REVIEW_QUEUE_INBOX_ID")
            .unwrap_or_else(|_| "email-workflow".to_string());
        let api_key =
            SecretString::from(std::env::var("REVIEW_QUEUE_API_KEY").unwrap_or_default());

        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            inbox_id,
            api_key,
        })
    }
}

/// Workflow-execution platform configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub endpoint: String,
    /// Deployed graph whose threads are listed.
    pub graph_id: String,
    pub api_key: SecretString,
}

impl WorkflowConfig {
    /// Returns `None` if `WORKFLOW_API_KEY` is not set (the platform
    /// rejects anonymous thread listing, so there is no point probing).
    pub fn from_env() -> Option<Self> {
        let api_key = SecretString::from(std::env::var("WORKFLOW_API_KEY").ok()?);
        let endpoint = std::env::var("WORKFLOW_ENDPOINT")
            .unwrap_or_else(|_| "https://api.workflow.example.com".to_string());
        let graph_id =
            std::env::var("WORKFLOW_GRAPH_ID").unwrap_or_else(|_| "email-workflow".to_string());

        Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            graph_id,
            api_key,
        })
    }
}

/// Trace-analytics service configuration.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub endpoint: String,
    /// Project whose runs are searched.
    pub project: String,
    pub api_key: SecretString,
}

impl TraceConfig {
    /// Returns `None` if `TRACE_API_KEY` is not set.
    pub fn from_env() -> Option<Self> {
        let api_key = SecretString::from(std::env::var("TRACE_API_KEY").ok()?);
        let endpoint = std::env::var("TRACE_ENDPOINT")
            .unwrap_or_else(|_| "https://api.trace.example.com".to_string());
        let project =
            std::env::var("TRACE_PROJECT").unwrap_or_else(|_| "email-workflow".to_string());

        Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project,
            api_key,
        })
    }
}

/// Ingest scheduler timing.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between successful cycles.
    pub poll_interval: Duration,
    /// Shortened wait after a failed cycle.
    pub error_backoff: Duration,
    /// Hard cap on one full ingestion cycle.
    pub cycle_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300), // 5 minutes
            error_backoff: Duration::from_secs(60),  // 1 minute
            cycle_timeout: Duration::from_secs(300),
        }
    }
}

impl SchedulerConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_interval = std::env::var("INGEST_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let error_backoff = std::env::var("INGEST_ERROR_BACKOFF_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.error_backoff);

        Self {
            poll_interval,
            error_backoff,
            cycle_timeout: defaults.cycle_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_defaults() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(300));
        assert_eq!(cfg.error_backoff, Duration::from_secs(60));
        assert_eq!(cfg.cycle_timeout, Duration::from_secs(300));
    }
}
