//! Backend source adapters — one per external monitoring/orchestration
//! service, all folding their native schemas into the canonical model.

pub mod review_queue;
pub mod trace;
pub mod workflow;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::model::{ConnectionState, DashboardSnapshot, EmailRecord};

pub use review_queue::ReviewQueueSource;
pub use trace::TraceServiceSource;
pub use workflow::WorkflowPlatformSource;

/// Probe timeout. Probes are lightweight health/list calls; anything
/// slower than this counts as disconnected.
pub const PROBE_TIMEOUT_SECS: u64 = 10;

/// Data-fetch timeout. An unbounded call is a correctness bug — a hung
/// backend must not stall the pipeline.
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// Adapter to one external backend.
#[async_trait]
pub trait BackendSource: Send + Sync {
    /// Stable name used for `source_used` tagging and logging.
    fn name(&self) -> &str;

    /// Lightweight connectivity probe, classified purely on transport/HTTP
    /// outcome within a bounded timeout.
    async fn test_connection(&self) -> ConnectionState;

    /// Fetch this backend's view as a snapshot.
    ///
    /// Probes first and returns `SourceError::Unavailable` immediately when
    /// not connected, so a backend known to be down never consumes the
    /// fetch timeout budget.
    async fn fetch_snapshot(&self) -> Result<DashboardSnapshot, SourceError>;
}

/// Delivery side of the ingestion pipeline — where freshly fetched mail is
/// forwarded for workflow processing.
///
/// De-duplication of records re-ingested across cycles is the target's
/// responsibility; the submit payload carries the stable provider message
/// id for exactly that purpose.
#[async_trait]
pub trait IngestTarget: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, record: &EmailRecord) -> Result<(), SourceError>;
}

/// Build an HTTP client with the given request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .expect("reqwest client")
}

/// Classify a probe response.
///
/// Transport failure or a non-2xx status is `Disconnected`. A 2xx whose
/// JSON body self-reports as unhealthy is `Degraded`; any other 2xx body
/// (including non-JSON) is `Connected` — transport-level classification
/// wins.
pub(crate) async fn classify_probe(
    result: Result<reqwest::Response, reqwest::Error>,
) -> ConnectionState {
    let response = match result {
        Ok(r) => r,
        Err(_) => return ConnectionState::Disconnected,
    };

    if !response.status().is_success() {
        return ConnectionState::Disconnected;
    }

    if let Ok(body) = response.json::<serde_json::Value>().await {
        let reported = body
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_lowercase();
        if reported == "unhealthy" || reported == "degraded" {
            return ConnectionState::Degraded;
        }
    }

    ConnectionState::Connected
}
