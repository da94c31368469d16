//! Ingest scheduler — the background loop that polls the mailbox and
//! forwards fresh records to the ingestion target.
//!
//! One cycle = fetch from the `MailSource`, then submit each record to the
//! `IngestTarget`. The loop runs its first cycle immediately, then waits a
//! fixed interval; a failed cycle logs and retries after a short backoff
//! instead of stopping. `stop()` lets the in-flight cycle finish but is
//! observed between per-message submissions, so a message is never
//! partially ingested.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{CredentialError, MailError};
use crate::gmail::source::{FetchQuery, MailSource};
use crate::sources::IngestTarget;

/// Result of one synchronous ingestion trigger.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub success: bool,
    pub processed_count: u32,
    pub failed_count: u32,
}

/// Scheduler status for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub cycle_count: u64,
}

#[derive(Debug, Default)]
struct CycleStats {
    last_run_at: Option<DateTime<Utc>>,
    cycle_count: u64,
}

#[derive(Debug, Default)]
struct CycleReport {
    processed: u32,
    failed: u32,
}

/// Owns the polling loop and its run/stop state.
///
/// At most one loop runs per scheduler: a second `start()` is a logged
/// no-op, which prevents duplicate ingestion of the same mail window.
pub struct IngestScheduler {
    mail: Arc<dyn MailSource>,
    target: Arc<dyn IngestTarget>,
    query: FetchQuery,
    config: SchedulerConfig,
    running: AtomicBool,
    shutdown: AtomicBool,
    stats: Mutex<CycleStats>,
}

impl IngestScheduler {
    pub fn new(
        mail: Arc<dyn MailSource>,
        target: Arc<dyn IngestTarget>,
        query: FetchQuery,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            mail,
            target,
            query,
            config,
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            stats: Mutex::new(CycleStats::default()),
        }
    }

    /// Spawn the background polling loop.
    ///
    /// Returns `false` (and starts nothing) if the loop is already
    /// running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Ingest scheduler already running");
            return false;
        }
        self.shutdown.store(false, Ordering::SeqCst);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_loop().await;
        });
        true
    }

    /// Signal the loop to stop. The in-flight cycle is allowed to finish;
    /// no new cycle starts.
    pub fn stop(&self) {
        info!("Ingest scheduler stop requested");
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Current loop state and cycle counters.
    pub fn status(&self) -> SchedulerStatus {
        let stats = self.stats.lock().expect("scheduler stats lock");
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            last_run_at: stats.last_run_at,
            cycle_count: stats.cycle_count,
        }
    }

    /// Run one real ingestion cycle synchronously, on the caller's path,
    /// independent of the scheduled loop.
    ///
    /// Reports real counts — never fabricated success. `CredentialError`
    /// is the only failure that surfaces hard; anything else becomes
    /// `success: false`.
    pub async fn trigger_now(&self) -> Result<IngestOutcome, CredentialError> {
        match self.run_cycle_bounded().await {
            Ok(report) => Ok(IngestOutcome {
                success: true,
                processed_count: report.processed,
                failed_count: report.failed,
            }),
            Err(MailError::Credentials(e)) => Err(e),
            Err(e) => {
                error!("Triggered ingest cycle failed: {e}");
                Ok(IngestOutcome {
                    success: false,
                    processed_count: 0,
                    failed_count: 0,
                })
            }
        }
    }

    async fn run_loop(&self) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "Ingest scheduler started"
        );

        // First cycle runs immediately, no initial delay.
        while !self.shutdown.load(Ordering::SeqCst) {
            let wait = match self.run_cycle_bounded().await {
                Ok(report) => {
                    info!(
                        processed = report.processed,
                        failed = report.failed,
                        "Ingest cycle complete"
                    );
                    self.config.poll_interval
                }
                Err(e) => {
                    error!("Ingest cycle failed, backing off: {e}");
                    self.config.error_backoff
                }
            };

            self.sleep_observing_shutdown(wait).await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Ingest scheduler stopped");
    }

    /// Sleep in short slices so a stop request does not have to wait out
    /// the full poll interval.
    async fn sleep_observing_shutdown(&self, wait: std::time::Duration) {
        let tick = wait.min(std::time::Duration::from_secs(1));
        let mut slept = std::time::Duration::ZERO;
        while slept < wait && !self.shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(tick).await;
            slept += tick;
        }
    }

    /// One cycle under the hard cycle timeout.
    async fn run_cycle_bounded(&self) -> Result<CycleReport, MailError> {
        let report = tokio::time::timeout(self.config.cycle_timeout, self.run_cycle())
            .await
            .map_err(|_| MailError::ListFailed {
                reason: format!(
                    "cycle exceeded {}s timeout",
                    self.config.cycle_timeout.as_secs()
                ),
            })??;

        let mut stats = self.stats.lock().expect("scheduler stats lock");
        stats.last_run_at = Some(Utc::now());
        stats.cycle_count += 1;

        Ok(report)
    }

    async fn run_cycle(&self) -> Result<CycleReport, MailError> {
        let batch = self.mail.fetch(&self.query).await?;

        let mut report = CycleReport {
            processed: 0,
            failed: batch.failed,
        };

        for record in &batch.records {
            // Safe checkpoint: a stop request is honored between messages,
            // never mid-message.
            if self.shutdown.load(Ordering::SeqCst) {
                info!(
                    submitted = report.processed,
                    "Stop observed mid-cycle, deferring remaining messages"
                );
                break;
            }

            match self.target.submit(record).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!(email_id = %record.id, "Failed to submit record: {e}");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
