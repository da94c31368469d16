use std::sync::Arc;

use inbox_monitor::aggregator::SourceAggregator;
use inbox_monitor::config::{
    GmailConfig, ReviewQueueConfig, SchedulerConfig, TraceConfig, WorkflowConfig,
};
use inbox_monitor::gmail::source::{FetchQuery, GmailSource};
use inbox_monitor::scheduler::IngestScheduler;
use inbox_monitor::sources::{
    BackendSource, ReviewQueueSource, TraceServiceSource, WorkflowPlatformSource,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    eprintln!("📬 Inbox Monitor v{}", env!("CARGO_PKG_VERSION"));

    // ── Dashboard sources, in fallback priority order ────────────────
    let review_queue_config = ReviewQueueConfig::from_env();
    let mut sources: Vec<Arc<dyn BackendSource>> = Vec::new();

    if let Some(config) = review_queue_config.clone() {
        eprintln!("   Review queue: {}", config.base_url);
        sources.push(Arc::new(ReviewQueueSource::new(config)));
    }
    if let Some(config) = WorkflowConfig::from_env() {
        eprintln!("   Workflow platform: {} (graph {})", config.endpoint, config.graph_id);
        sources.push(Arc::new(WorkflowPlatformSource::new(config)));
    }
    if let Some(config) = TraceConfig::from_env() {
        eprintln!("   Trace service: {} (project {})", config.endpoint, config.project);
        sources.push(Arc::new(TraceServiceSource::new(config)));
    }
    if sources.is_empty() {
        eprintln!("   No dashboard sources configured; snapshots will be empty");
    }

    let aggregator = Arc::new(SourceAggregator::new(sources));

    for (name, state) in aggregator.connection_states().await {
        tracing::info!(source = %name, state = ?state, "Initial backend probe");
    }

    // ── Ingest scheduler ─────────────────────────────────────────────
    // Needs both a mailbox to read from and a review queue to write to.
    let scheduler = match (GmailConfig::from_env(), review_queue_config) {
        (Some(gmail_config), Some(queue_config)) => {
            let scheduler_config = SchedulerConfig::from_env();
            eprintln!(
                "   Ingestion: {} (every {}s)\n",
                gmail_config.address,
                scheduler_config.poll_interval.as_secs()
            );
            let query = FetchQuery::from_config(&gmail_config);
            let scheduler = Arc::new(IngestScheduler::new(
                Arc::new(GmailSource::new(gmail_config)),
                Arc::new(ReviewQueueSource::new(queue_config)),
                query,
                scheduler_config,
            ));
            scheduler.start();
            Some(scheduler)
        }
        (None, _) => {
            eprintln!("   Ingestion: disabled (INGEST_EMAIL_ADDRESS not set)\n");
            None
        }
        (_, None) => {
            eprintln!("   Ingestion: disabled (REVIEW_QUEUE_URL not set)\n");
            None
        }
    };

    // Periodic snapshot logging until shutdown.
    let snapshot_aggregator = Arc::clone(&aggregator);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let snapshot = snapshot_aggregator.get_snapshot().await;
            tracing::info!(
                source = %snapshot.source_used,
                state = ?snapshot.connection_state,
                emails = snapshot.statistics.total,
                waiting = snapshot.statistics.waiting_action,
                hitl = snapshot.statistics.hitl,
                "Dashboard snapshot"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    if let Some(scheduler) = scheduler {
        scheduler.stop();
    }

    Ok(())
}
