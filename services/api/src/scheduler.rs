use chrono::Utc;
use counsel_flow::workflows::automation::{
    AutomationService, MessageSender, RecordStore, SnapshotFilter, TextGenerator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Spawns the background loop that runs every pass once per `every`.
pub(crate) fn spawn_scheduler<S, M, G>(
    service: Arc<AutomationService<S, M, G>>,
    every: Duration,
) -> JoinHandle<()>
where
    S: RecordStore + 'static,
    M: MessageSender + 'static,
    G: TextGenerator + 'static,
{
    info!(interval_secs = every.as_secs(), "automation scheduler started");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            run_tick(&service).await;
        }
    })
}

pub(crate) async fn run_tick<S, M, G>(service: &AutomationService<S, M, G>)
where
    S: RecordStore + 'static,
    M: MessageSender + 'static,
    G: TextGenerator + 'static,
{
    match service.run_all(&SnapshotFilter::default(), Utc::now()).await {
        Ok(reports) => {
            let errors: u32 = reports.iter().map(|report| report.summary.errors).sum();
            info!(passes = reports.len(), errors, "scheduled automation tick finished");
        }
        Err(err) => warn!(error = %err, "scheduled automation tick aborted"),
    }
}
