// Cron-driven sweeps
use anyhow::anyhow;
use config_engine::ScheduleConfig;
use preauth_engine::{PreauthOrchestrator, SweepKind};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

async fn run_sweep(orchestrator: &PreauthOrchestrator, kind: SweepKind) {
    let result = match kind {
        SweepKind::Retry => orchestrator.run_retry_sweep().await,
        SweepKind::Status => orchestrator.run_status_sweep().await,
        SweepKind::Expiry => orchestrator.run_expiry_sweep().await,
    };
    match result {
        Ok(report) => info!(
            sweep = ?kind,
            processed = report.processed,
            budget_exhausted = report.budget_exhausted,
            "Scheduled sweep completed"
        ),
        Err(e) => error!(sweep = ?kind, error = %e, "Scheduled sweep failed"),
    }
}

fn sweep_job(expression: &str, orchestrator: Arc<PreauthOrchestrator>, kind: SweepKind) -> anyhow::Result<Job> {
    Job::new_async(expression, move |_id, _scheduler| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move { run_sweep(&orchestrator, kind).await })
    })
    .map_err(|e| anyhow!("invalid {:?} sweep schedule '{}': {:?}", kind, expression, e))
}

/// Run all three sweeps on their cron expressions until Ctrl-C
pub async fn run(orchestrator: Arc<PreauthOrchestrator>, schedule: &ScheduleConfig) -> anyhow::Result<()> {
    let mut scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow!("creating scheduler: {:?}", e))?;

    for (expression, kind) in [
        (&schedule.retry_sweep, SweepKind::Retry),
        (&schedule.status_sweep, SweepKind::Status),
        (&schedule.expiry_sweep, SweepKind::Expiry),
    ] {
        let job = sweep_job(expression, orchestrator.clone(), kind)?;
        scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("scheduling {:?} sweep: {:?}", kind, e))?;
        info!(sweep = ?kind, cron = %expression, "Sweep scheduled");
    }

    scheduler
        .start()
        .await
        .map_err(|e| anyhow!("starting scheduler: {:?}", e))?;
    tokio::signal::ctrl_c().await?;
    info!("Shutting down scheduler");
    scheduler
        .shutdown()
        .await
        .map_err(|e| anyhow!("stopping scheduler: {:?}", e))?;
    Ok(())
}
