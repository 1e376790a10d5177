//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring daily ingestion run.

use std::sync::Arc;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;

use nicheprobe_core::{AppConfig, ScoringConfig};
use nicheprobe_pipeline::RunOptions;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_daily_run_job(&scheduler, pool, config).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the daily ingestion run at 03:00 UTC.
///
/// The probe is a batch system on a 24–48 h cadence; one scheduled run per
/// day keeps snapshot history and the shortlist current without burning the
/// token budget.
async fn register_daily_run_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 0 3 * * *", move |_uuid, _lock| {
        let pool = pool.clone();
        let config = Arc::clone(&config);

        Box::pin(async move {
            tracing::info!("scheduler: starting daily ingestion run");
            let scoring_config = ScoringConfig::default();
            match nicheprobe_pipeline::execute_run(
                &pool,
                &config,
                &scoring_config,
                RunOptions::default(),
                CancellationToken::new(),
            )
            .await
            {
                Ok(report) => {
                    tracing::info!(
                        run_id = %report.run_id,
                        status = %report.status,
                        asins_total = report.asins_total,
                        "scheduler: daily run finished"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "scheduler: daily run failed to start");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
