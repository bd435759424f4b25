//! BotLocal Background Worker
//!
//! The external scheduler next to the event pipeline. Scheduled jobs:
//! - Monthly message counter reset (1st of month, 00:05 UTC)
//! - Notification retention cleanup (daily at 3:00 AM UTC, 30 day window)
//! - Stuck payment event sweep (hourly, operator visibility only)
//! - Health check heartbeat (every 5 minutes)

use std::time::Duration;

use sqlx::PgPool;
use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use botlocal_shared::create_pool;

/// Payment events stuck in `processing` longer than this are reported.
/// Matches the billing claim timeout so the sweep never flags rows the
/// handler would still consider live.
const STUCK_EVENT_MINUTES: i32 = 30;

async fn create_db_pool() -> anyhow::Result<PgPool> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    Ok(create_pool(&database_url).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting BotLocal Worker");

    let pool = create_db_pool().await?;

    let scheduler = JobScheduler::new().await?;

    // Job 1: Reset monthly message counters (1st of month at 00:05 UTC).
    // This is the billing-period rollover the pipeline relies on; the
    // counter itself is only ever incremented atomically by the pipeline.
    let reset_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 5 0 1 * *", move |_uuid, _l| {
            let pool = reset_pool.clone();
            Box::pin(async move {
                info!("Running monthly message counter reset");
                match sqlx::query(
                    "UPDATE businesses SET message_count = 0, updated_at = NOW() WHERE message_count > 0",
                )
                .execute(&pool)
                .await
                {
                    Ok(result) => info!(
                        businesses = result.rows_affected(),
                        "Monthly message counters reset"
                    ),
                    Err(e) => error!(error = %e, "Monthly counter reset failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Monthly message counter reset (1st at 00:05 UTC)");

    // Job 2: Delete notifications older than 30 days (daily at 3:00 AM UTC)
    let cleanup_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let pool = cleanup_pool.clone();
            Box::pin(async move {
                info!("Running notification cleanup");
                match sqlx::query(
                    "DELETE FROM notifications WHERE created_at < NOW() - INTERVAL '30 days'",
                )
                .execute(&pool)
                .await
                {
                    Ok(result) => {
                        info!(deleted = result.rows_affected(), "Notification cleanup complete")
                    }
                    Err(e) => error!(error = %e, "Notification cleanup failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Notification cleanup (daily at 3:00 AM UTC)");

    // Job 3: Report payment events stuck in 'processing' (hourly).
    // The webhook handler re-claims these on redelivery; this job only
    // surfaces them for operators in case Stripe has stopped retrying.
    let stuck_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let pool = stuck_pool.clone();
            Box::pin(async move {
                let stuck: Vec<(Uuid, String, String, OffsetDateTime)> = sqlx::query_as(
                    r#"
                    SELECT id, stripe_event_id, event_type, processing_started_at
                    FROM payment_events
                    WHERE status = 'processing'
                      AND processing_started_at < NOW() - ($1 * INTERVAL '1 minute')
                    ORDER BY processing_started_at
                    LIMIT 100
                    "#,
                )
                .bind(STUCK_EVENT_MINUTES)
                .fetch_all(&pool)
                .await
                .unwrap_or_default();

                if stuck.is_empty() {
                    return;
                }

                warn!(count = stuck.len(), "Payment events stuck in processing");
                for (id, stripe_event_id, event_type, started_at) in stuck {
                    warn!(
                        id = %id,
                        stripe_event_id = %stripe_event_id,
                        event_type = %event_type,
                        processing_started_at = %started_at,
                        "Stuck payment event - will be re-claimed on provider redelivery"
                    );
                }
            })
        })?)
        .await?;
    info!("Scheduled: Stuck payment event sweep (hourly)");

    // Job 4: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("BotLocal Worker started successfully with {} scheduled jobs", 4);

    // Keep the main task running; the scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
