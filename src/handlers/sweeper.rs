use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::handlers::SessionRegistry;

/// Every five minutes, at second zero.
pub const DEFAULT_SWEEP_SCHEDULE: &str = "0 */5 * * * *";

pub struct SessionSweeper {
    registry: Arc<SessionRegistry>,
    idle_timeout: chrono::Duration,
    scheduler: JobScheduler,
}

impl SessionSweeper {
    pub async fn new(registry: Arc<SessionRegistry>, idle_timeout: chrono::Duration) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            registry,
            idle_timeout,
            scheduler,
        })
    }

    pub async fn start(&mut self, schedule: &str) -> Result<()> {
        let registry = self.registry.clone();
        let idle_timeout = self.idle_timeout;

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let registry = registry.clone();

            Box::pin(async move {
                let removed = registry.sweep_idle(idle_timeout);
                log::debug!("✅ Idle session sweep completed ({} removed)", removed);
            })
        })?;

        self.scheduler.add(job).await?;
        self.scheduler.start().await?;

        log::info!(
            "✅ Session sweeper started (idle timeout: {} min, schedule: '{}')",
            self.idle_timeout.num_minutes(),
            schedule
        );
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        log::info!("Session sweeper stopped");
        Ok(())
    }
}
