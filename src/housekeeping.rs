//! Scheduled retention sweep.
//!
//! [`RetentionJob`] deletes records older than the configured retention
//! period once at startup and then on a fixed interval. A failed sweep is
//! logged and retried on the next tick; it never stops the daemon.

use std::time::Duration;

use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::storage::StorageAdmin;

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum HousekeepingError {
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Run one sweep, returning the number of deleted records.
///
/// Errors are logged here; `None` means the sweep failed.
pub async fn run_sweep(admin: &StorageAdmin, retention_days: u32) -> Option<u64> {
    match admin.apply_retention(retention_days).await {
        Ok(deleted) => {
            if deleted > 0 {
                tracing::info!(deleted, retention_days, "Retention sweep removed old logs");
            }
            Some(deleted)
        }
        Err(e) => {
            tracing::warn!(error = %e, retention_days, "Retention sweep failed");
            None
        }
    }
}

/// Periodic retention sweep backed by `tokio-cron-scheduler`.
pub struct RetentionJob {
    scheduler: JobScheduler,
    admin: StorageAdmin,
    retention_days: u32,
    interval: Duration,
    job_id: Option<uuid::Uuid>,
}

impl std::fmt::Debug for RetentionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionJob")
            .field("retention_days", &self.retention_days)
            .field("interval", &self.interval)
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

impl RetentionJob {
    pub async fn new(
        admin: StorageAdmin,
        retention_days: u32,
        interval: Duration,
    ) -> Result<Self, HousekeepingError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| HousekeepingError::Scheduler(e.to_string()))?;

        Ok(Self {
            scheduler,
            admin,
            retention_days,
            interval,
            job_id: None,
        })
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Sweep once, then register the repeating job and start the scheduler.
    pub async fn start(&mut self) -> Result<(), HousekeepingError> {
        run_sweep(&self.admin, self.retention_days).await;

        if self.job_id.is_none() {
            let job = self.create_job()?;
            let job_id = self
                .scheduler
                .add(job)
                .await
                .map_err(|e| HousekeepingError::Scheduler(e.to_string()))?;
            self.job_id = Some(job_id);
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| HousekeepingError::Scheduler(e.to_string()))?;

        tracing::info!(
            retention_days = self.retention_days,
            interval = %humantime::format_duration(self.interval),
            "Retention sweep scheduled"
        );
        Ok(())
    }

    /// Stop the scheduler, waiting at most [`DEFAULT_SHUTDOWN_TIMEOUT`].
    pub async fn shutdown(mut self) -> Result<(), HousekeepingError> {
        match tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, self.scheduler.shutdown()).await {
            Ok(Ok(())) => {
                tracing::info!("Retention scheduler stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(HousekeepingError::Scheduler(e.to_string())),
            Err(_) => {
                tracing::warn!("Retention scheduler shutdown timed out");
                Ok(())
            }
        }
    }

    fn create_job(&self) -> Result<Job, HousekeepingError> {
        let admin = self.admin.clone();
        let retention_days = self.retention_days;

        Job::new_repeated_async(self.interval, move |_: uuid::Uuid, _: JobScheduler| {
            let admin = admin.clone();
            Box::pin(async move {
                run_sweep(&admin, retention_days).await;
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        })
        .map_err(|e| HousekeepingError::Scheduler(e.to_string()))
    }
}
