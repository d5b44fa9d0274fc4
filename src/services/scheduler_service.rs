use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use utoipa::ToSchema;

use crate::error::Result;
use crate::services::publication_service::{PublicationService, SweepReport};
use crate::utils::time::{self, Recurrence};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchedulerStatus {
    pub initialized: bool,
    pub running: bool,
    pub timezone: String,
    pub cron_expression: String,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub next_fire_description: Option<String>,
}

struct Inner {
    publication: PublicationService,
    recurrence: Recurrence,
    initialized: AtomicBool,
    jobs: Mutex<Option<JobScheduler>>,
}

/// Owned handle over the cron job that publishes scheduled content.
/// Clones share the same job.
#[derive(Clone)]
pub struct PublicationScheduler {
    inner: Arc<Inner>,
}

impl PublicationScheduler {
    pub fn new(publication: PublicationService, recurrence: Recurrence) -> Self {
        Self {
            inner: Arc::new(Inner {
                publication,
                recurrence,
                initialized: AtomicBool::new(false),
                jobs: Mutex::new(None),
            }),
        }
    }

    /// Registers the recurring job and runs one overdue sweep to recover
    /// anything missed while the process was down. Calling it on a running
    /// scheduler is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut jobs = self.inner.jobs.lock().await;
        if jobs.is_some() {
            tracing::warn!("Publication scheduler already running");
            return Ok(());
        }

        let recurrence = &self.inner.recurrence;
        let scheduler = JobScheduler::new().await?;
        let publication = self.inner.publication.clone();
        let job = Job::new_async_tz(
            recurrence.cron_expression().as_str(),
            recurrence.timezone,
            move |_id, _lock| {
                let publication = publication.clone();
                Box::pin(async move {
                    tracing::info!("Publication slot fired");
                    publication.run_slot(time::now()).await;
                })
            },
        )?;
        scheduler.add(job).await?;
        scheduler.start().await?;
        *jobs = Some(scheduler);
        drop(jobs);

        self.inner.initialized.store(true, Ordering::SeqCst);
        tracing::info!(
            schedule = %recurrence.describe(),
            cron = %recurrence.cron_expression(),
            "Publication scheduler started"
        );

        match self.inner.publication.sweep_overdue(time::now()).await {
            Ok(report) if !report.published.is_empty() => {
                tracing::info!(published = report.published.len(), "Recovered overdue items at startup");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = ?e, "Startup overdue sweep failed"),
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let scheduler = self.inner.jobs.lock().await.take();
        if let Some(mut scheduler) = scheduler {
            scheduler.shutdown().await?;
            tracing::info!("Publication scheduler stopped");
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.inner.jobs.lock().await.is_some()
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.status_at(time::now()).await
    }

    pub async fn status_at(&self, now: DateTime<Utc>) -> SchedulerStatus {
        let recurrence = &self.inner.recurrence;
        let running = self.is_running().await;
        let next_fire_at = if running {
            recurrence.next_fire_after(now)
        } else {
            None
        };
        SchedulerStatus {
            initialized: self.inner.initialized.load(Ordering::SeqCst),
            running,
            timezone: recurrence.timezone.name().to_string(),
            cron_expression: recurrence.cron_expression(),
            next_fire_description: next_fire_at
                .map(|at| time::format_local(at, &recurrence.timezone)),
            next_fire_at,
        }
    }

    /// Runs one slot immediately, outside the timer.
    pub async fn run_now(&self) -> SweepReport {
        tracing::info!("Manual publication run requested");
        self.inner.publication.run_slot(time::now()).await
    }
}
