//! Proactive session renewal

use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};

use crate::{error::ClientError, session::SessionManager};

/// Refreshes the session on a fixed interval while signed in
pub struct RefreshScheduler {
    scheduler: JobScheduler,
    interval: Duration,
}

impl RefreshScheduler {
    /// Start renewing `session` every `interval`. Ticks while signed out are
    /// skipped.
    pub async fn start(session: SessionManager, interval: Duration) -> Result<Self, ClientError> {
        let scheduler = JobScheduler::new().await?;

        let job = Job::new_repeated_async(interval, move |_, _| {
            let session = session.clone();
            Box::pin(async move {
                if !session.is_authenticated() {
                    debug!("Skipping scheduled refresh, no active session");
                    return;
                }

                match session.refresh().await {
                    Ok(renewed) => info!(
                        "Scheduled refresh succeeded, session valid until {}",
                        renewed.expires_at
                    ),
                    Err(e) => warn!("Scheduled refresh failed: {}", e),
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Started session refresh scheduler every {:?}", interval);
        Ok(Self {
            scheduler,
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the scheduler, e.g. on logout or application exit.
    pub async fn shutdown(mut self) -> Result<(), ClientError> {
        self.scheduler.shutdown().await?;
        info!("Stopped session refresh scheduler");
        Ok(())
    }
}
