//! Scheduled trash purge.
//!
//! Runs the retention sweep on a fixed interval, independent of any
//! per-user request. The first sweep fires immediately on spawn.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::service::VaultService;

/// Periodic purge sweep runner.
pub struct PurgeScheduler {
    interval: Duration,
}

impl PurgeScheduler {
    /// Create a scheduler with a custom sweep interval.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Daily sweep, the production default.
    pub fn daily() -> Self {
        Self::new(Duration::from_secs(24 * 3600))
    }

    /// Spawn the background sweep task.
    pub fn spawn(self, service: Arc<VaultService>) -> PurgeSchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(interval_secs = self.interval.as_secs(), "Purge scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match service.purge_expired_trash().await {
                            Ok(outcome) => {
                                if outcome.deleted_count > 0 {
                                    info!(
                                        deleted_count = outcome.deleted_count,
                                        files_deleted = outcome.files_deleted,
                                        "Scheduled purge sweep completed"
                                    );
                                }
                            }
                            Err(err) => error!(error = %err, "Scheduled purge sweep failed"),
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Purge scheduler stopped");
                        break;
                    }
                }
            }
        });

        PurgeSchedulerHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle for stopping the sweep task.
pub struct PurgeSchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PurgeSchedulerHandle {
    /// Stop the scheduler and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{service_fixture, uid, uploaded_file};
    use chrono::Utc;

    #[tokio::test]
    async fn test_scheduler_sweeps_expired_trash() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let file_id = uploaded_file(&fx, &user, "old.txt").await;
        fx.service.soft_delete(&user, &file_id).await.unwrap();
        let mut item = fx.service.repo.require_item(&file_id).await.unwrap();
        item.deleted_at = Some(Utc::now() - chrono::Duration::days(31));
        fx.service.repo.put_item(&item).await.unwrap();

        let service = Arc::new(fx.service);
        let handle = PurgeScheduler::new(Duration::from_secs(3600)).spawn(service.clone());

        // The first tick fires immediately; give it a moment to run.
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().await;

        assert!(service.repo.get_item(&file_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_task() {
        let fx = service_fixture().await;
        let handle =
            PurgeScheduler::new(Duration::from_secs(3600)).spawn(Arc::new(fx.service));
        handle.shutdown().await;
    }
}
