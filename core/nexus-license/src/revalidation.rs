//! Periodic background revalidation.

use crate::error::LicenseError;
use crate::manager::LicenseManager;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handle to a running revalidation task. Dropping it cancels the task.
pub struct RevalidationHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RevalidationHandle {
    /// Stops the task after its current iteration.
    pub fn cancel(self) {
        drop(self);
    }

    /// Returns true once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RevalidationHandle {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawns a task that calls [`LicenseManager::revalidate_if_due`] every
/// `every`, starting immediately. The task holds only a weak reference and
/// exits when the manager is dropped or the handle is cancelled.
pub(crate) fn spawn(manager: Weak<LicenseManager>, every: Duration) -> RevalidationHandle {
    let (cancel, mut cancelled) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Revalidation task started (every {:?})", every);

        loop {
            tokio::select! {
                biased;
                changed = cancelled.changed() => {
                    if changed.is_err() || *cancelled.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let Some(manager) = manager.upgrade() else {
                break;
            };
            match manager.revalidate_if_due().await {
                Ok(Some(valid)) => info!("Scheduled revalidation finished (valid: {})", valid),
                Ok(None) => debug!("Revalidation not due"),
                Err(LicenseError::Superseded) => debug!("Scheduled revalidation superseded"),
                Err(e) => warn!("Scheduled revalidation failed: {}", e),
            }
        }
        debug!("Revalidation task stopped");
    });

    RevalidationHandle { cancel, task }
}
