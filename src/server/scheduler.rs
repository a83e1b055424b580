//! Running validations on a schedule.

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use crate::commons::error::Error;
use crate::commons::ValidatorEmptyResult;
use crate::validation::locator::TrustAnchorLocator;
use super::ValidatorServer;
use super::anchors::AnchorStatus;


//------------ Scheduler -----------------------------------------------------

/// Starts validation runs for trust anchors when they are due.
///
/// Every run happens on its own blocking task, so a slow repository of
/// one anchor never holds up another.
pub struct Scheduler {
    server: Arc<ValidatorServer>,
    tick: Duration,
}

impl Scheduler {
    pub fn new(server: Arc<ValidatorServer>) -> Self {
        let tick = server.config().scheduler_tick();
        Scheduler { server, tick }
    }

    /// Runs until interrupted with Ctrl-C.
    pub async fn run(&self) -> ValidatorEmptyResult {
        if !self.server.image().has_enabled_anchors() {
            warn!("No trust anchors are enabled, nothing will be validated");
        }

        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => self.start_due(),
                res = tokio::signal::ctrl_c() => {
                    res.map_err(|err| {
                        Error::io_error_with_context(
                            "Cannot listen for shutdown signal".into(), err
                        )
                    })?;
                    info!("Shutting down");
                    return Ok(())
                }
            }
        }
    }

    fn start_due(&self) {
        let due = self.server.image().snapshot().due(Utc::now());
        if due.is_empty() {
            return
        }
        debug!("{} trust anchor(s) due for validation", due.len());
        for locator in due {
            // The handle is dropped, the run reports through the image.
            let _ = self.spawn(locator);
        }
    }

    /// Runs every enabled trust anchor once and waits for all of them.
    ///
    /// Returns the status of all anchors afterwards.
    pub async fn run_once(&self) -> Vec<AnchorStatus> {
        let handles: Vec<_> = self.server.image().snapshot().anchors().iter()
            .filter(|anchor| anchor.enabled())
            .map(|anchor| self.spawn(anchor.locator().clone()))
            .collect();
        for handle in handles {
            if let Err(err) = handle.await {
                error!("Validation task failed: {err}");
            }
        }
        self.server.image().snapshot().status()
    }

    fn spawn(&self, locator: Arc<TrustAnchorLocator>) -> JoinHandle<()> {
        let server = self.server.clone();
        tokio::task::spawn_blocking(move || {
            // Failures are recorded in the registry by the tracking layer.
            let _ = server.validate(locator);
        })
    }
}
