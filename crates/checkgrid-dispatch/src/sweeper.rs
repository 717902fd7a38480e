//! Periodic expiration sweep.
//!
//! Each tick expires silent nodes and then re-places whatever sits in the
//! unassigned pool, including configs freed by the same tick.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::dispatcher::Dispatcher;
use crate::error::DispatchResult;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Configs freed from expired nodes.
    pub freed: usize,
    /// Configs moved from the unassigned pool onto nodes.
    pub rescheduled: usize,
}

impl Dispatcher {
    /// Run one expiration + re-placement pass.
    pub fn sweep(&self) -> DispatchResult<SweepReport> {
        let freed = self.expire_nodes()?.len();
        let rescheduled = self.reschedule_unassigned()?;
        Ok(SweepReport { freed, rescheduled })
    }

    /// Sweep every `interval` until `shutdown` flips.
    ///
    /// A failed sweep is logged and the next tick runs as usual.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            timeout_secs = self.node_expiration_timeout().as_secs(),
            "dispatch sweeper started"
        );
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep() {
                        Ok(report) if report != SweepReport::default() => {
                            info!(freed = report.freed, rescheduled = report.rescheduled, "sweep completed");
                        }
                        Ok(_) => debug!("sweep completed, nothing to do"),
                        Err(e) if e.is_fault() => {
                            error!(error = %e, "sweep hit a store fault");
                        }
                        Err(e) => error!(error = %e, "sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("dispatch sweeper shutting down");
                    break;
                }
            }
        }
    }
}
