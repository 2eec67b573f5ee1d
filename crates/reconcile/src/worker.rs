//! Background reconciliation worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::service::{ReconcileError, Reconciler};

/// Periodic reconciliation driver.
///
/// Runs one lock-guarded cycle per interval from a dedicated thread.
/// Lock contention is the quiet normal case when several instances
/// share a cluster; Ledger outages are logged and retried next tick.
pub struct ReconcileWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

const SLICE: Duration = Duration::from_millis(250);

impl ReconcileWorker {
    pub fn spawn(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            info!(
                interval_secs = interval.as_secs(),
                owner = %reconciler.owner(),
                "reconciliation worker started"
            );
            while !flag.load(Ordering::Relaxed) {
                match reconciler.run_cycle(Utc::now()) {
                    Ok(report) if report.overridden > 0 || report.flagged > 0 => {
                        info!(
                            visited = report.visited,
                            overridden = report.overridden,
                            flagged = report.flagged,
                            "reconciliation corrected drift"
                        );
                    }
                    Ok(_) => {}
                    Err(ReconcileError::LockContention) => {
                        debug!("reconciliation lock held elsewhere, skipping cycle");
                    }
                    Err(ReconcileError::LedgerUnavailable(msg)) => {
                        warn!(error = %msg, "ledger unreachable, will retry next interval");
                    }
                    Err(e) => error!(error = %e, "reconciliation cycle failed"),
                }

                let mut slept = Duration::ZERO;
                while slept < interval && !flag.load(Ordering::Relaxed) {
                    let nap = SLICE.min(interval - slept);
                    thread::sleep(nap);
                    slept += nap;
                }
            }
            info!("reconciliation worker stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the worker and wait for the in-flight cycle to finish.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReconcileWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
