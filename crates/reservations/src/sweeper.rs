//! Background sweep worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::manager::ReservationManager;

/// Periodic cart sweeper.
///
/// Runs `sweep_expired` on a fixed cadence from a dedicated thread.
/// `stop` is prompt: the loop sleeps in short slices and checks the
/// stop flag between them.
pub struct SweeperWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

const SLICE: Duration = Duration::from_millis(250);

impl SweeperWorker {
    pub fn spawn(manager: Arc<ReservationManager>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            info!(interval_secs = interval.as_secs(), "cart sweeper started");
            while !flag.load(Ordering::Relaxed) {
                match manager.sweep_expired(Utc::now()) {
                    Ok(report) if report.reclaimed > 0 => {
                        info!(
                            scanned = report.scanned,
                            reclaimed = report.reclaimed,
                            "sweep returned expired reservations to the pool"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "sweep pass failed"),
                }

                let mut slept = Duration::ZERO;
                while slept < interval && !flag.load(Ordering::Relaxed) {
                    let nap = SLICE.min(interval - slept);
                    thread::sleep(nap);
                    slept += nap;
                }
            }
            info!("cart sweeper stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the worker and wait for the current pass to finish.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweeperWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
