//! Background expiry sweeper
//!
//! Lazy expiry keeps acquisitions correct, but an expired entry whose key is
//! never touched again would live forever. The sweeper thread wakes on a
//! fixed cadence and calls [`Sweep::sweep_expired`] on every registered
//! subsystem so memory stays bounded without any further traffic.
//!
//! The thread is stopped and joined when the [`Sweeper`] is dropped.

use holdfast_concurrency::Sweep;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace};

#[derive(Debug, Default)]
struct Shutdown {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to the running sweeper thread
pub struct Sweeper {
    shutdown: Arc<Shutdown>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Sweeper {
    /// Start sweeping `targets` every `interval`
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(interval: Duration, targets: Vec<Arc<dyn Sweep>>) -> std::io::Result<Self> {
        let shutdown = Arc::new(Shutdown::default());
        let thread_shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("holdfast-sweeper".into())
            .spawn(move || run(interval, &thread_shutdown, &targets))?;

        info!(interval_ms = interval.as_millis() as u64, "expiry sweeper started");
        Ok(Self {
            shutdown,
            handle: Some(handle),
            interval,
        })
    }

    /// Sweep cadence
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        {
            let mut stopped = self.shutdown.stopped.lock();
            *stopped = true;
            self.shutdown.wake.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("expiry sweeper stopped");
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("interval", &self.interval)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

fn run(interval: Duration, shutdown: &Shutdown, targets: &[Arc<dyn Sweep>]) {
    loop {
        {
            let mut stopped = shutdown.stopped.lock();
            if *stopped {
                return;
            }
            shutdown.wake.wait_for(&mut stopped, interval);
            if *stopped {
                return;
            }
        }

        for target in targets {
            let removed = target.sweep_expired();
            if removed > 0 {
                debug!(target = target.name(), removed, "swept expired entries");
            } else {
                trace!(target = target.name(), "nothing to sweep");
            }
        }
    }
}
