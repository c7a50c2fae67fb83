//! Self-rearming periodic timers.
//!
//! A timer firing only schedules a work item; the body runs on the adapter's
//! worker. `stop` joins the timer thread, so a stopped timer is never
//! mid-firing.

use crate::error::{Result, WrapperError};
use crate::work::{WorkItems, WorkQueue};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

#[derive(Debug)]
struct TimerThread {
    signal: Arc<StopSignal>,
    join: JoinHandle<()>,
}

/// Periodic timer scheduling one work item.
#[derive(Debug)]
pub struct PeriodicTimer {
    name: String,
    interval: Duration,
    fire_on_start: bool,
    item: WorkItems,
    work: Arc<WorkQueue>,
    fired: Arc<AtomicU64>,
    thread: Mutex<Option<TimerThread>>,
}

impl PeriodicTimer {
    /// Create a stopped timer.
    ///
    /// With `fire_on_start` the first firing happens as soon as the timer is
    /// started; otherwise after one interval.
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        fire_on_start: bool,
        item: WorkItems,
        work: Arc<WorkQueue>,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            fire_on_start,
            item,
            work,
            fired: Arc::new(AtomicU64::new(0)),
            thread: Mutex::new(None),
        }
    }

    /// Timer period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of firings since creation.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    /// True while the timer thread is alive.
    pub fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }

    /// Start the timer. Starting a running timer does nothing.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Ok(());
        }

        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let work = Arc::clone(&self.work);
        let fired = Arc::clone(&self.fired);
        let interval = self.interval;
        let item = self.item;
        let mut fire = self.fire_on_start;

        let join = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let mut stopped = thread_signal.stopped.lock();
                loop {
                    if *stopped {
                        break;
                    }
                    if fire {
                        fired.fetch_add(1, Ordering::Relaxed);
                        work.schedule(item);
                    }
                    fire = true;
                    let deadline = Instant::now() + interval;
                    while !*stopped {
                        if thread_signal
                            .cond
                            .wait_until(&mut stopped, deadline)
                            .timed_out()
                        {
                            break;
                        }
                    }
                }
            })
            .map_err(|_| WrapperError::ResourceExhausted {
                what: "timer thread",
            })?;

        debug!("timer {} started ({:?})", self.name, self.interval);
        *slot = Some(TimerThread { signal, join });
        Ok(())
    }

    /// Stop the timer and wait for its thread. Stopping a stopped timer does
    /// nothing.
    pub fn stop(&self) {
        let Some(timer) = self.thread.lock().take() else {
            return;
        };
        *timer.signal.stopped.lock() = true;
        timer.signal.cond.notify_all();
        if timer.join.join().is_err() {
            tracing::error!("timer {} thread panicked", self.name);
        }
        debug!("timer {} stopped", self.name);
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
