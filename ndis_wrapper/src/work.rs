//! Per-adapter deferred-work queue.
//!
//! Scheduling the same item twice before the worker picks it up runs it once.
//! One worker thread consumes the queue; item handlers never block on the
//! request bridge except through detached sets.

use crate::error::{Result, WrapperError};
use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

bitflags! {
    /// Work items the worker can be asked to run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WorkItems: u32 {
        /// Drain the transmit queue.
        const XMIT = 1 << 0;
        /// Trigger a BSSID scan.
        const SCAN = 1 << 1;
        /// Run the hang check.
        const HANGCHECK = 1 << 2;
    }
}

#[derive(Debug)]
struct WorkState {
    pending: WorkItems,
    running: bool,
    shutdown: bool,
}

/// Coalescing work queue.
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<WorkState>,
    cond: Condvar,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkState {
                pending: WorkItems::empty(),
                running: false,
                shutdown: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Schedule `items`. Returns false once the queue is shut down.
    pub fn schedule(&self, items: WorkItems) -> bool {
        let mut state = self.state.lock();
        if state.shutdown {
            return false;
        }
        state.pending |= items;
        drop(state);
        self.cond.notify_all();
        true
    }

    /// Block until work is pending; `None` after shutdown.
    fn next(&self) -> Option<WorkItems> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if !state.pending.is_empty() {
                let items = state.pending;
                state.pending = WorkItems::empty();
                state.running = true;
                return Some(items);
            }
            self.cond.wait(&mut state);
        }
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        state.running = false;
        drop(state);
        self.cond.notify_all();
    }

    /// Block until nothing is pending or running.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        while !state.shutdown && (state.running || !state.pending.is_empty()) {
            self.cond.wait(&mut state);
        }
    }

    /// Stop accepting work and discard what is pending. The worker exits
    /// after the item it is running, if any.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        state.pending = WorkItems::empty();
        drop(state);
        self.cond.notify_all();
    }

    /// True after `shutdown`.
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}

/// Spawn the worker thread consuming `queue`.
pub fn spawn_worker<F>(name: String, queue: Arc<WorkQueue>, mut handler: F) -> Result<JoinHandle<()>>
where
    F: FnMut(WorkItems) + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            debug!("worker {} started", name);
            while let Some(items) = queue.next() {
                handler(items);
                queue.finish();
            }
            debug!("worker {} stopped", name);
        })
        .map_err(|_| WrapperError::ResourceExhausted {
            what: "worker thread",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_schedule_coalesces() {
        let queue = WorkQueue::new();
        assert!(queue.schedule(WorkItems::XMIT));
        assert!(queue.schedule(WorkItems::XMIT | WorkItems::SCAN));
        assert_eq!(queue.next(), Some(WorkItems::XMIT | WorkItems::SCAN));
        queue.finish();
    }

    #[test]
    fn test_shutdown_discards_pending() {
        let queue = WorkQueue::new();
        queue.schedule(WorkItems::HANGCHECK);
        queue.shutdown();
        assert!(queue.is_shutdown());
        assert!(!queue.schedule(WorkItems::XMIT));
        assert_eq!(queue.next(), None);
    }

    #[test]
    fn test_worker_runs_and_flushes() {
        let queue = Arc::new(WorkQueue::new());
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let worker = spawn_worker("test-worker".to_string(), Arc::clone(&queue), move |items| {
            if items.contains(WorkItems::XMIT) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        queue.schedule(WorkItems::XMIT);
        queue.flush();
        assert!(runs.load(Ordering::SeqCst) >= 1);

        queue.shutdown();
        worker.join().unwrap();
    }
}
