//! Request bridge: synchronous query/set over the miniport's asynchronous
//! completion protocol.
//!
//! Each adapter owns one `RequestSlot` per request kind. A slot is a single
//! state cell (`busy` gate, `done` flag, result) guarded by one mutex, with
//! one condition variable used both for "gate free" and "request done".
//!
//! ```text
//! caller                     miniport                 completion context
//!   │ acquire gate              │                            │
//!   │ clear done                │                            │
//!   │ query_information ───────►│                            │
//!   │◄────────────── PENDING    │                            │
//!   │ wait(done)                │ ...                        │
//!   │                           │ query_complete(status) ───►│ store, done, notify
//!   │◄────────────────────────────────────────────────────────┘
//!   │ release gate (guard drop)
//! ```

use ndis_common::miniport::{AdapterContext, InformationBuffer, Miniport};
use ndis_common::ndis::{Oid, Status};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use tracing::{debug, warn};

/// Request class; each has its own gate and completion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `query_information`
    Query,
    /// `set_information`
    Set,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Query => write!(f, "query"),
            RequestKind::Set => write!(f, "set"),
        }
    }
}

/// Result of a bridged request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    /// Final status (never `PENDING`).
    pub status: Status,
    /// Bytes written (query) or read (set) by the miniport.
    pub written: u32,
    /// Bytes the miniport needs when the buffer was too short.
    pub needed: u32,
    /// Buffer contents after the request.
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct SlotState {
    busy: bool,
    done: bool,
    result: Status,
    detached: bool,
}

/// Completion slot for one request kind.
pub struct RequestSlot {
    kind: RequestKind,
    state: Mutex<SlotState>,
    cond: Condvar,
}

/// Holds the slot's gate; releases it on drop.
struct GateGuard<'a> {
    slot: &'a RequestSlot,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.slot.state.lock();
        state.busy = false;
        drop(state);
        self.slot.cond.notify_all();
    }
}

impl RequestSlot {
    /// Create an idle slot.
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            state: Mutex::new(SlotState {
                busy: false,
                done: false,
                result: Status::SUCCESS,
                detached: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Request kind served by this slot.
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// True while a request of this kind is outstanding.
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    fn acquire(&self) -> GateGuard<'_> {
        let mut state = self.state.lock();
        while state.busy {
            self.cond.wait(&mut state);
        }
        state.busy = true;
        state.done = false;
        state.detached = false;
        GateGuard { slot: self }
    }

    fn try_acquire_detached(&self) -> bool {
        let mut state = self.state.lock();
        if state.busy {
            return false;
        }
        state.busy = true;
        state.done = false;
        state.detached = true;
        true
    }

    fn release_detached(&self) {
        let mut state = self.state.lock();
        if !state.detached {
            return;
        }
        state.busy = false;
        state.detached = false;
        drop(state);
        self.cond.notify_all();
    }

    fn wait_done(&self) -> Status {
        let mut state = self.state.lock();
        while !state.done {
            self.cond.wait(&mut state);
        }
        state.done = false;
        state.result
    }

    /// Completion callback body: store the result and wake the waiter.
    ///
    /// Never blocks beyond the slot's state lock. A completion for a detached
    /// request releases the gate instead.
    pub fn complete(&self, status: Status) {
        let mut state = self.state.lock();
        if !state.busy {
            drop(state);
            warn!("{} completion ({}) with no outstanding request", self.kind, status);
            return;
        }
        if state.detached {
            state.busy = false;
            state.detached = false;
            drop(state);
            debug!("detached {} completed with {}", self.kind, status);
            self.cond.notify_all();
            return;
        }
        state.result = status;
        state.done = true;
        drop(state);
        self.cond.notify_all();
    }
}

impl fmt::Debug for RequestSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSlot")
            .field("kind", &self.kind)
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Query and set slots of one adapter.
#[derive(Debug)]
pub struct RequestBridge {
    query: RequestSlot,
    set: RequestSlot,
}

impl Default for RequestBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBridge {
    /// Create a bridge with both slots idle.
    pub fn new() -> Self {
        Self {
            query: RequestSlot::new(RequestKind::Query),
            set: RequestSlot::new(RequestKind::Set),
        }
    }

    /// Slot serving `kind`.
    pub fn slot(&self, kind: RequestKind) -> &RequestSlot {
        match kind {
            RequestKind::Query => &self.query,
            RequestKind::Set => &self.set,
        }
    }

    /// Issue a request and block until it completes.
    ///
    /// Must only be called from a context that may block. At most one request
    /// per kind is outstanding; further callers wait for the gate.
    pub fn call(
        &self,
        miniport: &dyn Miniport,
        ctx: AdapterContext,
        kind: RequestKind,
        oid: Oid,
        data: Vec<u8>,
    ) -> RequestOutcome {
        let slot = self.slot(kind);
        let _gate = slot.acquire();

        let buffer = InformationBuffer::new(data);
        let status = match kind {
            RequestKind::Query => miniport.query_information(ctx, oid, &buffer),
            RequestKind::Set => miniport.set_information(ctx, oid, &buffer),
        };
        let status = if status.is_pending() {
            debug!("{} {} pending", kind, oid);
            slot.wait_done()
        } else {
            status
        };

        RequestOutcome {
            status,
            written: buffer.written(),
            needed: buffer.needed(),
            data: buffer.to_vec(),
        }
    }

    /// Fire-and-forget set. Never waits.
    ///
    /// Returns `None` when a set is already outstanding. On `PENDING` the gate
    /// stays held until `set_complete` arrives.
    pub fn set_detached(
        &self,
        miniport: &dyn Miniport,
        ctx: AdapterContext,
        oid: Oid,
        data: Vec<u8>,
    ) -> Option<Status> {
        if !self.set.try_acquire_detached() {
            debug!("set {} skipped, another set is outstanding", oid);
            return None;
        }
        let buffer = InformationBuffer::new(data);
        let status = miniport.set_information(ctx, oid, &buffer);
        if !status.is_pending() {
            self.set.release_detached();
        }
        Some(status)
    }
}
