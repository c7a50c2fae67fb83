//! Foreign driver contract.
//!
//! This module defines:
//! - `Miniport` trait - the per-driver entry point table
//! - `EntryPoints` bitflags - which optional entry points a driver provides
//! - `MiniportCallbacks` trait - completion and indication callbacks handed to
//!   the driver at initialization
//! - `InformationBuffer` - query/set payload shared with a pending driver
//! - `Packet` / `SendDisposition` - uniquely owned transmit descriptor
//! - `DriverEntry` / `ImageLoader` traits - image preparation and module entry
//!
//! # Completion protocol
//!
//! `query_information`, `set_information` and `reset` either finish in-line
//! (any status other than `Status::PENDING`) or return `Status::PENDING` and
//! later call the matching completion callback exactly once, from any thread.
//! A pending `send` keeps the packet and hands it back through
//! `MiniportCallbacks::send_complete`.

use crate::hardware::{DmaAddress, HardwareDevice};
use crate::ndis::{Oid, Status};
use crate::setting::{Setting, SettingValue, find_setting};
use bitflags::bitflags;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

bitflags! {
    /// Optional entry points advertised by a driver.
    ///
    /// Absent entry points are skipped silently by the wrapper.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntryPoints: u32 {
        /// Single-packet send.
        const SEND = 1 << 0;
        /// Batched send; preferred over `SEND` when both are present.
        const SEND_PACKETS = 1 << 1;
        /// Health check.
        const CHECK_FOR_HANG = 1 << 2;
        /// Hardware reset.
        const RESET = 1 << 3;
        /// Packets must be mapped for DMA before send.
        const SCATTER_GATHER = 1 << 4;
    }
}

/// Opaque adapter context token returned by `Miniport::initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterContext(pub u64);

#[derive(Debug, Default)]
struct InformationState {
    data: Vec<u8>,
    written: u32,
    needed: u32,
}

/// Payload of a query or set request.
///
/// Clones share the same storage so a driver that returns pending can keep a
/// clone and fill it in before calling the completion callback.
#[derive(Clone, Default)]
pub struct InformationBuffer {
    inner: Arc<Mutex<InformationState>>,
}

impl InformationBuffer {
    /// Buffer initialised with `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(InformationState {
                data,
                written: 0,
                needed: 0,
            })),
        }
    }

    /// Zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// Buffer size in bytes.
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    /// True when the buffer has no capacity.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    /// Little-endian `u32` at `offset`, if in range.
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let state = self.inner.lock();
        let bytes = state.data.get(offset..offset.checked_add(4)?)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Copy `bytes` to the start of the buffer and record them as written.
    ///
    /// Returns `Status::BUFFER_TOO_SHORT` and records the needed size when the
    /// buffer is too small.
    pub fn write(&self, bytes: &[u8]) -> Status {
        let mut state = self.inner.lock();
        if bytes.len() > state.data.len() {
            state.written = 0;
            state.needed = bytes.len() as u32;
            return Status::BUFFER_TOO_SHORT;
        }
        state.data[..bytes.len()].copy_from_slice(bytes);
        state.written = bytes.len() as u32;
        state.needed = 0;
        Status::SUCCESS
    }

    /// Record the byte count consumed by a set request.
    pub fn set_written(&self, written: u32) {
        self.inner.lock().written = written;
    }

    /// Record the byte count a request would need.
    pub fn set_needed(&self, needed: u32) {
        self.inner.lock().needed = needed;
    }

    /// Bytes written (query) or read (set) by the driver.
    pub fn written(&self) -> u32 {
        self.inner.lock().written
    }

    /// Bytes the driver needs to complete the request.
    pub fn needed(&self) -> u32 {
        self.inner.lock().needed
    }
}

impl fmt::Debug for InformationBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("InformationBuffer")
            .field("len", &state.data.len())
            .field("written", &state.written)
            .field("needed", &state.needed)
            .finish()
    }
}

/// Single DMA segment of a mapped packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterGatherElement {
    /// Bus address of the segment.
    pub address: DmaAddress,
    /// Segment length in bytes.
    pub length: u32,
}

/// Driver-facing transmit descriptor.
///
/// Not `Clone`: a packet is released exactly once, by whoever holds it last.
#[derive(Debug, PartialEq, Eq)]
pub struct Packet {
    sequence: u64,
    data: Vec<u8>,
    sg: Option<ScatterGatherElement>,
}

impl Packet {
    /// Wrap an owned payload tagged with its enqueue sequence number.
    pub fn new(sequence: u64, data: Vec<u8>) -> Self {
        Self {
            sequence,
            data,
            sg: None,
        }
    }

    /// Enqueue sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Frame bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Frame length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty frame.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// DMA segment, when the packet has been mapped.
    pub fn scatter_gather(&self) -> Option<ScatterGatherElement> {
        self.sg
    }

    /// Attach the DMA segment produced by mapping this packet.
    pub fn attach_dma(&mut self, element: ScatterGatherElement) {
        self.sg = Some(element);
    }

    /// Detach the DMA segment, leaving the packet unmapped.
    pub fn take_dma(&mut self) -> Option<ScatterGatherElement> {
        self.sg.take()
    }
}

/// Result of a single-packet send.
#[derive(Debug)]
pub enum SendDisposition {
    /// Send finished in-line; the packet comes back for release.
    Complete(Packet, Status),
    /// Driver kept the packet and will return it through `send_complete`.
    Pending,
}

/// Callbacks a driver uses to report asynchronous events.
///
/// Implementations never block.
pub trait MiniportCallbacks: Send + Sync {
    /// Pending query finished.
    fn query_complete(&self, status: Status);

    /// Pending set finished.
    fn set_complete(&self, status: Status);

    /// Pending send finished; ownership of the packet returns to the wrapper.
    fn send_complete(&self, packet: Packet, status: Status);

    /// Pending reset finished.
    fn reset_complete(&self, status: Status, addressing_reset: bool);

    /// Status indication such as `Status::MEDIA_CONNECT`.
    fn indicate_status(&self, status: Status);

    /// Received frame.
    fn indicate_receive(&self, frame: &[u8]);
}

/// Everything a driver receives at adapter initialization.
#[derive(Clone)]
pub struct MiniportHost {
    /// Bound hardware instance.
    pub device: HardwareDevice,
    /// Settings attached to the driver record.
    pub settings: Arc<[Setting]>,
    /// Completion callbacks for this adapter.
    pub callbacks: Arc<dyn MiniportCallbacks>,
}

impl MiniportHost {
    /// Read a driver setting; names match case-insensitively.
    pub fn read_setting(&self, name: &str) -> Option<&SettingValue> {
        find_setting(&self.settings, name)
    }
}

impl fmt::Debug for MiniportHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiniportHost")
            .field("device", &self.device)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Entry point table of a foreign driver.
///
/// One instance serves every adapter the driver binds; adapters are told
/// apart by the context returned from `initialize`.
pub trait Miniport: Send + Sync {
    /// Optional entry points this driver provides.
    fn entry_points(&self) -> EntryPoints;

    /// Initialize an adapter for `host.device`.
    fn initialize(&self, host: MiniportHost) -> Result<AdapterContext, Status>;

    /// Stop an adapter. No callbacks for `ctx` may run after this returns.
    fn halt(&self, ctx: AdapterContext);

    /// Read an OID into `buffer`.
    fn query_information(&self, ctx: AdapterContext, oid: Oid, buffer: &InformationBuffer)
    -> Status;

    /// Apply an OID from `buffer`.
    fn set_information(&self, ctx: AdapterContext, oid: Oid, buffer: &InformationBuffer)
    -> Status;

    /// Send one packet. Called only when `EntryPoints::SEND` is advertised.
    fn send(&self, _ctx: AdapterContext, packet: Packet) -> SendDisposition {
        SendDisposition::Complete(packet, Status::NOT_SUPPORTED)
    }

    /// Send a batch. Returns the packets that completed in-line; the rest
    /// come back through `send_complete`. Called only when
    /// `EntryPoints::SEND_PACKETS` is advertised.
    fn send_packets(&self, _ctx: AdapterContext, packets: Vec<Packet>) -> Vec<(Packet, Status)> {
        packets
            .into_iter()
            .map(|packet| (packet, Status::NOT_SUPPORTED))
            .collect()
    }

    /// True when the adapter is hung.
    fn check_for_hang(&self, _ctx: AdapterContext) -> bool {
        false
    }

    /// Reset the hardware.
    fn reset(&self, _ctx: AdapterContext) -> Status {
        Status::NOT_SUPPORTED
    }
}

/// Module entry routine of a prepared image.
pub trait DriverEntry: Send + Sync {
    /// Run the module entry routine and return the driver's entry points.
    fn call(&self) -> Result<Arc<dyn Miniport>, Status>;
}

/// Image preparation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// Image could not be parsed.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Image is valid but uses features the loader does not provide.
    #[error("Unsupported image: {0}")]
    Unsupported(String),
}

/// Parses and relocates a driver image, resolving its entry point.
pub trait ImageLoader: Send + Sync {
    /// Prepare `image` for execution.
    fn prepare_image(&self, image: &[u8]) -> Result<Arc<dyn DriverEntry>, LoaderError>;
}
