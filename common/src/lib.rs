#![no_std]

//! Shared definitions for the Talos DSP firmware
//!
//! This crate pins down everything the firmware shares with the outside
//! world: the byte layout of the diagnostic record the host polls, the
//! mailbox geometry, and the status/error vocabulary of the dispatch
//! engine seam. No implementation logic belongs here - only definitions.

/// Wire contract of the shared diagnostic record.
///
/// The host log reader addresses this record by these offsets; field
/// order and sizes are frozen. All fields are naturally aligned
/// little-endian `u32` words, followed by the payload byte region.
pub mod channel {
    /// Physical base address of the shared diagnostic region.
    pub const BASE: usize = 0x8b30_0000;

    /// Total size of the shared region, header included.
    pub const REGION_SIZE: usize = 0x1000;

    /// Header size in bytes; the payload region starts here.
    pub const HEADER_SIZE: usize = 64;

    /// Ring capacity in bytes. At most `CAPACITY - 1` bytes are ever
    /// in use; one byte stays free so empty and full are distinguishable.
    pub const CAPACITY: usize = REGION_SIZE - HEADER_SIZE;

    /// Liveness word: heartbeat counter while running, halt sentinel
    /// once the core has frozen.
    pub const OFF_LIVENESS: usize = 0;
    /// Last sampled interrupt state (extended capability).
    pub const OFF_INTERRUPT: usize = 4;
    /// Last sampled cycle count (extended capability).
    pub const OFF_CYCLES: usize = 8;
    /// Read cursor. Host-owned; the firmware never writes it after boot.
    pub const OFF_READ: usize = 12;
    /// Write cursor. Firmware-owned; the host never writes it.
    pub const OFF_WRITE: usize = 16;
    /// Ring capacity in bytes, fixed at boot.
    pub const OFF_CAPACITY: usize = 20;
    /// Low-stack watermark; only ever decreases after boot.
    pub const OFF_STACK: usize = 24;

    /// Published forever once the core halts. Heartbeat values never
    /// reach this range: they are masked below `0x8000_0000`.
    pub const HALT_SENTINEL: u32 = 0xdead_babe;

    /// Heartbeat wraps at 31 bits, keeping the high bit clear so the
    /// counter can never be mistaken for the halt sentinel.
    pub const HEARTBEAT_MASK: u32 = 0x7fff_ffff;
}

/// Geometry of the inter-processor mailbox register array.
pub mod mailbox {
    /// Physical base address of the mailbox register array.
    pub const BASE: usize = 0xe896_b000;

    /// Channels in the array.
    pub const CHANNEL_COUNT: usize = 32;

    /// Channel index used for outbound signaling to the host.
    pub const OUTBOUND_CHANNEL: usize = 2;

    /// Channel index the host signals us on; acknowledged at boot and
    /// distinct from the outbound index by contract.
    pub const INBOUND_CHANNEL: usize = 18;

    /// Payload word written to data register 0 of an outbound doorbell.
    pub const DOORBELL_PAYLOAD: u32 = 0x1;
}

/// Device slot the dispatch engine is opened at.
pub const DEVICE_SLOT: u32 = 0;

/// Outcome of servicing one unit of dispatch work.
///
/// Anything other than `Success` or `Pending` is a permanent fault by
/// the engine's contract; the raw status word is carried for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// One request was served; more may already be queued.
    Success,
    /// No work pending; the core may idle until the host signals.
    Pending,
    /// Engine reported an unrecoverable condition.
    Failure(u32),
}

/// Error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareError {
    /// Dispatch engine failed to open; the raw status word is preserved.
    EngineOpen(u32),
}
