//! Shared diagnostic channel
//!
//! A lock-free, non-blocking byte ring in shared memory, polled by the
//! host across the trust boundary. The firmware is the only writer of
//! the write cursor and the liveness fields; the host is the only
//! writer of the read cursor. One byte of capacity is permanently left
//! free so `read == write` always means empty, never full.
//!
//! Writes never block, never allocate, and never fail: whatever does
//! not fit is silently dropped. The host draining too slowly loses
//! data; that is the accepted trade-off for a channel that may be
//! written from a fault handler.
//!
//! Every access goes through volatile accessors so it reaches the bus;
//! the write-cursor publication is a single aligned word store and the
//! last visible side effect of a write.

use core::cell::UnsafeCell;
use core::fmt;

use conquer_once::spin::OnceCell;
use talos_common::channel::{
    HALT_SENTINEL, HEADER_SIZE, HEARTBEAT_MASK, OFF_CAPACITY, OFF_CYCLES, OFF_INTERRUPT,
    OFF_LIVENESS, OFF_READ, OFF_STACK, OFF_WRITE,
};
use volatile::Volatile;

/// Header of the shared record. Field order and sizes are the wire
/// contract with the host log reader; see `talos_common::channel`.
#[repr(C)]
struct ChannelHeader {
    liveness: Volatile<u32>,
    interrupt: Volatile<u32>,
    cycles: Volatile<u32>,
    read: Volatile<u32>,
    write: Volatile<u32>,
    capacity: Volatile<u32>,
    stack_low: Volatile<u32>,
    _reserved: [u32; 9],
}

const _: () = assert!(core::mem::size_of::<ChannelHeader>() == HEADER_SIZE);
const _: () = assert!(core::mem::offset_of!(ChannelHeader, liveness) == OFF_LIVENESS);
const _: () = assert!(core::mem::offset_of!(ChannelHeader, interrupt) == OFF_INTERRUPT);
const _: () = assert!(core::mem::offset_of!(ChannelHeader, cycles) == OFF_CYCLES);
const _: () = assert!(core::mem::offset_of!(ChannelHeader, read) == OFF_READ);
const _: () = assert!(core::mem::offset_of!(ChannelHeader, write) == OFF_WRITE);
const _: () = assert!(core::mem::offset_of!(ChannelHeader, capacity) == OFF_CAPACITY);
const _: () = assert!(core::mem::offset_of!(ChannelHeader, stack_low) == OFF_STACK);

/// Typed view over the shared diagnostic region.
///
/// Handles are passed explicitly so the ring logic tests against a
/// fake backing region; production code reaches the one live instance
/// through [`with`].
pub struct DiagChannel {
    header: &'static mut ChannelHeader,
    data: &'static mut [Volatile<u8>],
    stack_probe: Option<fn() -> u32>,
}

impl DiagChannel {
    /// Builds a view over `region_len` bytes at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be 4-byte aligned, valid for reads and writes of
    /// `region_len` bytes for the rest of the program, and
    /// `region_len` must exceed the header size. No other code on this
    /// core may alias the region.
    pub unsafe fn from_raw(
        base: *mut u8,
        region_len: usize,
        stack_probe: Option<fn() -> u32>,
    ) -> Self {
        debug_assert!(region_len > HEADER_SIZE);
        let header = unsafe { &mut *base.cast::<ChannelHeader>() };
        let data = unsafe {
            core::slice::from_raw_parts_mut(
                base.add(HEADER_SIZE).cast::<Volatile<u8>>(),
                region_len - HEADER_SIZE,
            )
        };
        DiagChannel {
            header,
            data,
            stack_probe,
        }
    }

    /// One-time boot initialization: cursors zeroed, capacity fixed,
    /// liveness cleared, watermark saturated so the first probe records.
    pub fn reset(&mut self) {
        self.header.read.write(0);
        self.header.write.write(0);
        self.header.capacity.write(self.data.len() as u32);
        self.header.liveness.write(0);
        self.header.interrupt.write(0);
        self.header.cycles.write(0);
        self.header.stack_low.write(u32::MAX);
    }

    /// Appends as much of `buf` as fits and returns the byte count,
    /// which may be less than `buf.len()`. Truncation is not an error.
    ///
    /// The read cursor is re-read on every call: the host may advance
    /// it at any instant. The new write cursor is published as the
    /// final store, after all payload bytes are in place.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        self.note_stack();

        let capacity = self.header.capacity.read() as usize;
        if capacity == 0 {
            return 0;
        }
        // Host-owned word; reduce it into range so a corrupt cursor
        // cannot push the copy out of bounds.
        let read = self.header.read.read() as usize % capacity;
        let write = self.header.write.read() as usize;

        let mut tail = capacity - write;
        let total;
        if read > write {
            total = read - 1 - write;
            tail = total;
        } else if read == write {
            total = capacity - 1;
            if total < tail {
                tail = total;
            }
        } else {
            total = capacity - 1 - write + read;
            if total < tail {
                tail = total;
            }
        }
        if buf.len() < tail {
            tail = buf.len();
        }

        for (i, &byte) in buf[..tail].iter().enumerate() {
            self.data[write + i].write(byte);
        }
        let mut write = write + tail;
        if write == capacity {
            write = 0;
        }

        let rest = &buf[tail..];
        let mut head = total - tail;
        if !rest.is_empty() && head > 0 {
            if rest.len() < head {
                head = rest.len();
            }
            for (i, &byte) in rest[..head].iter().enumerate() {
                self.data[i].write(byte);
            }
            write += head;
        } else {
            head = 0;
        }

        self.header.write.write(write as u32);
        tail + head
    }

    /// Bumps the liveness counter, wrapping at 31 bits. The high bit
    /// stays clear, so a heartbeat can never be mistaken for the halt
    /// sentinel.
    pub fn heartbeat(&mut self) {
        let next = self.header.liveness.read().wrapping_add(1) & HEARTBEAT_MASK;
        self.header.liveness.write(next);
    }

    /// Stores the live interrupt-state and cycle-count snapshots.
    /// The host tolerates torn multi-field reads of these.
    pub fn snapshot(&mut self, interrupt: u32, cycles: u32) {
        self.header.interrupt.write(interrupt);
        self.header.cycles.write(cycles);
    }

    /// Publishes the halt sentinel in the liveness word.
    pub fn mark_halted(&mut self) {
        self.header.liveness.write(HALT_SENTINEL);
    }

    fn note_stack(&mut self) {
        if let Some(probe) = self.stack_probe {
            let sp = probe();
            if sp < self.header.stack_low.read() {
                self.header.stack_low.write(sp);
            }
        }
    }

    pub fn liveness(&self) -> u32 {
        self.header.liveness.read()
    }

    pub fn write_cursor(&self) -> u32 {
        self.header.write.read()
    }

    pub fn capacity(&self) -> u32 {
        self.header.capacity.read()
    }

    pub fn stack_low(&self) -> u32 {
        self.header.stack_low.read()
    }

    #[cfg(test)]
    pub(crate) fn set_cursors(&mut self, read: u32, write: u32) {
        self.header.read.write(read);
        self.header.write.write(write);
    }

    /// Consumer-side view of `[read, write)`, modulo capacity. The host
    /// owns this operation in production; tests use it to play host.
    #[cfg(test)]
    pub(crate) fn backlog(&self) -> Vec<u8> {
        let capacity = self.header.capacity.read() as usize;
        let write = self.header.write.read() as usize;
        let mut read = self.header.read.read() as usize;
        let mut out = Vec::new();
        while read != write {
            out.push(self.data[read].read());
            read = (read + 1) % capacity;
        }
        out
    }
}

impl fmt::Write for DiagChannel {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Truncation is a non-event; formatted output is best-effort.
        self.write(s.as_bytes());
        Ok(())
    }
}

struct DiagCell(UnsafeCell<DiagChannel>);

// SAFETY: single thread of control per core. A trap may preempt an
// in-progress channel access, but registered trap handlers never return
// to the interrupted code, so a preempted borrow is never resumed.
unsafe impl Sync for DiagCell {}

static DIAG: OnceCell<DiagCell> = OnceCell::uninit();

/// One-time boot initialization of the process-wide channel. Resets the
/// shared record before making it reachable. There is no teardown; the
/// channel lives until power loss and is re-initialized only by a full
/// reset.
///
/// # Safety
///
/// Same contract as [`DiagChannel::from_raw`]. Must be called at most
/// once per boot; a second call panics.
pub unsafe fn init(base: *mut u8, region_len: usize, stack_probe: Option<fn() -> u32>) {
    let mut channel = unsafe { DiagChannel::from_raw(base, region_len, stack_probe) };
    channel.reset();
    DIAG.init_once(|| DiagCell(UnsafeCell::new(channel)));
}

/// Runs `f` with a handle to the live channel, or returns `None` before
/// boot initialization.
///
/// `f` must not call back into foreign code that may itself reach the
/// channel (the dispatch engine in particular): the borrow is exclusive
/// for the duration of `f`. The supervisor loop releases it before
/// every engine call for exactly this reason.
pub fn with<R>(f: impl FnOnce(&mut DiagChannel) -> R) -> Option<R> {
    // SAFETY: see `DiagCell`; callers keep `f` free of reachable
    // channel accesses, so nothing else holds this borrow when a
    // single-threaded caller reaches here.
    DIAG.get().map(|cell| f(unsafe { &mut *cell.0.get() }))
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    let _ = with(|channel| channel.write_fmt(args));
}

/// Prints to the diagnostic channel, unbuffered.
#[macro_export]
macro_rules! diag_print {
    ($($arg:tt)*) => ($crate::diag::_print(format_args!($($arg)*)));
}

/// Prints to the diagnostic channel with a trailing newline, unbuffered.
#[macro_export]
macro_rules! diag_println {
    () => ($crate::diag_print!("\n"));
    ($($arg:tt)*) => ($crate::diag_print!("{}\n", format_args!($($arg)*)));
}

#[cfg(test)]
pub(crate) fn test_channel(capacity: usize) -> DiagChannel {
    let words = (HEADER_SIZE + capacity).div_ceil(4);
    let region: &'static mut [u32] = Box::leak(vec![0u32; words].into_boxed_slice());
    let mut channel = unsafe {
        DiagChannel::from_raw(region.as_mut_ptr().cast::<u8>(), HEADER_SIZE + capacity, None)
    };
    channel.reset();
    channel
}
