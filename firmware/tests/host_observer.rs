//! Plays the host's role against the wire contract.
//!
//! Boots the process-wide firmware state over a heap-backed region,
//! then observes and drains the shared record purely through the field
//! offsets in `talos_common::channel`, the way the host log reader
//! does. Everything lives in one test: the diagnostic channel, logger,
//! and halt configuration are one-time process singletons.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use talos_common::channel::{
    CAPACITY, HALT_SENTINEL, HEADER_SIZE, OFF_CAPACITY, OFF_CYCLES, OFF_INTERRUPT, OFF_LIVENESS,
    OFF_READ, OFF_STACK, OFF_WRITE, REGION_SIZE,
};
use talos_common::{DispatchStatus, FirmwareError};
use talos_firmware::engine::DispatchEngine;
use talos_firmware::fault::{self, ExceptionContext, HaltStyle, State, TrapCause};
use talos_firmware::hal::Hal;
use talos_firmware::supervisor::{Config, Step, Supervisor};
use talos_firmware::{diag, logger};

struct TestHal {
    interrupt: AtomicU32,
    cycles: AtomicU32,
    masked: AtomicBool,
    installed: AtomicUsize,
}

impl Hal for TestHal {
    fn wait_for_interrupt(&self) {}

    fn interrupt_state(&self) -> u32 {
        self.interrupt.load(Ordering::Relaxed)
    }

    fn cycle_count(&self) -> u32 {
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn mask_interrupts(&self) {
        self.masked.store(true, Ordering::Relaxed);
    }

    fn install_trap_handler(&self, _cause: TrapCause, _entry: fn(ExceptionContext) -> !) {
        self.installed.fetch_add(1, Ordering::Relaxed);
    }
}

static HAL: TestHal = TestHal {
    interrupt: AtomicU32::new(0x40),
    cycles: AtomicU32::new(0),
    masked: AtomicBool::new(false),
    installed: AtomicUsize::new(0),
};

/// Serves a fixed script, then reports no work forever. Prints through
/// the redirected text streams while dispatching, like the real engine.
struct FixedEngine(Vec<DispatchStatus>);

impl DispatchEngine for FixedEngine {
    type Device = ();

    fn open(&mut self, _slot: u32) -> Result<(), FirmwareError> {
        Ok(())
    }

    fn dispatch(&mut self, _device: &mut ()) -> DispatchStatus {
        talos_firmware::diag_println!("serving request {}", self.0.len());
        if self.0.is_empty() {
            DispatchStatus::Pending
        } else {
            self.0.remove(0)
        }
    }
}

fn word(base: *mut u8, offset: usize) -> u32 {
    unsafe { base.add(offset).cast::<u32>().read_volatile() }
}

fn set_read(base: *mut u8, value: u32) {
    unsafe { base.add(OFF_READ).cast::<u32>().write_volatile(value) }
}

/// Host consumer: copy `[read, write)` modulo capacity, then advance
/// the read cursor.
fn drain(base: *mut u8) -> Vec<u8> {
    let capacity = word(base, OFF_CAPACITY) as usize;
    let write = word(base, OFF_WRITE) as usize;
    let mut read = word(base, OFF_READ) as usize;
    let mut out = Vec::new();
    while read != write {
        out.push(unsafe { base.add(HEADER_SIZE + read).read_volatile() });
        read = (read + 1) % capacity;
    }
    set_read(base, write as u32);
    out
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn firmware_record_is_fully_observable_from_the_host() {
    let region: &'static mut [u32] = Box::leak(vec![0u32; REGION_SIZE / 4].into_boxed_slice());
    let base = region.as_mut_ptr().cast::<u8>();

    fn probe() -> u32 {
        0x1000
    }

    // Boot sequence, in the mandatory order.
    unsafe { diag::init(base, REGION_SIZE, Some(probe)) };
    logger::init();
    fault::install(&HAL, HaltStyle::FreezeAndSample);

    assert_eq!(HAL.installed.load(Ordering::Relaxed), TrapCause::ALL.len());
    assert_eq!(fault::state(), State::Running);

    // The record right after boot, read through the wire offsets.
    assert_eq!(word(base, OFF_READ), 0);
    assert_eq!(word(base, OFF_WRITE), 0);
    assert_eq!(word(base, OFF_CAPACITY), CAPACITY as u32);
    assert_eq!(word(base, OFF_STACK), u32::MAX);
    assert_eq!(word(base, OFF_LIVENESS), 0);

    // Text streams land in the ring immediately, unbuffered.
    log::info!("dispatch engine open");
    let out = drain(base);
    assert!(contains(&out, b"[INFO] dispatch engine open\n"));
    assert_eq!(word(base, OFF_STACK), 0x1000);

    talos_firmware::diag_println!("slot {} ready", 0);
    assert!(contains(&drain(base), b"slot 0 ready\n"));

    // A few supervised iterations against the live record.
    let engine = FixedEngine(vec![
        DispatchStatus::Success,
        DispatchStatus::Success,
        DispatchStatus::Pending,
    ]);
    let mut supervisor = Supervisor::new(&HAL, engine, None, Config::extended());
    let mut device = ();
    let steps: Vec<Step> = (0..3)
        .map(|_| {
            diag::with(|channel| supervisor.publish_liveness(channel)).unwrap();
            supervisor.service_one(&mut device)
        })
        .collect();
    assert_eq!(steps, [Step::Continue, Step::Continue, Step::Idle]);
    assert_eq!(word(base, OFF_LIVENESS), 3);
    assert_eq!(word(base, OFF_INTERRUPT), 0x40);
    assert!(word(base, OFF_CYCLES) > 0);

    // The engine printed mid-dispatch with the channel borrow released;
    // its lines reached the live ring.
    let served = drain(base);
    assert!(contains(&served, b"serving request 3\n"));
    assert!(contains(&served, b"serving request 1\n"));

    // A trap report, read back across the boundary.
    let context = ExceptionContext {
        cause: 6,
        fault_addr: 0x10,
        status: 0x0002_0000,
        fault_pc: 0x4000_1234,
    };
    diag::with(|channel| fault::report(channel, &context)).unwrap();
    let line = drain(base);
    assert!(contains(&line, b"cause=6 (DivideByZero)"));
    assert!(contains(&line, b"addr=0x00000010"));
    assert!(contains(&line, b"pc=0x40001234"));

    // What the halt loop publishes, one beacon at a time.
    fault::halt_beacon();
    assert_eq!(word(base, OFF_LIVENESS), HALT_SENTINEL);
    assert!(HAL.masked.load(Ordering::Relaxed));
    assert_eq!(word(base, OFF_INTERRUPT), 0x40);

    // Heartbeats resume nowhere: the sentinel is republished forever.
    fault::halt_beacon();
    assert_eq!(word(base, OFF_LIVENESS), HALT_SENTINEL);
}
