//! Fault reporting and the permanent-halt protocol
//!
//! One handler covers a fixed, closed set of trap causes. On any of
//! them: capture the four machine-state words, emit one formatted line
//! through the diagnostic channel, then freeze forever. Resuming past
//! an unmodeled trap is unsafe for shared hardware state, so no fault
//! is ever treated as recoverable: fail fast and freeze, never restart.
//!
//! While frozen the liveness sentinel is republished continuously, so
//! an external observer can tell "wedged" from "powered off".

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

use conquer_once::spin::OnceCell;

use crate::diag::{self, DiagChannel};
use crate::hal::Hal;

/// The closed set of trap causes the firmware registers for, with the
/// processor's numeric cause codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TrapCause {
    IllegalInstruction = 0,
    InstructionFetchError = 2,
    LoadStoreError = 3,
    DivideByZero = 6,
    PrivilegeViolation = 8,
    UnalignedAccess = 9,
    InstructionFetchDataError = 12,
    LoadStoreDataError = 13,
    InstructionFetchAddrError = 14,
    LoadStoreAddrError = 15,
    InstructionTlbMiss = 16,
    InstructionTlbMultiHit = 17,
    InstructionRingViolation = 18,
    InstructionFetchProhibited = 20,
    LoadStoreTlbMiss = 24,
    LoadStoreTlbMultiHit = 25,
    LoadStoreRingViolation = 26,
    LoadProhibited = 28,
    StoreProhibited = 29,
}

impl TrapCause {
    pub const ALL: [TrapCause; 19] = [
        TrapCause::IllegalInstruction,
        TrapCause::InstructionFetchError,
        TrapCause::LoadStoreError,
        TrapCause::DivideByZero,
        TrapCause::PrivilegeViolation,
        TrapCause::UnalignedAccess,
        TrapCause::InstructionFetchDataError,
        TrapCause::LoadStoreDataError,
        TrapCause::InstructionFetchAddrError,
        TrapCause::LoadStoreAddrError,
        TrapCause::InstructionTlbMiss,
        TrapCause::InstructionTlbMultiHit,
        TrapCause::InstructionRingViolation,
        TrapCause::InstructionFetchProhibited,
        TrapCause::LoadStoreTlbMiss,
        TrapCause::LoadStoreTlbMultiHit,
        TrapCause::LoadStoreRingViolation,
        TrapCause::LoadProhibited,
        TrapCause::StoreProhibited,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<TrapCause> {
        TrapCause::ALL.iter().find(|c| c.code() == code).copied()
    }
}

/// Machine state captured at trap time. Exists only for the duration
/// of fault reporting.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionContext {
    /// Raw cause code as read from the cause register.
    pub cause: u32,
    /// Faulting data address.
    pub fault_addr: u32,
    /// Processor status word.
    pub status: u32,
    /// Faulting instruction address.
    pub fault_pc: u32,
}

/// What the halt loop republishes on every spin iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltStyle {
    /// Only the liveness sentinel.
    SentinelOnly,
    /// Mask interrupts, then republish sentinel plus live interrupt and
    /// cycle-count snapshots, stabilizing the debug view.
    FreezeAndSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Entered once at boot.
    Running,
    /// Terminal; reached only via a registered trap or explicit abort.
    Halted,
}

struct HaltConfig {
    hal: &'static dyn Hal,
    style: HaltStyle,
}

static HALT: OnceCell<HaltConfig> = OnceCell::uninit();
static HALTED: AtomicBool = AtomicBool::new(false);

/// One-time boot registration: fixes the halt behavior and routes every
/// cause in [`TrapCause::ALL`] to the trap entry.
pub fn install(hal: &'static dyn Hal, style: HaltStyle) {
    HALT.init_once(|| HaltConfig { hal, style });
    for cause in TrapCause::ALL {
        hal.install_trap_handler(cause, trap_entry);
    }
}

pub fn state() -> State {
    if HALTED.load(Ordering::Relaxed) {
        State::Halted
    } else {
        State::Running
    }
}

/// Entry for every registered trap cause. Reports the captured context
/// and never returns.
pub fn trap_entry(context: ExceptionContext) -> ! {
    diag::with(|channel| report(channel, &context));
    halt()
}

/// Formats the fault line into the channel: the cause code and the
/// three other captured registers, on one line.
pub fn report(channel: &mut DiagChannel, context: &ExceptionContext) {
    let _ = match TrapCause::from_code(context.cause) {
        Some(cause) => writeln!(
            channel,
            "trap: cause={} ({:?}) addr={:#010x} status={:#010x} pc={:#010x}",
            context.cause, cause, context.fault_addr, context.status, context.fault_pc,
        ),
        None => writeln!(
            channel,
            "trap: cause={} (unregistered) addr={:#010x} status={:#010x} pc={:#010x}",
            context.cause, context.fault_addr, context.status, context.fault_pc,
        ),
    };
}

/// Explicit-abort path: a one-line message, then the same terminal halt
/// as a trap.
pub fn abort() -> ! {
    crate::diag_println!("abort: halting");
    halt()
}

/// Terminal. Spins forever republishing the liveness sentinel so the
/// host can see elapsed time and last interrupt state while we are
/// wedged. There is no transition out.
pub fn halt() -> ! {
    HALTED.store(true, Ordering::Relaxed);
    loop {
        halt_beacon();
    }
}

/// One spin iteration of the halt loop. Split out so the published
/// fields can be exercised without entering the unbounded loop.
pub fn halt_beacon() {
    match HALT.get() {
        Some(config) if config.style == HaltStyle::FreezeAndSample => {
            config.hal.mask_interrupts();
            let interrupt = config.hal.interrupt_state();
            let cycles = config.hal.cycle_count();
            diag::with(|channel| {
                channel.snapshot(interrupt, cycles);
                channel.mark_halted();
            });
        }
        _ => {
            diag::with(|channel| channel.mark_halted());
        }
    }
}
