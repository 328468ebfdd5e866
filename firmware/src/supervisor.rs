//! Process entry and the steady-state dispatch loop
//!
//! Boot order is mandatory: the diagnostic channel comes up first and
//! the text streams route through it before anything can fault, then
//! trap handlers, then the dispatch engine. An engine that fails to
//! open is reported once and the core halts; partial operation would be
//! worse than an observable halt.
//!
//! The loop itself: bump the heartbeat, publish live snapshots when
//! enabled, service one unit of work. Completed work busy-polls for
//! more; no pending work suspends on the wait-for-interrupt primitive
//! until the host signals; anything else is a permanent fault, routed
//! through the same abort path as an open failure. The channel borrow
//! is released before every engine call: the engine prints through the
//! redirected streams and must be able to reach the ring.

use talos_common::{DEVICE_SLOT, DispatchStatus, channel};

use crate::diag::{self, DiagChannel};
use crate::engine::DispatchEngine;
use crate::fault::{self, HaltStyle};
use crate::hal::Hal;
use crate::logger;
use crate::mailbox::MailboxSignal;

/// Boot-time configuration. There is no other configuration surface:
/// no command line, no files.
#[derive(Clone, Copy)]
pub struct Config {
    /// Device slot the dispatch engine opens.
    pub slot: u32,
    /// Publish live interrupt/cycle snapshots every loop iteration.
    pub live_snapshots: bool,
    /// What the halt loop republishes once the core freezes.
    pub halt_style: HaltStyle,
    /// Stack-pointer probe for the low-stack watermark, sampled on
    /// every diagnostic write. Platform-supplied.
    pub stack_probe: Option<fn() -> u32>,
}

impl Config {
    /// Plain build: heartbeat only, sentinel-only halt.
    pub const fn plain() -> Self {
        Config {
            slot: DEVICE_SLOT,
            live_snapshots: false,
            halt_style: HaltStyle::SentinelOnly,
            stack_probe: None,
        }
    }

    /// Mailbox-extended build: live snapshots, freeze-and-sample halt.
    pub const fn extended() -> Self {
        Config {
            slot: DEVICE_SLOT,
            live_snapshots: true,
            halt_style: HaltStyle::FreezeAndSample,
            stack_probe: None,
        }
    }
}

/// What one loop iteration decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Work was served; more may already be queued, poll again.
    Continue,
    /// No work pending; suspend until the host signals.
    Idle,
    /// Engine reported an unrecoverable status.
    Fault(u32),
}

pub struct Supervisor<E: DispatchEngine> {
    hal: &'static dyn Hal,
    engine: E,
    mailbox: Option<MailboxSignal>,
    config: Config,
}

impl<E: DispatchEngine> Supervisor<E> {
    pub fn new(
        hal: &'static dyn Hal,
        engine: E,
        mailbox: Option<MailboxSignal>,
        config: Config,
    ) -> Self {
        Supervisor {
            hal,
            engine,
            mailbox,
            config,
        }
    }

    /// Process entry. Initializes the shared diagnostic channel at its
    /// fixed physical address, then runs the rest of the boot sequence
    /// and serves forever.
    ///
    /// # Safety
    ///
    /// `channel::BASE` must map the shared diagnostic region on this
    /// platform, and nothing else on this core may touch it. Must be
    /// called at most once per boot.
    pub unsafe fn boot(self) -> ! {
        unsafe {
            diag::init(
                channel::BASE as *mut u8,
                channel::REGION_SIZE,
                self.config.stack_probe,
            );
        }
        self.start()
    }

    /// Boot sequence after the channel is live: redirect the text
    /// streams, install fault handlers, open the engine, acknowledge
    /// any interrupt the host asserted before this core was ready, then
    /// enter the loop. Split from [`boot`](Supervisor::boot) so a
    /// harness can point the channel at a fake region first.
    pub fn start(mut self) -> ! {
        logger::init();
        fault::install(self.hal, self.config.halt_style);

        let mut device = match self.engine.open(self.config.slot) {
            Ok(device) => device,
            Err(error) => {
                log::error!("dispatch engine open failed: {error:?}");
                fault::abort();
            }
        };

        if let Some(mailbox) = self.mailbox.as_mut() {
            mailbox.ack();
        }

        loop {
            if diag::with(|diag_channel| self.publish_liveness(diag_channel)).is_none() {
                // The channel is initialized before this loop is
                // reachable; an unobservable core must not keep serving.
                fault::halt();
            }
            match self.service_one(&mut device) {
                Step::Continue => {}
                Step::Idle => self.hal.wait_for_interrupt(),
                Step::Fault(status) => {
                    log::error!("dispatch engine failed: status {status:#x}");
                    fault::abort();
                }
            }
        }
    }

    /// Per-iteration liveness publication: snapshots (when enabled),
    /// then one heartbeat bump. The heartbeat advances exactly once per
    /// call and not at all while the loop is suspended between calls.
    pub fn publish_liveness(&mut self, diag_channel: &mut DiagChannel) {
        if self.config.live_snapshots {
            diag_channel.snapshot(self.hal.interrupt_state(), self.hal.cycle_count());
        }
        diag_channel.heartbeat();
    }

    /// Services one unit of dispatch work. Runs with no channel borrow
    /// held: the engine owns the text streams while it executes and its
    /// output must be able to reach the ring.
    pub fn service_one(&mut self, device: &mut E::Device) -> Step {
        match self.engine.dispatch(device) {
            DispatchStatus::Success => Step::Continue,
            DispatchStatus::Pending => Step::Idle,
            DispatchStatus::Failure(status) => Step::Fault(status),
        }
    }
}
