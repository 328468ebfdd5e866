#![cfg_attr(not(test), no_std)]

//! Talos DSP firmware entry point
//!
//! DSP-side firmware serving a remote-procedure dispatch protocol to a
//! host processor, built so that a crashed, wedged, or merely busy core
//! stays observable from outside: every diagnostic goes through a
//! lock-free shared-memory ring the host polls, every modeled trap ends
//! in a reported, observable permanent halt, and the steady-state loop
//! publishes a heartbeat on every iteration.
//!
//! Module map:
//! - [`diag`] - the shared diagnostic channel and its print macros
//! - [`logger`] - the `log` facade routed into the channel
//! - [`fault`] - trap causes, the fault report, and the halt protocol
//! - [`mailbox`] - inter-processor doorbell signaling
//! - [`hal`] / [`engine`] - seams to platform code and the RPC engine
//! - [`supervisor`] - boot sequence and the dispatch loop
//!
//! The crate is freestanding in production builds; the test suite runs
//! hosted against fake backing memory.

pub mod diag;
pub mod engine;
pub mod fault;
pub mod hal;
pub mod logger;
pub mod mailbox;
pub mod supervisor;

pub use talos_common as common;

/// Panics converge on the explicit-abort path: one line through the
/// channel, then the terminal halt.
#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    crate::diag_println!("{}", info);
    fault::halt()
}
