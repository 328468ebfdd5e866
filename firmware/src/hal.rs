//! Hardware seam
//!
//! Register-level access, trap vectoring, and the wait-for-interrupt
//! intrinsic belong to platform code outside this crate. The supervisor
//! and fault paths reach hardware only through this trait, so tests can
//! substitute a non-blocking mock.

use crate::fault::{ExceptionContext, TrapCause};

pub trait Hal: Sync {
    /// Blocks until an external interrupt arrives. May block forever;
    /// cancelled only by a hardware event (host work signal, or a fault).
    fn wait_for_interrupt(&self);

    /// Current interrupt-state word.
    fn interrupt_state(&self) -> u32;

    /// Free-running cycle counter.
    fn cycle_count(&self) -> u32;

    /// Raises the interrupt level so no further interrupts are taken.
    /// Used by the freeze-and-sample halt style.
    fn mask_interrupts(&self);

    /// Routes `cause` to `entry`. Installed once per cause at boot;
    /// a registered entry never returns.
    fn install_trap_handler(&self, cause: TrapCause, entry: fn(ExceptionContext) -> !);
}
