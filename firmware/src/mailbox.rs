//! Inter-processor mailbox
//!
//! Doorbell signaling between this core and the host over a fixed
//! register array, one block of registers per channel. Channel 2 is
//! ours for outbound signaling; channel 18 is where the host signals
//! us. Both operations are fire-and-forget: register writes are assumed
//! to succeed once issued, and nothing is reported back.
//!
//! `send` must clear the stale pending bit before configuring mask and
//! mode; arming on leftover state races the remote interrupt controller.

use bitflags::bitflags;
use talos_common::mailbox::DOORBELL_PAYLOAD;
use volatile::Volatile;

bitflags! {
    /// Core identity bits as they appear in the source, mask, clear and
    /// send registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CoreBits: u32 {
        const HOST = 0x01;
        const DSP = 0x10;
    }
}

bitflags! {
    /// Channel mode register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeBits: u32 {
        const TRIGGERED = 0x1;
    }
}

/// One channel of the mailbox register array. Layout is the hardware
/// contract; field order and sizes are frozen.
#[repr(C)]
pub struct MailboxChannel {
    source: Volatile<u32>,
    pending_set: Volatile<u32>,
    pending_clear: Volatile<u32>,
    pending_status: Volatile<u32>,
    mode: Volatile<u32>,
    int_mask: Volatile<u32>,
    int_clear: Volatile<u32>,
    send: Volatile<u32>,
    data: [Volatile<u32>; 8],
}

const _: () = assert!(core::mem::size_of::<MailboxChannel>() == 64);

/// Typed view over the mailbox array, bound to one outbound and one
/// inbound channel index.
pub struct MailboxSignal {
    channels: &'static mut [MailboxChannel],
    outbound: usize,
    inbound: usize,
}

impl MailboxSignal {
    /// Builds a view over `count` channels at `base`.
    ///
    /// # Safety
    ///
    /// `base` must point to the live register array (or a fake backing
    /// array in tests), valid for `count` channels for the rest of the
    /// program, with no other access path from this core.
    pub unsafe fn from_raw(
        base: *mut MailboxChannel,
        count: usize,
        outbound: usize,
        inbound: usize,
    ) -> Self {
        debug_assert!(outbound < count && inbound < count);
        debug_assert!(outbound != inbound);
        let channels = unsafe { core::slice::from_raw_parts_mut(base, count) };
        MailboxSignal {
            channels,
            outbound,
            inbound,
        }
    }

    /// Rings the host's doorbell on the outbound channel.
    pub fn send(&mut self) {
        let channel = &mut self.channels[self.outbound];
        // Stale pending bit goes first; mask and mode only after.
        channel.int_clear.write(CoreBits::DSP.bits());
        channel.source.write(CoreBits::DSP.bits());
        channel.pending_clear.write(!0);
        channel.pending_set.write(0);
        channel.int_mask.write(!(CoreBits::HOST | CoreBits::DSP).bits());
        channel.mode.write(ModeBits::TRIGGERED.bits());
        channel.data[0].write(DOORBELL_PAYLOAD);
        channel.send.write(CoreBits::DSP.bits());
    }

    /// Acknowledges accepted interrupts on the inbound channel: clears
    /// only the pending bits not currently masked, leaving masked ones
    /// pending for a later unmask.
    pub fn ack(&mut self) {
        let channel = &mut self.channels[self.inbound];
        let unmasked = !channel.int_mask.read() & CoreBits::DSP.bits();
        channel.int_clear.write(unmasked);
    }
}
