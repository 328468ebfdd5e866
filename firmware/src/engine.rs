//! Dispatch engine seam
//!
//! The RPC transport and marshaling engine is an opaque collaborator;
//! this trait is the whole of what the firmware asks of it.

use talos_common::{DispatchStatus, FirmwareError};

pub trait DispatchEngine {
    /// Handle to an opened engine instance.
    type Device;

    /// Opens the engine at `slot`. Failure is fatal: an unusable engine
    /// means no host request can ever be served.
    fn open(&mut self, slot: u32) -> Result<Self::Device, FirmwareError>;

    /// Services one unit of pending work on `device`.
    fn dispatch(&mut self, device: &mut Self::Device) -> DispatchStatus;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a scripted sequence of statuses, then reports no work.
    pub(crate) struct ScriptedEngine {
        pub script: VecDeque<DispatchStatus>,
        pub fail_open: Option<u32>,
    }

    impl ScriptedEngine {
        pub fn new(script: impl IntoIterator<Item = DispatchStatus>) -> Self {
            ScriptedEngine {
                script: script.into_iter().collect(),
                fail_open: None,
            }
        }
    }

    impl DispatchEngine for ScriptedEngine {
        type Device = ();

        fn open(&mut self, _slot: u32) -> Result<(), FirmwareError> {
            match self.fail_open {
                Some(status) => Err(FirmwareError::EngineOpen(status)),
                None => Ok(()),
            }
        }

        fn dispatch(&mut self, _device: &mut ()) -> DispatchStatus {
            self.script.pop_front().unwrap_or(DispatchStatus::Pending)
        }
    }
}
