//! Events emitted to the IL Client (spec §6) and the sink that receives
//! them, plus the paired buffer callbacks.

use crate::buffer::{BufferFlags, BufferHeader, MarkPayload};
use crate::error::KernelError;
use crate::ids::{PortIndex, PortTarget};
use crate::queue::CommandKind;

/// An event delivered to the IL Client (spec §6).
#[derive(Debug)]
pub enum Event {
    CommandComplete {
        cmd: CommandKind,
        port: PortTarget,
        error: Option<KernelError>,
    },
    PortSettingsChanged {
        port: PortIndex,
        sub_index: u32,
    },
    PortFormatDetected {
        port: PortIndex,
    },
    BufferFlag {
        port: PortIndex,
        flags: BufferFlags,
    },
    Mark {
        data: MarkPayload,
    },
    Error(KernelError),
}

/// The IL Client's event sink, and the two paired buffer callbacks that
/// travel outside the tagged `Event` enum because they carry a header
/// (spec §6).
pub trait EventSink {
    fn emit(&mut self, event: Event);

    fn empty_buffer_done(&mut self, port: PortIndex, hdr: BufferHeader);
    fn fill_buffer_done(&mut self, port: PortIndex, hdr: BufferHeader);
}
