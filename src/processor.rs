//! The external processor collaborator (spec §1, §4.6).
//!
//! The processor is the media-processing leaf: it receives buffer forwards
//! from the kernel and eventually relinquishes them back via a `Callback`
//! message on the kernel's own queue. This crate never implements media
//! processing; it only defines the seam.

use crate::buffer::BufferHeader;
use crate::ids::{PortIndex, PortTarget};
use crate::queue::CommandKind;

pub trait Processor {
    /// Forward an input-port buffer for processing.
    fn empty_this_buffer(&mut self, port: PortIndex, hdr: BufferHeader);

    /// Forward an output-port buffer to be filled.
    fn fill_this_buffer(&mut self, port: PortIndex, hdr: BufferHeader);

    /// Forward a command the processor itself must act on before the
    /// kernel can complete it (spec §4.3, §4.4: disable/flush with buffers
    /// still claimed).
    fn send_command(&mut self, cmd: CommandKind, port: PortTarget);
}
