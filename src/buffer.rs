//! Buffer headers and the marks that can ride along with them.
//!
//! The kernel never allocates header payloads itself (spec §3 "Lifecycle");
//! it only reads and rewrites the bookkeeping fields listed here. The actual
//! memory a header describes is out of scope (no codec knowledge), so
//! `payload` is an opaque identifier rather than a byte buffer.

use std::sync::Arc;

use crate::ids::PortIndex;

/// Flags carried in a buffer header's `nFlags` field. Modelled as a plain
/// bitmask rather than pulling in `bitflags`, matching mio's own hand-rolled
/// `Ready`/`Interest` masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const EMPTY: BufferFlags = BufferFlags(0);
    pub const EOS: BufferFlags = BufferFlags(0b0000_0001);
    pub const START_TIME: BufferFlags = BufferFlags(0b0000_0010);
    pub const SYNC_FRAME: BufferFlags = BufferFlags(0b0000_0100);

    pub const fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: BufferFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: BufferFlags) {
        self.0 &= !other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = BufferFlags;
    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

/// Opaque identity of an IL Client / component, used only to compare a
/// mark's target against "self" (spec §4.5).
pub type ComponentHandle = u64;

/// Arbitrary payload a mark carries to its target, reported back verbatim
/// in `Event::Mark`. `Arc` lets the mark queue and the eventually-emitted
/// event share it without the kernel needing to know its shape.
pub type MarkPayload = Arc<dyn std::any::Any + Send + Sync>;

/// A `(target_component, mark_data)` pair travelling with a buffer header
/// (spec §4.5, GLOSSARY).
///
/// `owner` is `Some(port)` when `port` has a pending `MarkBuffer` completion
/// waiting on this exact copy being consumed, the port that originally
/// called `store_mark`, or, for a mark propagated from an input port to
/// every output port (spec §4.5), each output port's own copy, since each
/// completes its own `CommandComplete(MarkBuffer)` independently once it
/// stamps a header. `owner` is never `None` in this crate; the field stays
/// an `Option` so a future tunnel-relay mark (passed through without any
/// port completing it) has somewhere to live.
#[derive(Clone)]
pub struct Mark {
    pub target: ComponentHandle,
    pub data: MarkPayload,
    pub owner: Option<PortIndex>,
}

impl std::fmt::Debug for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mark")
            .field("target", &self.target)
            .field("owner", &self.owner)
            .finish()
    }
}

/// A buffer header as the kernel sees it: the bookkeeping fields of spec §3,
/// not the memory the buffer actually describes.
#[derive(Debug, Clone)]
pub struct BufferHeader {
    /// Opaque identifier standing in for `pBuffer`.
    pub buffer_id: u64,
    pub filled_len: usize,
    pub offset: usize,
    pub flags: BufferFlags,
    pub mark: Option<Mark>,
    pub input_port_index: Option<PortIndex>,
    pub output_port_index: Option<PortIndex>,
}

impl BufferHeader {
    pub fn new(buffer_id: u64) -> Self {
        BufferHeader {
            buffer_id,
            filled_len: 0,
            offset: 0,
            flags: BufferFlags::EMPTY,
            mark: None,
            input_port_index: None,
            output_port_index: None,
        }
    }

    /// Zero the metadata of the header, keeping the buffer and its identity
    /// (used by flush and by `transfer_and_process`'s ingress→egress clear).
    pub fn clear_metadata(&mut self) {
        self.filled_len = 0;
        self.offset = 0;
        self.flags = BufferFlags::EMPTY;
    }

    pub fn zero_filled_len(&mut self) {
        self.filled_len = 0;
    }
}
