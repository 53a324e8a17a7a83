//! The port capability set the kernel queries (spec §3) and a concrete
//! implementation of it.
//!
//! Ports are treated as opaque entities created and destroyed by a factory
//! external to the kernel (spec §3 "Lifecycle"); the kernel only ever sees
//! them through the [`Port`] trait, the same way the teacher's `Poll` only
//! ever sees I/O handles through the `Evented`/`event::Source` boundary.

pub mod registry;

use crate::buffer::{BufferHeader, Mark};
use crate::error::{KernelError, MarkStamp};
use crate::ids::{Domain, PortDir, PortIndex};

/// The capability set the kernel queries on an opaque port (spec §3).
pub trait Port: std::fmt::Debug {
    fn dir(&self) -> PortDir;
    fn domain(&self) -> Domain;
    fn index(&self) -> PortIndex;

    fn buffer_count(&self) -> usize;
    fn set_buffer_count(&mut self, count: usize);

    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, value: bool);

    fn populated(&self) -> bool;
    fn set_populated(&mut self, value: bool);

    fn tunneled(&self) -> bool;
    fn supplier(&self) -> bool;
    fn allocator(&self) -> bool;

    /// Establish (or tear down, passing `tunneled = false`) this port's
    /// tunnel relationship (spec §6 `ComponentTunnelRequest`). A no-op for
    /// ports that never participate in tunnelling.
    fn set_tunnel(&mut self, tunneled: bool, supplier: bool) {
        let _ = (tunneled, supplier);
    }
    /// An allocator port with pre-announcement disabled defers populating a
    /// header's buffer pointer until the header is actually about to leave
    /// on an **input** port (spec §4.6 `flush_egress` step 2).
    fn preannouncement_disabled(&self) -> bool {
        false
    }

    fn flush_in_progress(&self) -> bool;
    fn set_flush_in_progress(&mut self, value: bool);

    fn going_to_disabled(&self) -> bool;
    fn set_going_to_disabled(&mut self, value: bool);

    fn going_to_enabled(&self) -> bool;
    fn set_going_to_enabled(&mut self, value: bool);

    fn being_flushed(&self) -> bool;
    fn set_being_flushed(&mut self, value: bool);

    fn being_disabled(&self) -> bool;
    fn set_being_disabled(&mut self, value: bool);

    fn being_enabled(&self) -> bool;
    fn set_being_enabled(&mut self, value: bool);

    fn is_config_port(&self) -> bool {
        false
    }

    /// The index of this port's master (if this port is a slave) or slave
    /// (if this port is a master) in a master/slave pair (spec §4.7).
    fn master_or_slave(&self) -> Option<PortIndex> {
        None
    }

    fn claimed_count(&self) -> usize;
    fn inc_claimed_count(&mut self);
    fn dec_claimed_count(&mut self);

    /// How many of `buffer_count`'s headers the IL Client has actually
    /// supplied via `UseBuffer`/`AllocateBuffer` so far. A port whose buffers
    /// come from elsewhere (a tunnelled supplier allocating its own) never
    /// needs this and keeps the default.
    fn supplied_count(&self) -> usize {
        0
    }
    fn inc_supplied_count(&mut self) {}
    fn dec_supplied_count(&mut self) {}

    /// The peer record for this port's tunnel connection, if any (spec §5).
    /// `None` for a non-tunnelled port or when no peer has been attached.
    fn tunnel_peer(&self) -> Option<&dyn crate::tunnel::TunnelPeer> {
        None
    }

    /// Attach (or, passing `None`, detach) the peer record `flush_egress`
    /// synchronises through (spec §5, §6 `ComponentTunnelRequest`).
    fn set_tunnel_peer(&mut self, peer: Option<Box<dyn crate::tunnel::TunnelPeer>>) {
        let _ = peer;
    }

    /// Allocate/attach buffer-header storage for this port's declared
    /// `buffer_count`. Errs with [`KernelError::InsufficientResources`] if
    /// the underlying allocator (external to the kernel) can't satisfy it.
    fn populate(&mut self) -> Result<(), KernelError>;

    /// Release whatever `populate` set up and reset `buffer_count` to zero.
    fn depopulate(&mut self) -> Result<(), KernelError>;

    /// Queue a mark for later stamping on an outgoing header. The port takes
    /// ownership of it (spec §4.5 `dispatch_mark_buffer`).
    fn store_mark(&mut self, mark: Mark);

    /// Attempt to stamp `hdr` with the port's next queued mark.
    fn mark_buffer(&mut self, hdr: &mut BufferHeader) -> MarkStamp;

    /// Late-populate an input allocator header's buffer pointer just before
    /// it leaves (spec §4.6 step 2). A no-op for non-allocator ports.
    fn populate_header(&mut self, _hdr: &mut BufferHeader) {}

    /// Whether this port's declared parameter/config index set contains
    /// `index_id` (spec §4.7 `find_managing_port`).
    fn find_index(&self, index_id: u32) -> bool;

    /// Ask this port's master to propagate slaving behaviour onto `slave`,
    /// returning the sub-indices that changed (spec §4.7). Only meaningful
    /// when called on the master side of a pair.
    fn apply_slaving_behaviour(&mut self, slave: &mut dyn Port) -> Result<Vec<u32>, KernelError> {
        let _ = slave;
        Ok(Vec::new())
    }
}

/// A concrete data port. Not the only possible implementation, the kernel
/// only depends on [`Port`], but the one this crate ships and tests
/// against, the way mio ships `TcpStream` as a concrete `Evented`.
#[derive(Debug)]
pub struct DataPort {
    index: PortIndex,
    dir: PortDir,
    domain: Domain,
    buffer_count: usize,
    enabled: bool,
    populated: bool,
    tunneled: bool,
    supplier: bool,
    allocator: bool,
    preannouncement_disabled: bool,
    flush_in_progress: bool,
    going_to_disabled: bool,
    going_to_enabled: bool,
    being_flushed: bool,
    being_disabled: bool,
    being_enabled: bool,
    claimed_count: usize,
    supplied_count: usize,
    mark_queue: std::collections::VecDeque<Mark>,
    declared_indices: Vec<u32>,
    master_or_slave: Option<PortIndex>,
    tunnel_peer: Option<Box<dyn crate::tunnel::TunnelPeer>>,
}

impl DataPort {
    pub fn new(index: PortIndex, dir: PortDir, domain: Domain) -> Self {
        DataPort {
            index,
            dir,
            domain,
            buffer_count: 0,
            enabled: true,
            populated: false,
            tunneled: false,
            supplier: false,
            allocator: false,
            preannouncement_disabled: false,
            flush_in_progress: false,
            going_to_disabled: false,
            going_to_enabled: false,
            being_flushed: false,
            being_disabled: false,
            being_enabled: false,
            claimed_count: 0,
            supplied_count: 0,
            mark_queue: std::collections::VecDeque::new(),
            declared_indices: Vec::new(),
            master_or_slave: None,
            tunnel_peer: None,
        }
    }

    pub fn with_tunnel(mut self, tunneled: bool, supplier: bool) -> Self {
        self.tunneled = tunneled;
        self.supplier = supplier;
        self
    }

    pub fn with_tunnel_peer(mut self, peer: Box<dyn crate::tunnel::TunnelPeer>) -> Self {
        self.tunnel_peer = Some(peer);
        self
    }

    pub fn with_allocator(mut self, allocator: bool, preannouncement_disabled: bool) -> Self {
        self.allocator = allocator;
        self.preannouncement_disabled = preannouncement_disabled;
        self
    }

    pub fn with_declared_indices(mut self, indices: Vec<u32>) -> Self {
        self.declared_indices = indices;
        self
    }

    pub fn with_master_or_slave(mut self, other: PortIndex) -> Self {
        self.master_or_slave = Some(other);
        self
    }
}

impl Port for DataPort {
    fn dir(&self) -> PortDir {
        self.dir
    }

    fn domain(&self) -> Domain {
        self.domain
    }

    fn index(&self) -> PortIndex {
        self.index
    }

    fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    fn set_buffer_count(&mut self, count: usize) {
        self.buffer_count = count;
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, value: bool) {
        self.enabled = value;
    }

    fn populated(&self) -> bool {
        self.populated
    }

    fn set_populated(&mut self, value: bool) {
        self.populated = value;
    }

    fn tunneled(&self) -> bool {
        self.tunneled
    }

    fn supplier(&self) -> bool {
        self.supplier
    }

    fn set_tunnel(&mut self, tunneled: bool, supplier: bool) {
        self.tunneled = tunneled;
        self.supplier = supplier;
        if !tunneled {
            self.tunnel_peer = None;
        }
    }

    fn allocator(&self) -> bool {
        self.allocator
    }

    fn preannouncement_disabled(&self) -> bool {
        self.preannouncement_disabled
    }

    fn flush_in_progress(&self) -> bool {
        self.flush_in_progress
    }

    fn set_flush_in_progress(&mut self, value: bool) {
        self.flush_in_progress = value;
    }

    fn going_to_disabled(&self) -> bool {
        self.going_to_disabled
    }

    fn set_going_to_disabled(&mut self, value: bool) {
        self.going_to_disabled = value;
    }

    fn going_to_enabled(&self) -> bool {
        self.going_to_enabled
    }

    fn set_going_to_enabled(&mut self, value: bool) {
        self.going_to_enabled = value;
    }

    fn being_flushed(&self) -> bool {
        self.being_flushed
    }

    fn set_being_flushed(&mut self, value: bool) {
        self.being_flushed = value;
    }

    fn being_disabled(&self) -> bool {
        self.being_disabled
    }

    fn set_being_disabled(&mut self, value: bool) {
        self.being_disabled = value;
    }

    fn being_enabled(&self) -> bool {
        self.being_enabled
    }

    fn set_being_enabled(&mut self, value: bool) {
        self.being_enabled = value;
    }

    fn master_or_slave(&self) -> Option<PortIndex> {
        self.master_or_slave
    }

    fn claimed_count(&self) -> usize {
        self.claimed_count
    }

    fn inc_claimed_count(&mut self) {
        self.claimed_count += 1;
    }

    fn dec_claimed_count(&mut self) {
        debug_assert!(self.claimed_count > 0, "claimed_count underflow on port {}", self.index);
        self.claimed_count = self.claimed_count.saturating_sub(1);
    }

    fn supplied_count(&self) -> usize {
        self.supplied_count
    }

    fn inc_supplied_count(&mut self) {
        self.supplied_count += 1;
    }

    fn dec_supplied_count(&mut self) {
        debug_assert!(self.supplied_count > 0, "supplied_count underflow on port {}", self.index);
        self.supplied_count = self.supplied_count.saturating_sub(1);
    }

    fn populate(&mut self) -> Result<(), KernelError> {
        if self.buffer_count == 0 {
            return Err(KernelError::InsufficientResources);
        }
        self.populated = true;
        Ok(())
    }

    fn depopulate(&mut self) -> Result<(), KernelError> {
        self.buffer_count = 0;
        self.populated = false;
        Ok(())
    }

    fn store_mark(&mut self, mark: Mark) {
        self.mark_queue.push_back(mark);
    }

    fn mark_buffer(&mut self, hdr: &mut BufferHeader) -> MarkStamp {
        match self.mark_queue.pop_front() {
            Some(mark) => {
                let owned = mark.owner == Some(self.index);
                hdr.mark = Some(mark);
                if owned {
                    MarkStamp::Owned
                } else {
                    MarkStamp::NotOwned
                }
            }
            None => MarkStamp::NoMore,
        }
    }

    fn populate_header(&mut self, hdr: &mut BufferHeader) {
        if self.allocator && self.preannouncement_disabled {
            hdr.input_port_index = Some(self.index);
        }
    }

    fn find_index(&self, index_id: u32) -> bool {
        self.declared_indices.contains(&index_id)
    }

    fn tunnel_peer(&self) -> Option<&dyn crate::tunnel::TunnelPeer> {
        self.tunnel_peer.as_deref()
    }

    fn set_tunnel_peer(&mut self, peer: Option<Box<dyn crate::tunnel::TunnelPeer>>) {
        self.tunnel_peer = peer;
    }
}

/// The kernel's exclusively-owned, control-plane-only configuration port
/// (spec §3). It never carries buffers, so it does not implement the full
/// buffer/mark surface meaningfully, but it is still a `Port` so it can be
/// searched by [`Port::find_index`] during parameter routing.
#[derive(Debug)]
pub struct ConfigPort {
    declared_indices: Vec<u32>,
}

impl ConfigPort {
    pub fn new(declared_indices: Vec<u32>) -> Self {
        ConfigPort { declared_indices }
    }
}

impl Port for ConfigPort {
    fn dir(&self) -> PortDir {
        PortDir::Input
    }

    fn domain(&self) -> Domain {
        Domain::Other
    }

    fn index(&self) -> PortIndex {
        crate::ids::CONFIG_PORT_INDEX
    }

    fn buffer_count(&self) -> usize {
        0
    }

    fn set_buffer_count(&mut self, _count: usize) {}

    fn enabled(&self) -> bool {
        true
    }

    fn set_enabled(&mut self, _value: bool) {}

    fn populated(&self) -> bool {
        true
    }

    fn set_populated(&mut self, _value: bool) {}

    fn tunneled(&self) -> bool {
        false
    }

    fn supplier(&self) -> bool {
        false
    }

    fn allocator(&self) -> bool {
        false
    }

    fn flush_in_progress(&self) -> bool {
        false
    }

    fn set_flush_in_progress(&mut self, _value: bool) {}

    fn going_to_disabled(&self) -> bool {
        false
    }

    fn set_going_to_disabled(&mut self, _value: bool) {}

    fn going_to_enabled(&self) -> bool {
        false
    }

    fn set_going_to_enabled(&mut self, _value: bool) {}

    fn being_flushed(&self) -> bool {
        false
    }

    fn set_being_flushed(&mut self, _value: bool) {}

    fn being_disabled(&self) -> bool {
        false
    }

    fn set_being_disabled(&mut self, _value: bool) {}

    fn being_enabled(&self) -> bool {
        false
    }

    fn set_being_enabled(&mut self, _value: bool) {}

    fn is_config_port(&self) -> bool {
        true
    }

    fn claimed_count(&self) -> usize {
        0
    }

    fn inc_claimed_count(&mut self) {}

    fn dec_claimed_count(&mut self) {}

    fn populate(&mut self) -> Result<(), KernelError> {
        Ok(())
    }

    fn depopulate(&mut self) -> Result<(), KernelError> {
        Ok(())
    }

    fn store_mark(&mut self, _mark: Mark) {}

    fn mark_buffer(&mut self, _hdr: &mut BufferHeader) -> MarkStamp {
        MarkStamp::NoMore
    }

    fn find_index(&self, index_id: u32) -> bool {
        self.declared_indices.contains(&index_id)
    }
}
