//! The external API surface (spec §6): port registration/inspection, the
//! pull-based buffer retrieval pair (`select`/`claim_buffer`), the
//! IL-Client-facing buffer lifecycle (`UseBuffer`/`AllocateBuffer`/
//! `FreeBuffer`), tunnel setup, and the standard component entry points that
//! either answer synchronously or enqueue a dispatcher message.

use super::Kernel;
use crate::buffer::BufferHeader;
use crate::error::KernelError;
use crate::fsm::Substate;
use crate::ids::{PortDir, PortIndex, PortTarget};
use crate::port::Port;
use crate::queue::{Callback, CommandKind, Message, SendCommand};

/// `get_population_status`'s result (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationStatus {
    FullyPopulated,
    Unpopulated,
    FullyUnpopulated,
}

impl Kernel {
    /// `register_port` (spec §6): takes ownership, and, for a data port,
    /// grows the parallel ingress/egress lists so `pid` indexes cleanly into
    /// both from the moment it is registered.
    pub fn register_port(&mut self, port: Box<dyn Port>, is_config: bool) {
        if !is_config {
            self.ingress.push(std::collections::VecDeque::new());
            self.egress.push(std::collections::VecDeque::new());
        }
        self.registry.register_port(port, is_config);
    }

    /// `deregister_all_ports` (spec §6): destroys all registrations.
    pub fn deregister_all_ports(&mut self) {
        self.registry.deregister_all();
        self.ingress.clear();
        self.egress.clear();
    }

    pub fn get_port(&self, pid: PortIndex) -> Option<&dyn Port> {
        self.registry.get_port(pid)
    }

    /// `find_managing_port(index, struct)` (spec §6): this crate's ports
    /// declare their index set directly rather than requiring the caller to
    /// extract an index from a versioned struct, so the struct parameter
    /// collapses to just `index_id`.
    pub fn find_managing_port(&self, index_id: u32) -> Option<PortIndex> {
        self.registry.find_managing_port(index_id)
    }

    /// `get_population_status(pid_or_ALL)` (spec §6).
    pub fn get_population_status(&self, target: PortTarget) -> (PopulationStatus, bool) {
        let indices = self.resolve_targets(target);
        let mut any_populated = false;
        let mut all_populated = true;
        let mut may_be_fully_unpopulated = true;

        for pid in &indices {
            let Some(port) = self.registry.get_port(*pid) else {
                continue;
            };
            if port.populated() {
                any_populated = true;
            } else {
                all_populated = false;
            }
            if port.tunneled() && !port.supplier() && port.buffer_count() > 0 {
                may_be_fully_unpopulated = false;
            }
        }

        let status = if all_populated && !indices.is_empty() {
            PopulationStatus::FullyPopulated
        } else if any_populated {
            PopulationStatus::Unpopulated
        } else {
            PopulationStatus::FullyUnpopulated
        };
        (status, may_be_fully_unpopulated)
    }

    /// `select(nports, bitset)` (spec §6): set bit `i` for each of the first
    /// `nports` ports whose ingress list is non-empty.
    pub fn select(&self, nports: usize, bitset: &mut [bool]) -> Result<(), KernelError> {
        if bitset.len() < nports {
            return Err(KernelError::BadPortIndex);
        }
        for (pid, slot) in bitset.iter_mut().take(nports).enumerate() {
            *slot = self
                .ingress
                .get(pid)
                .map(|list| !list.is_empty())
                .unwrap_or(false);
        }
        Ok(())
    }

    /// `claim_buffer(pid, pos)` (spec §6): the processor's pull-based
    /// alternative to waiting on `propagate_ingress`'s push. Applies the
    /// same late-populate and mark-propagation treatment `flush_egress`
    /// applies on the opposite (egress) side, so a port's buffers carry
    /// correct metadata regardless of which path a processor implementation
    /// chooses to use.
    pub fn claim_buffer(&mut self, pid: PortIndex, pos: usize) -> Result<BufferHeader, KernelError> {
        if matches!(self.fsm.substate().steady_state(), Some(crate::fsm::State::Pause)) {
            return Err(KernelError::Undefined);
        }
        let enabled = self.registry.get_port(pid).map(|p| p.enabled()).unwrap_or(false);
        if !enabled {
            return Err(KernelError::BadPortIndex);
        }
        let list = self.ingress.get_mut(pid as usize).ok_or(KernelError::BadPortIndex)?;
        if pos >= list.len() {
            return Err(KernelError::BadPortIndex);
        }
        let mut hdr = list.remove(pos).ok_or(KernelError::BadPortIndex)?;

        if let Some(port) = self.registry.get_port_mut(pid) {
            port.inc_claimed_count();
            if port.dir() == PortDir::Output && port.allocator() && port.preannouncement_disabled() {
                port.populate_header(&mut hdr);
            }
        }
        crate::mark::process_marks(&mut self.registry, pid, &mut hdr, self.self_handle, self.events.as_mut());
        Ok(hdr)
    }

    /// `relinquish_buffer(pid, hdr)` (spec §6): enqueues a `Callback`, the
    /// same completion path a processor driven by `propagate_ingress`
    /// already uses.
    pub fn relinquish_buffer(&self, pid: PortIndex, hdr: BufferHeader) -> Result<(), KernelError> {
        let dir = self.registry.get_port(pid).map(|p| p.dir()).ok_or(KernelError::BadPortIndex)?;
        let cb = Callback {
            hdr: Some(hdr),
            port: pid,
            dir: match dir {
                PortDir::Input => crate::queue::CallbackDir::Input,
                PortDir::Output => crate::queue::CallbackDir::Output,
            },
        };
        self.queue_tx.send(Message::Callback(cb)).map_err(|_| KernelError::Undefined)
    }

    /// `UseBuffer` (spec §3 Lifecycle, §6): the IL Client hands the kernel a
    /// buffer it owns; `AllocateBuffer` is its allocate-on-our-side twin.
    /// Both just grow a port's supplied count towards `buffer_count` and
    /// hand back a fresh header; the header only enters `ingress` once the
    /// client later submits it via `EmptyThisBuffer`/`FillThisBuffer`.
    pub fn use_buffer(&mut self, pid: PortIndex, buffer_id: u64) -> Result<BufferHeader, KernelError> {
        self.supply_buffer(pid, buffer_id)
    }

    pub fn allocate_buffer(&mut self, pid: PortIndex, buffer_id: u64) -> Result<BufferHeader, KernelError> {
        self.supply_buffer(pid, buffer_id)
    }

    fn supply_buffer(&mut self, pid: PortIndex, buffer_id: u64) -> Result<BufferHeader, KernelError> {
        let port = self.registry.get_port_mut(pid).ok_or(KernelError::BadPortIndex)?;
        let mut hdr = BufferHeader::new(buffer_id);
        match port.dir() {
            PortDir::Input => hdr.input_port_index = Some(pid),
            PortDir::Output => hdr.output_port_index = Some(pid),
        }
        port.inc_supplied_count();
        if port.supplied_count() >= port.buffer_count() {
            port.set_populated(true);
        }
        self.maybe_complete_port_enable(pid);
        Ok(hdr)
    }

    /// `FreeBuffer` (spec §3 Lifecycle, §6, §7 protocol-failure case).
    pub fn free_buffer(&mut self, pid: PortIndex, hdr: BufferHeader) -> Result<(), KernelError> {
        let (enabled, populated) = {
            let port = self.registry.get_port(pid).ok_or(KernelError::BadPortIndex)?;
            (port.enabled(), port.populated())
        };
        if enabled && populated && self.fsm.substate() != Substate::IdleToLoaded {
            self.events.emit(crate::events::Event::Error(KernelError::PortUnpopulated));
        }
        drop(hdr);

        let port = self.registry.get_port_mut(pid).ok_or(KernelError::BadPortIndex)?;
        port.dec_supplied_count();
        if port.supplied_count() == 0 {
            let _ = port.depopulate();
        }
        self.maybe_complete_loaded_transition();
        Ok(())
    }

    /// `ComponentTunnelRequest` (spec §6): establish or tear down a port's
    /// tunnel relationship. Passing `peer = None` with `tunneled = false`
    /// tears the tunnel down.
    pub fn component_tunnel_request(
        &mut self,
        pid: PortIndex,
        tunneled: bool,
        supplier: bool,
        peer: Option<Box<dyn crate::tunnel::TunnelPeer>>,
    ) -> Result<(), KernelError> {
        let port = self.registry.get_port_mut(pid).ok_or(KernelError::BadPortIndex)?;
        port.set_tunnel(tunneled, supplier);
        port.set_tunnel_peer(peer);
        Ok(())
    }

    /// `GetComponentVersion` (spec §6, SPEC_FULL §4.7a): answered by the
    /// enclosing component base class in the original, out of scope here.
    pub fn get_component_version(&self) -> Result<(), KernelError> {
        Err(KernelError::NotImplemented)
    }

    /// `SendCommand` (spec §6): enqueues a dispatcher message rather than
    /// acting synchronously. Every state/port/flush/mark command in §4
    /// runs from inside `dispatch`, even when called from the kernel's own
    /// thread.
    pub fn send_command(
        &self,
        kind: CommandKind,
        port: PortTarget,
        mark: Option<crate::buffer::Mark>,
    ) -> Result<(), KernelError> {
        self.queue_tx
            .send(Message::SendCommand(SendCommand { kind, port, mark }))
            .map_err(|_| KernelError::Undefined)
    }

    /// `EmptyThisBuffer`/`FillThisBuffer` as external entry points: enqueue
    /// rather than touch `ingress` directly, matching every other submission
    /// path (spec §5: "submission entry points ... only enqueue").
    pub fn empty_this_buffer(&self, hdr: BufferHeader) -> Result<(), KernelError> {
        self.queue_tx.send(Message::EmptyThisBuffer(hdr)).map_err(|_| KernelError::Undefined)
    }

    pub fn fill_this_buffer(&self, hdr: BufferHeader) -> Result<(), KernelError> {
        self.queue_tx.send(Message::FillThisBuffer(hdr)).map_err(|_| KernelError::Undefined)
    }
}
