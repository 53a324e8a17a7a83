//! Buffer paths: `EmptyThisBuffer`/`FillThisBuffer`, processor relinquish
//! (`Callback`), `flush_egress`, `propagate_ingress`, and the list-motion
//! helpers they share (spec §4.6).

use std::collections::VecDeque;

use log::trace;

use super::Kernel;
use crate::buffer::{BufferFlags, BufferHeader};
use crate::error::KernelError;
use crate::events::Event;
use crate::fsm::State;
use crate::ids::{PortDir, PortIndex};
use crate::mark::process_marks;
use crate::queue::{Callback, Message, PluggableEvent};

impl Kernel {
    pub(super) fn handle_empty_this_buffer(&mut self, hdr: BufferHeader) {
        let Some(pid) = hdr.input_port_index else {
            self.events.emit(Event::Error(KernelError::BadPortIndex));
            return;
        };
        self.buffer_arrived(pid, hdr);
    }

    pub(super) fn handle_fill_this_buffer(&mut self, hdr: BufferHeader) {
        let Some(pid) = hdr.output_port_index else {
            self.events.emit(Event::Error(KernelError::BadPortIndex));
            return;
        };
        self.buffer_arrived(pid, hdr);
    }

    /// Shared tail of ETB/FTB handling (spec §4.6): push onto ingress, then
    /// run the three checks that can fire as a consequence of its arrival.
    fn buffer_arrived(&mut self, pid: PortIndex, hdr: BufferHeader) {
        if pid as usize >= self.ingress.len() {
            self.events.emit(Event::Error(KernelError::BadPortIndex));
            return;
        }
        self.ingress[pid as usize].push_back(hdr);

        let Some(port) = self.registry.get_port(pid) else {
            self.events.emit(Event::Error(KernelError::BadPortIndex));
            return;
        };
        let tunneled_supplier = port.tunneled() && port.supplier();
        let going_to_disabled = port.going_to_disabled();
        let all_back = self.ingress[pid as usize].len() == port.buffer_count();
        let enabled = port.enabled();

        if tunneled_supplier && going_to_disabled && all_back {
            self.depopulate_and_scrub(pid);
            self.complete_port_disable(pid, None);
            return;
        }

        if self.maybe_complete_idle_transition() {
            return;
        }

        if self.fsm.substate().steady_state() != Some(State::Pause) && enabled {
            self.propagate_ingress(pid);
        }
    }

    pub(super) fn handle_callback(&mut self, cb: Callback) {
        if self.fsm.substate().steady_state() == Some(State::Pause) {
            let being_flushed = if cb.is_dummy() {
                true
            } else {
                self.registry.get_port(cb.port).map(|p| p.being_flushed()).unwrap_or(false)
            };
            if !being_flushed {
                let _ = self.sender().send(Message::Callback(Callback::dummy()));
                return;
            }
        }

        if cb.is_dummy() {
            self.flush_all_egress();
            return;
        }

        let pid = cb.port;
        if let Some(hdr) = cb.hdr {
            if (pid as usize) < self.egress.len() {
                self.egress[pid as usize].push_back(hdr);
            }
        }
        if let Some(port) = self.registry.get_port_mut(pid) {
            port.dec_claimed_count();
        }
        self.flush_all_egress();

        let claimed = self.registry.get_port(pid).map(|p| p.claimed_count()).unwrap_or(0);
        if claimed == 0 {
            let port_state = self.registry.get_port(pid).map(|p| (p.being_flushed(), p.going_to_disabled()));
            if let Some((being_flushed, going_to_disabled)) = port_state {
                if being_flushed {
                    self.complete_flush(pid, None);
                }
                if going_to_disabled {
                    self.complete_port_disable(pid, None);
                }
            }
            self.maybe_complete_idle_transition();
        }
    }

    pub(super) fn handle_pluggable_event(&mut self, event: PluggableEvent) {
        match event {
            PluggableEvent::RmWaitEnd { rid } => {
                trace!("rm wait-end rid={rid}");
            }
            PluggableEvent::RmPreempted { rid } => {
                trace!("rm preempted rid={rid}");
                self.events.emit(Event::Error(KernelError::ResourcesPreempted));
            }
            PluggableEvent::RmPreemptEnd { rid } => {
                trace!("rm preempt-end rid={rid}");
            }
        }
    }

    fn flush_all_egress(&mut self) {
        for pid in 0..self.port_count() as PortIndex {
            self.flush_egress(pid, false);
        }
    }

    /// spec §4.6 `flush_egress(pid, clear?)`. Drains a snapshot of the
    /// port's current egress list so that re-queued ("clear") headers don't
    /// get reprocessed in the same pass, and so a tunnel back-pressure abort
    /// can restore the untouched remainder in order.
    pub(super) fn flush_egress(&mut self, pid: PortIndex, clear: bool) {
        if pid as usize >= self.egress.len() {
            return;
        }
        let mut pending: VecDeque<BufferHeader> = std::mem::take(&mut self.egress[pid as usize]);

        while let Some(mut hdr) = pending.pop_front() {
            if let Some(port) = self.registry.get_port(pid) {
                if port.tunneled() {
                    if let Some(peer) = port.tunnel_peer() {
                        if !peer.signal_or_defer() {
                            pending.push_front(hdr);
                            self.egress[pid as usize] = pending;
                            let _ = self.sender().send(Message::Callback(Callback::dummy()));
                            return;
                        }
                        peer.wait_for_resync();
                    }
                }
            }

            if let Some(port) = self.registry.get_port_mut(pid) {
                if port.dir() == PortDir::Input && port.allocator() && port.preannouncement_disabled() {
                    port.populate_header(&mut hdr);
                }
            }

            process_marks(&mut self.registry, pid, &mut hdr, self.self_handle, self.events.as_mut());

            if !clear {
                if let Some(port) = self.registry.get_port(pid) {
                    if port.dir() == PortDir::Output && hdr.flags.contains(BufferFlags::EOS) && !self.eos {
                        self.eos = true;
                        self.events.emit(Event::BufferFlag { port: pid, flags: hdr.flags });
                    }
                }
            }

            if clear {
                hdr.clear_metadata();
                self.egress[pid as usize].push_back(hdr);
                continue;
            }

            let dir = self.registry.get_port(pid).map(|p| p.dir());
            match dir {
                Some(PortDir::Input) => self.events.empty_buffer_done(pid, hdr),
                Some(PortDir::Output) => self.events.fill_buffer_done(pid, hdr),
                None => {}
            }
        }
    }

    /// spec §4.6 `propagate_ingress(pid)`: hand every currently-arrived
    /// header on `pid` to the processor. Unlike the source's "keeps them in
    /// the list" wording, this crate removes each header from ingress as it
    /// is claimed by the processor, the single-owner reading of invariant 7
    /// that the `Processor` trait's by-value handoff already commits to (see
    /// DESIGN.md).
    pub(super) fn propagate_ingress(&mut self, pid: PortIndex) {
        let Some(dir) = self.registry.get_port(pid).map(|p| p.dir()) else {
            return;
        };
        if pid as usize >= self.ingress.len() {
            return;
        }
        while let Some(hdr) = self.ingress[pid as usize].pop_front() {
            if let Some(port) = self.registry.get_port_mut(pid) {
                port.inc_claimed_count();
            }
            match dir {
                PortDir::Input => self.processor.empty_this_buffer(pid, hdr),
                PortDir::Output => self.processor.fill_this_buffer(pid, hdr),
            }
        }
    }

    /// Atomically append `ingress[pid]` onto `egress[pid]`, clearing the
    /// source (spec §4.6 `move_to_egress`).
    pub(super) fn move_to_egress(&mut self, pid: PortIndex) {
        let pid = pid as usize;
        if pid >= self.ingress.len() {
            return;
        }
        let drained = std::mem::take(&mut self.ingress[pid]);
        self.egress[pid].extend(drained);
    }

    /// Atomically append `egress[pid]` onto `ingress[pid]`, clearing the
    /// source (spec §4.6 `move_to_ingress`).
    pub(super) fn move_to_ingress(&mut self, pid: PortIndex) {
        let pid = pid as usize;
        if pid >= self.egress.len() {
            return;
        }
        let drained = std::mem::take(&mut self.egress[pid]);
        self.ingress[pid].extend(drained);
    }

    pub(super) fn clear_ingress_metadata(&mut self, pid: PortIndex) {
        if let Some(list) = self.ingress.get_mut(pid as usize) {
            for hdr in list.iter_mut() {
                hdr.clear_metadata();
            }
        }
    }

    pub(super) fn zero_egress_filled_len(&mut self, pid: PortIndex) {
        if let Some(list) = self.egress.get_mut(pid as usize) {
            for hdr in list.iter_mut() {
                hdr.zero_filled_len();
            }
        }
    }
}
