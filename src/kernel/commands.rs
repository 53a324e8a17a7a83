//! `SendCommand` handling: state-set (§4.2), port-disable/enable (§4.3),
//! port-flush (§4.4), mark-buffer dispatch (§4.5).

use log::debug;

use super::{Kernel, PendingCompletion};
use crate::error::KernelError;
use crate::events::Event;
use crate::fsm::{State, Substate};
use crate::ids::{PortIndex, PortTarget};
use crate::mark::flush_marks;
use crate::queue::{CommandKind, SendCommand};

impl Kernel {
    pub(super) fn handle_send_command(&mut self, cmd: SendCommand) {
        match cmd.kind {
            CommandKind::StateSet(target) => self.state_set(target),
            CommandKind::PortDisable => {
                self.pending_completion = PendingCompletion::PortCommand {
                    cmd: CommandKind::PortDisable,
                    port: cmd.port,
                };
                self.port_command(CommandKind::PortDisable, cmd.port);
            }
            CommandKind::PortEnable => {
                self.pending_completion = PendingCompletion::PortCommand {
                    cmd: CommandKind::PortEnable,
                    port: cmd.port,
                };
                self.port_command(CommandKind::PortEnable, cmd.port);
            }
            CommandKind::Flush => {
                self.pending_completion = PendingCompletion::PortCommand {
                    cmd: CommandKind::Flush,
                    port: cmd.port,
                };
                self.port_flush(cmd.port);
            }
            CommandKind::MarkBuffer => self.dispatch_mark_buffer(cmd.port, cmd.mark),
        }
    }

    /// spec §4.2's matrix, implemented in table order: the two wildcard
    /// target rows (`WaitForResources`, `Pause`) take priority over the
    /// specific-pair rows, and any pair not named in the matrix reports
    /// `SameState` rather than doing anything.
    fn state_set(&mut self, target: State) {
        if target == State::WaitForResources {
            self.fsm.complete_transition(target, None);
            return;
        }
        if target == State::Pause {
            self.fsm.complete_transition(target, None);
            return;
        }

        let Some(current) = self.fsm.substate().steady_state() else {
            self.events.emit(Event::Error(KernelError::Undefined));
            return;
        };

        match (current, target) {
            (State::Idle, State::Loaded) => {
                if let Some(mut rm) = self.rm.take() {
                    rm.release();
                    rm.deinit();
                    self.rm_client = Some(rm.into_client());
                }
                self.pending_completion = PendingCompletion::Transition { target };
                self.port_command(CommandKind::PortDisable, PortTarget::All);
            }
            (State::Loaded, State::Idle) => {
                self.init_resource_manager();
                if let Some(rm) = &mut self.rm {
                    if let Err(err) = rm.acquire() {
                        self.fsm.complete_transition(target, Some(err));
                        return;
                    }
                }
                self.pending_completion = PendingCompletion::Transition { target };
                self.port_command(CommandKind::PortEnable, PortTarget::All);
            }
            (State::Executing, State::Idle) | (State::Pause, State::Idle) => {
                self.stop_and_return();
                self.maybe_complete_idle_transition();
            }
            (State::Idle, State::Executing) => {
                self.prepare_to_transfer(PortTarget::All);
                self.fsm.complete_transition(target, None);
            }
            (State::Pause, State::Executing) => {
                let _ = self.sender().send(crate::queue::Message::Callback(
                    crate::queue::Callback::dummy(),
                ));
                self.fsm.complete_transition(target, None);
            }
            (State::Executing, State::Executing) => {
                self.transfer_and_process(PortTarget::All);
                // done=false (spec §4.2): no complete_transition call.
            }
            _ => {
                self.fsm.complete_transition(target, Some(KernelError::SameState));
            }
        }
    }

    fn init_resource_manager(&mut self) {
        let Some(client) = self.take_rm_client() else {
            return;
        };
        let name = self.config.get_component_name().to_string();
        let priority = self.config.get_component_priority();
        self.rm = Some(crate::resource_manager::ResourceManager::new(
            client,
            &name,
            priority,
            self.sender(),
        ));
    }

    /// "stop_and_return" (spec §4.2 Executing/Pause→Idle): move every
    /// enabled port's egress to ingress and flush it outward, mirroring a
    /// disable without touching the enabled flag.
    fn stop_and_return(&mut self) {
        for pid in 0..self.port_count() as PortIndex {
            self.move_to_egress(pid);
            self.flush_egress(pid, false);
        }
    }

    /// "prepare_to_transfer(ALL)" (spec §4.2 Idle→Executing): hand every
    /// port's already-arrived ingress buffers to the processor.
    fn prepare_to_transfer(&mut self, target: PortTarget) {
        for pid in self.resolve_targets(target) {
            self.propagate_ingress(pid);
        }
    }

    /// "transfer_and_process(ALL)" (spec §4.2 Executing→Executing, §4.6
    /// `flush_egress(pid, clear=true)` usage): re-offer ingress to the
    /// processor and clear (but keep) egress headers so a subsequent drain
    /// picks them back up.
    fn transfer_and_process(&mut self, target: PortTarget) {
        for pid in self.resolve_targets(target) {
            self.propagate_ingress(pid);
            self.flush_egress(pid, true);
        }
    }

    /// spec §4.3: drive `PortDisable`/`PortEnable` across the resolved port
    /// set, setting `cmd_completion_count` up front.
    pub(super) fn port_command(&mut self, kind: CommandKind, target: PortTarget) {
        let indices = self.resolve_targets(target);
        self.cmd_completion_count = indices.len() as i64;
        for pid in indices {
            match kind {
                CommandKind::PortDisable => self.begin_port_disable(pid),
                CommandKind::PortEnable => self.begin_port_enable(pid),
                other => unreachable!("port_command only handles Disable/Enable, got {other:?}"),
            }
        }
        if self.cmd_completion_count == 0 {
            self.finish_multi_port_command();
        }
    }

    fn begin_port_disable(&mut self, pid: PortIndex) {
        let Some(port) = self.registry.get_port(pid) else {
            self.complete_port_disable(pid, Some(KernelError::BadPortIndex));
            return;
        };

        if !port.enabled() {
            self.complete_port_disable(pid, None);
            return;
        }

        let tunneled_supplier = port.tunneled() && port.supplier();
        let buffer_count = port.buffer_count();

        if tunneled_supplier {
            self.move_to_ingress(pid);
            let all_back = {
                let port = self.registry.get_port(pid).unwrap();
                self.ingress[pid as usize].len() == port.buffer_count()
            };
            if !all_back {
                self.registry.get_port_mut(pid).unwrap().set_going_to_disabled(true);
                return;
            }
            self.depopulate_and_scrub(pid);
            self.complete_port_disable(pid, None);
            return;
        }

        if buffer_count > 0 {
            self.registry.get_port_mut(pid).unwrap().set_going_to_disabled(true);
            self.clear_ingress_metadata(pid);
            self.move_to_egress(pid);
            self.flush_egress(pid, false);
            let claimed = self.registry.get_port(pid).unwrap().claimed_count();
            if claimed > 0 {
                self.processor.send_command(CommandKind::PortDisable, PortTarget::Index(pid));
            } else {
                self.complete_port_disable(pid, None);
            }
            return;
        }

        self.complete_port_disable(pid, None);
    }

    /// spec §4.3: scrub stale header references from both the kernel's and
    /// the processor's queues once a tunnelled-supplier port's buffers are
    /// all back, then depopulate.
    fn depopulate_and_scrub(&mut self, pid: PortIndex) {
        self.ingress[pid as usize].clear();
        self.egress[pid as usize].clear();
        if let Some(port) = self.registry.get_port_mut(pid) {
            let _ = port.depopulate();
        }
    }

    pub(super) fn complete_port_disable(&mut self, pid: PortIndex, err: Option<KernelError>) {
        if let Some(port) = self.registry.get_port_mut(pid) {
            port.set_enabled(false);
            port.set_going_to_disabled(false);
            flush_marks(port, self.events.as_mut());
        }
        self.events.emit(Event::CommandComplete {
            cmd: CommandKind::PortDisable,
            port: PortTarget::Index(pid),
            error: err,
        });
        self.decrement_cmd_completion();
    }

    fn begin_port_enable(&mut self, pid: PortIndex) {
        // A standalone `PortEnable` arriving while steady in WaitForResources
        // or Loaded completes immediately. There is nothing to populate yet.
        // A Loaded→Idle-transition-triggered enable is told apart by
        // `pending_completion` rather than the FSM's self-reported substate:
        // the FSM has no hook to advance its substate to `LoadedToIdle`
        // before the kernel starts issuing the per-port commands, so at this
        // point it would still report plain `Loaded` either way.
        let mid_loaded_to_idle =
            matches!(self.pending_completion, PendingCompletion::Transition { target: State::Idle });
        if !mid_loaded_to_idle && matches!(self.fsm.substate(), Substate::WaitForResources | Substate::Loaded) {
            self.complete_port_enable(pid, None);
            return;
        }

        let Some(port) = self.registry.get_port_mut(pid) else {
            self.complete_port_enable(pid, Some(KernelError::BadPortIndex));
            return;
        };
        port.set_going_to_enabled(true);

        // A tunnelled supplier allocates its own buffers synchronously; any
        // other port waits for the IL Client to drive its population up to
        // `buffer_count` via `UseBuffer`/`AllocateBuffer` (see `api.rs`).
        if port.tunneled() && port.supplier() {
            match port.populate() {
                Ok(()) => self.complete_port_enable(pid, None),
                Err(err) => self.complete_port_enable(pid, Some(err)),
            }
        }
    }

    pub(super) fn complete_port_enable(&mut self, pid: PortIndex, err: Option<KernelError>) {
        if let Some(port) = self.registry.get_port_mut(pid) {
            port.set_enabled(true);
            port.set_going_to_enabled(false);
        }
        self.events.emit(Event::CommandComplete {
            cmd: CommandKind::PortEnable,
            port: PortTarget::Index(pid),
            error: err,
        });
        self.decrement_cmd_completion();
        if self.fsm.substate().steady_state() == Some(State::Executing) {
            self.propagate_ingress(pid);
        }
    }

    /// spec §4.4's flush matrix, implemented verbatim. Like `port_command`,
    /// sets `cmd_completion_count` up front so a `Flush(ALL)` notifies the
    /// FSM once every port's flush has completed.
    fn port_flush(&mut self, target: PortTarget) {
        let indices = self.resolve_targets(target);
        self.cmd_completion_count = indices.len() as i64;
        for pid in indices {
            self.begin_port_flush(pid);
        }
        if self.cmd_completion_count == 0 {
            self.finish_multi_port_command();
        }
    }

    fn begin_port_flush(&mut self, pid: PortIndex) {
        let Some(port) = self.registry.get_port(pid) else {
            self.events.emit(Event::Error(KernelError::BadPortIndex));
            return;
        };
        if port.buffer_count() == 0 || !port.enabled() {
            self.complete_flush(pid, None);
            return;
        }
        let substate = self.fsm.substate();
        if !matches!(substate.steady_state(), Some(State::Executing) | Some(State::Pause)) {
            self.complete_flush(pid, None);
            return;
        }

        let tunneled = port.tunneled();
        let supplier = port.supplier();
        let dir = port.dir();
        let claimed = port.claimed_count();

        use crate::ids::PortDir;
        match (tunneled, supplier, dir) {
            (false, _, PortDir::Input) => self.move_to_egress(pid),
            (false, _, PortDir::Output) => {
                self.move_to_egress(pid);
                self.zero_egress_filled_len(pid);
            }
            (true, true, PortDir::Input) => {
                self.move_to_egress(pid);
                self.zero_egress_filled_len(pid);
            }
            (true, true, PortDir::Output) => {
                self.move_to_ingress(pid);
                self.clear_ingress_metadata(pid);
            }
            (true, false, PortDir::Input) => self.move_to_egress(pid),
            (true, false, PortDir::Output) => {
                self.move_to_egress(pid);
                self.zero_egress_filled_len(pid);
            }
        }
        self.flush_egress(pid, false);

        if claimed > 0 {
            if let Some(port) = self.registry.get_port_mut(pid) {
                port.set_flush_in_progress(true);
                port.set_being_flushed(true);
            }
            self.processor.send_command(CommandKind::Flush, PortTarget::Index(pid));
        } else {
            self.complete_flush(pid, None);
        }
    }

    pub(super) fn complete_flush(&mut self, pid: PortIndex, err: Option<KernelError>) {
        if let Some(port) = self.registry.get_port_mut(pid) {
            port.set_flush_in_progress(false);
            port.set_being_flushed(false);
        }
        self.events.emit(Event::CommandComplete {
            cmd: CommandKind::Flush,
            port: PortTarget::Index(pid),
            error: err,
        });
        self.decrement_cmd_completion();
    }

    /// spec §4.5 `dispatch_mark_buffer`: the port takes ownership of the
    /// mark it was just handed.
    fn dispatch_mark_buffer(&mut self, target: PortTarget, mark: Option<crate::buffer::Mark>) {
        let PortTarget::Index(pid) = target else {
            debug!("MarkBuffer requires a specific port index, got {target:?}");
            return;
        };
        let Some(mark) = mark else {
            return;
        };
        if let Some(port) = self.registry.get_port_mut(pid) {
            port.store_mark(crate::buffer::Mark {
                owner: Some(pid),
                ..mark
            });
        } else {
            self.events.emit(Event::Error(KernelError::BadPortIndex));
        }
    }
}
