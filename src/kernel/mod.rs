//! The `Kernel` itself: dispatcher, command handlers, buffer paths and
//! parameter routing (spec §4 wholesale).
//!
//! Shaped like the teacher's `deprecated::EventLoop<H>`: a struct owning a
//! single-consumer queue side plus the collaborators it drives, a `run`
//! flag, and a `run_once` that drains exactly one message per call so tests
//! can single-step the dispatcher the way `tests/smoke.rs` single-steps
//! `EventLoop::run_once`.

mod api;
mod buffers;
mod commands;
mod params;

pub use api::PopulationStatus;

use std::collections::VecDeque;

use log::{debug, trace};

use crate::buffer::{BufferHeader, ComponentHandle};
use crate::config::KernelConfig;
use crate::events::EventSink;
use crate::fsm::{Fsm, State};
use crate::ids::PortIndex;
use crate::port::registry::PortRegistry;
use crate::processor::Processor;
use crate::queue::{self, CommandKind, Message, Receiver, Sender};
use crate::resource_manager::ResourceManager;

/// What a completed multi-port command or transition should notify once
/// `cmd_completion_count` reaches zero (spec §4.2/§4.3). Exactly one of
/// these is ever outstanding, matching invariant 3 ("at most one in-progress
/// top-level transition per kernel").
#[derive(Debug)]
pub(crate) enum PendingCompletion {
    None,
    PortCommand { cmd: CommandKind, port: crate::ids::PortTarget },
    Transition { target: State },
}

/// The per-component control core (spec §1, §3).
pub struct Kernel {
    registry: PortRegistry,
    ingress: Vec<VecDeque<BufferHeader>>,
    egress: Vec<VecDeque<BufferHeader>>,
    cmd_completion_count: i64,
    pending_completion: PendingCompletion,
    eos: bool,
    rm: Option<ResourceManager>,
    rm_client: Option<Box<dyn crate::resource_manager::RmClient>>,
    fsm: Box<dyn Fsm>,
    processor: Box<dyn Processor>,
    events: Box<dyn EventSink>,
    queue_tx: Sender,
    queue_rx: Receiver,
    self_handle: ComponentHandle,
    config: KernelConfig,
    run: bool,
}

impl Kernel {
    /// Construct a kernel and its cross-thread submission handle (mirrors
    /// `EventLoop::new`/`EventLoop::channel`).
    pub fn new(
        self_handle: ComponentHandle,
        fsm: Box<dyn Fsm>,
        processor: Box<dyn Processor>,
        events: Box<dyn EventSink>,
        config: KernelConfig,
    ) -> (Kernel, Sender) {
        let (tx, rx) = queue::queue();
        let kernel = Kernel {
            registry: PortRegistry::new(),
            ingress: Vec::new(),
            egress: Vec::new(),
            cmd_completion_count: 0,
            pending_completion: PendingCompletion::None,
            eos: false,
            rm: None,
            rm_client: None,
            fsm,
            processor,
            events,
            queue_tx: tx.clone(),
            queue_rx: rx,
            self_handle,
            config,
            run: true,
        };
        debug!(
            "kernel constructed for '{}' (queue capacity hint {})",
            kernel.config.get_component_name(),
            kernel.config.get_queue_capacity_hint()
        );
        (kernel, tx)
    }

    /// A fresh clone of the submission handle (spec §5: callable from any
    /// thread).
    pub fn sender(&self) -> Sender {
        self.queue_tx.clone()
    }

    /// Attach the resource-manager client used on the next Loaded→Idle
    /// transition (spec §4.8). A component with no RM integration simply
    /// never calls this; `rm` stays `None` and the Loaded↔Idle matrix rows
    /// run without RM acquire/release.
    pub fn set_rm_client(&mut self, client: Box<dyn crate::resource_manager::RmClient>) {
        self.rm_client = Some(client);
    }

    pub(crate) fn take_rm_client(&mut self) -> Option<Box<dyn crate::resource_manager::RmClient>> {
        self.rm_client.take()
    }

    /// Keep draining the queue until told to stop (mirrors
    /// `EventLoop::run`).
    pub fn run(&mut self) {
        self.run = true;
        while self.run {
            if !self.run_once() {
                break;
            }
        }
    }

    /// Drain and dispatch exactly one message, blocking if the queue is
    /// empty (spec §4.1: "suspension happens only when the underlying queue
    /// is empty"). Returns `false` once the queue is closed and drained.
    pub fn run_once(&mut self) -> bool {
        let Some(msg) = self.queue_rx.recv() else {
            self.run = false;
            return false;
        };
        self.dispatch(msg);
        true
    }

    /// Non-blocking single step, used by tests that want to assert on an
    /// empty queue rather than suspend.
    pub fn try_run_once(&mut self) -> bool {
        match self.queue_rx.try_recv() {
            Some(msg) => {
                self.dispatch(msg);
                true
            }
            None => false,
        }
    }

    /// Stop the dispatcher and close the queue (ambient lifecycle tooling;
    /// see SPEC_FULL.md §4.1a, the original has no equivalent because the
    /// kernel servant lives as long as the process).
    pub fn shutdown(&mut self) {
        self.run = false;
        self.queue_rx.close();
    }

    fn dispatch(&mut self, msg: Message) {
        trace!("dispatch: {msg:?}");
        match msg {
            Message::SendCommand(cmd) => self.handle_send_command(cmd),
            Message::EmptyThisBuffer(hdr) => self.handle_empty_this_buffer(hdr),
            Message::FillThisBuffer(hdr) => self.handle_fill_this_buffer(hdr),
            Message::Callback(cb) => self.handle_callback(cb),
            Message::PluggableEvent(ev) => self.handle_pluggable_event(ev),
        }
    }

    fn finish_multi_port_command(&mut self) {
        if self.cmd_completion_count != 0 {
            return;
        }
        match std::mem::replace(&mut self.pending_completion, PendingCompletion::None) {
            PendingCompletion::None => {}
            PendingCompletion::PortCommand { cmd, port } => {
                self.fsm.complete_command(cmd, port, None);
            }
            // Idle→Loaded's completion condition is `all_depopulated`
            // (spec §4.2), which buffer supply (freed one header at a time
            // via `FreeBuffer`, see `api.rs`) can still be short of even
            // after every port's disable command has itself completed.
            // Keep waiting rather than firing early; `maybe_complete_loaded_
            // transition` re-checks after each `FreeBuffer`.
            PendingCompletion::Transition { target: State::Loaded } if !self.all_depopulated() => {
                self.pending_completion = PendingCompletion::Transition { target: State::Loaded };
            }
            PendingCompletion::Transition { target } => {
                self.fsm.complete_transition(target, None);
            }
        }
    }

    /// Re-check a still-outstanding Idle→Loaded transition after a
    /// `FreeBuffer` call changes `all_depopulated` (spec §4.2).
    pub(crate) fn maybe_complete_loaded_transition(&mut self) {
        if matches!(self.pending_completion, PendingCompletion::Transition { target: State::Loaded })
            && self.all_depopulated()
        {
            self.pending_completion = PendingCompletion::None;
            self.fsm.complete_transition(State::Loaded, None);
        }
    }

    /// Re-check a still-outstanding per-port enable after `UseBuffer`/
    /// `AllocateBuffer` brings a port's `supplied_count` up to `buffer_count`
    /// (spec §4.3's enable path, deferred for non-supplier ports).
    pub(crate) fn maybe_complete_port_enable(&mut self, pid: PortIndex) {
        let ready = self
            .registry
            .get_port(pid)
            .map(|p| p.going_to_enabled() && p.populated())
            .unwrap_or(false);
        if ready {
            self.complete_port_enable(pid, None);
        }
    }

    fn decrement_cmd_completion(&mut self) {
        debug_assert!(
            self.cmd_completion_count > 0,
            "cmd_completion_count underflow: decrement with none outstanding"
        );
        self.cmd_completion_count = self.cmd_completion_count.saturating_sub(1);
        self.finish_multi_port_command();
    }

    /// All enabled ports are populated (spec §3 invariant 4, §4.2 "done" for
    /// Loaded→Idle).
    pub(crate) fn all_populated(&self) -> bool {
        self.registry.ports().filter(|p| p.enabled()).all(|p| p.populated())
    }

    /// Every port has `buffer_count == 0` (spec §3 invariant 5, §4.2 "done"
    /// for Idle→Loaded).
    pub(crate) fn all_depopulated(&self) -> bool {
        self.registry.ports().all(|p| p.buffer_count() == 0)
    }

    /// spec §3 invariant 6, §4.2 "done" for Executing/Pause→Idle.
    pub(crate) fn all_buffers_returned(&self) -> bool {
        self.registry.ports().enumerate().filter(|(_, p)| p.enabled()).all(|(i, p)| {
            if p.tunneled() && p.supplier() {
                self.ingress[i].len() == p.buffer_count()
            } else {
                p.claimed_count() == 0
            }
        })
    }

    /// Check whether a still-outstanding Executing/Pause→Idle transition can
    /// now complete (spec §4.6: checked after every buffer-path event, not
    /// driven by `cmd_completion_count` since no per-port command is
    /// outstanding for this direction). Returns whether it did.
    ///
    /// `eos` resets to `false` here: spec §3 defines it as "EOS already
    /// reported on some output port this play cycle", and a play cycle ends
    /// when every buffer has come back to Idle.
    pub(crate) fn maybe_complete_idle_transition(&mut self) -> bool {
        let substate = self.fsm.substate();
        if substate.is_executing_to_idle_or_pause_to_idle() && self.all_buffers_returned() {
            self.eos = false;
            self.fsm.complete_transition(State::Idle, None);
            true
        } else {
            false
        }
    }

    pub(crate) fn port_count(&self) -> usize {
        self.registry.port_count()
    }

    pub(crate) fn resolve_targets(&self, target: crate::ids::PortTarget) -> Vec<PortIndex> {
        match target {
            crate::ids::PortTarget::Index(pid) => vec![pid],
            crate::ids::PortTarget::All => (0..self.registry.port_count() as PortIndex).collect(),
        }
    }
}
