//! Shared fakes for the integration suite: a scripted `Fsm`, a
//! buffer-echoing `Processor`, and an `EventSink` that records everything it
//! sees so a test can assert on the exact sequence.
//!
//! Every collaborator that needs to submit onto the kernel's own queue
//! (`EchoProcessor`, `HoldingProcessor`) only learns its `Sender` after
//! `Kernel::new` hands it back, so they hold it behind a `DeferredSender`
//! that a test fills in right after construction.

use std::cell::RefCell;
use std::rc::Rc;

use tizkernel::{
    BufferHeader, Callback, CallbackDir, CommandKind, Event, EventSink, Fsm, KernelError, Message,
    PortIndex, PortTarget, Processor, Sender, State, Substate,
};

/// The state a `FakeFsm` actually tracks, plus everything the kernel has
/// told it so a test can assert on exact sequencing.
pub struct FakeFsm {
    pub substate: Substate,
    pub transitions: Vec<(State, Option<KernelError>)>,
    pub commands: Vec<(CommandKind, PortTarget, Option<KernelError>)>,
}

impl FakeFsm {
    pub fn new(initial: Substate) -> Self {
        FakeFsm {
            substate: initial,
            transitions: Vec::new(),
            commands: Vec::new(),
        }
    }
}

fn steady_substate(target: State) -> Substate {
    match target {
        State::Loaded => Substate::Loaded,
        State::WaitForResources => Substate::WaitForResources,
        State::Idle => Substate::Idle,
        State::Executing => Substate::Executing,
        State::Pause => Substate::Pause,
    }
}

/// Wraps a `FakeFsm` in `Rc<RefCell<_>>` so a test keeps its own handle to
/// inspect recorded transitions/commands after handing a `Box<dyn Fsm>` to
/// the kernel (the kernel is single-threaded, so `Rc`/`RefCell` suffice;
/// there's no `Send` bound on `Fsm`).
#[derive(Clone)]
pub struct SharedFsm(pub Rc<RefCell<FakeFsm>>);

impl SharedFsm {
    pub fn new(initial: Substate) -> Self {
        SharedFsm(Rc::new(RefCell::new(FakeFsm::new(initial))))
    }

    pub fn substate(&self) -> Substate {
        self.0.borrow().substate
    }

    pub fn transitions(&self) -> Vec<(State, Option<KernelError>)> {
        self.0.borrow().transitions.clone()
    }

    pub fn commands(&self) -> Vec<(CommandKind, PortTarget, Option<KernelError>)> {
        self.0.borrow().commands.clone()
    }
}

impl Fsm for SharedFsm {
    fn substate(&self) -> Substate {
        self.0.borrow().substate
    }

    fn complete_transition(&mut self, target: State, error: Option<KernelError>) {
        let mut inner = self.0.borrow_mut();
        inner.substate = steady_substate(target);
        inner.transitions.push((target, error));
    }

    fn complete_command(&mut self, cmd: CommandKind, port: PortTarget, error: Option<KernelError>) {
        self.0.borrow_mut().commands.push((cmd, port, error));
    }
}

/// A `Sender` a collaborator can be built with before the kernel that will
/// eventually own it has been constructed.
#[derive(Clone, Default)]
pub struct DeferredSender(Rc<RefCell<Option<Sender>>>);

impl DeferredSender {
    pub fn set(&self, sender: Sender) {
        *self.0.borrow_mut() = Some(sender);
    }

    fn send(&self, msg: Message) {
        if let Some(sender) = self.0.borrow().as_ref() {
            let _ = sender.send(msg);
        }
    }
}

/// A processor that immediately relinquishes whatever it's handed back to
/// the kernel's own queue, the way a trivial passthrough component would.
pub struct EchoProcessor {
    sender: DeferredSender,
}

impl EchoProcessor {
    pub fn new() -> (Self, DeferredSender) {
        let sender = DeferredSender::default();
        (EchoProcessor { sender: sender.clone() }, sender)
    }
}

impl Processor for EchoProcessor {
    fn empty_this_buffer(&mut self, port: PortIndex, hdr: BufferHeader) {
        self.sender.send(Message::Callback(Callback { hdr: Some(hdr), port, dir: CallbackDir::Input }));
    }

    fn fill_this_buffer(&mut self, port: PortIndex, hdr: BufferHeader) {
        self.sender.send(Message::Callback(Callback { hdr: Some(hdr), port, dir: CallbackDir::Output }));
    }

    fn send_command(&mut self, _cmd: CommandKind, _port: PortTarget) {}
}

/// A processor that never relinquishes on its own. A test keeps a
/// [`HoldingHandle`] to release exactly one buffer at a time, useful for
/// asserting a disable/flush stays pending while claimed buffers are still
/// out.
pub struct HoldingProcessor {
    held: Rc<RefCell<Vec<(PortIndex, BufferHeader, CallbackDir)>>>,
    sender: DeferredSender,
}

/// Shares the same backing queue as the `HoldingProcessor` it was created
/// alongside, so a test can still drive it after the processor itself has
/// been moved into a `Kernel`.
#[derive(Clone)]
pub struct HoldingHandle {
    held: Rc<RefCell<Vec<(PortIndex, BufferHeader, CallbackDir)>>>,
    sender: DeferredSender,
}

impl HoldingProcessor {
    pub fn new() -> (Self, HoldingHandle) {
        let held = Rc::new(RefCell::new(Vec::new()));
        let sender = DeferredSender::default();
        let processor = HoldingProcessor { held: held.clone(), sender: sender.clone() };
        let handle = HoldingHandle { held, sender };
        (processor, handle)
    }
}

impl HoldingHandle {
    pub fn set_sender(&self, sender: Sender) {
        self.sender.set(sender);
    }

    pub fn release_one(&self) {
        if let Some((port, hdr, dir)) = self.held.borrow_mut().pop() {
            self.sender.send(Message::Callback(Callback { hdr: Some(hdr), port, dir }));
        }
    }

    pub fn held_count(&self) -> usize {
        self.held.borrow().len()
    }
}

impl Processor for HoldingProcessor {
    fn empty_this_buffer(&mut self, port: PortIndex, hdr: BufferHeader) {
        self.held.borrow_mut().push((port, hdr, CallbackDir::Input));
    }

    fn fill_this_buffer(&mut self, port: PortIndex, hdr: BufferHeader) {
        self.held.borrow_mut().push((port, hdr, CallbackDir::Output));
    }

    fn send_command(&mut self, _cmd: CommandKind, _port: PortTarget) {}
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<String>,
    pub empty_done: Vec<(PortIndex, u64)>,
    pub fill_done: Vec<(PortIndex, u64)>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: Event) {
        self.events.push(format!("{event:?}"));
    }

    fn empty_buffer_done(&mut self, port: PortIndex, hdr: BufferHeader) {
        self.empty_done.push((port, hdr.buffer_id));
    }

    fn fill_buffer_done(&mut self, port: PortIndex, hdr: BufferHeader) {
        self.fill_done.push((port, hdr.buffer_id));
    }
}

impl RecordingSink {
    pub fn command_completes(&self) -> usize {
        self.events.iter().filter(|e| e.starts_with("CommandComplete")).count()
    }
}

/// Shared handle so a test can read the sink's recorded events after handing
/// a `Box<dyn EventSink>` to the kernel.
#[derive(Clone, Default)]
pub struct SharedSink(pub Rc<RefCell<RecordingSink>>);

impl SharedSink {
    pub fn new() -> Self {
        SharedSink(Rc::new(RefCell::new(RecordingSink::default())))
    }

    pub fn command_completes(&self) -> usize {
        self.0.borrow().command_completes()
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().events.clone()
    }
}

impl EventSink for SharedSink {
    fn emit(&mut self, event: Event) {
        self.0.borrow_mut().emit(event);
    }

    fn empty_buffer_done(&mut self, port: PortIndex, hdr: BufferHeader) {
        self.0.borrow_mut().empty_buffer_done(port, hdr);
    }

    fn fill_buffer_done(&mut self, port: PortIndex, hdr: BufferHeader) {
        self.0.borrow_mut().fill_buffer_done(port, hdr);
    }
}

/// Drain the kernel's queue to quiescence without blocking; the dispatch of
/// one message can enqueue another (a dummy `Callback` re-drain, a processor
/// echo), so a test drains until the queue reports empty rather than calling
/// `try_run_once` a fixed number of times.
pub fn drain(kernel: &mut tizkernel::Kernel) {
    while kernel.try_run_once() {}
}
