//! The heterogeneous, priority-ordered message queue the dispatcher drains
//! (spec §4.1).
//!
//! Modelled the way the teacher wraps `std::sync::mpsc` in `channel.rs`:
//! a cheaply-`Clone`-able [`Sender`] usable from any thread, and a single
//! consumer side owned by the kernel. Unlike `channel.rs` there is no
//! `Evented` registration here: the dispatcher is its own event loop, not
//! an I/O source. The "submit now, drain later, never block the
//! submitter" shape is the same.

use std::collections::VecDeque;
use std::error;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

use crate::buffer::BufferHeader;
use crate::fsm::State;
use crate::ids::{PortIndex, PortTarget};

/// The five commands `SendCommand` can carry (spec §4.1 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    StateSet(State),
    Flush,
    PortDisable,
    PortEnable,
    MarkBuffer,
}

/// `SendCommand`'s payload (spec §4.1): a command, the port(s) it targets,
/// and, for `MarkBuffer` only, the mark being attached.
#[derive(Debug)]
pub struct SendCommand {
    pub kind: CommandKind,
    pub port: PortTarget,
    pub mark: Option<crate::buffer::Mark>,
}

/// `Callback`'s payload (spec §4.1): either a real processor relinquish, or
/// a *dummy* (`hdr = None`, `dir = Max`) used to trigger a re-drain of
/// egress without introducing a new header.
#[derive(Debug)]
pub struct Callback {
    pub hdr: Option<BufferHeader>,
    pub port: PortIndex,
    pub dir: CallbackDir,
}

impl Callback {
    pub fn dummy() -> Self {
        Callback {
            hdr: None,
            port: 0,
            dir: CallbackDir::Max,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.hdr.is_none() && matches!(self.dir, CallbackDir::Max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDir {
    Input,
    Output,
    /// Sentinel direction used only by dummy callbacks.
    Max,
}

/// A pluggable event (spec §4.1, §4.8): a work item an external subsystem,
/// in this crate only the resource manager, delivers on the kernel's own
/// queue so its notifications serialise with everything else. The "caller
/// provided handler" of spec §4.1 collapses to this closed set because the
/// resource manager is the one pluggable-event producer the spec actually
/// describes (see DESIGN.md).
#[derive(Debug)]
pub enum PluggableEvent {
    RmWaitEnd { rid: u32 },
    RmPreempted { rid: u32 },
    RmPreemptEnd { rid: u32 },
}

/// The closed set of message classes the dispatcher drains (spec §4.1).
#[derive(Debug)]
pub enum Message {
    SendCommand(SendCommand),
    EmptyThisBuffer(BufferHeader),
    FillThisBuffer(BufferHeader),
    Callback(Callback),
    PluggableEvent(PluggableEvent),
}

impl Message {
    /// `SendCommand` is priority 0 (high); everything else is priority 1
    /// (default), spec §4.1: "Commands enqueue at a higher priority than
    /// buffer traffic so that state transitions are never indefinitely
    /// starved by buffer floods."
    fn is_high_priority(&self) -> bool {
        matches!(self, Message::SendCommand(_))
    }
}

/// Error returned when submitting to a queue whose dispatcher side has
/// been dropped (spec has no cancellation, but a dropped kernel is still a
/// real Rust lifetime event the teacher's `NotifyError::Closed` models).
#[derive(Debug)]
pub struct QueueClosed;

impl fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("kernel message queue is closed")
    }
}

impl error::Error for QueueClosed {}

struct Shared {
    high: Mutex<VecDeque<Message>>,
    normal: Mutex<VecDeque<Message>>,
    not_empty: Condvar,
    closed: Mutex<bool>,
}

/// Cross-thread handle used to submit messages to the kernel's queue.
/// `SendCommand`, `EmptyThisBuffer`, `FillThisBuffer` and
/// `receive_pluggable_event` are all callable from any thread through this
/// (spec §5): submission only ever enqueues, it never touches kernel state.
pub struct Sender {
    shared: Arc<Shared>,
}

impl Clone for Sender {
    fn clone(&self) -> Self {
        Sender {
            shared: self.shared.clone(),
        }
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sender {{ .. }}")
    }
}

impl Sender {
    pub fn send(&self, msg: Message) -> Result<(), QueueClosed> {
        if *self.shared.closed.lock().unwrap() {
            return Err(QueueClosed);
        }

        let class = if msg.is_high_priority() {
            &self.shared.high
        } else {
            &self.shared.normal
        };
        class.lock().unwrap().push_back(msg);
        self.shared.not_empty.notify_one();
        Ok(())
    }
}

/// The single-consumer side, owned by the kernel.
pub struct Receiver {
    shared: Arc<Shared>,
}

impl Receiver {
    /// Block until a message is available (or the queue is closed and
    /// empty), then return it. Commands always drain ahead of buffer
    /// traffic (spec §4.1, §5 "commands preempt buffers on arrival").
    pub fn recv(&self) -> Option<Message> {
        let mut high = self.shared.high.lock().unwrap();
        loop {
            if let Some(msg) = high.pop_front() {
                return Some(msg);
            }
            drop(high);

            let mut normal = self.shared.normal.lock().unwrap();
            if let Some(msg) = normal.pop_front() {
                return Some(msg);
            }

            if *self.shared.closed.lock().unwrap() {
                return None;
            }

            // Wait to be woken by a submission, re-checking the high-priority
            // queue first on each wakeup.
            let (guard, _timeout) = self
                .shared
                .not_empty
                .wait_timeout(normal, std::time::Duration::from_millis(50))
                .unwrap();
            drop(guard);
            high = self.shared.high.lock().unwrap();
        }
    }

    /// Non-blocking drain used by tests and by a dispatcher that wants to
    /// exhaust the queue without suspending.
    pub fn try_recv(&self) -> Option<Message> {
        if let Some(msg) = self.shared.high.lock().unwrap().pop_front() {
            return Some(msg);
        }
        self.shared.normal.lock().unwrap().pop_front()
    }

    pub fn close(&self) {
        *self.shared.closed.lock().unwrap() = true;
        self.shared.not_empty.notify_all();
    }
}

/// Build a fresh queue, returning the submission handle and the consumer
/// side (mirrors `channel::channel()`/`channel::sync_channel()`).
pub fn queue() -> (Sender, Receiver) {
    let shared = Arc::new(Shared {
        high: Mutex::new(VecDeque::new()),
        normal: Mutex::new(VecDeque::new()),
        not_empty: Condvar::new(),
        closed: Mutex::new(false),
    });
    (
        Sender {
            shared: shared.clone(),
        },
        Receiver { shared },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_drain_ahead_of_buffers() {
        let (tx, rx) = queue();
        tx.send(Message::EmptyThisBuffer(BufferHeader::new(1))).unwrap();
        tx.send(Message::SendCommand(SendCommand {
            kind: CommandKind::Flush,
            port: PortTarget::Index(0),
            mark: None,
        }))
        .unwrap();

        match rx.try_recv().unwrap() {
            Message::SendCommand(_) => {}
            other => panic!("expected SendCommand first, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            Message::EmptyThisBuffer(_) => {}
            other => panic!("expected EmptyThisBuffer second, got {other:?}"),
        }
    }

    #[test]
    fn closed_queue_rejects_sends() {
        let (tx, rx) = queue();
        rx.close();
        assert!(tx.send(Message::Callback(Callback::dummy())).is_err());
    }
}
