//! Resource-manager integration (spec §4.8).
//!
//! On `Loaded → Idle` the kernel reads the component's name and priority
//! from the config port and initialises an RM proxy with three scheduled
//! callbacks. Each callback only ever allocates a `{rid}` payload and hands
//! it back to the kernel as a [`crate::queue::PluggableEvent`], so RM
//! notifications serialise through the same queue as everything else
//! (spec §5).

use log::debug;

use crate::error::KernelError;
use crate::queue::{Message, PluggableEvent, Sender};

/// What `acquire` reported, mapped per spec §4.2/§9: preemption-in-progress
/// and not-enough-resource both stop the transition rather than rolling
/// back already-completed per-port steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Granted,
    PreemptionInProgress,
    InsufficientResources,
}

/// Where an RM client delivers its three scheduled callbacks (spec §4.8:
/// "delivers it to the kernel as a `PluggableEvent`"). Implemented for
/// [`Sender`] so a real RM client, running on its own thread, can post
/// straight onto the kernel's queue without depending on `Kernel` itself.
pub trait RmCallbackSink: Send {
    fn wait_end(&self, rid: u32);
    fn preempted(&self, rid: u32);
    fn preempt_end(&self, rid: u32);
}

impl RmCallbackSink for Sender {
    fn wait_end(&self, rid: u32) {
        let _ = self.send(Message::PluggableEvent(PluggableEvent::RmWaitEnd { rid }));
    }

    fn preempted(&self, rid: u32) {
        let _ = self.send(Message::PluggableEvent(PluggableEvent::RmPreempted { rid }));
    }

    fn preempt_end(&self, rid: u32) {
        let _ = self.send(Message::PluggableEvent(PluggableEvent::RmPreemptEnd { rid }));
    }
}

/// The proxy to an external resource manager. A real RM client lives
/// outside this crate; `RmClient` is the seam it implements.
pub trait RmClient {
    fn init(&mut self, component_name: &str, priority: u32, sink: Box<dyn RmCallbackSink>);
    fn deinit(&mut self);
    fn acquire(&mut self) -> AcquireOutcome;
    fn release(&mut self);
}

/// Kernel-side state for an RM proxy in use (spec §3 `rm`). Holds the
/// client as a trait object. Like the kernel's `Fsm`/`Processor`/
/// `EventSink` collaborators, there is exactly one RM proxy per component
/// instance, so a generic parameter would only push the same bound up into
/// `Kernel` for no benefit.
pub struct ResourceManager {
    client: Box<dyn RmClient>,
    next_rid: u32,
}

impl ResourceManager {
    pub fn new(
        mut client: Box<dyn RmClient>,
        component_name: &str,
        priority: u32,
        queue_tx: Sender,
    ) -> Self {
        debug!("rm: init for '{component_name}' priority {priority}");
        client.init(component_name, priority, Box::new(queue_tx));
        ResourceManager { client, next_rid: 0 }
    }

    pub fn acquire(&mut self) -> Result<(), KernelError> {
        match self.client.acquire() {
            AcquireOutcome::Granted => Ok(()),
            AcquireOutcome::PreemptionInProgress => Err(KernelError::ResourcesPreempted),
            AcquireOutcome::InsufficientResources => Err(KernelError::InsufficientResources),
        }
    }

    pub fn release(&mut self) {
        self.client.release();
    }

    pub fn deinit(&mut self) {
        debug!("rm: deinit");
        self.client.deinit();
    }

    /// Allocate the next `rid` for a scheduled callback delivery.
    pub fn next_rid(&mut self) -> u32 {
        let rid = self.next_rid;
        self.next_rid += 1;
        rid
    }

    /// Reclaim the underlying client after `deinit`, so the next
    /// Loaded→Idle transition can reuse it rather than requiring a fresh
    /// one to be configured every cycle.
    pub fn into_client(self) -> Box<dyn RmClient> {
        self.client
    }
}
