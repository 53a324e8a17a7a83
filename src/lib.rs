//! A single-threaded, cooperative command-and-buffer dispatcher for an
//! OpenMAX IL-like multimedia component (spec §1).
//!
//! [`kernel::Kernel`] is the crate's entry point: it owns the priority
//! message queue (`queue`), the registered port set (`port`), and the three
//! collaborator seams an embedding component provides (`fsm::Fsm`,
//! `processor::Processor`, `events::EventSink`), plus the optional
//! `resource_manager::RmClient`. Everything else in this crate exists to
//! make the kernel's own state transitions correct and observable.

pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod ids;
pub mod kernel;
pub mod mark;
pub mod port;
pub mod processor;
pub mod queue;
pub mod resource_manager;
pub mod tunnel;

pub use buffer::{BufferFlags, BufferHeader, ComponentHandle, Mark, MarkPayload};
pub use config::KernelConfig;
pub use error::{KernelError, MarkStamp};
pub use events::{Event, EventSink};
pub use fsm::{Fsm, State, Substate};
pub use ids::{Domain, PortDir, PortIndex, PortTarget, ALL_PORTS, CONFIG_PORT_INDEX};
pub use kernel::{Kernel, PopulationStatus};
pub use port::registry::{DomainAggregate, PortRegistry};
pub use port::{ConfigPort, DataPort, Port};
pub use processor::Processor;
pub use queue::{Callback, CallbackDir, CommandKind, Message, PluggableEvent, Sender, SendCommand};
pub use resource_manager::{AcquireOutcome, ResourceManager, RmCallbackSink, RmClient};
pub use tunnel::TunnelPeer;
