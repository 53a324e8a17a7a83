//! Error and non-error status types used throughout the kernel.

use std::error;
use std::fmt;

/// Errors the kernel can report, either synchronously from an API call or
/// asynchronously via [`crate::events::Event::CommandComplete`] /
/// [`crate::events::Event::Error`].
///
/// This mirrors the reserved error codes of the external protocol (spec §6):
/// bad-input errors are returned directly to the caller, resource/protocol/RM
/// failures are routed through the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A port index did not resolve to a registered port or `ALL`.
    BadPortIndex,
    /// A resource (buffer, RM grant) could not be allocated.
    InsufficientResources,
    /// A state-set command requested the state the component is already in.
    SameState,
    /// A parameter/config index has no managing port.
    UnsupportedIndex,
    /// A content URI could not be parsed or resolved.
    ContentURIError,
    /// An operation was attempted on an enabled, populated port outside the
    /// substate that allows depopulation.
    PortUnpopulated,
    /// The resource manager preempted (or is preempting) this component.
    ResourcesPreempted,
    /// The requested operation has no implementation at this layer.
    NotImplemented,
    /// Catch-all for conditions with no more specific reserved code.
    Undefined,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::BadPortIndex => "bad port index",
            KernelError::InsufficientResources => "insufficient resources",
            KernelError::SameState => "already in requested state",
            KernelError::UnsupportedIndex => "unsupported parameter/config index",
            KernelError::ContentURIError => "content URI error",
            KernelError::PortUnpopulated => "port unpopulated",
            KernelError::ResourcesPreempted => "resources preempted",
            KernelError::NotImplemented => "not implemented",
            KernelError::Undefined => "undefined error",
        };
        f.write_str(msg)
    }
}

impl error::Error for KernelError {}

/// Non-error status codes returned by port mark operations (spec §4.5/§6).
/// `NoMore` and `NotReady` are not failures: they distinguish "nothing left
/// to stamp" from an actual ownership hit, and are never surfaced to the IL
/// Client as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkStamp {
    /// The header was stamped with a mark owned by the port.
    Owned,
    /// The header was stamped with a mark that is merely passing through.
    NotOwned,
    /// The port's mark queue is empty.
    NoMore,
}
