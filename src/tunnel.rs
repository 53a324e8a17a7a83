//! Tunnel peer synchronisation (spec §5).
//!
//! Each tunnelled port has an associated peer record living in the *other*
//! component's kernel instance, a `(mutex, semaphore, waiter-count)` tuple
//! this crate never owns. [`TunnelPeer`] is the seam the kernel calls
//! through, the same way [`crate::port::Port`] is a seam over an opaque
//! port: the peer mutex/semaphore bookkeeping is out of this crate's data
//! model (spec §5), but the call shape, acquire, check waiters, signal or
//! defer, release, is this crate's responsibility to drive correctly.

/// The peer side of a tunnel connection (spec §5 "Tunnel cross-component
/// synchronisation").
pub trait TunnelPeer {
    /// Acquire the peer's mutex, read its waiter count, and post its
    /// semaphore if nobody is waiting. Returns `true` if the signal was
    /// posted (the kernel may push the header through), `false` if waiters
    /// were already present (the kernel must defer rather than push into a
    /// back-pressured peer).
    fn signal_or_defer(&self) -> bool;

    /// Wait once on the peer's semaphore to re-sync after a successful push
    /// (spec §5: "After pushing, it waits on the semaphore once").
    fn wait_for_resync(&self);
}
