//! Parameter/config routing (spec §4.7). `SetParameter`, `GetParameter`,
//! `GetConfig`, `SetConfig` and `GetExtensionIndex` are synchronous and
//! never touch the queue; they delegate directly to whichever port
//! declares the requested index, the config port taking priority.

use super::Kernel;
use crate::error::KernelError;
use crate::events::Event;
use crate::ids::{Domain, PortIndex, CONFIG_PORT_INDEX};
use crate::port::registry::DomainAggregate;
use crate::port::Port;

impl Kernel {
    fn managing_port(&self, index_id: u32) -> Result<PortIndex, KernelError> {
        self.registry.find_managing_port(index_id).ok_or(KernelError::UnsupportedIndex)
    }

    /// `GetParameter`/`GetConfig`/`GetExtensionIndex` (read-only delegation,
    /// spec §4.7): find the managing port and run `read` against it.
    pub fn get_parameter<R>(
        &self,
        index_id: u32,
        read: impl FnOnce(&dyn Port) -> Result<R, KernelError>,
    ) -> Result<R, KernelError> {
        let pid = self.managing_port(index_id)?;
        let port = self.registry.get_port(pid).ok_or(KernelError::BadPortIndex)?;
        read(port)
    }

    /// `SetConfig` (write delegation, no master/slave propagation; that is
    /// `SetParameter`-only per spec §4.7).
    pub fn set_config(
        &mut self,
        index_id: u32,
        write: impl FnOnce(&mut dyn Port) -> Result<(), KernelError>,
    ) -> Result<(), KernelError> {
        let pid = self.managing_port(index_id)?;
        let port = self.registry.get_port_mut(pid).ok_or(KernelError::BadPortIndex)?;
        write(port)
    }

    /// `SetParameter` (spec §4.7): on success, if the port has a paired
    /// master/slave counterpart, ask its master side to propagate slaving
    /// behaviour and emit `PortSettingsChanged` for each sub-index that
    /// changed as a result.
    pub fn set_parameter(
        &mut self,
        index_id: u32,
        write: impl FnOnce(&mut dyn Port) -> Result<(), KernelError>,
    ) -> Result<(), KernelError> {
        let pid = self.managing_port(index_id)?;
        {
            let port = self.registry.get_port_mut(pid).ok_or(KernelError::BadPortIndex)?;
            write(port)?;
        }

        if pid == CONFIG_PORT_INDEX {
            return Ok(());
        }

        let Some(paired) = self.registry.get_port(pid).and_then(|p| p.master_or_slave()) else {
            return Ok(());
        };

        // The port whose SetParameter just succeeded drives the call; a
        // slave's default `apply_slaving_behaviour` is a no-op, so it is
        // safe to invoke this even when `pid` turns out to be the slave
        // side of the pair (see DESIGN.md).
        let changed = self
            .registry
            .with_port_pair_mut(pid, paired, |a, b| a.apply_slaving_behaviour(b))
            .unwrap_or(Ok(Vec::new()))?;

        for sub_index in changed {
            self.events.emit(Event::PortSettingsChanged { port: pid, sub_index });
        }
        Ok(())
    }

    /// The four `PortParam` domain queries (spec §4.7), served from the
    /// registration-order aggregates rather than a port walk.
    pub fn port_param(&self, domain: Domain) -> DomainAggregate {
        self.registry.domain_aggregate(domain)
    }
}
