//! The config port plus ordered data-port sequence, and the four domain
//! aggregates maintained alongside them (spec §3, §4.7).

use log::debug;

use crate::ids::{Domain, PortIndex, CONFIG_PORT_INDEX};
use crate::port::Port;

/// `{ start_index, count }` maintained by registration order for one media
/// domain (spec §3 `domain_aggregates`), backing the `PortParam` queries of
/// spec §4.7.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainAggregate {
    pub start_index: PortIndex,
    pub count: u32,
}

/// Owns the configuration port and the ordered sequence of data ports
/// (spec §3 `ports`). Registration transfers exclusive ownership to the
/// kernel; the kernel destroys ports on deinit (`deregister_all`).
pub struct PortRegistry {
    config_port: Option<Box<dyn Port>>,
    ports: Vec<Box<dyn Port>>,
    domain_aggregates: [DomainAggregate; 4],
}

impl PortRegistry {
    pub fn new() -> Self {
        PortRegistry {
            config_port: None,
            ports: Vec::new(),
            domain_aggregates: [DomainAggregate::default(); 4],
        }
    }

    /// Register a port, taking ownership of it (spec §6 `register_port`).
    pub fn register_port(&mut self, port: Box<dyn Port>, is_config: bool) {
        if is_config {
            debug!("registering config port");
            self.config_port = Some(port);
            return;
        }

        let domain = port.domain();
        let idx: usize = domain.into();
        let agg = &mut self.domain_aggregates[idx];
        if agg.count == 0 {
            agg.start_index = port.index();
        }
        agg.count += 1;

        debug!("registering data port {} (domain {:?})", port.index(), domain);
        self.ports.push(port);
    }

    /// Destroy all registrations (spec §6 `deregister_all_ports`).
    pub fn deregister_all(&mut self) {
        debug!("deregistering all ports");
        self.config_port = None;
        self.ports.clear();
        self.domain_aggregates = [DomainAggregate::default(); 4];
    }

    pub fn get_port(&self, pid: PortIndex) -> Option<&dyn Port> {
        if pid == CONFIG_PORT_INDEX {
            return self.config_port.as_deref();
        }
        self.ports.get(pid as usize).map(|p| p.as_ref())
    }

    pub fn get_port_mut(&mut self, pid: PortIndex) -> Option<&mut (dyn Port + 'static)> {
        if pid == CONFIG_PORT_INDEX {
            return self.config_port.as_deref_mut();
        }
        self.ports.get_mut(pid as usize).map(|p| p.as_mut())
    }

    pub fn config_port(&self) -> Option<&dyn Port> {
        self.config_port.as_deref()
    }

    pub fn config_port_mut(&mut self) -> Option<&mut (dyn Port + 'static)> {
        self.config_port.as_deref_mut()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn ports(&self) -> impl Iterator<Item = &dyn Port> {
        self.ports.iter().map(|p| p.as_ref())
    }

    pub fn ports_mut(&mut self) -> impl Iterator<Item = &mut (dyn Port + 'static)> {
        self.ports.iter_mut().map(|p| p.as_mut())
    }

    pub fn domain_aggregate(&self, domain: Domain) -> DomainAggregate {
        self.domain_aggregates[usize::from(domain)]
    }

    /// Find the port (config port first, then data ports in registration
    /// order) whose declared index set contains `index_id` (spec §4.7).
    pub fn find_managing_port(&self, index_id: u32) -> Option<PortIndex> {
        if let Some(cp) = &self.config_port {
            if cp.find_index(index_id) {
                return Some(CONFIG_PORT_INDEX);
            }
        }
        self.ports
            .iter()
            .find(|p| p.find_index(index_id))
            .map(|p| p.index())
    }

    pub fn find_managing_port_mut(&mut self, index_id: u32) -> Option<&mut (dyn Port + 'static)> {
        if let Some(cp) = &self.config_port {
            if cp.find_index(index_id) {
                return self.config_port.as_deref_mut();
            }
        }
        self.ports
            .iter_mut()
            .find(|p| p.find_index(index_id))
            .map(|p| p.as_mut())
    }

    /// Borrow two distinct data ports mutably at once (spec §4.7 master/
    /// slave propagation needs both sides live simultaneously). Returns
    /// `None` if `a == b` or either index is out of range; the config port
    /// is never a valid argument here since master/slave pairing is a
    /// data-port-only concept.
    pub fn with_port_pair_mut<R>(
        &mut self,
        a: PortIndex,
        b: PortIndex,
        f: impl FnOnce(&mut dyn Port, &mut dyn Port) -> R,
    ) -> Option<R> {
        if a == b {
            return None;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (lo, hi) = (lo as usize, hi as usize);
        if hi >= self.ports.len() {
            return None;
        }
        let (left, right) = self.ports.split_at_mut(hi);
        let port_lo = left.get_mut(lo)?.as_mut();
        let port_hi = right[0].as_mut();
        Some(if a < b { f(port_lo, port_hi) } else { f(port_hi, port_lo) })
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PortDir;

    #[test]
    fn domain_aggregates_track_registration_order() {
        let mut reg = PortRegistry::new();
        reg.register_port(
            Box::new(crate::port::DataPort::new(0, PortDir::Input, Domain::Audio)),
            false,
        );
        reg.register_port(
            Box::new(crate::port::DataPort::new(1, PortDir::Output, Domain::Audio)),
            false,
        );
        reg.register_port(
            Box::new(crate::port::DataPort::new(2, PortDir::Output, Domain::Video)),
            false,
        );

        let audio = reg.domain_aggregate(Domain::Audio);
        assert_eq!(audio.start_index, 0);
        assert_eq!(audio.count, 2);

        let video = reg.domain_aggregate(Domain::Video);
        assert_eq!(video.start_index, 2);
        assert_eq!(video.count, 1);
    }

    #[test]
    fn deregister_all_clears_everything() {
        let mut reg = PortRegistry::new();
        reg.register_port(
            Box::new(crate::port::DataPort::new(0, PortDir::Input, Domain::Audio)),
            false,
        );
        reg.deregister_all();
        assert_eq!(reg.port_count(), 0);
        assert_eq!(reg.domain_aggregate(Domain::Audio).count, 0);
    }

    #[test]
    fn find_managing_port_checks_config_port_first() {
        let mut reg = PortRegistry::new();
        reg.register_port(
            Box::new(crate::port::ConfigPort::new(vec![42])),
            true,
        );
        reg.register_port(
            Box::new(
                crate::port::DataPort::new(0, PortDir::Input, Domain::Audio)
                    .with_declared_indices(vec![7]),
            ),
            false,
        );

        assert_eq!(reg.find_managing_port(42), Some(CONFIG_PORT_INDEX));
        assert_eq!(reg.find_managing_port(7), Some(0));
        assert_eq!(reg.find_managing_port(99), None);
    }
}
