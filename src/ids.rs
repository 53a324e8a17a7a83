//! Port indices and the domain/direction tags attached to them.

/// A data-port index. Valid data ports occupy the half-open range `[0, N)`
/// (spec §9: "specification standardises on half-open intervals").
pub type PortIndex = u32;

/// Sentinel index reserved for the exclusively-owned configuration port, a
/// fixed out-of-band value so [`crate::port::registry::PortRegistry::find_managing_port`]
/// can distinguish it from data-port indices (spec §3, §6).
pub const CONFIG_PORT_INDEX: PortIndex = PortIndex::MAX;

/// Sentinel accepted as a port index by `PortDisable`/`PortEnable` to mean
/// "every data port" (spec §4.3).
pub const ALL_PORTS: PortIndex = PortIndex::MAX - 1;

/// Target of a multi-port command: either a specific port or every port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortTarget {
    Index(PortIndex),
    All,
}

/// Direction a data port moves buffers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDir {
    Input,
    Output,
}

/// Media domain a data port carries, used to maintain the `PortParam`
/// aggregates of spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Audio,
    Video,
    Image,
    Other,
}

impl Domain {
    pub const ALL: [Domain; 4] = [Domain::Audio, Domain::Video, Domain::Image, Domain::Other];

    fn as_usize(self) -> usize {
        match self {
            Domain::Audio => 0,
            Domain::Video => 1,
            Domain::Image => 2,
            Domain::Other => 3,
        }
    }
}

impl From<Domain> for usize {
    fn from(d: Domain) -> usize {
        d.as_usize()
    }
}
