//! Mark propagation (spec §4.5).

use crate::buffer::{BufferHeader, ComponentHandle};
use crate::error::MarkStamp;
use crate::events::{Event, EventSink};
use crate::ids::{PortDir, PortIndex, PortTarget};
use crate::port::registry::PortRegistry;
use crate::queue::CommandKind;

/// Egress-time mark handling for one outgoing header on port `pid`
/// (spec §4.5 `process_marks`, called from `flush_egress`).
///
/// - A mark already targeting `self_handle` fires `Event::Mark` and is
///   cleared; it does not propagate further.
/// - A mark on an **input** port header is handed to every output port's
///   mark queue (propagation, not ownership) and cleared from the header.
/// - A markless **output** port header is offered the port's next stored
///   mark; if the stamp succeeded and the mark was owned by this port, the
///   pending `MarkBuffer` command completes.
pub fn process_marks(
    registry: &mut PortRegistry,
    pid: PortIndex,
    hdr: &mut BufferHeader,
    self_handle: ComponentHandle,
    events: &mut dyn EventSink,
) {
    let dir = match registry.get_port(pid) {
        Some(p) => p.dir(),
        None => return,
    };

    if let Some(mark) = &hdr.mark {
        if mark.target == self_handle {
            let data = mark.data.clone();
            hdr.mark = None;
            events.emit(Event::Mark { data });
            return;
        }

        if dir == PortDir::Input {
            let mark = hdr.mark.take().unwrap();
            let targets: Vec<PortIndex> =
                registry.ports().filter(|p| p.dir() == PortDir::Output).map(|p| p.index()).collect();
            for out_pid in targets {
                if let Some(out_port) = registry.get_port_mut(out_pid) {
                    out_port.store_mark(crate::buffer::Mark {
                        target: mark.target,
                        data: mark.data.clone(),
                        owner: Some(out_pid),
                    });
                }
            }
            return;
        }
        return;
    }

    if dir == PortDir::Output {
        if let Some(port) = registry.get_port_mut(pid) {
            if port.mark_buffer(hdr) == MarkStamp::Owned {
                events.emit(Event::CommandComplete {
                    cmd: CommandKind::MarkBuffer,
                    port: PortTarget::Index(pid),
                    error: None,
                });
            }
        }
    }
}

/// Drain a port's pending marks on disable, completing each one owned by
/// the port with `PortUnpopulated` (spec §4.4/§4.3 `flush_marks`, called
/// from `complete_port_disable`).
pub fn flush_marks(port: &mut dyn crate::port::Port, events: &mut dyn EventSink) {
    let mut scratch = BufferHeader::new(0);
    loop {
        match port.mark_buffer(&mut scratch) {
            MarkStamp::NoMore => break,
            MarkStamp::Owned => {
                events.emit(Event::CommandComplete {
                    cmd: CommandKind::MarkBuffer,
                    port: PortTarget::Index(port.index()),
                    error: Some(crate::error::KernelError::PortUnpopulated),
                });
            }
            MarkStamp::NotOwned => {}
        }
        scratch.mark = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Domain;
    use crate::port::DataPort;
    use std::sync::Arc;

    struct RecordingSink {
        events: Vec<String>,
    }
    impl EventSink for RecordingSink {
        fn emit(&mut self, event: Event) {
            self.events.push(format!("{event:?}"));
        }
        fn empty_buffer_done(&mut self, _port: PortIndex, _hdr: BufferHeader) {}
        fn fill_buffer_done(&mut self, _port: PortIndex, _hdr: BufferHeader) {}
    }

    #[test]
    fn mark_targeting_self_fires_once_and_does_not_propagate() {
        let mut registry = PortRegistry::new();
        registry.register_port(Box::new(DataPort::new(0, PortDir::Input, Domain::Audio)), false);
        registry.register_port(Box::new(DataPort::new(1, PortDir::Output, Domain::Audio)), false);

        let mut sink = RecordingSink { events: Vec::new() };
        let mut hdr = BufferHeader::new(1);
        hdr.mark = Some(crate::buffer::Mark {
            target: 0xCAFE,
            data: Arc::new(()),
            owner: Some(0),
        });

        process_marks(&mut registry, 0, &mut hdr, 0xCAFE, &mut sink);

        assert!(hdr.mark.is_none());
        assert_eq!(sink.events.len(), 1);
        assert!(sink.events[0].starts_with("Mark"));
        assert!(registry.get_port(1).unwrap().claimed_count() == 0);
    }

    #[test]
    fn input_mark_propagates_to_all_outputs() {
        let mut registry = PortRegistry::new();
        registry.register_port(Box::new(DataPort::new(0, PortDir::Input, Domain::Audio)), false);
        registry.register_port(Box::new(DataPort::new(1, PortDir::Output, Domain::Audio)), false);
        registry.register_port(Box::new(DataPort::new(2, PortDir::Output, Domain::Video)), false);

        let mut sink = RecordingSink { events: Vec::new() };
        let mut hdr = BufferHeader::new(1);
        hdr.mark = Some(crate::buffer::Mark {
            target: 0xBEEF,
            data: Arc::new(()),
            owner: Some(0),
        });

        process_marks(&mut registry, 0, &mut hdr, 0xCAFE, &mut sink);
        assert!(hdr.mark.is_none());

        // Both output ports should stamp an outgoing header with the
        // propagated mark; each now owns its own copy, so each completes its
        // own pending MarkBuffer command once stamped.
        let mut out1 = BufferHeader::new(2);
        let stamp1 = registry.get_port_mut(1).unwrap().mark_buffer(&mut out1);
        assert_eq!(stamp1, MarkStamp::Owned);

        let mut out2 = BufferHeader::new(3);
        let stamp2 = registry.get_port_mut(2).unwrap().mark_buffer(&mut out2);
        assert_eq!(stamp2, MarkStamp::Owned);
    }

    #[test]
    fn flush_marks_completes_owned_marks_with_port_unpopulated() {
        let mut port = DataPort::new(1, PortDir::Output, Domain::Audio);
        port.store_mark(crate::buffer::Mark {
            target: 0xCAFE,
            data: Arc::new(()),
            owner: Some(1),
        });

        let mut sink = RecordingSink { events: Vec::new() };
        flush_marks(&mut port, &mut sink);

        assert_eq!(sink.events.len(), 1);
        assert!(sink.events[0].contains("PortUnpopulated"));
    }
}
