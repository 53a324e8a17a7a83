//! End-to-end dispatcher tests driving a real `Kernel` against the fakes in
//! `support`, one per scenario called out for this subsystem: state
//! transitions gated on buffer supply, flush/disable against a processor
//! that holds onto claimed buffers, EOS firing once, and mark propagation.

mod support;

use std::sync::Arc;

use support::{drain, EchoProcessor, HoldingProcessor, SharedFsm, SharedSink};
use tizkernel::{
    BufferFlags, BufferHeader, CommandKind, DataPort, Domain, Kernel, KernelConfig, Mark, Port,
    PortDir, PortTarget, State, Substate,
};

fn make_port(index: u32, dir: PortDir, domain: Domain, buffer_count: usize) -> Box<dyn Port> {
    let mut port = DataPort::new(index, dir, domain);
    port.set_buffer_count(buffer_count);
    Box::new(port)
}

#[test]
fn loaded_idle_loaded_gated_by_buffer_supply() {
    let fsm = SharedFsm::new(Substate::Loaded);
    let sink = SharedSink::new();
    let (processor, sender_cell) = EchoProcessor::new();
    let (mut kernel, tx) = Kernel::new(
        0xCAFE,
        Box::new(fsm.clone()),
        Box::new(processor),
        Box::new(sink.clone()),
        KernelConfig::new(),
    );
    sender_cell.set(tx);
    kernel.register_port(make_port(0, PortDir::Input, Domain::Audio, 2), false);
    kernel.register_port(make_port(1, PortDir::Output, Domain::Audio, 2), false);

    kernel.send_command(CommandKind::StateSet(State::Idle), PortTarget::All, None).unwrap();
    drain(&mut kernel);
    assert!(fsm.transitions().is_empty(), "Idle transition must wait for buffer supply");

    let hdr00 = kernel.use_buffer(0, 100).unwrap();
    assert!(fsm.transitions().is_empty());
    let hdr01 = kernel.use_buffer(0, 101).unwrap();
    assert!(fsm.transitions().is_empty(), "port 1 has not supplied any buffers yet");
    let hdr10 = kernel.use_buffer(1, 200).unwrap();
    assert!(fsm.transitions().is_empty());
    let hdr11 = kernel.use_buffer(1, 201).unwrap();

    let transitions = fsm.transitions();
    assert_eq!(transitions, vec![(State::Idle, None)], "completes exactly once, after the 4th buffer");

    // Idle -> Loaded: both ports' disables complete synchronously (nothing
    // claimed), but the transition itself still waits on every buffer being
    // freed back down to zero.
    kernel.send_command(CommandKind::StateSet(State::Loaded), PortTarget::All, None).unwrap();
    drain(&mut kernel);
    assert_eq!(fsm.transitions().len(), 1, "Loaded transition must wait for FreeBuffer");

    kernel.free_buffer(0, hdr00).unwrap();
    kernel.free_buffer(0, hdr01).unwrap();
    assert_eq!(fsm.transitions().len(), 1);
    kernel.free_buffer(1, hdr10).unwrap();
    assert_eq!(fsm.transitions().len(), 1);
    kernel.free_buffer(1, hdr11).unwrap();

    let transitions = fsm.transitions();
    assert_eq!(transitions.len(), 2, "completes exactly once, after the 4th free");
    assert_eq!(transitions[1], (State::Loaded, None));
}

#[test]
fn flush_completes_only_after_processor_releases_claimed_buffer() {
    let fsm = SharedFsm::new(Substate::Executing);
    let sink = SharedSink::new();
    let (processor, handle) = HoldingProcessor::new();
    let (mut kernel, tx) = Kernel::new(
        0xCAFE,
        Box::new(fsm.clone()),
        Box::new(processor),
        Box::new(sink.clone()),
        KernelConfig::new(),
    );
    handle.set_sender(tx);
    kernel.register_port(make_port(0, PortDir::Input, Domain::Audio, 1), false);

    let mut hdr = BufferHeader::new(1);
    hdr.input_port_index = Some(0);
    kernel.empty_this_buffer(hdr).unwrap();
    drain(&mut kernel);
    assert_eq!(handle.held_count(), 1, "processor should be holding the claimed buffer");

    kernel.send_command(CommandKind::Flush, PortTarget::Index(0), None).unwrap();
    drain(&mut kernel);
    assert_eq!(sink.command_completes(), 0, "flush must wait on the claimed buffer");

    handle.release_one();
    drain(&mut kernel);
    assert_eq!(sink.command_completes(), 1);
    assert!(sink.events().iter().any(|e| e.contains("Flush")));
}

#[test]
fn eos_flag_event_fires_once() {
    let fsm = SharedFsm::new(Substate::Executing);
    let sink = SharedSink::new();
    let (processor, sender_cell) = EchoProcessor::new();
    let (mut kernel, tx) = Kernel::new(
        0xCAFE,
        Box::new(fsm.clone()),
        Box::new(processor),
        Box::new(sink.clone()),
        KernelConfig::new(),
    );
    sender_cell.set(tx);
    kernel.register_port(make_port(0, PortDir::Output, Domain::Audio, 1), false);

    let mut hdr1 = BufferHeader::new(1);
    hdr1.output_port_index = Some(0);
    hdr1.flags = BufferFlags::EOS;
    kernel.fill_this_buffer(hdr1).unwrap();
    drain(&mut kernel);

    let mut hdr2 = BufferHeader::new(2);
    hdr2.output_port_index = Some(0);
    hdr2.flags = BufferFlags::EOS;
    kernel.fill_this_buffer(hdr2).unwrap();
    drain(&mut kernel);

    let eos_events = sink.events().iter().filter(|e| e.starts_with("BufferFlag")).count();
    assert_eq!(eos_events, 1, "a second EOS-flagged header must not re-fire the event");
}

#[test]
fn port_disable_waits_for_claimed_buffer_then_completes() {
    let fsm = SharedFsm::new(Substate::Executing);
    let sink = SharedSink::new();
    let (processor, handle) = HoldingProcessor::new();
    let (mut kernel, tx) = Kernel::new(
        0xCAFE,
        Box::new(fsm.clone()),
        Box::new(processor),
        Box::new(sink.clone()),
        KernelConfig::new(),
    );
    handle.set_sender(tx);
    kernel.register_port(make_port(0, PortDir::Input, Domain::Audio, 1), false);

    let mut hdr = BufferHeader::new(1);
    hdr.input_port_index = Some(0);
    kernel.empty_this_buffer(hdr).unwrap();
    drain(&mut kernel);
    assert_eq!(handle.held_count(), 1);

    kernel.send_command(CommandKind::PortDisable, PortTarget::Index(0), None).unwrap();
    drain(&mut kernel);
    assert_eq!(sink.command_completes(), 0, "disable must wait on the claimed buffer");
    assert!(fsm.commands().is_empty());

    handle.release_one();
    drain(&mut kernel);
    assert_eq!(sink.command_completes(), 1);
    assert!(sink.events().iter().any(|e| e.contains("PortDisable")));
    assert_eq!(fsm.commands(), vec![(CommandKind::PortDisable, PortTarget::Index(0), None)]);
}

#[test]
fn mark_propagates_from_input_to_all_outputs_and_each_completes() {
    let fsm = SharedFsm::new(Substate::Executing);
    let sink = SharedSink::new();
    let (processor, sender_cell) = EchoProcessor::new();
    let (mut kernel, tx) = Kernel::new(
        0xCAFE,
        Box::new(fsm.clone()),
        Box::new(processor),
        Box::new(sink.clone()),
        KernelConfig::new(),
    );
    sender_cell.set(tx);
    kernel.register_port(make_port(0, PortDir::Input, Domain::Audio, 1), false);
    kernel.register_port(make_port(1, PortDir::Output, Domain::Audio, 1), false);
    kernel.register_port(make_port(2, PortDir::Output, Domain::Video, 1), false);

    let mut hdr = BufferHeader::new(1);
    hdr.input_port_index = Some(0);
    hdr.mark = Some(Mark { target: 0xFACE, data: Arc::new(()), owner: Some(0) });
    kernel.empty_this_buffer(hdr).unwrap();
    drain(&mut kernel);

    let mut out1 = BufferHeader::new(2);
    out1.output_port_index = Some(1);
    kernel.fill_this_buffer(out1).unwrap();
    drain(&mut kernel);

    let mut out2 = BufferHeader::new(3);
    out2.output_port_index = Some(2);
    kernel.fill_this_buffer(out2).unwrap();
    drain(&mut kernel);

    let mark_completes = sink.events().iter().filter(|e| e.contains("MarkBuffer")).count();
    assert_eq!(mark_completes, 2, "each output port completes its own propagated copy");
}

#[test]
fn pause_defers_callbacks_until_resume_drains_egress() {
    let fsm = SharedFsm::new(Substate::Executing);
    let sink = SharedSink::new();
    let (processor, sender_cell) = EchoProcessor::new();
    let (mut kernel, tx) = Kernel::new(
        0xCAFE,
        Box::new(fsm.clone()),
        Box::new(processor),
        Box::new(sink.clone()),
        KernelConfig::new(),
    );
    sender_cell.set(tx);
    kernel.register_port(make_port(0, PortDir::Input, Domain::Audio, 1), false);

    fsm.0.borrow_mut().substate = Substate::Pause;
    let mut hdr = BufferHeader::new(1);
    hdr.input_port_index = Some(0);
    kernel.empty_this_buffer(hdr).unwrap();
    drain(&mut kernel);

    assert!(
        sink.events().iter().all(|e| !e.contains("EmptyBufferDone") && !e.contains("empty_done")),
        "a buffer arriving during Pause must not be handed to the processor"
    );
    assert!(sink.0.borrow().empty_done.is_empty());
}
