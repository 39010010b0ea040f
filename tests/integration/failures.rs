use snappr_core::config::ProtocolKind;
use snappr_core::{FlowId, MessageKind, NetworkMessage, NodeId};
use snappr_sim::SimError;
use snappr_transport::ProtocolError;

use crate::*;

fn stray_ack(flow: u64) -> NetworkMessage {
    NetworkMessage::new(NodeId(1), NodeId(0), FlowId(flow), 0, MessageKind::RdmaPutSentAck)
}

/// An ack for a flow that was never registered aborts the run and names
/// the flow. In-flight state stays put for inspection.
#[test]
fn test_ack_for_unknown_flow_is_fatal() {
    let mut sim = sim(&config(ProtocolKind::DirectPut, 1_000));
    sim.post_recv(NodeId(1), recv_spec(10_000, 0)).unwrap();
    let send = sim.send(send_args(10_000, 0)).unwrap();
    sim.schedule_delivery(ps(10), NodeId(0), stray_ack(4242));

    let err = sim.run().unwrap_err();
    assert!(matches!(
        err,
        SimError::Protocol(ProtocolError::UnknownAck {
            flow: FlowId(4242),
            ..
        })
    ));
    assert!(err.to_string().contains("flow4242"));

    assert_eq!(sim.now(), ps(10));
    assert!(!send.is_complete());
    let tx = sim.endpoint(NodeId(0)).unwrap();
    assert_eq!(tx.protocol().send_flows().in_flight(), vec![FlowId(0)]);
    assert!(sim.pending_events() > 0);
}

/// The genuine ack completes the send; a duplicate of it finds nothing.
#[test]
fn test_duplicate_ack_is_fatal_and_request_completes_once() {
    let mut sim = sim(&config(ProtocolKind::DirectPut, 1_000));
    sim.post_recv(NodeId(1), recv_spec(100, 0)).unwrap();
    let send = sim.send(send_args(100, 0)).unwrap();
    sim.schedule_delivery(ps(500_000), NodeId(0), stray_ack(0));

    let err = sim.run().unwrap_err();
    assert!(matches!(
        err,
        SimError::Protocol(ProtocolError::UnknownAck { flow: FlowId(0), .. })
    ));
    assert_eq!(send.completed_at(), Some(ps(1_000)));
    assert_eq!(send.completions(), 1);
}

#[test]
fn test_kind_foreign_to_protocol_is_fatal() {
    let mut sim = sim(&config(ProtocolKind::DirectPut, 1_000));
    let eager_payload = NetworkMessage::new(NodeId(0), NodeId(1), FlowId(3), 10, MessageKind::Payload);
    sim.schedule_delivery(ps(0), NodeId(1), eager_payload);

    let err = sim.run().unwrap_err();
    assert!(matches!(
        err,
        SimError::Protocol(ProtocolError::UnexpectedKind {
            protocol: "direct_put",
            kind: MessageKind::Payload,
            flow: FlowId(3),
        })
    ));

    let mut eager = crate::sim(&config(ProtocolKind::Eager, 1_000));
    eager.schedule_delivery(ps(0), NodeId(0), stray_ack(1));
    assert!(matches!(
        eager.run(),
        Err(SimError::Protocol(ProtocolError::UnexpectedKind { protocol: "eager", .. }))
    ));
}

#[test]
fn test_receive_too_small_is_fatal() {
    let mut sim = sim(&config(ProtocolKind::DirectPut, 1_000));
    let recv = sim.post_recv(NodeId(1), recv_spec(100, 0)).unwrap();
    sim.send(send_args(1_000, 0)).unwrap();

    let err = sim.run().unwrap_err();
    assert!(matches!(
        err,
        SimError::Protocol(ProtocolError::Truncated {
            count: 1_000,
            capacity: 100,
            ..
        })
    ));
    assert!(!recv.is_complete());
}

#[test]
fn test_message_to_missing_endpoint_is_rejected() {
    let mut sim = sim(&config(ProtocolKind::DirectPut, 1_000));
    let mut args = send_args(10, 0);
    args.dst = NodeId(7);
    assert!(matches!(sim.send(args), Err(SimError::UnknownNode(NodeId(7)))));
    assert_eq!(sim.endpoint(NodeId(0)).unwrap().flows_issued(), 0);
}
