use std::rc::Rc;

use bytes::Bytes;
use snappr_core::config::ProtocolKind;
use snappr_core::{NodeId, TimeDelta};
use snappr_sim::{ring, RecvSpec};
use snappr_transport::Strided;

use crate::*;

/// 10000 bytes in 1500-byte packets: 7 packets, injection done at
/// 10000 * 10 ps, one reassembly one hop later.
#[test]
fn test_ten_thousand_byte_put() {
    let mut sim = sim(&config(ProtocolKind::DirectPut, 1_000));
    let recv = sim.post_recv(NodeId(1), recv_spec(10_000, 0)).unwrap();
    let send = sim.send(send_args(10_000, 0)).unwrap();
    sim.run().unwrap();

    assert_eq!(send.completed_at(), Some(ps(100_000)));
    assert_eq!(recv.completed_at(), Some(ps(101_000)));
    assert_eq!(send.completions(), 1);
    assert_eq!(recv.completions(), 1);

    let rx = sim.endpoint(NodeId(1)).unwrap();
    assert_eq!(rx.nic().reassembly().completed(), 1);
    assert!(rx.nic().reassembly().in_progress().is_empty());
    let tx = sim.endpoint(NodeId(0)).unwrap();
    assert_eq!(tx.nic().stats().ports()[0].packets_sent, 7);
    assert!(tx.protocol().send_flows().is_empty());
}

#[test]
fn test_eager_has_same_timing_and_carries_data() {
    let mut sim = sim(&config(ProtocolKind::Eager, 1_000));
    let recv = sim.post_recv(NodeId(1), recv_spec(4, 3)).unwrap();
    let mut args = send_args(4, 3);
    args.buffer = Some(Bytes::from_static(b"snap"));
    let send = sim.send(args).unwrap();
    sim.run().unwrap();

    assert_eq!(send.completed_at(), Some(ps(40)));
    assert_eq!(recv.completed_at(), Some(ps(1_040)));
    assert_eq!(recv.data().as_deref(), Some(&b"snap"[..]));
    let status = recv.status().unwrap();
    assert_eq!((status.source, status.tag, status.count, status.bytes), (0, 3, 4, 4));
}

#[test]
fn test_eager_packs_and_receiver_unpacks_strided_data() {
    let strided = Rc::new(Strided::new(40, 2, 4).unwrap());
    let mut sim = sim(&config(ProtocolKind::Eager, 1_000));
    let recv = sim
        .post_recv(
            NodeId(1),
            RecvSpec {
                comm: 0,
                source: None,
                tag: None,
                count: 3,
                datatype: strided.clone(),
            },
        )
        .unwrap();
    let mut args = send_args(3, 0);
    args.datatype = strided;
    args.buffer = Some(Bytes::from_static(&[1, 2, 0, 0, 3, 4, 0, 0, 5, 6]));
    sim.send(args).unwrap();
    sim.run().unwrap();

    assert_eq!(recv.status().unwrap().bytes, 6);
    assert_eq!(
        recv.data().as_deref(),
        Some(&[1u8, 2, 0, 0, 3, 4, 0, 0, 5, 6, 0, 0][..])
    );
}

#[test]
fn test_unexpected_payload_completes_later_receive() {
    let mut sim = sim(&config(ProtocolKind::DirectPut, 1_000));
    let send = sim.send(send_args(3_000, 9)).unwrap();
    sim.run().unwrap();
    assert!(send.is_complete());
    assert_eq!(sim.endpoint(NodeId(1)).unwrap().matcher().unexpected_len(), 1);

    sim.run_until(ps(1_000_000)).unwrap();
    let recv = sim.post_recv(NodeId(1), recv_spec(3_000, 9)).unwrap();
    assert_eq!(recv.completed_at(), Some(ps(1_000_000)));
    // The sender was not late.
    assert_eq!(recv.delay().unwrap().sync, TimeDelta::ZERO);
    assert_eq!(sim.endpoint(NodeId(1)).unwrap().matcher().unexpected_len(), 0);
}

#[test]
fn test_late_sender_is_charged_as_sync_delay() {
    let mut sim = sim(&config(ProtocolKind::DirectPut, 1_000));
    let recv = sim.post_recv(NodeId(1), recv_spec(100, 0)).unwrap();
    sim.send_at(ps(5_000), send_args(100, 0));
    sim.run().unwrap();

    assert_eq!(recv.completed_at(), Some(ps(7_000)));
    assert_eq!(recv.delay().unwrap().sync, TimeDelta::from_ps(5_000));
}

#[test]
fn test_zero_byte_message_still_completes() {
    let mut sim = sim(&config(ProtocolKind::DirectPut, 1_000));
    let recv = sim.post_recv(NodeId(1), recv_spec(0, 0)).unwrap();
    let send = sim.send(send_args(0, 0)).unwrap();
    sim.run().unwrap();

    assert_eq!(send.completed_at(), Some(ps(0)));
    assert_eq!(recv.completed_at(), Some(ps(1_000)));
    assert_eq!(recv.status().unwrap().bytes, 0);
}

#[test]
fn test_ejection_delay_pushes_out_completion() {
    let mut config = config(ProtocolKind::DirectPut, 1_000);
    config.nic.ejection_byte_delay_ps = 1;
    let mut sim = sim(&config);
    let recv = sim.post_recv(NodeId(1), recv_spec(3_000, 0)).unwrap();
    sim.send(send_args(3_000, 0)).unwrap();
    sim.run().unwrap();

    // Packet 1 lands at 16000 and ejects by 17500; packet 2 lands at
    // 31000 and ejects by 32500.
    assert_eq!(recv.completed_at(), Some(ps(32_500)));
}

#[test]
fn test_ring_workload_completes_for_both_protocols() {
    for protocol in [ProtocolKind::DirectPut, ProtocolKind::Eager] {
        let mut config = config(protocol, 50_000);
        config.workload.endpoints = 4;
        config.workload.messages = 3;
        config.workload.message_bytes = 7_000;

        let mut sim = sim(&config);
        let workload = ring(&mut sim, &config.workload).unwrap();
        sim.run().unwrap();

        assert_eq!(workload.incomplete(), 0, "{protocol:?}");
        assert_eq!(workload.recvs.len(), 12);
        for ep in sim.endpoints() {
            assert_eq!(ep.flows_issued(), 3);
            assert_eq!(ep.matcher().finalized(), 3);
            assert_eq!(ep.matcher().unexpected_len(), 0);
            assert!(ep.protocol().send_flows().is_empty());
        }
    }
}
