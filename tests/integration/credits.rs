use snappr_core::config::{ProtocolKind, SimConfig};
use snappr_core::{NodeId, Port, TimeDelta};
use snappr_sim::ring;

use crate::*;

/// Credit for two 1500-byte packets, 20 ns hops.
fn two_packet_credit(send_credits: bool) -> SimConfig {
    let mut config = config(ProtocolKind::DirectPut, 20_000);
    config.nic.credits = 3_000;
    config.nic.send_credits = send_credits;
    config
}

/// Three packets, two packets of credit: the third leaves only once the
/// switch hands back the first packet's credit as it lands (35000).
#[test]
fn test_third_packet_waits_for_implicit_credit() {
    let mut sim = sim(&two_packet_credit(false));
    let recv = sim.post_recv(NodeId(1), recv_spec(4_500, 0)).unwrap();
    let send = sim.send(send_args(4_500, 0)).unwrap();

    sim.run_until(ps(34_999)).unwrap();
    let tx = sim.endpoint(NodeId(0)).unwrap();
    assert_eq!(tx.nic().stats().ports()[0].packets_sent, 2);
    assert_eq!(tx.nic().credits().available(Port(0)), Some(0));
    assert_eq!(tx.nic().injection().head_offset(Port(0)), Some(3_000));

    sim.run().unwrap();
    assert_eq!(send.completed_at(), Some(ps(50_000)));
    assert_eq!(recv.completed_at(), Some(ps(70_000)));

    let tx = sim.endpoint(NodeId(0)).unwrap();
    assert_eq!(tx.nic().credits().consumed(Port(0)), 0);
    let port = &tx.nic().stats().ports()[0];
    assert_eq!(port.stalled, TimeDelta::from_ps(35_000));
    assert_eq!(port.stalls, 1);
}

/// Same transfer with explicit returns: the receiver sends the credit back
/// over the fabric once the packet is ejected, one more hop.
#[test]
fn test_explicit_credit_return_costs_a_hop() {
    let mut sim = sim(&two_packet_credit(true));
    let recv = sim.post_recv(NodeId(1), recv_spec(4_500, 0)).unwrap();
    let send = sim.send(send_args(4_500, 0)).unwrap();
    sim.run().unwrap();

    assert_eq!(send.completed_at(), Some(ps(70_000)));
    assert_eq!(recv.completed_at(), Some(ps(90_000)));

    let tx = sim.endpoint(NodeId(0)).unwrap();
    assert_eq!(tx.nic().credits().consumed(Port(0)), 0);
    assert_eq!(
        tx.nic().stats().ports()[0].stalled,
        TimeDelta::from_ps(55_000)
    );
}

/// A stalled head holds back everything queued behind it on the port.
#[test]
fn test_stalled_message_blocks_the_next_one() {
    let mut sim = sim(&two_packet_credit(false));
    let first = sim.post_recv(NodeId(1), recv_spec(4_500, 1)).unwrap();
    let second = sim.post_recv(NodeId(1), recv_spec(100, 2)).unwrap();
    sim.send(send_args(4_500, 1)).unwrap();
    sim.send(send_args(100, 2)).unwrap();
    sim.run().unwrap();

    // Second message: one packet right behind the first's tail (50000).
    assert_eq!(first.completed_at(), Some(ps(70_000)));
    assert_eq!(second.completed_at(), Some(ps(71_000)));
}

#[test]
fn test_ports_have_independent_credit() {
    let mut sim = sim(&{
        let mut config = two_packet_credit(false);
        config.nic.num_ports = 2;
        config
    });
    let blocked = sim.post_recv(NodeId(1), recv_spec(4_500, 1)).unwrap();
    let free = sim.post_recv(NodeId(1), recv_spec(100, 2)).unwrap();
    sim.send(send_args(4_500, 1)).unwrap();
    let mut other = send_args(100, 2);
    other.port = Port(1);
    sim.send(other).unwrap();
    sim.run().unwrap();

    assert_eq!(free.completed_at(), Some(ps(21_000)));
    assert_eq!(blocked.completed_at(), Some(ps(70_000)));
}

/// Credit return mode and transport acks are independent: every pairing
/// delivers everything and leaves no credit outstanding.
#[test]
fn test_credit_mode_and_protocol_combinations() {
    for send_credits in [false, true] {
        for protocol in [ProtocolKind::DirectPut, ProtocolKind::Eager] {
            let mut config = config(protocol, 10_000);
            config.nic.credits = 4_500;
            config.nic.send_credits = send_credits;
            config.workload.endpoints = 3;
            config.workload.messages = 5;
            config.workload.message_bytes = 12_345;

            let mut sim = sim(&config);
            let workload = ring(&mut sim, &config.workload).unwrap();
            sim.run().unwrap();

            assert_eq!(workload.incomplete(), 0, "{protocol:?} send_credits={send_credits}");
            for ep in sim.endpoints() {
                assert_eq!(ep.nic().credits().consumed(Port(0)), 0);
                assert!(ep.protocol().send_flows().is_empty());
            }
        }
    }
}
