//! snappr integration test harness.
//!
//! Every test builds a whole simulation (endpoints, NICs, fixed-latency
//! wire) and drives it through the public `Simulation` API only:
//!
//!   cargo test --test integration
//!
//! Times below are in picoseconds. Unless a test says otherwise the NIC
//! injects at 10 ps/byte in 1500-byte packets.

use std::rc::Rc;

use snappr_core::config::{ProtocolKind, SimConfig};
use snappr_core::{NodeId, Port};
use snappr_sim::{RecvSpec, Simulation};
use snappr_transport::{Contiguous, SendArgs};

mod credits;
mod failures;
mod stats;
mod transfers;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Two endpoints, unlimited credit, implicit credit return.
pub fn config(protocol: ProtocolKind, latency_ps: u64) -> SimConfig {
    let mut config = SimConfig::default();
    config.workload.endpoints = 2;
    config.fabric.latency_ps = latency_ps;
    config.transport.protocol = protocol;
    config
}

pub fn sim(config: &SimConfig) -> Simulation {
    Simulation::from_config(config).expect("config should be valid")
}

/// `bytes` bytes from node 0 to node 1 with tag `tag`, no real data.
pub fn send_args(bytes: u32, tag: i32) -> SendArgs {
    SendArgs {
        src: NodeId(0),
        dst: NodeId(1),
        src_rank: 0,
        dst_rank: 1,
        tag,
        comm: 0,
        seq: tag as u32,
        count: bytes,
        datatype: Rc::new(Contiguous::BYTE),
        buffer: None,
        port: Port(0),
    }
}

/// Byte receive at node 1 for anything from rank 0 with `tag`.
pub fn recv_spec(count: u32, tag: i32) -> RecvSpec {
    RecvSpec {
        comm: 0,
        source: Some(0),
        tag: Some(tag),
        count,
        datatype: Rc::new(Contiguous::BYTE),
    }
}

pub fn ps(ps: u64) -> snappr_core::Timestamp {
    snappr_core::Timestamp::from_ps(ps)
}
