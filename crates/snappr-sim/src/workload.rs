//! Ring workload: endpoint `i` sends to `(i + 1) % n`, with every matching
//! receive posted before the first send.

use std::rc::Rc;

use bytes::Bytes;
use snappr_core::config::WorkloadConfig;
use snappr_core::{NodeId, Port, Request};
use snappr_nic::Fabric;
use snappr_transport::{Contiguous, SendArgs};

use crate::error::SimError;
use crate::sim::{RecvSpec, Simulation};

#[derive(Debug, Default)]
pub struct Workload {
    pub sends: Vec<Request>,
    pub recvs: Vec<Request>,
}

impl Workload {
    /// Requests that never completed.
    pub fn incomplete(&self) -> usize {
        self.sends
            .iter()
            .chain(&self.recvs)
            .filter(|r| !r.is_complete())
            .count()
    }
}

pub fn ring<F: Fabric>(sim: &mut Simulation<F>, config: &WorkloadConfig) -> Result<Workload, SimError> {
    let n = sim.endpoints().len() as u32;
    let count = config.message_bytes as u32;
    let num_ports = sim.num_ports().max(1);
    let mut workload = Workload::default();

    for i in 0..n {
        let dst = (i + 1) % n;
        for k in 0..config.messages {
            let recv = sim.post_recv(
                NodeId(dst),
                RecvSpec {
                    comm: 0,
                    source: Some(i as i32),
                    tag: Some(k as i32),
                    count,
                    datatype: Rc::new(Contiguous::BYTE),
                },
            )?;
            workload.recvs.push(recv);
        }
    }

    for i in 0..n {
        let dst = (i + 1) % n;
        for k in 0..config.messages {
            let args = SendArgs {
                src: NodeId(i),
                dst: NodeId(dst),
                src_rank: i as i32,
                dst_rank: dst as i32,
                tag: k as i32,
                comm: 0,
                seq: k,
                count,
                datatype: Rc::new(Contiguous::BYTE),
                buffer: Some(Bytes::from(vec![k as u8; count as usize])),
                port: Port((k % num_ports as u32) as u16),
            };
            workload.sends.push(sim.send(args)?);
        }
    }

    tracing::info!(
        endpoints = n,
        messages = config.messages,
        bytes = config.message_bytes,
        "ring workload posted"
    );
    Ok(workload)
}
