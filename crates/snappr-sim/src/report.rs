//! End-of-run summary, serialized as JSON by the binary.

use serde::Serialize;

use snappr_core::config::ProtocolKind;
use snappr_core::{FlowId, NodeId, Port, Timestamp};
use snappr_nic::PortStats;

use crate::endpoint::Endpoint;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub finished_at: Timestamp,
    pub events: u64,
    pub pending_events: usize,
    pub endpoints: Vec<EndpointReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointReport {
    pub node: NodeId,
    pub protocol: ProtocolKind,
    pub flows_issued: u64,
    /// Sends still waiting for their ack.
    pub sends_in_flight: Vec<FlowId>,
    pub receives_finalized: u64,
    pub receives_posted: usize,
    pub unexpected: usize,
    pub messages_reassembled: u64,
    pub reassembly_in_progress: usize,
    /// Credit consumed and not yet returned, per port.
    pub credit_outstanding: Vec<u64>,
    pub ports: Vec<PortStats>,
}

impl EndpointReport {
    pub fn from_endpoint(ep: &Endpoint) -> Self {
        let nic = ep.nic();
        let num_ports = nic.credits().num_ports();
        Self {
            node: ep.addr(),
            protocol: ep.protocol().kind(),
            flows_issued: ep.flows_issued(),
            sends_in_flight: ep.protocol().send_flows().in_flight(),
            receives_finalized: ep.matcher().finalized(),
            receives_posted: ep.matcher().posted_len(),
            unexpected: ep.matcher().unexpected_len(),
            messages_reassembled: nic.reassembly().completed(),
            reassembly_in_progress: nic.reassembly().in_progress().len(),
            credit_outstanding: (0..num_ports).map(|p| nic.credits().consumed(Port(p))).collect(),
            ports: nic.stats().ports().to_vec(),
        }
    }
}
