//! Ejection — reassembles arriving packets into completed messages.
//!
//! A flow is established by its offset-0 packet and torn down by the packet
//! that brings accumulated bytes up to the declared length. Packets of a flow
//! must arrive contiguous and in order; anything else is fatal.

use std::collections::btree_map::{BTreeMap, Entry};

use snappr_core::{FlowId, NetworkMessage, NodeId, Timestamp};

use crate::error::NicError;
use crate::packet::Packet;

#[derive(Debug, Clone)]
struct FlowProgress {
    received: u64,
    total: u64,
    packets: u32,
    first_arrival: Timestamp,
}

/// Result of accepting one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembly {
    Partial { received: u64, total: u64 },
    Complete {
        message: NetworkMessage,
        packets: u32,
        first_arrival: Timestamp,
    },
}

/// Flow table keyed by `(source, flow id)`: flow ids are only unique per
/// sending endpoint.
#[derive(Debug, Default)]
pub struct ReassemblyEngine {
    flows: BTreeMap<(NodeId, FlowId), FlowProgress>,
    completed: u64,
}

impl ReassemblyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, packet: Packet, now: Timestamp) -> Result<Reassembly, NicError> {
        let key = (packet.src, packet.flow_id);

        let progress = match self.flows.entry(key) {
            Entry::Occupied(entry) => {
                let progress = entry.into_mut();
                if packet.total_bytes != progress.total {
                    return Err(NicError::LengthMismatch {
                        src: packet.src,
                        flow: packet.flow_id,
                        declared: packet.total_bytes,
                        expected: progress.total,
                    });
                }
                if packet.offset < progress.received {
                    return Err(NicError::DoubleDelivery {
                        src: packet.src,
                        flow: packet.flow_id,
                        port: packet.port,
                        offset: packet.offset,
                        received: progress.received,
                    });
                }
                if packet.offset > progress.received {
                    return Err(NicError::NonContiguous {
                        src: packet.src,
                        flow: packet.flow_id,
                        port: packet.port,
                        offset: packet.offset,
                        received: progress.received,
                    });
                }
                progress
            }
            Entry::Vacant(entry) => {
                if packet.offset != 0 {
                    return Err(NicError::UnknownFlow {
                        src: packet.src,
                        flow: packet.flow_id,
                        port: packet.port,
                        offset: packet.offset,
                    });
                }
                tracing::trace!(
                    src = packet.src.0,
                    flow = packet.flow_id.0,
                    total = packet.total_bytes,
                    "flow established"
                );
                entry.insert(FlowProgress {
                    received: 0,
                    total: packet.total_bytes,
                    packets: 0,
                    first_arrival: now,
                })
            }
        };

        if packet.end() > progress.total {
            return Err(NicError::Overrun {
                src: packet.src,
                flow: packet.flow_id,
                port: packet.port,
                offset: packet.offset,
                num_bytes: packet.num_bytes,
                total: progress.total,
            });
        }

        progress.received = packet.end();
        progress.packets += 1;

        if progress.received < progress.total {
            return Ok(Reassembly::Partial {
                received: progress.received,
                total: progress.total,
            });
        }

        let Some(message) = packet.payload else {
            return Err(NicError::MissingPayload {
                src: packet.src,
                flow: packet.flow_id,
                total: progress.total,
            });
        };
        if message.byte_length() != progress.total {
            return Err(NicError::LengthMismatch {
                src: packet.src,
                flow: packet.flow_id,
                declared: message.byte_length(),
                expected: progress.total,
            });
        }

        let packets = progress.packets;
        let first_arrival = progress.first_arrival;
        self.flows.remove(&key);
        self.completed += 1;

        tracing::debug!(
            src = packet.src.0,
            flow = packet.flow_id.0,
            bytes = message.byte_length(),
            packets,
            "flow reassembled"
        );

        Ok(Reassembly::Complete {
            message: *message,
            packets,
            first_arrival,
        })
    }

    /// Flows with some but not all bytes received, for post-mortem inspection.
    pub fn in_progress(&self) -> Vec<(NodeId, FlowId, u64, u64)> {
        self.flows
            .iter()
            .map(|(&(src, flow), p)| (src, flow, p.received, p.total))
            .collect()
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }
}
