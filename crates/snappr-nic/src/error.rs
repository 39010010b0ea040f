//! Fatal NIC conditions.
//!
//! Every variant is a modeling or integration bug. The run stops at the
//! event that detected it and the offending flow's state is left in place.

use snappr_core::{FlowId, MessageKind, NodeId, Port};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NicError {
    #[error("credit underflow on {port}: consuming {requested} bytes with {available} available")]
    CreditUnderflow {
        port: Port,
        requested: u64,
        available: u64,
    },

    #[error("credit overflow on {port}: returning {returned} bytes with only {outstanding} consumed")]
    CreditOverflow {
        port: Port,
        returned: u64,
        outstanding: u64,
    },

    #[error("packet size must be at least one byte")]
    ZeroPacketSize,

    #[error("{port} out of range, nic has {num_ports} ports")]
    UnknownPort { port: Port, num_ports: u16 },

    #[error("{flow} from {src} on {port}: first packet arrived at offset {offset}, flow was never established")]
    UnknownFlow {
        src: NodeId,
        flow: FlowId,
        port: Port,
        offset: u64,
    },

    #[error("{flow} from {src} on {port}: bytes at offset {offset} already delivered ({received} received)")]
    DoubleDelivery {
        src: NodeId,
        flow: FlowId,
        port: Port,
        offset: u64,
        received: u64,
    },

    #[error("{flow} from {src} on {port}: packet at offset {offset} leaves a gap after {received} received bytes")]
    NonContiguous {
        src: NodeId,
        flow: FlowId,
        port: Port,
        offset: u64,
        received: u64,
    },

    #[error("{flow} from {src} on {port}: packet [{offset}, +{num_bytes}) overruns declared length {total}")]
    Overrun {
        src: NodeId,
        flow: FlowId,
        port: Port,
        offset: u64,
        num_bytes: u32,
        total: u64,
    },

    #[error("{flow} from {src}: packet declares length {declared}, flow was established with {expected}")]
    LengthMismatch {
        src: NodeId,
        flow: FlowId,
        declared: u64,
        expected: u64,
    },

    #[error("{flow} from {src}: all {total} bytes arrived but no packet carried the message")]
    MissingPayload { src: NodeId, flow: FlowId, total: u64 },

    #[error("{flow}: message from {src} handed to nic {nic}")]
    ForeignMessage { flow: FlowId, src: NodeId, nic: NodeId },

    #[error("{flow}: packet for {dst} delivered to nic {nic}")]
    Misrouted { flow: FlowId, dst: NodeId, nic: NodeId },

    #[error("{flow}: ack requested for {kind}, which has no acknowledgment variant")]
    NotAckable { flow: FlowId, kind: MessageKind },
}
