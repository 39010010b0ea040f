use snappr_core::{FlowId, MessageKind, NodeId};

/// Fatal transport conditions. Flow state is left as it was when the
/// condition was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("could not find matching ack for {flow} from {from}: no send in flight")]
    UnknownAck { flow: FlowId, from: NodeId },

    #[error("invalid message type {kind} for {flow} to {protocol} protocol")]
    UnexpectedKind {
        protocol: &'static str,
        kind: MessageKind,
        flow: FlowId,
    },

    #[error("{flow} is already registered as in flight")]
    DuplicateFlow { flow: FlowId },

    #[error("{flow}: message of {count} elements truncated by receive of {capacity}")]
    Truncated { flow: FlowId, count: u32, capacity: u32 },

    #[error("datatype {id}: block of {block} bytes does not fit a {stride}-byte stride")]
    InvalidDatatype { id: u32, block: u32, stride: u32 },

    #[error("send buffer of {got} bytes cannot hold {needed} packed bytes")]
    BufferTooShort { needed: u64, got: usize },
}
