//! snappr-core — shared types, wire format, and configuration.
//! All other snappr crates depend on this one.

pub mod config;
pub mod message;
pub mod request;
pub mod time;
pub mod wire;

pub use message::{
    make_ack, CreditReturn, Envelope, FlowId, FlowIdAllocator, MessageKind, NetworkMessage,
    NodeId, Port,
};
pub use request::{MessageDelay, RecvStatus, Request};
pub use time::{TimeDelta, Timestamp};
