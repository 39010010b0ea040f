//! snappr-transport — point-to-point message transport over the NIC model.
//!
//! Maps logical sends and receives onto `NetworkMessage`s, tracks sends in
//! flight until their sent ack returns, and hands arriving payloads to a
//! receive matcher.

pub mod datatype;
pub mod error;
pub mod matching;
pub mod protocol;

pub use datatype::{fill_send_buffer, Contiguous, Datatype, Strided};
pub use error::ProtocolError;
pub use matching::{PostedRecv, PostedRecvQueue, RecvMatcher};
pub use protocol::{DirectPut, Eager, Incoming, Protocol, SendArgs, SendFlows, TransportProtocol};
