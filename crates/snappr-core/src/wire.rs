//! snappr wire format — the order-stable serialized form of every message
//! that crosses a process boundary (trace files, co-simulation tunnels).
//!
//! All headers are #[repr(C, packed)] for deterministic layout and use
//! zerocopy derives for allocation-free serialization. Integers are in host
//! byte order; a trace is only replayed on the architecture that wrote it.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Message Header ───────────────────────────────────────────────────────────

/// Leading header of a serialized `NetworkMessage`.
///
/// Followed by an `EnvelopeHeader` when `flags & HAS_ENVELOPE` is set, then,
/// when `flags & HAS_DATA` is set, by `data_len` bytes of payload data.
///
/// Wire size: 44 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct MessageHeader {
    /// Sending endpoint.
    pub src: u32,
    /// Receiving endpoint.
    pub dst: u32,
    /// Flow identifier, unique within the sending endpoint's lifetime.
    pub flow_id: u64,
    /// Logical length in bytes. This is what the NIC packetizes, and may
    /// exceed `data_len` when no real buffer travels with the message.
    pub byte_length: u64,
    /// Simulated time (ps) at which the sender started the operation.
    pub started_at: u64,
    /// Bytes of packed data following the headers.
    pub data_len: u32,
    /// Output port the message is injected on.
    pub port: u16,
    /// `MessageKind` discriminant.
    pub kind: u8,
    /// Bit flags:
    ///   bit 0: sender NIC generates a "sent" ack when injection completes
    ///   bit 1: an `EnvelopeHeader` follows
    ///   bits 2-7: reserved, must be zero
    pub flags: u8,
    /// Wire format version. Currently 0x01.
    pub version: u8,
    pub reserved: [u8; 3],
}

assert_eq_size!(MessageHeader, [u8; 44]);

// ── Envelope Header ──────────────────────────────────────────────────────────

/// Placement metadata of a point-to-point transfer.
///
/// Wire size: 32 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct EnvelopeHeader {
    pub src_rank: i32,
    pub dst_rank: i32,
    pub tag: i32,
    pub comm: u32,
    pub seq: u32,
    pub count: u32,
    pub type_size: u32,
    pub datatype: u32,
}

assert_eq_size!(EnvelopeHeader, [u8; 32]);

// ── Packet Header ────────────────────────────────────────────────────────────

/// One fixed-size slice of a message's byte range.
///
/// Wire size: 40 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct PacketHeader {
    /// Parent flow.
    pub flow_id: u64,
    /// First byte of the parent message carried by this packet.
    pub offset: u64,
    /// Declared length of the parent message.
    pub total_bytes: u64,
    pub src: u32,
    pub dst: u32,
    /// Bytes carried by this packet.
    pub num_bytes: u32,
    pub port: u16,
    /// Bit flags:
    ///   bit 0: tail packet, the parent message travels with it
    ///   bits 1-7: reserved, must be zero
    pub flags: u8,
    pub version: u8,
}

assert_eq_size!(PacketHeader, [u8; 40]);

// ── Credit Header ────────────────────────────────────────────────────────────

/// Explicit credit return toward the origin of consumed buffer space.
///
/// Wire size: 16 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct CreditHeader {
    pub bytes: u64,
    pub origin: u32,
    pub port: u16,
    /// Always `MessageKind::Credit`.
    pub kind: u8,
    pub version: u8,
}

assert_eq_size!(CreditHeader, [u8; 16]);

pub mod flags {
    /// `MessageHeader`: sender NIC acks the message when injection completes.
    pub const NEEDS_ACK: u8 = 0x01;
    /// `MessageHeader`: an `EnvelopeHeader` follows.
    pub const HAS_ENVELOPE: u8 = 0x02;
    /// `MessageHeader`: the message carries data, possibly empty.
    pub const HAS_DATA: u8 = 0x04;
    pub const MESSAGE_RESERVED: u8 = !(NEEDS_ACK | HAS_ENVELOPE | HAS_DATA);

    /// `PacketHeader`: tail packet.
    pub const TAIL: u8 = 0x01;
    pub const PACKET_RESERVED: u8 = !TAIL;
}

// ── Message Kind ─────────────────────────────────────────────────────────────

/// Type tag carried by every message.
///
/// The set is closed: a protocol that receives a kind it does not own treats
/// it as a fatal dispatch error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Eager payload, data packed into the message.
    Payload = 0x01,
    /// Injection-complete acknowledgment of a `Payload`.
    PayloadSentAck = 0x02,
    /// Remote write carrying data plus placement metadata.
    RdmaPutPayload = 0x03,
    /// Injection-complete acknowledgment of an `RdmaPutPayload`.
    RdmaPutSentAck = 0x04,
    /// Buffer credit returned to an origin port.
    Credit = 0x05,
}

impl MessageKind {
    /// The acknowledgment variant of this kind, if it has one.
    pub fn ack_kind(self) -> Option<MessageKind> {
        match self {
            MessageKind::Payload => Some(MessageKind::PayloadSentAck),
            MessageKind::RdmaPutPayload => Some(MessageKind::RdmaPutSentAck),
            _ => None,
        }
    }

    pub fn is_ack(self) -> bool {
        matches!(self, MessageKind::PayloadSentAck | MessageKind::RdmaPutSentAck)
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Payload => "payload",
            MessageKind::PayloadSentAck => "payload_sent_ack",
            MessageKind::RdmaPutPayload => "rdma_put_payload",
            MessageKind::RdmaPutSentAck => "rdma_put_sent_ack",
            MessageKind::Credit => "credit",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageKind::Payload),
            0x02 => Ok(MessageKind::PayloadSentAck),
            0x03 => Ok(MessageKind::RdmaPutPayload),
            0x04 => Ok(MessageKind::RdmaPutSentAck),
            0x05 => Ok(MessageKind::Credit),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(k: MessageKind) -> u8 {
        k as u8
    }
}

// ── Constants ────────────────────────────────────────────────────────────────

/// Current wire format version.
pub const WIRE_VERSION: u8 = 0x01;

pub const MESSAGE_HEADER_LEN: usize = std::mem::size_of::<MessageHeader>();
pub const ENVELOPE_HEADER_LEN: usize = std::mem::size_of::<EnvelopeHeader>();
pub const PACKET_HEADER_LEN: usize = std::mem::size_of::<PacketHeader>();
pub const CREDIT_HEADER_LEN: usize = std::mem::size_of::<CreditHeader>();

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown message kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("unknown wire version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("truncated input: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("message data of {0} bytes exceeds the 32-bit length field")]
    DataTooLong(usize),

    #[error("message kind {0} has no acknowledgment variant")]
    NotAckable(MessageKind),

    #[error("expected {expected} frame, got {got}")]
    WrongKind { expected: MessageKind, got: MessageKind },
}

/// Check the version byte every header carries.
pub fn check_version(version: u8) -> Result<(), WireError> {
    if version != WIRE_VERSION {
        return Err(WireError::UnknownVersion(version));
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────
