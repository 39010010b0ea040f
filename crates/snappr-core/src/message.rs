//! Logical network messages.
//!
//! A `NetworkMessage` is immutable once built. The only derived form is its
//! acknowledgment, produced by [`make_ack`] as a new value that shares nothing
//! with the original except the flow id.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use zerocopy::{AsBytes, FromBytes};

use crate::time::Timestamp;
use crate::wire::{
    self, flags, CreditHeader, EnvelopeHeader, MessageHeader, WireError, CREDIT_HEADER_LEN,
    ENVELOPE_HEADER_LEN, MESSAGE_HEADER_LEN, WIRE_VERSION,
};

pub use crate::wire::MessageKind;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Network endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

/// One logical payload transfer, unique within the sending endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub u64);

/// NIC output port (one credit pool and injection queue each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Port(pub u16);

impl Port {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow{}", self.0)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port{}", self.0)
    }
}

/// Hands out flow ids for one endpoint. Ids are never reused.
#[derive(Debug, Default)]
pub struct FlowIdAllocator {
    next: u64,
}

impl FlowIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> FlowId {
        let id = FlowId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Placement metadata for a point-to-point transfer: who, which tag, which
/// communicator, and how the bytes are typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub src_rank: i32,
    pub dst_rank: i32,
    pub tag: i32,
    pub comm: u32,
    pub seq: u32,
    pub count: u32,
    pub type_size: u32,
    pub datatype: u32,
}

impl Envelope {
    /// Payload size implied by the element count and packed element size.
    pub fn payload_bytes(&self) -> u64 {
        self.count as u64 * self.type_size as u64
    }

    fn to_header(self) -> EnvelopeHeader {
        EnvelopeHeader {
            src_rank: self.src_rank,
            dst_rank: self.dst_rank,
            tag: self.tag,
            comm: self.comm,
            seq: self.seq,
            count: self.count,
            type_size: self.type_size,
            datatype: self.datatype,
        }
    }

    fn from_header(h: &EnvelopeHeader) -> Self {
        Self {
            src_rank: h.src_rank,
            dst_rank: h.dst_rank,
            tag: h.tag,
            comm: h.comm,
            seq: h.seq,
            count: h.count,
            type_size: h.type_size,
            datatype: h.datatype,
        }
    }
}

// ── NetworkMessage ───────────────────────────────────────────────────────────

/// A logical unit of data moving between two endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMessage {
    src: NodeId,
    dst: NodeId,
    flow_id: FlowId,
    byte_length: u64,
    kind: MessageKind,
    port: Port,
    needs_ack: bool,
    started_at: Timestamp,
    envelope: Option<Envelope>,
    data: Option<Bytes>,
}

impl NetworkMessage {
    pub fn new(
        src: NodeId,
        dst: NodeId,
        flow_id: FlowId,
        byte_length: u64,
        kind: MessageKind,
    ) -> Self {
        Self {
            src,
            dst,
            flow_id,
            byte_length,
            kind,
            port: Port(0),
            needs_ack: false,
            started_at: Timestamp::ZERO,
            envelope: None,
            data: None,
        }
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.port = port;
        self
    }

    /// Ask the sending NIC for a "sent" ack once the last byte is injected.
    pub fn with_ack(mut self) -> Self {
        self.needs_ack = true;
        self
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = Some(data);
        self
    }

    pub fn started_at(mut self, now: Timestamp) -> Self {
        self.started_at = now;
        self
    }

    pub fn src(&self) -> NodeId {
        self.src
    }

    pub fn dst(&self) -> NodeId {
        self.dst
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn needs_ack(&self) -> bool {
        self.needs_ack
    }

    pub fn time_started(&self) -> Timestamp {
        self.started_at
    }

    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Serialize to bytes for trace files and cross-process transport.
    pub fn to_bytes(&self) -> Result<Bytes, WireError> {
        let data_len = self.data.as_ref().map_or(0, |d| d.len());
        let wire_data_len = u32::try_from(data_len).map_err(|_| WireError::DataTooLong(data_len))?;
        let mut msg_flags = 0u8;
        if self.needs_ack {
            msg_flags |= flags::NEEDS_ACK;
        }
        if self.envelope.is_some() {
            msg_flags |= flags::HAS_ENVELOPE;
        }
        if self.data.is_some() {
            msg_flags |= flags::HAS_DATA;
        }

        let header = MessageHeader {
            src: self.src.0,
            dst: self.dst.0,
            flow_id: self.flow_id.0,
            byte_length: self.byte_length,
            started_at: self.started_at.as_ps(),
            data_len: wire_data_len,
            port: self.port.0,
            kind: self.kind.into(),
            flags: msg_flags,
            version: WIRE_VERSION,
            reserved: [0; 3],
        };

        let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_LEN + ENVELOPE_HEADER_LEN + data_len);
        buf.put_slice(header.as_bytes());
        if let Some(env) = self.envelope {
            buf.put_slice(env.to_header().as_bytes());
        }
        if let Some(data) = &self.data {
            buf.put_slice(data);
        }
        Ok(buf.freeze())
    }

    /// Deserialize from bytes produced by [`NetworkMessage::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let header = MessageHeader::read_from_prefix(bytes).ok_or(WireError::Truncated {
            needed: MESSAGE_HEADER_LEN,
            got: bytes.len(),
        })?;
        wire::check_version(header.version)?;
        if header.flags & flags::MESSAGE_RESERVED != 0 {
            return Err(WireError::ReservedFlagsSet(header.flags));
        }
        let kind = MessageKind::try_from(header.kind)?;

        let mut rest = &bytes[MESSAGE_HEADER_LEN..];
        let envelope = if header.flags & flags::HAS_ENVELOPE != 0 {
            let env = EnvelopeHeader::read_from_prefix(rest).ok_or(WireError::Truncated {
                needed: MESSAGE_HEADER_LEN + ENVELOPE_HEADER_LEN,
                got: bytes.len(),
            })?;
            rest = &rest[ENVELOPE_HEADER_LEN..];
            Some(Envelope::from_header(&env))
        } else {
            None
        };

        let has_data = header.flags & flags::HAS_DATA != 0;
        let data_len = if has_data { header.data_len as usize } else { 0 };
        if rest.len() < data_len {
            return Err(WireError::Truncated {
                needed: bytes.len() - rest.len() + data_len,
                got: bytes.len(),
            });
        }
        if rest.len() > data_len {
            return Err(WireError::TrailingBytes(rest.len() - data_len));
        }
        let data = has_data.then(|| Bytes::copy_from_slice(rest));

        Ok(Self {
            src: NodeId(header.src),
            dst: NodeId(header.dst),
            flow_id: FlowId(header.flow_id),
            byte_length: header.byte_length,
            kind,
            port: Port(header.port),
            needs_ack: header.flags & flags::NEEDS_ACK != 0,
            started_at: Timestamp::from_ps(header.started_at),
            envelope,
            data,
        })
    }
}

impl fmt::Display for NetworkMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}->{} bytes={} {}",
            self.kind, self.flow_id, self.src, self.dst, self.byte_length, self.port
        )?;
        if let Some(env) = &self.envelope {
            write!(
                f,
                " rank {}->{} tag={} comm={} seq={}",
                env.src_rank, env.dst_rank, env.tag, env.comm, env.seq
            )?;
        }
        Ok(())
    }
}

/// Build the acknowledgment of `msg`: same flow id, direction inverted, no
/// payload, kind switched to the ack variant. The original is untouched.
pub fn make_ack(msg: &NetworkMessage) -> Result<NetworkMessage, WireError> {
    let kind = msg.kind.ack_kind().ok_or(WireError::NotAckable(msg.kind))?;
    Ok(NetworkMessage {
        src: msg.dst,
        dst: msg.src,
        flow_id: msg.flow_id,
        byte_length: 0,
        kind,
        port: msg.port,
        needs_ack: false,
        started_at: msg.started_at,
        envelope: msg.envelope,
        data: None,
    })
}

// ── Credit return ────────────────────────────────────────────────────────────

/// Buffer credit flowing back to the port that consumed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditReturn {
    /// The NIC whose credit is replenished.
    pub origin: NodeId,
    pub port: Port,
    pub bytes: u64,
}

impl CreditReturn {
    pub fn to_bytes(&self) -> [u8; CREDIT_HEADER_LEN] {
        let header = CreditHeader {
            bytes: self.bytes,
            origin: self.origin.0,
            port: self.port.0,
            kind: MessageKind::Credit.into(),
            version: WIRE_VERSION,
        };
        let mut out = [0u8; CREDIT_HEADER_LEN];
        out.copy_from_slice(header.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let header = CreditHeader::read_from(bytes).ok_or(WireError::Truncated {
            needed: CREDIT_HEADER_LEN,
            got: bytes.len(),
        })?;
        wire::check_version(header.version)?;
        let kind = MessageKind::try_from(header.kind)?;
        if kind != MessageKind::Credit {
            return Err(WireError::WrongKind {
                expected: MessageKind::Credit,
                got: kind,
            });
        }
        Ok(Self {
            origin: NodeId(header.origin),
            port: Port(header.port),
            bytes: header.bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope {
            src_rank: 0,
            dst_rank: 1,
            tag: 42,
            comm: 7,
            seq: 3,
            count: 16,
            type_size: 8,
            datatype: 2,
        }
    }

    fn put_message() -> NetworkMessage {
        NetworkMessage::new(NodeId(0), NodeId(1), FlowId(9), 128, MessageKind::RdmaPutPayload)
            .with_port(Port(2))
            .with_ack()
            .with_envelope(envelope())
            .started_at(Timestamp::from_ps(500))
    }

    #[test]
    fn ack_preserves_flow_and_inverts_direction() {
        let msg = put_message();
        let ack = make_ack(&msg).unwrap();

        assert_eq!(ack.flow_id(), msg.flow_id());
        assert_eq!(ack.src(), msg.dst());
        assert_eq!(ack.dst(), msg.src());
        assert_eq!(ack.kind(), MessageKind::RdmaPutSentAck);
        assert_eq!(ack.byte_length(), 0);
        assert!(!ack.needs_ack());
        assert!(ack.data().is_none());

        // The original is unchanged.
        assert_eq!(msg.kind(), MessageKind::RdmaPutPayload);
        assert_eq!(msg.byte_length(), 128);
    }

    #[test]
    fn ack_of_ack_is_rejected() {
        let ack = make_ack(&put_message()).unwrap();
        assert_eq!(
            make_ack(&ack),
            Err(WireError::NotAckable(MessageKind::RdmaPutSentAck))
        );
    }

    #[test]
    fn message_serialization_preserves_fields() {
        let msg = put_message().with_data(Bytes::from_static(b"packed bytes"));
        let decoded = NetworkMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.envelope(), Some(&envelope()));
        assert_eq!(decoded.time_started(), Timestamp::from_ps(500));
    }

    #[test]
    fn empty_data_survives_serialization() {
        let empty = put_message().with_data(Bytes::new());
        let decoded = NetworkMessage::from_bytes(&empty.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.data(), Some(&Bytes::new()));
        assert_eq!(decoded, empty);

        let none = NetworkMessage::from_bytes(&put_message().to_bytes().unwrap()).unwrap();
        assert!(none.data().is_none());
    }

    #[test]
    fn bare_message_has_no_envelope_on_wire() {
        let msg = NetworkMessage::new(NodeId(3), NodeId(4), FlowId(1), 10, MessageKind::Payload);
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(bytes.len(), MESSAGE_HEADER_LEN);
        assert_eq!(NetworkMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn truncated_message_is_rejected() {
        let bytes = put_message().to_bytes().unwrap();
        let err = NetworkMessage::from_bytes(&bytes[..MESSAGE_HEADER_LEN + 4]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));
    }

    #[test]
    fn reserved_flags_are_rejected() {
        let mut bytes = put_message().to_bytes().unwrap().to_vec();
        // flags byte sits after src, dst, flow_id, byte_length, started_at,
        // data_len, port and kind.
        bytes[39] |= 0x80;
        assert!(matches!(
            NetworkMessage::from_bytes(&bytes),
            Err(WireError::ReservedFlagsSet(_))
        ));
    }

    #[test]
    fn credit_return_round_trip() {
        let credit = CreditReturn {
            origin: NodeId(5),
            port: Port(1),
            bytes: 1500,
        };
        assert_eq!(CreditReturn::from_bytes(&credit.to_bytes()), Ok(credit));
    }

    #[test]
    fn flow_ids_are_monotonic() {
        let mut ids = FlowIdAllocator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert!(b > a);
        assert_eq!(ids.issued(), 2);
    }
}
