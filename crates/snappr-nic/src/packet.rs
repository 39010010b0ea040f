//! Packets — fixed-size slices of a message's byte range.

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::{AsBytes, FromBytes};

use snappr_core::wire::{self, flags, PacketHeader, WireError, PACKET_HEADER_LEN, WIRE_VERSION};
use snappr_core::{FlowId, NetworkMessage, NodeId, Port};

/// A packet has no identity beyond `(flow_id, offset)`. The tail packet
/// carries the parent message so the receiver can hand it up once the
/// last byte lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub flow_id: FlowId,
    pub src: NodeId,
    pub dst: NodeId,
    pub port: Port,
    pub offset: u64,
    pub num_bytes: u32,
    /// Declared length of the parent message.
    pub total_bytes: u64,
    pub payload: Option<Box<NetworkMessage>>,
}

impl Packet {
    pub fn is_tail(&self) -> bool {
        self.payload.is_some()
    }

    /// One past the last byte this packet carries.
    pub fn end(&self) -> u64 {
        self.offset + self.num_bytes as u64
    }

    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            flow_id: self.flow_id.0,
            offset: self.offset,
            total_bytes: self.total_bytes,
            src: self.src.0,
            dst: self.dst.0,
            num_bytes: self.num_bytes,
            port: self.port.0,
            flags: if self.is_tail() { flags::TAIL } else { 0 },
            version: WIRE_VERSION,
        }
    }

    /// Header, followed by the serialized parent message on the tail packet.
    pub fn to_bytes(&self) -> Result<Bytes, WireError> {
        let header = self.header();
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_LEN);
        buf.put_slice(header.as_bytes());
        if let Some(msg) = &self.payload {
            buf.put_slice(&msg.to_bytes()?);
        }
        Ok(buf.freeze())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let header = PacketHeader::read_from_prefix(bytes).ok_or(WireError::Truncated {
            needed: PACKET_HEADER_LEN,
            got: bytes.len(),
        })?;
        wire::check_version(header.version)?;
        if header.flags & flags::PACKET_RESERVED != 0 {
            return Err(WireError::ReservedFlagsSet(header.flags));
        }
        let rest = &bytes[PACKET_HEADER_LEN..];
        let payload = if header.flags & flags::TAIL != 0 {
            Some(Box::new(NetworkMessage::from_bytes(rest)?))
        } else if !rest.is_empty() {
            return Err(WireError::TrailingBytes(rest.len()));
        } else {
            None
        };
        Ok(Self {
            flow_id: FlowId(header.flow_id),
            src: NodeId(header.src),
            dst: NodeId(header.dst),
            port: Port(header.port),
            offset: header.offset,
            num_bytes: header.num_bytes,
            total_bytes: header.total_bytes,
            payload,
        })
    }
}
