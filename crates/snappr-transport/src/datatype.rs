//! Datatype pack/unpack contract.
//!
//! A datatype describes how `count` elements sit in a user buffer. Each
//! element spans `extent` bytes of which `packed_size` carry data; packing
//! gathers those bytes into a dense buffer for the wire.

use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

pub trait Datatype: Debug {
    fn id(&self) -> u32;

    /// Data bytes per element once packed.
    fn packed_size(&self) -> u32;

    /// Bytes per element in the user buffer.
    fn extent(&self) -> u32;

    fn is_contiguous(&self) -> bool {
        self.packed_size() == self.extent()
    }

    /// Gather `count` elements from `buffer` into a dense buffer.
    fn pack(&self, buffer: &[u8], count: u32) -> Result<Bytes, ProtocolError>;

    /// Scatter densely packed elements back into user layout.
    fn unpack(&self, packed: &[u8], count: u32) -> Bytes;
}

/// Dense elements of a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contiguous {
    pub id: u32,
    pub size: u32,
}

impl Contiguous {
    /// A byte-typed datatype.
    pub const BYTE: Contiguous = Contiguous { id: 1, size: 1 };

    pub fn new(id: u32, size: u32) -> Self {
        Self { id, size }
    }
}

impl Datatype for Contiguous {
    fn id(&self) -> u32 {
        self.id
    }

    fn packed_size(&self) -> u32 {
        self.size
    }

    fn extent(&self) -> u32 {
        self.size
    }

    fn pack(&self, buffer: &[u8], count: u32) -> Result<Bytes, ProtocolError> {
        let needed = count as u64 * self.size as u64;
        let src = buffer
            .get(..needed as usize)
            .ok_or(ProtocolError::BufferTooShort {
                needed,
                got: buffer.len(),
            })?;
        Ok(Bytes::copy_from_slice(src))
    }

    fn unpack(&self, packed: &[u8], _count: u32) -> Bytes {
        Bytes::copy_from_slice(packed)
    }
}

/// The first `block` bytes of every `stride`-byte element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strided {
    id: u32,
    block: u32,
    stride: u32,
}

impl Strided {
    /// `block` must be non-empty and fit inside `stride`.
    pub fn new(id: u32, block: u32, stride: u32) -> Result<Self, ProtocolError> {
        if block == 0 || block > stride {
            return Err(ProtocolError::InvalidDatatype { id, block, stride });
        }
        Ok(Self { id, block, stride })
    }
}

impl Datatype for Strided {
    fn id(&self) -> u32 {
        self.id
    }

    fn packed_size(&self) -> u32 {
        self.block
    }

    fn extent(&self) -> u32 {
        self.stride
    }

    fn pack(&self, buffer: &[u8], count: u32) -> Result<Bytes, ProtocolError> {
        let (block, stride) = (self.block as usize, self.stride as usize);
        let needed = match count {
            0 => 0,
            n => (n as usize - 1) * stride + block,
        };
        if buffer.len() < needed {
            return Err(ProtocolError::BufferTooShort {
                needed: needed as u64,
                got: buffer.len(),
            });
        }
        let mut out = BytesMut::with_capacity(count as usize * block);
        for i in 0..count as usize {
            out.put_slice(&buffer[i * stride..i * stride + block]);
        }
        Ok(out.freeze())
    }

    fn unpack(&self, packed: &[u8], count: u32) -> Bytes {
        let (block, stride) = (self.block as usize, self.stride as usize);
        let mut out = BytesMut::zeroed(count as usize * stride);
        for (i, chunk) in packed.chunks(block).take(count as usize).enumerate() {
            out[i * stride..i * stride + chunk.len()].copy_from_slice(chunk);
        }
        out.freeze()
    }
}

/// Copy of the send buffer in wire layout: a straight copy when the
/// datatype is contiguous, otherwise packed.
pub fn fill_send_buffer(
    buffer: &[u8],
    count: u32,
    datatype: &dyn Datatype,
) -> Result<Bytes, ProtocolError> {
    if datatype.is_contiguous() {
        let length = count as u64 * datatype.packed_size() as u64;
        let src = buffer
            .get(..length as usize)
            .ok_or(ProtocolError::BufferTooShort {
                needed: length,
                got: buffer.len(),
            })?;
        return Ok(Bytes::copy_from_slice(src));
    }
    datatype.pack(buffer, count)
}
