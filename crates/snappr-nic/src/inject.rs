//! Injection engine — turns queued messages into timed packets.
//!
//! Each port serves its queue strictly FIFO. The head message is cut into
//! packets of at most `packet_size` bytes; a packet leaves only when the
//! credit ledger covers it. A credit-starved head blocks everything behind
//! it on the same port.

use std::collections::VecDeque;

use snappr_core::{NetworkMessage, Port, TimeDelta, Timestamp};

use crate::credit::CreditLedger;
use crate::error::NicError;
use crate::packet::Packet;

/// Outcome of one injection attempt on a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    /// A packet left the port. `offset` is the head message's next unsent
    /// byte; it equals the message length on the tail packet.
    Advanced {
        packet: Packet,
        departure: Timestamp,
        offset: u64,
    },
    /// The head packet needs `needed` bytes of credit the port does not have.
    Stalled { needed: u64 },
    /// Nothing queued.
    Idle,
}

#[derive(Debug)]
struct Pending {
    message: NetworkMessage,
    offset: u64,
}

#[derive(Debug)]
pub struct InjectionEngine {
    packet_size: u32,
    byte_delay: TimeDelta,
    queues: Vec<VecDeque<Pending>>,
    next_free: Vec<Timestamp>,
}

impl InjectionEngine {
    /// A zero `packet_size` could never advance a head message.
    pub fn new(num_ports: u16, packet_size: u32, byte_delay: TimeDelta) -> Result<Self, NicError> {
        if packet_size == 0 {
            return Err(NicError::ZeroPacketSize);
        }
        Ok(Self {
            packet_size,
            byte_delay,
            queues: (0..num_ports).map(|_| VecDeque::new()).collect(),
            next_free: vec![Timestamp::ZERO; num_ports as usize],
        })
    }

    fn check_port(&self, port: Port) -> Result<(), NicError> {
        if port.index() >= self.queues.len() {
            return Err(NicError::UnknownPort {
                port,
                num_ports: self.queues.len() as u16,
            });
        }
        Ok(())
    }

    /// Queue a message behind whatever its port already holds.
    pub fn enqueue(&mut self, message: NetworkMessage) -> Result<(), NicError> {
        let port = message.port();
        self.check_port(port)?;
        tracing::trace!(
            flow = message.flow_id().0,
            port = port.0,
            bytes = message.byte_length(),
            depth = self.queues[port.index()].len(),
            "message queued for injection"
        );
        self.queues[port.index()].push_back(Pending { message, offset: 0 });
        Ok(())
    }

    /// Try to emit the next packet of the head message on `port`.
    pub fn inject(
        &mut self,
        port: Port,
        credits: &mut CreditLedger,
        now: Timestamp,
    ) -> Result<Injection, NicError> {
        self.check_port(port)?;
        let queue = &mut self.queues[port.index()];
        let Some(head) = queue.front_mut() else {
            return Ok(Injection::Idle);
        };

        let total = head.message.byte_length();
        let num_bytes = (total - head.offset).min(self.packet_size as u64);
        if !credits.has_credit(port, num_bytes) {
            return Ok(Injection::Stalled { needed: num_bytes });
        }
        credits.consume(port, num_bytes)?;

        let next_free = &mut self.next_free[port.index()];
        let departure = (*next_free).max(now) + self.byte_delay * num_bytes;
        *next_free = departure;

        let offset = head.offset;
        head.offset += num_bytes;
        let new_offset = head.offset;
        let msg = &head.message;
        let mut packet = Packet {
            flow_id: msg.flow_id(),
            src: msg.src(),
            dst: msg.dst(),
            port,
            offset,
            num_bytes: num_bytes as u32,
            total_bytes: total,
            payload: None,
        };

        if new_offset == total {
            if let Some(done) = queue.pop_front() {
                packet.payload = Some(Box::new(done.message));
            }
        }

        tracing::trace!(
            flow = packet.flow_id.0,
            port = port.0,
            offset,
            num_bytes,
            departure = departure.as_ps(),
            tail = packet.is_tail(),
            "packet injected"
        );

        Ok(Injection::Advanced {
            packet,
            departure,
            offset: new_offset,
        })
    }

    /// When the port finishes serializing everything injected so far.
    pub fn next_free(&self, port: Port) -> Timestamp {
        self.next_free
            .get(port.index())
            .copied()
            .unwrap_or(Timestamp::ZERO)
    }

    /// Messages still queued on `port`, including a partially injected head.
    pub fn queue_len(&self, port: Port) -> usize {
        self.queues.get(port.index()).map_or(0, VecDeque::len)
    }

    /// Next unsent byte of the head message on `port`.
    pub fn head_offset(&self, port: Port) -> Option<u64> {
        self.queues
            .get(port.index())
            .and_then(VecDeque::front)
            .map(|p| p.offset)
    }

    pub fn packet_size(&self) -> u32 {
        self.packet_size
    }
}
