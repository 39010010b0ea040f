//! Interconnect seam. The NIC decides when traffic leaves; the fabric
//! decides when it lands.

use snappr_core::{CreditReturn, NodeId, Timestamp};

use crate::packet::Packet;

pub trait Fabric {
    /// Arrival time at `packet.dst` of a packet that finished injection at
    /// `departure`. Must be `>= departure`, and must not reorder packets of
    /// one flow.
    fn packet_arrival(&mut self, packet: &Packet, departure: Timestamp) -> Timestamp;

    /// Arrival time at `credit.origin` of a credit return sent by `from`.
    fn credit_arrival(&mut self, credit: &CreditReturn, from: NodeId, departure: Timestamp)
        -> Timestamp;
}
