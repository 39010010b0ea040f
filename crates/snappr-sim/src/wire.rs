//! Fixed-latency fabric: every hop takes the same time, so per-flow order
//! is whatever order the sender injected in.

use snappr_core::{CreditReturn, NodeId, TimeDelta, Timestamp};
use snappr_nic::{Fabric, Packet};

#[derive(Debug, Clone, Copy)]
pub struct Wire {
    latency: TimeDelta,
}

impl Wire {
    pub fn new(latency: TimeDelta) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> TimeDelta {
        self.latency
    }
}

impl Fabric for Wire {
    fn packet_arrival(&mut self, _packet: &Packet, departure: Timestamp) -> Timestamp {
        departure + self.latency
    }

    fn credit_arrival(&mut self, _credit: &CreditReturn, _from: NodeId, departure: Timestamp) -> Timestamp {
        departure + self.latency
    }
}
