use snappr_core::config::SimConfig;
use snappr_core::{FlowIdAllocator, NodeId};
use snappr_nic::{Nic, NicError, UtilizationStats};
use snappr_transport::{PostedRecvQueue, Protocol};

/// One simulated process: its NIC, the protocol it speaks, its posted
/// receives and its flow id space.
pub struct Endpoint {
    pub(crate) nic: Nic,
    pub(crate) protocol: Protocol,
    pub(crate) matcher: PostedRecvQueue,
    pub(crate) flow_ids: FlowIdAllocator,
}

impl Endpoint {
    pub fn new(addr: NodeId, config: &SimConfig) -> Result<Self, NicError> {
        let stats = UtilizationStats::new(config.nic.num_ports, config.stats.epoch());
        Ok(Self {
            nic: Nic::new(addr, &config.nic, stats)?,
            protocol: Protocol::new(config.transport.protocol),
            matcher: PostedRecvQueue::new(),
            flow_ids: FlowIdAllocator::new(),
        })
    }

    pub fn addr(&self) -> NodeId {
        self.nic.addr()
    }

    pub fn nic(&self) -> &Nic {
        &self.nic
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn matcher(&self) -> &PostedRecvQueue {
        &self.matcher
    }

    pub fn flows_issued(&self) -> u64 {
        self.flow_ids.issued()
    }
}
