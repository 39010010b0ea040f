//! Discrete-event driver.
//!
//! Owns every endpoint, the fabric and the event calendar. Events execute
//! to completion one at a time; whatever a component wants done later comes
//! back as a `NicEvent` and is scheduled here. The first fatal error stops
//! the run with all state left in place.

use std::rc::Rc;

use snappr_core::config::SimConfig;
use snappr_core::{NetworkMessage, NodeId, Request, Timestamp};
use snappr_nic::{Fabric, NicEvent};
use snappr_transport::{Datatype, Incoming, PostedRecv, SendArgs};

use crate::endpoint::Endpoint;
use crate::error::SimError;
use crate::events::{Event, EventQueue};
use crate::report::{EndpointReport, Report};
use crate::wire::Wire;

/// A receive to post.
#[derive(Debug, Clone)]
pub struct RecvSpec {
    pub comm: u32,
    /// `None` accepts any source rank.
    pub source: Option<i32>,
    /// `None` accepts any tag.
    pub tag: Option<i32>,
    pub count: u32,
    pub datatype: Rc<dyn Datatype>,
}

pub struct Simulation<F: Fabric = Wire> {
    now: Timestamp,
    queue: EventQueue,
    endpoints: Vec<Endpoint>,
    fabric: F,
    num_ports: u16,
    events: u64,
}

impl Simulation<Wire> {
    /// Fixed-latency fabric.
    pub fn from_config(config: &SimConfig) -> Result<Self, SimError> {
        Self::new(config, Wire::new(config.fabric.latency()))
    }
}

impl<F: Fabric> Simulation<F> {
    /// `config.workload.endpoints` endpoints, addressed `0..n`. The config
    /// is validated first.
    pub fn new(config: &SimConfig, fabric: F) -> Result<Self, SimError> {
        config.validate()?;
        let endpoints = (0..config.workload.endpoints)
            .map(|i| Endpoint::new(NodeId(i), config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            now: Timestamp::ZERO,
            queue: EventQueue::new(),
            endpoints,
            fabric,
            num_ports: config.nic.num_ports,
            events: 0,
        })
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn num_ports(&self) -> u16 {
        self.num_ports
    }

    pub fn endpoint(&self, node: NodeId) -> Option<&Endpoint> {
        self.endpoints.get(node.0 as usize)
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn fabric(&self) -> &F {
        &self.fabric
    }

    /// Events executed so far.
    pub fn events_processed(&self) -> u64 {
        self.events
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    fn endpoint_mut(&mut self, node: NodeId) -> Result<&mut Endpoint, SimError> {
        self.endpoints
            .get_mut(node.0 as usize)
            .ok_or(SimError::UnknownNode(node))
    }

    /// Post a receive at `node` now. May complete at once against an
    /// unexpected message.
    pub fn post_recv(&mut self, node: NodeId, spec: RecvSpec) -> Result<Request, SimError> {
        let now = self.now;
        let request = Request::posted(now);
        let recv = PostedRecv {
            request: request.clone(),
            comm: spec.comm,
            source: spec.source,
            tag: spec.tag,
            count: spec.count,
            datatype: spec.datatype,
        };
        self.endpoint_mut(node)?.matcher.post(recv, now)?;
        Ok(request)
    }

    /// Start a send from `args.src` now.
    pub fn send(&mut self, args: SendArgs) -> Result<Request, SimError> {
        let request = Request::posted(self.now);
        self.start_send(args, request.clone())?;
        Ok(request)
    }

    /// Start a send at `at` (or now, if `at` has passed).
    pub fn send_at(&mut self, at: Timestamp, args: SendArgs) -> Request {
        let at = at.max(self.now);
        let request = Request::posted(at);
        self.queue.push(
            at,
            Event::Send {
                args,
                request: request.clone(),
            },
        );
        request
    }

    /// Hand `message` straight to `node`'s transport at `at`, bypassing the
    /// NIC.
    pub fn schedule_delivery(&mut self, at: Timestamp, node: NodeId, message: NetworkMessage) {
        self.queue.push(at.max(self.now), Event::Deliver { node, message });
    }

    /// Run until no events remain.
    pub fn run(&mut self) -> Result<(), SimError> {
        while let Some((at, event)) = self.queue.pop() {
            self.step(at, event)?;
        }
        tracing::info!(now = self.now.as_ps(), events = self.events, "run drained");
        Ok(())
    }

    /// Run every event scheduled no later than `limit`, then advance the
    /// clock to `limit`.
    pub fn run_until(&mut self, limit: Timestamp) -> Result<(), SimError> {
        while let Some((at, event)) = self.queue.pop_until(limit) {
            self.step(at, event)?;
        }
        self.now = self.now.max(limit);
        Ok(())
    }

    /// Snapshot of every endpoint. Closes utilization intervals at `now`.
    pub fn report(&mut self) -> Report {
        let now = self.now;
        for ep in &mut self.endpoints {
            ep.nic.flush_stats(now);
        }
        Report {
            finished_at: now,
            events: self.events,
            pending_events: self.queue.len(),
            endpoints: self.endpoints.iter().map(EndpointReport::from_endpoint).collect(),
        }
    }

    fn step(&mut self, at: Timestamp, event: Event) -> Result<(), SimError> {
        self.now = at;
        self.events += 1;
        self.dispatch(event).map_err(|err| {
            tracing::error!(at = at.as_ps(), error = %err, "fatal, stopping run");
            err
        })
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SimError> {
        let now = self.now;
        match event {
            Event::PacketArrival { packet } => {
                let node = packet.dst;
                let mut out = Vec::new();
                let delivery = self
                    .endpoint_mut(node)?
                    .nic
                    .receive_packet(packet, now, &mut out)?;
                self.schedule(node, out)?;
                if let Some(delivery) = delivery {
                    self.queue.push(
                        delivery.at,
                        Event::Deliver {
                            node,
                            message: delivery.message,
                        },
                    );
                }
            }
            Event::CreditArrival { node, port, bytes } => {
                let mut out = Vec::new();
                self.endpoint_mut(node)?
                    .nic
                    .replenish(port, bytes, now, &mut out)?;
                self.schedule(node, out)?;
            }
            Event::PortIdle { node, port } => {
                self.endpoint_mut(node)?.nic.port_idle(port, now)?;
            }
            Event::Deliver { node, message } => {
                let ep = self.endpoint_mut(node)?;
                let flow = message.flow_id();
                match ep.protocol.incoming(message, &mut ep.matcher, now)? {
                    Incoming::Acked(_) => {
                        tracing::debug!(node = node.0, flow = flow.0, at = now.as_ps(), "send complete")
                    }
                    Incoming::Matched(_) => {
                        tracing::debug!(node = node.0, flow = flow.0, at = now.as_ps(), "receive complete")
                    }
                    Incoming::Unexpected => {
                        tracing::trace!(node = node.0, flow = flow.0, "payload held as unexpected")
                    }
                }
            }
            Event::Send { args, request } => self.start_send(args, request)?,
        }
        Ok(())
    }

    fn start_send(&mut self, args: SendArgs, request: Request) -> Result<(), SimError> {
        let now = self.now;
        let node = args.src;
        if self.endpoint(args.dst).is_none() {
            return Err(SimError::UnknownNode(args.dst));
        }
        let ep = self.endpoint_mut(node)?;
        let message = ep.protocol.start(args, request, &mut ep.flow_ids, now)?;
        let mut out = Vec::new();
        ep.nic.send(message, now, &mut out)?;
        self.schedule(node, out)
    }

    /// Turn what `node`'s NIC asked for into calendar entries.
    fn schedule(&mut self, node: NodeId, out: Vec<NicEvent>) -> Result<(), SimError> {
        for event in out {
            match event {
                NicEvent::Transmit { packet, departure } => {
                    let arrival = self.fabric.packet_arrival(&packet, departure);
                    let receiver = self
                        .endpoints
                        .get(packet.dst.0 as usize)
                        .ok_or(SimError::UnknownNode(packet.dst))?;
                    // Without explicit returns the switch hands credit
                    // back as soon as the packet drains into the receiver.
                    if !receiver.nic.send_credits() && packet.num_bytes > 0 {
                        self.queue.push(
                            arrival,
                            Event::CreditArrival {
                                node,
                                port: packet.port,
                                bytes: packet.num_bytes as u64,
                            },
                        );
                    }
                    self.queue.push(arrival, Event::PacketArrival { packet });
                }
                NicEvent::ReturnCredit { credit, departure } => {
                    let at = self.fabric.credit_arrival(&credit, node, departure);
                    self.queue.push(
                        at,
                        Event::CreditArrival {
                            node: credit.origin,
                            port: credit.port,
                            bytes: credit.bytes,
                        },
                    );
                }
                NicEvent::LocalAck { ack, at } => {
                    self.queue.push(at, Event::Deliver { node, message: ack });
                }
                NicEvent::IdleCheck { port, at } => {
                    self.queue.push(at, Event::PortIdle { node, port });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snappr_core::{FlowId, MessageKind, Port, TimeDelta};
    use snappr_transport::Contiguous;

    fn config() -> SimConfig {
        let mut config = SimConfig::default();
        config.fabric.latency_ps = 1_000;
        config
    }

    fn args(bytes: u32) -> SendArgs {
        SendArgs {
            src: NodeId(0),
            dst: NodeId(1),
            src_rank: 0,
            dst_rank: 1,
            tag: 0,
            comm: 0,
            seq: 0,
            count: bytes,
            datatype: Rc::new(Contiguous::BYTE),
            buffer: None,
            port: Port(0),
        }
    }

    fn any_recv(count: u32) -> RecvSpec {
        RecvSpec {
            comm: 0,
            source: None,
            tag: None,
            count,
            datatype: Rc::new(Contiguous::BYTE),
        }
    }

    #[test]
    fn send_and_receive_complete_at_model_times() {
        let mut sim = Simulation::from_config(&config()).unwrap();
        let recv = sim.post_recv(NodeId(1), any_recv(10_000)).unwrap();
        let send = sim.send(args(10_000)).unwrap();
        sim.run().unwrap();

        // Tail leaves at 10000 * 10ps; the sent ack is local.
        assert_eq!(send.completed_at(), Some(Timestamp::from_ps(100_000)));
        assert_eq!(recv.completed_at(), Some(Timestamp::from_ps(101_000)));
        assert!(sim.endpoint(NodeId(0)).unwrap().protocol().send_flows().is_empty());
    }

    #[test]
    fn send_at_defers_injection() {
        let mut sim = Simulation::from_config(&config()).unwrap();
        sim.post_recv(NodeId(1), any_recv(100)).unwrap();
        let send = sim.send_at(Timestamp::from_ps(5_000), args(100));
        sim.run_until(Timestamp::from_ps(4_999)).unwrap();
        assert!(!send.is_complete());
        assert_eq!(sim.now(), Timestamp::from_ps(4_999));

        sim.run().unwrap();
        assert_eq!(
            send.completed_at(),
            Some(Timestamp::from_ps(5_000) + TimeDelta::from_ps(1_000))
        );
    }

    #[test]
    fn stray_ack_stops_the_run_naming_the_flow() {
        let mut sim = Simulation::from_config(&config()).unwrap();
        let ack = NetworkMessage::new(NodeId(1), NodeId(0), FlowId(77), 0, MessageKind::RdmaPutSentAck);
        sim.schedule_delivery(Timestamp::from_ps(10), NodeId(0), ack);
        let err = sim.run().unwrap_err();
        assert!(err.to_string().contains("flow77"));
        assert_eq!(sim.now(), Timestamp::from_ps(10));
    }

    #[test]
    fn send_to_missing_endpoint_is_rejected() {
        let mut sim = Simulation::from_config(&config()).unwrap();
        let mut a = args(10);
        a.dst = NodeId(9);
        assert!(matches!(sim.send(a), Err(SimError::UnknownNode(NodeId(9)))));
    }

    #[test]
    fn report_serializes_to_json() {
        let mut sim = Simulation::from_config(&config()).unwrap();
        sim.post_recv(NodeId(1), any_recv(3000)).unwrap();
        sim.send(args(3000)).unwrap();
        sim.run().unwrap();

        let report = sim.report();
        assert_eq!(report.endpoints.len(), 2);
        assert_eq!(report.endpoints[0].ports[0].packets_sent, 2);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["endpoints"][1]["receives_finalized"], 1);
        assert_eq!(json["endpoints"][0]["protocol"], "direct_put");
    }

    #[test]
    fn explicit_fabric_constructor_still_validates() {
        let mut cfg = config();
        cfg.nic.packet_size = 0;
        let err = Simulation::new(&cfg, Wire::new(TimeDelta::from_ps(1_000))).err().unwrap();
        assert!(matches!(err, SimError::Config(_)));
        assert!(err.to_string().contains("packet_size"));
    }
}
