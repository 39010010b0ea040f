//! Point-to-point transport protocols.
//!
//! A send goes CREATED -> IN_FLIGHT (flow registered) -> ACKED (request
//! completed, flow removed). The ack is the NIC-level "sent" ack generated
//! when the payload's tail packet finishes injection. There is no retry and
//! no timeout at this layer.

use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;
use snappr_core::config::ProtocolKind;
use snappr_core::{Envelope, FlowId, FlowIdAllocator, MessageKind, NetworkMessage, NodeId, Port, Request, Timestamp};

use crate::datatype::{fill_send_buffer, Datatype};
use crate::error::ProtocolError;
use crate::matching::RecvMatcher;

/// Everything a logical send needs.
#[derive(Debug, Clone)]
pub struct SendArgs {
    pub src: NodeId,
    pub dst: NodeId,
    pub src_rank: i32,
    pub dst_rank: i32,
    pub tag: i32,
    pub comm: u32,
    pub seq: u32,
    pub count: u32,
    pub datatype: Rc<dyn Datatype>,
    /// User send buffer. `None` models the transfer without real data.
    pub buffer: Option<Bytes>,
    pub port: Port,
}

impl SendArgs {
    pub fn envelope(&self) -> Envelope {
        Envelope {
            src_rank: self.src_rank,
            dst_rank: self.dst_rank,
            tag: self.tag,
            comm: self.comm,
            seq: self.seq,
            count: self.count,
            type_size: self.datatype.packed_size(),
            datatype: self.datatype.id(),
        }
    }

    pub fn payload_bytes(&self) -> u64 {
        self.count as u64 * self.datatype.packed_size() as u64
    }

    /// Bytes the user buffer has to cover: `count` elements `extent` apart,
    /// the last one up to the end of its data.
    pub fn buffer_span(&self) -> u64 {
        match self.count {
            0 => 0,
            n => (n as u64 - 1) * self.datatype.extent() as u64 + self.datatype.packed_size() as u64,
        }
    }
}

/// What happened to an incoming message.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// A sent ack completed this send request.
    Acked(Request),
    /// A payload completed this posted receive.
    Matched(Request),
    /// A payload was handed to the matcher as unexpected.
    Unexpected,
}

// ── Send-flow table ───────────────────────────────────────────────────────────

/// Sends awaiting their ack, by flow id.
#[derive(Debug, Default)]
pub struct SendFlows {
    flows: HashMap<FlowId, Request>,
}

impl SendFlows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, flow: FlowId, request: Request) -> Result<(), ProtocolError> {
        if self.flows.contains_key(&flow) {
            return Err(ProtocolError::DuplicateFlow { flow });
        }
        self.flows.insert(flow, request);
        Ok(())
    }

    /// Complete and remove the send `ack` acknowledges. A miss is fatal.
    pub fn acknowledge(
        &mut self,
        ack: &NetworkMessage,
        now: Timestamp,
    ) -> Result<Request, ProtocolError> {
        let request = self
            .flows
            .remove(&ack.flow_id())
            .ok_or(ProtocolError::UnknownAck {
                flow: ack.flow_id(),
                from: ack.src(),
            })?;
        request.complete(now);
        tracing::debug!(flow = ack.flow_id().0, kind = %ack.kind(), "send acked");
        Ok(request)
    }

    pub fn contains(&self, flow: FlowId) -> bool {
        self.flows.contains_key(&flow)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// In-flight flow ids, sorted.
    pub fn in_flight(&self) -> Vec<FlowId> {
        let mut ids: Vec<FlowId> = self.flows.keys().copied().collect();
        ids.sort();
        ids
    }
}

/// Shared receive path: match, finalize, or park as unexpected.
fn deliver_payload(
    msg: NetworkMessage,
    matcher: &mut dyn RecvMatcher,
    now: Timestamp,
) -> Result<Incoming, ProtocolError> {
    match matcher.find_matching_recv(&msg) {
        Some(recv) => {
            let request = recv.request.clone();
            matcher.finalize_recv(&msg, recv, now)?;
            Ok(Incoming::Matched(request))
        }
        None => {
            matcher.buffer_unexpected(msg);
            Ok(Incoming::Unexpected)
        }
    }
}

// ── Protocols ─────────────────────────────────────────────────────────────────

/// Capability set every protocol variant provides.
pub trait TransportProtocol {
    fn name(&self) -> &'static str;

    /// Build the payload for a send and register it as in flight.
    fn start(
        &mut self,
        args: SendArgs,
        request: Request,
        flow_ids: &mut FlowIdAllocator,
        now: Timestamp,
    ) -> Result<NetworkMessage, ProtocolError>;

    /// Dispatch an arrived message by kind.
    fn incoming(
        &mut self,
        msg: NetworkMessage,
        matcher: &mut dyn RecvMatcher,
        now: Timestamp,
    ) -> Result<Incoming, ProtocolError>;

    fn incoming_ack(&mut self, msg: NetworkMessage, now: Timestamp) -> Result<Request, ProtocolError>;

    fn send_flows(&self) -> &SendFlows;
}

/// Remote write carrying the full payload plus placement metadata. The
/// send completes when the sent ack comes back.
#[derive(Debug, Default)]
pub struct DirectPut {
    send_flows: SendFlows,
}

impl TransportProtocol for DirectPut {
    fn name(&self) -> &'static str {
        "direct_put"
    }

    fn start(
        &mut self,
        args: SendArgs,
        request: Request,
        flow_ids: &mut FlowIdAllocator,
        now: Timestamp,
    ) -> Result<NetworkMessage, ProtocolError> {
        if let Some(buffer) = &args.buffer {
            let needed = args.buffer_span();
            if (buffer.len() as u64) < needed {
                return Err(ProtocolError::BufferTooShort {
                    needed,
                    got: buffer.len(),
                });
            }
        }
        let flow = flow_ids.next_id();
        let mut msg = NetworkMessage::new(
            args.src,
            args.dst,
            flow,
            args.payload_bytes(),
            MessageKind::RdmaPutPayload,
        )
        .with_port(args.port)
        .with_envelope(args.envelope())
        .with_ack()
        .started_at(now);
        // The put reads the user buffer in place.
        if let Some(buffer) = args.buffer {
            msg = msg.with_data(buffer);
        }
        self.send_flows.register(flow, request)?;
        tracing::debug!(msg = %msg, "direct put started");
        Ok(msg)
    }

    fn incoming(
        &mut self,
        msg: NetworkMessage,
        matcher: &mut dyn RecvMatcher,
        now: Timestamp,
    ) -> Result<Incoming, ProtocolError> {
        match msg.kind() {
            MessageKind::RdmaPutSentAck => self.incoming_ack(msg, now).map(Incoming::Acked),
            MessageKind::RdmaPutPayload => deliver_payload(msg, matcher, now),
            kind => Err(ProtocolError::UnexpectedKind {
                protocol: self.name(),
                kind,
                flow: msg.flow_id(),
            }),
        }
    }

    fn incoming_ack(&mut self, msg: NetworkMessage, now: Timestamp) -> Result<Request, ProtocolError> {
        self.send_flows.acknowledge(&msg, now)
    }

    fn send_flows(&self) -> &SendFlows {
        &self.send_flows
    }
}

/// The sender packs its buffer into the payload up front and completes on
/// the sent ack.
#[derive(Debug, Default)]
pub struct Eager {
    send_flows: SendFlows,
}

impl TransportProtocol for Eager {
    fn name(&self) -> &'static str {
        "eager"
    }

    fn start(
        &mut self,
        args: SendArgs,
        request: Request,
        flow_ids: &mut FlowIdAllocator,
        now: Timestamp,
    ) -> Result<NetworkMessage, ProtocolError> {
        let packed = match &args.buffer {
            Some(buffer) => Some(fill_send_buffer(buffer, args.count, args.datatype.as_ref())?),
            None => None,
        };
        let flow = flow_ids.next_id();
        let mut msg = NetworkMessage::new(
            args.src,
            args.dst,
            flow,
            args.payload_bytes(),
            MessageKind::Payload,
        )
        .with_port(args.port)
        .with_envelope(args.envelope())
        .with_ack()
        .started_at(now);
        if let Some(packed) = packed {
            msg = msg.with_data(packed);
        }
        self.send_flows.register(flow, request)?;
        tracing::debug!(msg = %msg, "eager send started");
        Ok(msg)
    }

    fn incoming(
        &mut self,
        msg: NetworkMessage,
        matcher: &mut dyn RecvMatcher,
        now: Timestamp,
    ) -> Result<Incoming, ProtocolError> {
        match msg.kind() {
            MessageKind::PayloadSentAck => self.incoming_ack(msg, now).map(Incoming::Acked),
            MessageKind::Payload => deliver_payload(msg, matcher, now),
            kind => Err(ProtocolError::UnexpectedKind {
                protocol: self.name(),
                kind,
                flow: msg.flow_id(),
            }),
        }
    }

    fn incoming_ack(&mut self, msg: NetworkMessage, now: Timestamp) -> Result<Request, ProtocolError> {
        self.send_flows.acknowledge(&msg, now)
    }

    fn send_flows(&self) -> &SendFlows {
        &self.send_flows
    }
}

/// The protocol an endpoint speaks, chosen once at construction.
#[derive(Debug)]
pub enum Protocol {
    DirectPut(DirectPut),
    Eager(Eager),
}

impl Protocol {
    pub fn new(kind: ProtocolKind) -> Self {
        match kind {
            ProtocolKind::DirectPut => Protocol::DirectPut(DirectPut::default()),
            ProtocolKind::Eager => Protocol::Eager(Eager::default()),
        }
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            Protocol::DirectPut(_) => ProtocolKind::DirectPut,
            Protocol::Eager(_) => ProtocolKind::Eager,
        }
    }

    fn inner(&self) -> &dyn TransportProtocol {
        match self {
            Protocol::DirectPut(p) => p,
            Protocol::Eager(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn TransportProtocol {
        match self {
            Protocol::DirectPut(p) => p,
            Protocol::Eager(p) => p,
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner().name()
    }

    pub fn start(
        &mut self,
        args: SendArgs,
        request: Request,
        flow_ids: &mut FlowIdAllocator,
        now: Timestamp,
    ) -> Result<NetworkMessage, ProtocolError> {
        self.inner_mut().start(args, request, flow_ids, now)
    }

    pub fn incoming(
        &mut self,
        msg: NetworkMessage,
        matcher: &mut dyn RecvMatcher,
        now: Timestamp,
    ) -> Result<Incoming, ProtocolError> {
        self.inner_mut().incoming(msg, matcher, now)
    }

    pub fn incoming_ack(&mut self, msg: NetworkMessage, now: Timestamp) -> Result<Request, ProtocolError> {
        self.inner_mut().incoming_ack(msg, now)
    }

    pub fn send_flows(&self) -> &SendFlows {
        self.inner().send_flows()
    }
}
