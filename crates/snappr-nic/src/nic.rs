//! The NIC: credit, injection, ejection and utilization for one endpoint.
//!
//! Entry points never block. Each one runs to completion at `now` and pushes
//! whatever must happen later onto `out` for the dispatcher to schedule.

use snappr_core::config::NicConfig;
use snappr_core::{make_ack, CreditReturn, NetworkMessage, NodeId, Port, TimeDelta, Timestamp};

use crate::credit::CreditLedger;
use crate::eject::{Reassembly, ReassemblyEngine};
use crate::error::NicError;
use crate::inject::{Injection, InjectionEngine};
use crate::packet::Packet;
use crate::utilization::{ActivityState, StatsSink, UtilizationStats, UtilizationTracker};

/// Follow-up work produced by the NIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicEvent {
    /// Hand `packet` to the fabric; its last byte leaves at `departure`.
    Transmit { packet: Packet, departure: Timestamp },
    /// Send buffer credit back toward `credit.origin`.
    ReturnCredit {
        credit: CreditReturn,
        departure: Timestamp,
    },
    /// Transport "sent" ack for a fully injected message, for the local
    /// transport at `at`.
    LocalAck { ack: NetworkMessage, at: Timestamp },
    /// Port may have drained; call `port_idle` at `at`.
    IdleCheck { port: Port, at: Timestamp },
}

/// A reassembled message ready for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: NetworkMessage,
    /// Ejection finish time.
    pub at: Timestamp,
    pub packets: u32,
    pub first_arrival: Timestamp,
}

pub struct Nic<S: StatsSink = UtilizationStats> {
    addr: NodeId,
    send_credits: bool,
    ejection_byte_delay: TimeDelta,
    credits: CreditLedger,
    injection: InjectionEngine,
    reassembly: ReassemblyEngine,
    ej_next_free: Timestamp,
    trackers: Vec<UtilizationTracker>,
    stats: S,
}

impl<S: StatsSink> Nic<S> {
    pub fn new(addr: NodeId, config: &NicConfig, stats: S) -> Result<Self, NicError> {
        let num_ports = config.num_ports;
        Ok(Self {
            addr,
            send_credits: config.send_credits,
            ejection_byte_delay: config.ejection_byte_delay(),
            credits: CreditLedger::new(num_ports, config.credit_capacity()),
            injection: InjectionEngine::new(num_ports, config.packet_size, config.byte_delay())?,
            reassembly: ReassemblyEngine::new(),
            ej_next_free: Timestamp::ZERO,
            trackers: (0..num_ports).map(|p| UtilizationTracker::new(Port(p))).collect(),
            stats,
        })
    }

    pub fn addr(&self) -> NodeId {
        self.addr
    }

    pub fn send_credits(&self) -> bool {
        self.send_credits
    }

    pub fn credits(&self) -> &CreditLedger {
        &self.credits
    }

    pub fn injection(&self) -> &InjectionEngine {
        &self.injection
    }

    pub fn reassembly(&self) -> &ReassemblyEngine {
        &self.reassembly
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    pub fn port_state(&self, port: Port) -> Option<ActivityState> {
        self.trackers.get(port.index()).map(UtilizationTracker::state)
    }

    /// Queue `message` on its port and inject as far as credit allows.
    pub fn send(
        &mut self,
        message: NetworkMessage,
        now: Timestamp,
        out: &mut Vec<NicEvent>,
    ) -> Result<(), NicError> {
        if message.src() != self.addr {
            return Err(NicError::ForeignMessage {
                flow: message.flow_id(),
                src: message.src(),
                nic: self.addr,
            });
        }
        let port = message.port();
        tracing::debug!(nic = self.addr.0, msg = %message, "send");
        self.injection.enqueue(message)?;
        self.pump(port, now, out)
    }

    /// Credit came back for `port`; resume a stalled queue.
    pub fn replenish(
        &mut self,
        port: Port,
        bytes: u64,
        now: Timestamp,
        out: &mut Vec<NicEvent>,
    ) -> Result<(), NicError> {
        self.credits.replenish(port, bytes)?;
        tracing::trace!(
            nic = self.addr.0,
            port = port.0,
            bytes,
            available = ?self.credits.available(port),
            "credit replenished"
        );
        self.pump(port, now, out)
    }

    /// Follow-up to `NicEvent::IdleCheck`. Goes idle only if nothing was
    /// queued or injected since the check was scheduled.
    pub fn port_idle(&mut self, port: Port, now: Timestamp) -> Result<(), NicError> {
        let tracker = self.trackers.get_mut(port.index()).ok_or(NicError::UnknownPort {
            port,
            num_ports: self.credits.num_ports(),
        })?;
        if tracker.state() == ActivityState::Active
            && self.injection.queue_len(port) == 0
            && self.injection.next_free(port) <= now
        {
            tracker.transition(ActivityState::Idle, now, &mut self.stats);
        }
        Ok(())
    }

    /// Accept one arriving packet. Returns the message once its last byte
    /// has been ejected.
    pub fn receive_packet(
        &mut self,
        packet: Packet,
        now: Timestamp,
        out: &mut Vec<NicEvent>,
    ) -> Result<Option<Delivery>, NicError> {
        if packet.dst != self.addr {
            return Err(NicError::Misrouted {
                flow: packet.flow_id,
                dst: packet.dst,
                nic: self.addr,
            });
        }
        let (src, port, bytes) = (packet.src, packet.port, packet.num_bytes as u64);

        let outcome = self.reassembly.accept(packet, now)?;

        let ejected = self.ej_next_free.max(now) + self.ejection_byte_delay * bytes;
        self.ej_next_free = ejected;

        if self.send_credits && bytes > 0 {
            out.push(NicEvent::ReturnCredit {
                credit: CreditReturn {
                    origin: src,
                    port,
                    bytes,
                },
                departure: ejected,
            });
        }

        Ok(match outcome {
            Reassembly::Partial { .. } => None,
            Reassembly::Complete {
                message,
                packets,
                first_arrival,
            } => Some(Delivery {
                message,
                at: ejected,
                packets,
                first_arrival,
            }),
        })
    }

    /// Close every port's open utilization interval at `now`.
    pub fn flush_stats(&mut self, now: Timestamp) {
        for tracker in &mut self.trackers {
            tracker.flush(now, &mut self.stats);
        }
    }

    fn pump(&mut self, port: Port, now: Timestamp, out: &mut Vec<NicEvent>) -> Result<(), NicError> {
        let idx = port.index();
        loop {
            match self.injection.inject(port, &mut self.credits, now)? {
                Injection::Advanced {
                    packet, departure, ..
                } => {
                    self.stats.record_packet_sent(port, packet.num_bytes as u64);
                    self.trackers[idx].transition(ActivityState::Active, now, &mut self.stats);
                    if let Some(message) = packet.payload.as_deref() {
                        if message.needs_ack() {
                            let ack = make_ack(message).map_err(|_| NicError::NotAckable {
                                flow: message.flow_id(),
                                kind: message.kind(),
                            })?;
                            out.push(NicEvent::LocalAck { ack, at: departure });
                        }
                    }
                    out.push(NicEvent::Transmit { packet, departure });
                }
                Injection::Stalled { needed } => {
                    tracing::debug!(
                        nic = self.addr.0,
                        port = port.0,
                        needed,
                        available = ?self.credits.available(port),
                        "injection stalled on credit"
                    );
                    self.trackers[idx].transition(ActivityState::Stalled, now, &mut self.stats);
                    return Ok(());
                }
                Injection::Idle => {
                    if self.trackers[idx].state() == ActivityState::Active {
                        out.push(NicEvent::IdleCheck {
                            port,
                            at: self.injection.next_free(port),
                        });
                    }
                    return Ok(());
                }
            }
        }
    }
}
