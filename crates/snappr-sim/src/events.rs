//! Event calendar.
//!
//! Events fire in time order; events at the same instant fire in the order
//! they were scheduled, so runs are deterministic.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use snappr_core::{NetworkMessage, NodeId, Port, Request, Timestamp};
use snappr_nic::Packet;
use snappr_transport::SendArgs;

#[derive(Debug)]
pub enum Event {
    /// Packet lands at `packet.dst`.
    PacketArrival { packet: Packet },
    /// Buffer credit lands back at `node`.
    CreditArrival { node: NodeId, port: Port, bytes: u64 },
    /// `node`'s port may have drained.
    PortIdle { node: NodeId, port: Port },
    /// Hand a message to `node`'s transport.
    Deliver { node: NodeId, message: NetworkMessage },
    /// Start a deferred send.
    Send { args: SendArgs, request: Request },
}

#[derive(Debug)]
struct Scheduled {
    at: Timestamp,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.seq) == (other.at, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: Timestamp, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled { at, seq, event }));
    }

    /// Remove the earliest event.
    pub fn pop(&mut self) -> Option<(Timestamp, Event)> {
        self.heap.pop().map(|Reverse(s)| (s.at, s.event))
    }

    /// Remove the earliest event if it fires no later than `limit`.
    pub fn pop_until(&mut self, limit: Timestamp) -> Option<(Timestamp, Event)> {
        match self.peek_time() {
            Some(at) if at <= limit => self.pop(),
            _ => None,
        }
    }

    pub fn peek_time(&self) -> Option<Timestamp> {
        self.heap.peek().map(|Reverse(s)| s.at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle(node: u32) -> Event {
        Event::PortIdle {
            node: NodeId(node),
            port: Port(0),
        }
    }

    fn node_of(event: &Event) -> u32 {
        match event {
            Event::PortIdle { node, .. } => node.0,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pops_in_time_then_insertion_order() {
        let mut queue = EventQueue::new();
        queue.push(Timestamp::from_ps(30), idle(0));
        queue.push(Timestamp::from_ps(10), idle(1));
        queue.push(Timestamp::from_ps(30), idle(2));
        queue.push(Timestamp::from_ps(10), idle(3));

        let order: Vec<(u64, u32)> = std::iter::from_fn(|| queue.pop())
            .map(|(at, e)| (at.as_ps(), node_of(&e)))
            .collect();
        assert_eq!(order, vec![(10, 1), (10, 3), (30, 0), (30, 2)]);
    }

    #[test]
    fn pop_until_respects_limit() {
        let mut queue = EventQueue::new();
        queue.push(Timestamp::from_ps(5), idle(0));
        queue.push(Timestamp::from_ps(50), idle(1));

        assert!(queue.pop_until(Timestamp::from_ps(5)).is_some());
        assert!(queue.pop_until(Timestamp::from_ps(49)).is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_time(), Some(Timestamp::from_ps(50)));
    }
}
