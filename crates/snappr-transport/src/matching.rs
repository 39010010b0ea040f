//! Receive matching.
//!
//! Arriving payloads are paired with posted receives by communicator,
//! source rank and tag, in post order. A payload that finds no receive is
//! held as unexpected until one is posted.

use std::collections::VecDeque;
use std::rc::Rc;

use snappr_core::{Envelope, MessageDelay, MessageKind, NetworkMessage, RecvStatus, Request, TimeDelta, Timestamp};

use crate::datatype::Datatype;
use crate::error::ProtocolError;

/// A receive waiting for its message.
#[derive(Debug, Clone)]
pub struct PostedRecv {
    pub request: Request,
    pub comm: u32,
    /// `None` matches any source rank.
    pub source: Option<i32>,
    /// `None` matches any tag.
    pub tag: Option<i32>,
    /// Capacity in elements.
    pub count: u32,
    pub datatype: Rc<dyn Datatype>,
}

impl PostedRecv {
    pub fn matches(&self, env: &Envelope) -> bool {
        self.comm == env.comm
            && self.source.map_or(true, |s| s == env.src_rank)
            && self.tag.map_or(true, |t| t == env.tag)
    }
}

/// The matching collaborator the protocols hand payloads to.
pub trait RecvMatcher {
    /// Remove and return the first posted receive `msg` satisfies.
    fn find_matching_recv(&mut self, msg: &NetworkMessage) -> Option<PostedRecv>;

    /// Complete `recv` with the contents of `msg`.
    fn finalize_recv(
        &mut self,
        msg: &NetworkMessage,
        recv: PostedRecv,
        now: Timestamp,
    ) -> Result<(), ProtocolError>;

    /// Keep a payload no receive was waiting for.
    fn buffer_unexpected(&mut self, msg: NetworkMessage);
}

#[derive(Debug, Default)]
pub struct PostedRecvQueue {
    posted: VecDeque<PostedRecv>,
    unexpected: VecDeque<NetworkMessage>,
    finalized: u64,
}

impl PostedRecvQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a receive. If an unexpected message already satisfies it, the
    /// receive completes immediately and `true` is returned.
    pub fn post(&mut self, recv: PostedRecv, now: Timestamp) -> Result<bool, ProtocolError> {
        let hit = self
            .unexpected
            .iter()
            .position(|m| m.envelope().is_some_and(|env| recv.matches(env)));
        match hit.and_then(|idx| self.unexpected.remove(idx)) {
            Some(msg) => {
                self.finalize_recv(&msg, recv, now)?;
                Ok(true)
            }
            None => {
                self.posted.push_back(recv);
                Ok(false)
            }
        }
    }

    pub fn posted_len(&self) -> usize {
        self.posted.len()
    }

    pub fn unexpected_len(&self) -> usize {
        self.unexpected.len()
    }

    pub fn finalized(&self) -> u64 {
        self.finalized
    }
}

/// Receive-delay accounting: how long the receive sat waiting on a late
/// sender, and active-wait time since the request's wait started.
fn recv_delay(msg: &NetworkMessage, request: &Request, now: Timestamp) -> MessageDelay {
    let mut active = TimeDelta::ZERO;
    if request.active_wait() {
        if let Some(start) = request.wait_start() {
            active = now.since(start);
        }
        request.set_wait_start(now);
    }
    let sync = msg.time_started().since(request.posted_at());
    MessageDelay { sync, active }
}

impl RecvMatcher for PostedRecvQueue {
    fn find_matching_recv(&mut self, msg: &NetworkMessage) -> Option<PostedRecv> {
        let env = msg.envelope()?;
        let idx = self.posted.iter().position(|r| r.matches(env))?;
        self.posted.remove(idx)
    }

    fn finalize_recv(
        &mut self,
        msg: &NetworkMessage,
        recv: PostedRecv,
        now: Timestamp,
    ) -> Result<(), ProtocolError> {
        let (source, tag, count) = match msg.envelope() {
            Some(env) => (env.src_rank, env.tag, env.count),
            None => (-1, -1, 0),
        };
        if count > recv.count {
            return Err(ProtocolError::Truncated {
                flow: msg.flow_id(),
                count,
                capacity: recv.count,
            });
        }

        let request = &recv.request;
        let delay = recv_delay(msg, request, now);
        request.set_delay(delay);
        request.set_status(RecvStatus {
            source,
            tag,
            count,
            bytes: msg.byte_length(),
        });
        if let Some(data) = msg.data() {
            // Eager payloads arrive packed; put payloads arrive as written.
            let data = if msg.kind() == MessageKind::Payload && !recv.datatype.is_contiguous() {
                recv.datatype.unpack(data, count)
            } else {
                data.clone()
            };
            request.set_data(data);
        }
        request.complete(now);
        self.finalized += 1;

        tracing::debug!(
            flow = msg.flow_id().0,
            source,
            tag,
            bytes = msg.byte_length(),
            sync_ps = delay.sync.as_ps(),
            active_ps = delay.active.as_ps(),
            "receive finalized"
        );
        Ok(())
    }

    fn buffer_unexpected(&mut self, msg: NetworkMessage) {
        tracing::debug!(msg = %msg, queued = self.unexpected.len(), "unexpected message");
        self.unexpected.push_back(msg);
    }
}
