//! Request handles — what the application layer polls or waits on.
//!
//! A request moves from pending to completed exactly once. Completing it
//! again is a no-op that is not observed a second time.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use serde::Serialize;

use crate::time::{TimeDelta, Timestamp};

/// Status of a finished receive, filled in when the matching message lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecvStatus {
    pub source: i32,
    pub tag: i32,
    pub count: u32,
    pub bytes: u64,
}

/// Delay accounting for a receive: how long the receive waited on a late
/// sender, and how much active-wait time was charged since the last check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageDelay {
    pub sync: TimeDelta,
    pub active: TimeDelta,
}

#[derive(Debug, Default)]
struct RequestState {
    completed_at: Option<Timestamp>,
    completions: u32,
    posted_at: Timestamp,
    active_wait: bool,
    wait_start: Option<Timestamp>,
    status: Option<RecvStatus>,
    delay: Option<MessageDelay>,
    data: Option<Bytes>,
}

/// Shared, single-threaded handle to one send or receive operation.
///
/// Clones refer to the same operation. The simulation is cooperative and
/// single-threaded, so the handle is `!Send`.
#[derive(Debug, Clone, Default)]
pub struct Request {
    inner: Rc<RefCell<RequestState>>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request posted at `now`; receive-delay accounting measures from here.
    pub fn posted(now: Timestamp) -> Self {
        let req = Self::default();
        req.inner.borrow_mut().posted_at = now;
        req
    }

    /// Mark the request completed. Returns true only for the call that
    /// actually completed it.
    pub fn complete(&self, now: Timestamp) -> bool {
        let mut state = self.inner.borrow_mut();
        if state.completed_at.is_some() {
            return false;
        }
        state.completed_at = Some(now);
        state.completions += 1;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.inner.borrow().completed_at.is_some()
    }

    pub fn completed_at(&self) -> Option<Timestamp> {
        self.inner.borrow().completed_at
    }

    /// How many times completion was observed. Never more than one.
    pub fn completions(&self) -> u32 {
        self.inner.borrow().completions
    }

    pub fn posted_at(&self) -> Timestamp {
        self.inner.borrow().posted_at
    }

    /// Whether the owner is spinning on this request (active wait), as
    /// opposed to blocked.
    pub fn active_wait(&self) -> bool {
        self.inner.borrow().active_wait
    }

    pub fn set_active_wait(&self, active: bool, now: Timestamp) {
        let mut state = self.inner.borrow_mut();
        state.active_wait = active;
        state.wait_start = active.then_some(now);
    }

    pub fn wait_start(&self) -> Option<Timestamp> {
        self.inner.borrow().wait_start
    }

    pub fn set_wait_start(&self, now: Timestamp) {
        self.inner.borrow_mut().wait_start = Some(now);
    }

    pub fn status(&self) -> Option<RecvStatus> {
        self.inner.borrow().status
    }

    pub fn set_status(&self, status: RecvStatus) {
        self.inner.borrow_mut().status = Some(status);
    }

    pub fn delay(&self) -> Option<MessageDelay> {
        self.inner.borrow().delay
    }

    pub fn set_delay(&self, delay: MessageDelay) {
        self.inner.borrow_mut().delay = Some(delay);
    }

    /// Data delivered into a receive, if the message carried any.
    pub fn data(&self) -> Option<Bytes> {
        self.inner.borrow().data.clone()
    }

    pub fn set_data(&self, data: Bytes) {
        self.inner.borrow_mut().data = Some(data);
    }

    /// True if both handles refer to the same operation.
    pub fn same_as(&self, other: &Request) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
