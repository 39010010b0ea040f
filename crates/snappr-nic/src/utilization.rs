//! Utilization accounting. Purely observational.
//!
//! Each port is IDLE (nothing to send), ACTIVE (packets in flight) or
//! STALLED (head of queue waiting on credit). Every transition reports the
//! time spent in the previous state to a `StatsSink`. Nothing here is read
//! back by the scheduler.

use serde::Serialize;

use snappr_core::{Port, TimeDelta, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    Idle,
    Active,
    Stalled,
}

/// Write-only consumer of utilization data.
pub trait StatsSink {
    /// `port` spent `[start, end)` in `state`.
    fn record_state(&mut self, port: Port, state: ActivityState, start: Timestamp, end: Timestamp);

    /// `port` entered STALLED. Called once per stall episode.
    fn record_stall(&mut self, port: Port);

    /// One packet of `bytes` left `port`.
    fn record_packet_sent(&mut self, port: Port, bytes: u64);
}

/// Current state of one port plus when it was entered.
#[derive(Debug, Clone)]
pub struct UtilizationTracker {
    port: Port,
    state: ActivityState,
    since: Timestamp,
}

impl UtilizationTracker {
    pub fn new(port: Port) -> Self {
        Self {
            port,
            state: ActivityState::Idle,
            since: Timestamp::ZERO,
        }
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    /// Move to `next` at `now`. Re-entering the current state is not a
    /// transition and records nothing.
    pub fn transition(&mut self, next: ActivityState, now: Timestamp, sink: &mut dyn StatsSink) {
        if next == self.state {
            return;
        }
        sink.record_state(self.port, self.state, self.since, now);
        if next == ActivityState::Stalled {
            sink.record_stall(self.port);
        }
        tracing::trace!(port = self.port.0, from = ?self.state, to = ?next, at = now.as_ps(), "port state");
        self.state = next;
        self.since = now;
    }

    /// Report the open interval up to `now` without changing state.
    pub fn flush(&mut self, now: Timestamp, sink: &mut dyn StatsSink) {
        if now > self.since {
            sink.record_state(self.port, self.state, self.since, now);
            self.since = now;
        }
    }
}

// ── In-memory sink ────────────────────────────────────────────────────────────

/// Time spent per state within one calendar epoch, in picoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EpochBucket {
    pub idle_ps: u64,
    pub active_ps: u64,
    pub stalled_ps: u64,
}

impl EpochBucket {
    fn add(&mut self, state: ActivityState, ps: u64) {
        match state {
            ActivityState::Idle => self.idle_ps += ps,
            ActivityState::Active => self.active_ps += ps,
            ActivityState::Stalled => self.stalled_ps += ps,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PortStats {
    pub idle: TimeDelta,
    pub active: TimeDelta,
    pub stalled: TimeDelta,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    /// Number of times the port entered STALLED.
    pub stalls: u64,
    /// Per-epoch breakdown; empty when the calendar is disabled.
    pub calendar: Vec<EpochBucket>,
}

impl PortStats {
    pub fn time_in(&self, state: ActivityState) -> TimeDelta {
        match state {
            ActivityState::Idle => self.idle,
            ActivityState::Active => self.active,
            ActivityState::Stalled => self.stalled,
        }
    }
}

/// Default sink: per-state totals, byte counters and a time-bucketed
/// calendar of activity per port.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UtilizationStats {
    #[serde(skip)]
    epoch: Option<TimeDelta>,
    ports: Vec<PortStats>,
}

impl UtilizationStats {
    /// `epoch` is the calendar bucket width; `None` keeps totals only.
    pub fn new(num_ports: u16, epoch: Option<TimeDelta>) -> Self {
        Self {
            epoch: epoch.filter(|e| !e.is_zero()),
            ports: vec![PortStats::default(); num_ports as usize],
        }
    }

    pub fn port(&self, port: Port) -> Option<&PortStats> {
        self.ports.get(port.index())
    }

    pub fn ports(&self) -> &[PortStats] {
        &self.ports
    }

    pub fn total_bytes_sent(&self) -> u64 {
        self.ports.iter().map(|p| p.bytes_sent).sum()
    }

    fn port_mut(&mut self, port: Port) -> &mut PortStats {
        let idx = port.index();
        if idx >= self.ports.len() {
            self.ports.resize(idx + 1, PortStats::default());
        }
        &mut self.ports[idx]
    }
}

impl StatsSink for UtilizationStats {
    fn record_state(&mut self, port: Port, state: ActivityState, start: Timestamp, end: Timestamp) {
        let epoch = self.epoch;
        let stats = self.port_mut(port);
        let elapsed = end.since(start);
        match state {
            ActivityState::Idle => stats.idle += elapsed,
            ActivityState::Active => stats.active += elapsed,
            ActivityState::Stalled => stats.stalled += elapsed,
        }

        let Some(width) = epoch.map(TimeDelta::as_ps) else {
            return;
        };
        // Split [start, end) across the buckets it overlaps.
        let mut t = start.as_ps();
        let end = end.as_ps();
        while t < end {
            let bucket = (t / width) as usize;
            let bucket_end = ((bucket as u64) + 1) * width;
            let slice = bucket_end.min(end) - t;
            if bucket >= stats.calendar.len() {
                stats.calendar.resize(bucket + 1, EpochBucket::default());
            }
            stats.calendar[bucket].add(state, slice);
            t += slice;
        }
    }

    fn record_stall(&mut self, port: Port) {
        self.port_mut(port).stalls += 1;
    }

    fn record_packet_sent(&mut self, port: Port, bytes: u64) {
        let stats = self.port_mut(port);
        stats.bytes_sent += bytes;
        stats.packets_sent += 1;
    }
}
