//! snappr-nic — packet-level network interface model.
//!
//! A `Nic` owns one credit ledger, one injection queue per output port, one
//! reassembly table and one utilization tracker per port. It never blocks:
//! every entry point runs to completion and reports what should happen next
//! as `NicEvent`s for the event dispatcher to schedule.

pub mod credit;
pub mod eject;
pub mod error;
pub mod fabric;
pub mod inject;
pub mod nic;
pub mod packet;
pub mod utilization;

pub use credit::CreditLedger;
pub use eject::{Reassembly, ReassemblyEngine};
pub use error::NicError;
pub use fabric::Fabric;
pub use inject::{Injection, InjectionEngine};
pub use nic::{Delivery, Nic, NicEvent};
pub use packet::Packet;
pub use utilization::{ActivityState, PortStats, StatsSink, UtilizationStats, UtilizationTracker};
