//! snappr-sim — event-driven simulation of endpoints, NICs and a fabric.

pub mod endpoint;
pub mod error;
pub mod events;
pub mod report;
pub mod sim;
pub mod wire;
pub mod workload;

pub use endpoint::Endpoint;
pub use error::SimError;
pub use events::{Event, EventQueue};
pub use report::{EndpointReport, Report};
pub use sim::{RecvSpec, Simulation};
pub use wire::Wire;
pub use workload::{ring, Workload};
