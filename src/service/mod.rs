//! Request flows: the generic saga runner, the account provisioner built on
//! it, and the broker that sequences store and target calls per request.

pub mod broker;
pub mod provisioner;
pub mod saga;

pub use broker::{Broker, DropOutcome, FlowState};
pub use provisioner::Provisioner;
