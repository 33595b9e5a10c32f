pub mod msr;
pub mod topology;

pub use msr::{MsrDevice, RegisterReader};
pub use topology::{Topology, MAX_NODES};
