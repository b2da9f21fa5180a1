//! Agent registry subsystem.
//!
//! Holds the catalog of known agents ([`memory::AgentRegistry`]) and the
//! record types ([`types`]) that the rest of the crate passes around.

pub mod memory;
pub mod types;

pub use memory::AgentRegistry;
pub use types::{AgentId, AgentRecord, AgentStatus, Capability, DEFAULT_FRAMEWORK};
