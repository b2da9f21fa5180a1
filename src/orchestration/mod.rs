//! Running collaborations end to end.
//!
//! [`driver::CollaborationDriver`] executes a collaboration's agents in order
//! through their executors; [`manifest`] loads agent rosters from TOML.

pub mod driver;
pub mod manifest;

pub use driver::{AgentRunResult, CollaborationDriver, CreatedTask, ExecutionReport};
