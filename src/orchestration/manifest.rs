//! Agent manifests: a TOML roster of agents to register at startup.
//!
//! ```toml
//! [[agents]]
//! id = "r1"
//! name = "Researcher"
//! capabilities = [{ name = "research", description = "Finds sources" }]
//!
//! [[agents]]
//! id = "w1"
//! name = "Writer"
//! system_prompt = "You write clear prose."
//! capabilities = [{ name = "text_generation" }]
//! config = { depends_on = "r1" }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::registry::{AgentId, AgentRecord, AgentRegistry};

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    agents: Vec<AgentRecord>,
}

/// Parse manifest text. `origin` is only used in error messages.
pub fn parse_manifest(content: &str, origin: &Path) -> Result<Vec<AgentRecord>, ConfigError> {
    let manifest: Manifest = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: origin.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(manifest.agents)
}

pub fn load_manifest(path: &Path) -> Result<Vec<AgentRecord>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_manifest(&content, path)
}

/// Register every agent in order and return the assigned ids.
pub fn register_all(registry: &AgentRegistry, agents: Vec<AgentRecord>) -> Vec<AgentId> {
    let ids: Vec<AgentId> = agents.into_iter().map(|a| registry.register(a)).collect();
    tracing::info!(count = ids.len(), "Registered agents from manifest");
    ids
}
