//! In-memory agent registry.
//!
//! [`AgentRegistry`] is the single source of truth for registered agents. The
//! table sits behind an `RwLock`; each entry has its own `Mutex`, so status
//! updates to different agents only share the read side of the table lock
//! while updates to the same agent serialize on its entry lock.
//! Registration and deletion take the table's write lock for the duration of
//! one map insert/remove.
//!
//! Collaboration runs lease an agent with [`AgentRegistry::begin_run`] and
//! release it with [`AgentRegistry::end_run`]. The agent shows `Busy` while
//! at least one lease is held and returns to the status it had before the
//! first lease once the last one is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid::Uuid;

use super::types::{AgentId, AgentRecord, AgentStatus};
use crate::error::RegistryError;

struct AgentEntry {
    record: AgentRecord,
    /// Runs currently executing this agent.
    active_runs: usize,
    /// Status to restore when the last run releases the agent.
    resting: AgentStatus,
}

impl AgentEntry {
    fn new(record: AgentRecord) -> Self {
        let resting = record.status;
        Self {
            record,
            active_runs: 0,
            resting,
        }
    }

    /// Ready, or busy only because collaboration runs hold it.
    fn is_available(&self) -> bool {
        match self.record.status {
            AgentStatus::Ready => true,
            AgentStatus::Busy => self.active_runs > 0 && self.resting == AgentStatus::Ready,
            _ => false,
        }
    }
}

#[derive(Default)]
struct RegistryTable {
    /// Insertion order; iteration follows it.
    order: Vec<AgentId>,
    agents: HashMap<AgentId, Arc<Mutex<AgentEntry>>>,
}

/// Catalog of known agents.
///
/// Cheap to clone: clones share the same table.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    table: Arc<RwLock<RegistryTable>>,
}

fn lock_entry(entry: &Mutex<AgentEntry>) -> MutexGuard<'_, AgentEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an agent and return its id.
    ///
    /// A missing id is replaced with a fresh UUID. Both timestamps are
    /// stamped with the current time. Registering an id that already exists
    /// replaces that record in place: it keeps its position in iteration
    /// order and its original `created_at`.
    pub fn register(&self, mut record: AgentRecord) -> AgentId {
        if record.id.trim().is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let now = Utc::now();
        record.created_at = now;
        record.updated_at = now;

        let id = record.id.clone();
        let mut table = self.write();
        match table.agents.get(&id) {
            Some(existing) => {
                let mut entry = lock_entry(existing);
                record.created_at = entry.record.created_at;
                tracing::warn!(agent_id = %id, name = %record.name, "Re-registering agent; previous record replaced");
                entry.resting = record.status;
                if entry.active_runs > 0 {
                    record.status = AgentStatus::Busy;
                }
                entry.record = record;
            }
            None => {
                tracing::info!(agent_id = %id, name = %record.name, "Registered agent");
                table.order.push(id.clone());
                table
                    .agents
                    .insert(id.clone(), Arc::new(Mutex::new(AgentEntry::new(record))));
            }
        }
        id
    }

    /// Snapshot of one agent, or `None` if the id is unknown.
    pub fn get(&self, id: &str) -> Option<AgentRecord> {
        let table = self.read();
        table.agents.get(id).map(|e| lock_entry(e).record.clone())
    }

    /// Snapshots of every agent in insertion order.
    pub fn list(&self) -> Vec<AgentRecord> {
        self.filter(|_| true)
    }

    /// Change an agent's status and refresh its `updated_at`.
    ///
    /// While runs hold the agent, the new status is also the one restored
    /// when the last run ends.
    pub fn update_status(&self, id: &str, status: AgentStatus) -> Result<(), RegistryError> {
        self.with_entry(id, |entry| {
            entry.record.status = status;
            if entry.active_runs == 0 || status != AgentStatus::Busy {
                entry.resting = status;
            }
            entry.record.updated_at = Utc::now();
        })?;
        tracing::info!(agent_id = %id, %status, "Updated agent status");
        Ok(())
    }

    /// Take a run lease on an agent and mark it `Busy`.
    pub fn begin_run(&self, id: &str) -> Result<(), RegistryError> {
        let runs = self.with_entry(id, |entry| {
            if entry.active_runs == 0 && entry.record.status != AgentStatus::Busy {
                entry.resting = entry.record.status;
            }
            entry.active_runs += 1;
            entry.record.status = AgentStatus::Busy;
            entry.record.updated_at = Utc::now();
            entry.active_runs
        })?;
        tracing::debug!(agent_id = %id, runs, "Agent run started");
        Ok(())
    }

    /// Release a run lease. The last release restores the status the agent
    /// had before its first lease (or whatever an operator set meanwhile).
    pub fn end_run(&self, id: &str) -> Result<(), RegistryError> {
        let (runs, status) = self.with_entry(id, |entry| {
            entry.active_runs = entry.active_runs.saturating_sub(1);
            if entry.active_runs == 0 {
                entry.record.status = entry.resting;
                entry.record.updated_at = Utc::now();
            }
            (entry.active_runs, entry.record.status)
        })?;
        tracing::debug!(agent_id = %id, runs, %status, "Agent run finished");
        Ok(())
    }

    /// Remove an agent. Returns `false` if the id was not registered.
    pub fn delete(&self, id: &str) -> bool {
        let mut table = self.write();
        if table.agents.remove(id).is_none() {
            return false;
        }
        table.order.retain(|existing| existing != id);
        tracing::info!(agent_id = %id, "Deleted agent");
        true
    }

    /// Ready agents that declare a capability with exactly this name, in
    /// insertion order.
    pub fn find_by_capability(&self, name: &str) -> Vec<AgentRecord> {
        let matching =
            self.filter(|e| e.record.status == AgentStatus::Ready && e.record.has_capability(name));
        tracing::debug!(capability = %name, count = matching.len(), "Found agents by capability");
        matching
    }

    /// Like [`Self::find_by_capability`], but also counts agents that are
    /// `Busy` only because collaboration runs currently hold them.
    pub fn find_available_by_capability(&self, name: &str) -> Vec<AgentRecord> {
        self.filter(|e| e.is_available() && e.record.has_capability(name))
    }

    /// Agents of any status that use the given framework tag.
    pub fn find_by_framework(&self, framework: &str) -> Vec<AgentRecord> {
        self.filter(|e| e.record.framework == framework)
    }

    pub fn len(&self) -> usize {
        self.read().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entry<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut AgentEntry) -> T,
    ) -> Result<T, RegistryError> {
        let table = self.read();
        let entry = table
            .agents
            .get(id)
            .ok_or_else(|| RegistryError::AgentNotFound(id.to_string()))?;
        let mut entry = lock_entry(entry);
        Ok(f(&mut entry))
    }

    fn filter(&self, pred: impl Fn(&AgentEntry) -> bool) -> Vec<AgentRecord> {
        let table = self.read();
        table
            .order
            .iter()
            .filter_map(|id| table.agents.get(id))
            .filter_map(|e| {
                let entry = lock_entry(e);
                pred(&entry).then(|| entry.record.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::Capability;

    fn agent(id: &str, caps: &[&str]) -> AgentRecord {
        caps.iter().fold(AgentRecord::new(id, id), |a, c| {
            a.with_capability(Capability::new(*c, ""))
        })
    }

    #[test]
    fn register_assigns_missing_id() {
        let reg = AgentRegistry::new();
        let id = reg.register(AgentRecord::new("", "anonymous"));
        assert!(!id.is_empty());
        assert_eq!(reg.get(&id).unwrap().name, "anonymous");
    }

    #[test]
    fn reregistering_keeps_position_and_created_at() {
        let reg = AgentRegistry::new();
        reg.register(agent("a", &[]));
        reg.register(agent("b", &[]));
        let first_created = reg.get("a").unwrap().created_at;

        reg.register(AgentRecord::new("a", "renamed"));

        let ids: Vec<_> = reg.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let a = reg.get("a").unwrap();
        assert_eq!(a.name, "renamed");
        assert_eq!(a.created_at, first_created);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn update_status_unknown_id_is_not_found() {
        let reg = AgentRegistry::new();
        let err = reg.update_status("ghost", AgentStatus::Busy).unwrap_err();
        assert!(matches!(err, RegistryError::AgentNotFound(id) if id == "ghost"));
    }

    #[test]
    fn update_status_refreshes_updated_at() {
        let reg = AgentRegistry::new();
        reg.register(agent("a", &[]));
        let before = reg.get("a").unwrap().updated_at;
        reg.update_status("a", AgentStatus::Offline).unwrap();
        let after = reg.get("a").unwrap();
        assert_eq!(after.status, AgentStatus::Offline);
        assert!(after.updated_at >= before);
    }

    #[test]
    fn delete_reports_presence() {
        let reg = AgentRegistry::new();
        reg.register(agent("a", &[]));
        assert!(reg.delete("a"));
        assert!(!reg.delete("a"));
        assert!(reg.is_empty());
    }

    #[test]
    fn find_by_capability_requires_ready_and_exact_name() {
        let reg = AgentRegistry::new();
        reg.register(agent("r1", &["research"]));
        reg.register(agent("r2", &["research"]).with_status(AgentStatus::Busy));
        reg.register(agent("r3", &["research_deep"]));
        reg.register(agent("r4", &["text_generation", "research"]));

        let ids: Vec<_> = reg
            .find_by_capability("research")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["r1", "r4"]);
    }

    #[test]
    fn run_leases_restore_prior_status() {
        let reg = AgentRegistry::new();
        reg.register(agent("a", &[]).with_status(AgentStatus::Offline));

        reg.begin_run("a").unwrap();
        reg.begin_run("a").unwrap();
        assert_eq!(reg.get("a").unwrap().status, AgentStatus::Busy);

        reg.end_run("a").unwrap();
        assert_eq!(reg.get("a").unwrap().status, AgentStatus::Busy);
        reg.end_run("a").unwrap();
        assert_eq!(reg.get("a").unwrap().status, AgentStatus::Offline);
    }

    #[test]
    fn status_set_during_run_wins_after_release() {
        let reg = AgentRegistry::new();
        reg.register(agent("a", &[]));
        reg.begin_run("a").unwrap();
        reg.update_status("a", AgentStatus::Error).unwrap();
        reg.end_run("a").unwrap();
        assert_eq!(reg.get("a").unwrap().status, AgentStatus::Error);
    }

    #[test]
    fn leased_ready_agent_stays_available() {
        let reg = AgentRegistry::new();
        reg.register(agent("w1", &["text_generation"]));
        reg.register(agent("w2", &["text_generation"]).with_status(AgentStatus::Busy));
        reg.begin_run("w1").unwrap();

        assert!(reg.find_by_capability("text_generation").is_empty());
        let ids: Vec<_> = reg
            .find_available_by_capability("text_generation")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["w1"]);
    }

    #[test]
    fn find_by_framework_ignores_status() {
        let reg = AgentRegistry::new();
        reg.register(agent("a", &[]).with_framework("crew"));
        reg.register(agent("b", &[]).with_status(AgentStatus::Offline).with_framework("crew"));
        reg.register(agent("c", &[]));
        assert_eq!(reg.find_by_framework("crew").len(), 2);
    }
}
