//! The supervisor: task analysis, agent selection, and the collaboration
//! lifecycle.
//!
//! [`Supervisor`] keeps one [`CollaborationRecord`] per hub session it opened.
//! Records live behind the same two-level locking as the registry and hub: a
//! table `RwLock` taken for writing only on insert, plus a `Mutex` per record.
//! A record lock may be held while touching the hub (record first, then
//! session), never the other way round, and never across an executor call.
//!
//! **Cancellation model:** each record owns a [`CancellationToken`]. The
//! driver receives a clone in its [`ExecutionTicket`] and checks it between
//! agent steps; [`Supervisor::terminate_collaboration`] cancels it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use super::analysis::{RELEVANCE_THRESHOLD, TaskAnalysis, TaskAnalyzer, validate_score};
use super::ordering::{compute_priority, determine_execution_order};
use super::selection::rank_candidates;
use crate::error::{HubError, RegistryError, SupervisorError};
use crate::hub::{CommunicationHub, SYSTEM_SENDER};
use crate::registry::{AgentId, AgentRecord, AgentRegistry};

/// Display name used for supervisor-authored messages.
pub const SUPERVISOR_NAME: &str = "Supervisor";

/// Lifecycle of a collaboration as seen by the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationStatus {
    Created,
    Active,
    Executing,
    Executed,
    Terminated,
}

impl fmt::Display for CollaborationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollaborationStatus::Created => "created",
            CollaborationStatus::Active => "active",
            CollaborationStatus::Executing => "executing",
            CollaborationStatus::Executed => "executed",
            CollaborationStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

struct CollaborationRecord {
    session_id: String,
    task: String,
    agent_ids: Vec<AgentId>,
    status: CollaborationStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancel_token: CancellationToken,
}

impl CollaborationRecord {
    fn info(&self) -> CollaborationInfo {
        CollaborationInfo {
            session_id: self.session_id.clone(),
            task: self.task.clone(),
            agent_ids: self.agent_ids.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn transition(&mut self, to: CollaborationStatus) {
        tracing::debug!(session_id = %self.session_id, from = %self.status, to = %to, "Collaboration transition");
        self.status = to;
        self.updated_at = Utc::now();
    }

    fn invalid(&self, to: CollaborationStatus) -> SupervisorError {
        SupervisorError::InvalidTransition {
            session_id: self.session_id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

/// Snapshot of a collaboration record.
#[derive(Clone, Debug, Serialize)]
pub struct CollaborationInfo {
    pub session_id: String,
    pub task: String,
    pub agent_ids: Vec<AgentId>,
    pub status: CollaborationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of [`Supervisor::monitor_collaboration`].
#[derive(Clone, Debug, Serialize)]
pub struct MonitorReport {
    pub session_id: String,
    pub status: CollaborationStatus,
    pub message_count: usize,
    /// Timestamp of the newest message in the session.
    pub last_update: DateTime<Utc>,
}

/// Everything the driver needs to run a collaboration, handed out by
/// [`Supervisor::begin_execution`].
#[derive(Clone, Debug)]
pub struct ExecutionTicket {
    pub session_id: String,
    pub task: String,
    /// Participants in execution order.
    pub agents: Vec<AgentRecord>,
    pub cancel_token: CancellationToken,
}

#[derive(Default)]
struct CollaborationTable {
    order: Vec<String>,
    records: HashMap<String, Arc<Mutex<CollaborationRecord>>>,
}

fn lock_record(record: &Mutex<CollaborationRecord>) -> MutexGuard<'_, CollaborationRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

fn supervisor_metadata(action: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("type".into(), json!("system"));
    meta.insert("action".into(), json!(action));
    meta
}

/// Orchestration engine tying the registry and hub together.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Supervisor {
    registry: AgentRegistry,
    hub: CommunicationHub,
    analyzer: Arc<dyn TaskAnalyzer>,
    relevance_threshold: f64,
    collaborations: Arc<RwLock<CollaborationTable>>,
}

impl Supervisor {
    pub fn new(
        registry: AgentRegistry,
        hub: CommunicationHub,
        analyzer: Arc<dyn TaskAnalyzer>,
    ) -> Self {
        Self {
            registry,
            hub,
            analyzer,
            relevance_threshold: RELEVANCE_THRESHOLD,
            collaborations: Arc::new(RwLock::new(CollaborationTable::default())),
        }
    }

    pub fn with_relevance_threshold(mut self, threshold: f64) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &CommunicationHub {
        &self.hub
    }

    fn record(&self, session_id: &str) -> Result<Arc<Mutex<CollaborationRecord>>, SupervisorError> {
        let table = self.collaborations.read().unwrap_or_else(PoisonError::into_inner);
        table
            .records
            .get(session_id)
            .cloned()
            .ok_or_else(|| SupervisorError::SessionNotFound(session_id.to_string()))
    }

    /// Work out which capabilities `task` needs.
    ///
    /// Never fails: an analyzer error, or a report in which nothing reaches
    /// the relevance threshold, yields the default capability.
    pub async fn analyze_task(&self, task: &str) -> TaskAnalysis {
        self.analyze_task_with_context(task, None).await
    }

    /// [`Self::analyze_task`] with an earlier analysis passed to the analyzer
    /// as extra context.
    pub async fn analyze_task_with_context(
        &self,
        task: &str,
        prior: Option<&TaskAnalysis>,
    ) -> TaskAnalysis {
        let report = match self.analyzer.analyze(task, prior).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Task analysis failed; using default capability");
                return TaskAnalysis::fallback(task, format!("Analysis failed: {e}"));
            }
        };

        let scored: HashSet<String> = report.scores.keys().cloned().collect();
        let mut scores = BTreeMap::new();
        for (capability, score) in report.scores {
            match validate_score(&capability, score) {
                Ok(score) => {
                    scores.insert(capability, score);
                }
                Err(e) => tracing::warn!(error = %e, "Discarding capability score"),
            }
        }

        let mut required: BTreeSet<String> = scores
            .iter()
            .filter(|(_, score)| **score >= self.relevance_threshold)
            .map(|(capability, _)| capability.clone())
            .collect();
        required.extend(
            report
                .required_capabilities
                .into_iter()
                .filter(|capability| !scored.contains(capability)),
        );

        if required.is_empty() {
            tracing::info!(task = %task, "No capability met the relevance threshold; using default");
            let mut analysis = TaskAnalysis::fallback(task, "No capability met the relevance threshold");
            analysis.scores = scores;
            return analysis;
        }

        tracing::info!(task = %task, capabilities = ?required, "Task analyzed");
        TaskAnalysis {
            task: task.to_string(),
            required_capabilities: required,
            scores,
            reasoning: report.reasoning.unwrap_or_default(),
            fallback: false,
        }
    }

    /// Pick registered agents for an analysis.
    ///
    /// Candidates are gathered per required capability (ready agents, plus
    /// ready agents currently leased by another run) and ranked by coverage. When nothing matches, every registered agent
    /// is returned instead.
    pub fn select_agents(&self, analysis: &TaskAnalysis) -> Result<Vec<AgentRecord>, SupervisorError> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for capability in &analysis.required_capabilities {
            for agent in self.registry.find_available_by_capability(capability) {
                if seen.insert(agent.id.clone()) {
                    candidates.push(agent);
                }
            }
        }

        if candidates.is_empty() {
            tracing::warn!(
                capabilities = ?analysis.required_capabilities,
                "No agent matches the required capabilities; falling back to all agents"
            );
            candidates = self.registry.list();
        }
        if candidates.is_empty() {
            return Err(SupervisorError::NoSuitableAgents(analysis.task.clone()));
        }

        let ranked = rank_candidates(candidates, &analysis.required_capabilities);
        tracing::info!(
            agents = ?ranked.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            "Selected agents"
        );
        Ok(ranked)
    }

    /// Open a hub session for `agents` and post the supervisor kickoff.
    pub fn create_collaboration(
        &self,
        agents: &[AgentRecord],
        task: &str,
    ) -> Result<String, SupervisorError> {
        let agent_ids: Vec<AgentId> = agents.iter().map(|a| a.id.clone()).collect();
        let session_id = self.hub.create_session(task, agent_ids.clone())?;

        let now = Utc::now();
        let record = Arc::new(Mutex::new(CollaborationRecord {
            session_id: session_id.clone(),
            task: task.to_string(),
            agent_ids,
            status: CollaborationStatus::Created,
            created_at: now,
            updated_at: now,
            cancel_token: CancellationToken::new(),
        }));
        {
            let mut table = self.collaborations.write().unwrap_or_else(PoisonError::into_inner);
            table.order.push(session_id.clone());
            table.records.insert(session_id.clone(), record.clone());
        }

        let mut record = lock_record(&record);
        self.hub.send_message(
            &session_id,
            &format!("Task: {task}\n\nPlease collaborate to complete this task."),
            SYSTEM_SENDER,
            SUPERVISOR_NAME,
            Some(supervisor_metadata("kickoff")),
        )?;
        record.transition(CollaborationStatus::Active);

        tracing::info!(session_id = %session_id, agents = agents.len(), "Created collaboration");
        Ok(session_id)
    }

    /// Deterministic execution order for `agents`. See
    /// [`super::ordering`] for the rules.
    pub fn determine_agent_execution_order(
        &self,
        agents: &[AgentRecord],
    ) -> Result<Vec<AgentRecord>, SupervisorError> {
        let ordered = determine_execution_order(agents)?;
        tracing::info!(
            order = ?ordered
                .iter()
                .map(|a| format!("{} (priority {})", a.name, compute_priority(a)))
                .collect::<Vec<_>>(),
            "Determined agent execution order"
        );
        Ok(ordered)
    }

    /// Execution order for a collaboration's participants, resolved against
    /// the registry's current records.
    pub fn execution_plan(&self, session_id: &str) -> Result<Vec<AgentRecord>, SupervisorError> {
        let record = self.record(session_id)?;
        let agent_ids = lock_record(&record).agent_ids.clone();
        let agents = agent_ids
            .iter()
            .map(|id| {
                self.registry
                    .get(id)
                    .ok_or_else(|| RegistryError::AgentNotFound(id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.determine_agent_execution_order(&agents)
    }

    /// Move a collaboration into `Executing` and hand out its plan.
    ///
    /// Allowed from `Created` or `Active` only.
    pub fn begin_execution(&self, session_id: &str) -> Result<ExecutionTicket, SupervisorError> {
        let agents = self.execution_plan(session_id)?;
        let record = self.record(session_id)?;
        let mut record = lock_record(&record);
        match record.status {
            CollaborationStatus::Created | CollaborationStatus::Active => {}
            _ => return Err(record.invalid(CollaborationStatus::Executing)),
        }
        self.hub.mark_executing(session_id)?;
        record.transition(CollaborationStatus::Executing);

        Ok(ExecutionTicket {
            session_id: session_id.to_string(),
            task: record.task.clone(),
            agents,
            cancel_token: record.cancel_token.clone(),
        })
    }

    /// Close out a run. A collaboration terminated mid-run stays
    /// `Terminated`; otherwise it must be `Executing` and becomes `Executed`.
    pub fn finish_execution(&self, session_id: &str) -> Result<CollaborationStatus, SupervisorError> {
        let record = self.record(session_id)?;
        let mut record = lock_record(&record);
        match record.status {
            CollaborationStatus::Terminated => Ok(CollaborationStatus::Terminated),
            CollaborationStatus::Executing => {
                self.hub.mark_active(session_id)?;
                record.transition(CollaborationStatus::Executed);
                tracing::info!(session_id = %session_id, "Collaboration executed");
                Ok(CollaborationStatus::Executed)
            }
            _ => Err(record.invalid(CollaborationStatus::Executed)),
        }
    }

    pub fn get_collaboration(&self, session_id: &str) -> Result<CollaborationInfo, SupervisorError> {
        let record = self.record(session_id)?;
        Ok(lock_record(&record).info())
    }

    /// Status, message count and last activity of a collaboration.
    pub fn monitor_collaboration(&self, session_id: &str) -> Result<MonitorReport, SupervisorError> {
        let info = self.get_collaboration(session_id)?;
        let history = self.hub.get_history(session_id)?;
        let last_update = history
            .last()
            .map(|m| m.timestamp)
            .unwrap_or(info.updated_at);
        Ok(MonitorReport {
            session_id: info.session_id,
            status: info.status,
            message_count: history.len(),
            last_update,
        })
    }

    /// Stop a collaboration. Repeated calls succeed without side effects.
    pub fn terminate_collaboration(&self, session_id: &str) -> Result<(), SupervisorError> {
        let record = self.record(session_id)?;
        let mut record = lock_record(&record);
        if record.status == CollaborationStatus::Terminated {
            return Ok(());
        }

        let notice = self.hub.send_message(
            session_id,
            "This collaboration session has been terminated by the supervisor.",
            SYSTEM_SENDER,
            SUPERVISOR_NAME,
            Some(supervisor_metadata("terminate")),
        );
        match notice.and_then(|_| self.hub.terminate_session(session_id)) {
            Ok(()) => {}
            Err(e @ (HubError::SessionNotFound(_) | HubError::SessionClosed(_))) => {
                tracing::warn!(session_id = %session_id, error = %e, "Hub session already gone while terminating");
            }
            Err(e) => return Err(e.into()),
        }

        record.cancel_token.cancel();
        record.transition(CollaborationStatus::Terminated);
        tracing::info!(session_id = %session_id, "Terminated collaboration");
        Ok(())
    }

    /// Snapshots of every collaboration in creation order.
    pub fn list_collaborations(&self) -> Vec<CollaborationInfo> {
        let table = self.collaborations.read().unwrap_or_else(PoisonError::into_inner);
        table
            .order
            .iter()
            .filter_map(|id| table.records.get(id))
            .map(|r| lock_record(r).info())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::registry::Capability;
    use crate::supervisor::analysis::AnalyzerReport;
    use async_trait::async_trait;

    struct FixedAnalyzer(Result<AnalyzerReport, String>);

    #[async_trait]
    impl TaskAnalyzer for FixedAnalyzer {
        async fn analyze(
            &self,
            _task: &str,
            _prior: Option<&TaskAnalysis>,
        ) -> Result<AnalyzerReport, AnalysisError> {
            self.0.clone().map_err(AnalysisError::Failed)
        }
    }

    fn supervisor(report: Result<AnalyzerReport, String>) -> Supervisor {
        Supervisor::new(
            AgentRegistry::new(),
            CommunicationHub::new(),
            Arc::new(FixedAnalyzer(report)),
        )
    }

    fn scores(pairs: &[(&str, f64)]) -> AnalyzerReport {
        AnalyzerReport {
            scores: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn analyzer_failure_falls_back_to_text_generation() {
        let sup = supervisor(Err("boom".into()));
        let analysis = sup.analyze_task("anything").await;
        assert!(analysis.fallback);
        assert_eq!(
            analysis.required_capabilities,
            BTreeSet::from(["text_generation".to_string()])
        );
    }

    #[tokio::test]
    async fn threshold_filters_scores() {
        let sup = supervisor(Ok(scores(&[("research", 0.8), ("planning", 0.49), ("evaluation", 0.5)])));
        let analysis = sup.analyze_task("t").await;
        let caps: Vec<_> = analysis.required_capabilities.iter().map(String::as_str).collect();
        assert_eq!(caps, vec!["evaluation", "research"]);
        assert!(!analysis.fallback);
    }

    #[tokio::test]
    async fn nothing_relevant_falls_back() {
        let sup = supervisor(Ok(scores(&[("research", 0.2)])));
        let analysis = sup.analyze_task("t").await;
        assert!(analysis.fallback);
        assert!(analysis.required_capabilities.contains("text_generation"));
        assert_eq!(analysis.scores.get("research"), Some(&0.2));
    }

    #[tokio::test]
    async fn malformed_scores_are_discarded() {
        let sup = supervisor(Ok(scores(&[("research", 1.7), ("planning", 0.9)])));
        let analysis = sup.analyze_task("t").await;
        assert!(!analysis.scores.contains_key("research"));
        assert!(!analysis.required_capabilities.contains("research"));
        assert!(analysis.required_capabilities.contains("planning"));
    }

    #[test]
    fn select_agents_on_empty_registry_fails() {
        let sup = supervisor(Ok(AnalyzerReport::default()));
        let analysis = TaskAnalysis::fallback("t", "x");
        assert!(matches!(
            sup.select_agents(&analysis),
            Err(SupervisorError::NoSuitableAgents(_))
        ));
    }

    #[test]
    fn select_agents_falls_back_to_everyone() {
        let sup = supervisor(Ok(AnalyzerReport::default()));
        sup.registry().register(AgentRecord::new("a", "A").with_capability(Capability::new("planning", "")));
        sup.registry().register(AgentRecord::new("b", "B"));
        let analysis = TaskAnalysis::fallback("t", "x");
        assert_eq!(sup.select_agents(&analysis).unwrap().len(), 2);
    }

    #[test]
    fn lifecycle_transitions() {
        let sup = supervisor(Ok(AnalyzerReport::default()));
        sup.registry().register(AgentRecord::new("a", "A"));
        let agents = sup.registry().list();
        let id = sup.create_collaboration(&agents, "task").unwrap();
        assert_eq!(sup.get_collaboration(&id).unwrap().status, CollaborationStatus::Active);

        let ticket = sup.begin_execution(&id).unwrap();
        assert_eq!(ticket.agents.len(), 1);
        assert!(sup.begin_execution(&id).is_err());

        assert_eq!(sup.finish_execution(&id).unwrap(), CollaborationStatus::Executed);
        assert!(matches!(
            sup.begin_execution(&id),
            Err(SupervisorError::InvalidTransition { .. })
        ));

        sup.terminate_collaboration(&id).unwrap();
        assert!(ticket.cancel_token.is_cancelled());
        assert_eq!(sup.get_collaboration(&id).unwrap().status, CollaborationStatus::Terminated);
    }

    #[test]
    fn terminate_twice_posts_one_notice() {
        let sup = supervisor(Ok(AnalyzerReport::default()));
        sup.registry().register(AgentRecord::new("a", "A"));
        let id = sup.create_collaboration(&sup.registry().list(), "task").unwrap();
        sup.terminate_collaboration(&id).unwrap();
        let count = sup.monitor_collaboration(&id).unwrap().message_count;
        sup.terminate_collaboration(&id).unwrap();
        assert_eq!(sup.monitor_collaboration(&id).unwrap().message_count, count);
        // kickoff, supervisor kickoff, supervisor notice, hub notice
        assert_eq!(count, 4);
    }

    #[test]
    fn unknown_collaboration_is_not_found() {
        let sup = supervisor(Ok(AnalyzerReport::default()));
        assert!(matches!(
            sup.monitor_collaboration("missing"),
            Err(SupervisorError::SessionNotFound(_))
        ));
        assert!(sup.terminate_collaboration("missing").is_err());
    }
}
