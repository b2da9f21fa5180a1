use std::collections::BTreeSet;
use std::sync::Arc;

use ams::error::{AnalysisError, ErrorKind, SupervisorError};
use ams::hub::{CommunicationHub, SenderRole};
use ams::registry::{AgentRecord, AgentRegistry, Capability};
use ams::supervisor::ordering::compute_priority;
use ams::supervisor::{
    AnalyzerReport, CollaborationStatus, KeywordAnalyzer, Supervisor, TaskAnalysis, TaskAnalyzer,
};
use async_trait::async_trait;
use serde_json::json;

// ─── Helper ───────────────────────────────────────────────────────────

/// Analyzer double returning a canned report, or failing.
struct ScriptedAnalyzer {
    required: Vec<&'static str>,
    fail: bool,
}

#[async_trait]
impl TaskAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        _task: &str,
        _prior: Option<&TaskAnalysis>,
    ) -> Result<AnalyzerReport, AnalysisError> {
        if self.fail {
            return Err(AnalysisError::Failed("model unavailable".into()));
        }
        Ok(AnalyzerReport {
            scores: self.required.iter().map(|c| (c.to_string(), 0.9)).collect(),
            ..Default::default()
        })
    }
}

fn supervisor_with(required: Vec<&'static str>, fail: bool) -> Supervisor {
    Supervisor::new(
        AgentRegistry::new(),
        CommunicationHub::new(),
        Arc::new(ScriptedAnalyzer { required, fail }),
    )
}

fn agent(id: &str, name: &str, caps: &[&str]) -> AgentRecord {
    caps.iter().fold(AgentRecord::new(id, name), |a, c| {
        a.with_capability(Capability::new(*c, ""))
    })
}

fn ids(agents: &[AgentRecord]) -> Vec<String> {
    agents.iter().map(|a| a.id.clone()).collect()
}

// ============================================================
// Analysis and selection
// ============================================================

#[tokio::test]
async fn test_research_then_write_scenario() {
    let sup = supervisor_with(vec!["research", "text_generation"], false);
    sup.registry().register(agent("r1", "r1", &["research"]));
    sup.registry().register(
        agent("w1", "w1", &["text_generation"]).with_config("depends_on", json!("r1")),
    );

    let analysis = sup.analyze_task("Write an article on tidal power").await;
    assert_eq!(
        analysis.required_capabilities,
        BTreeSet::from(["research".to_string(), "text_generation".to_string()])
    );

    let selected = sup.select_agents(&analysis).unwrap();
    let mut selected_ids = ids(&selected);
    selected_ids.sort();
    assert_eq!(selected_ids, vec!["r1", "w1"]);

    let order = sup.determine_agent_execution_order(&selected).unwrap();
    assert_eq!(ids(&order), vec!["r1", "w1"]);
}

#[tokio::test]
async fn test_analysis_failure_requires_text_generation() {
    let sup = supervisor_with(vec![], true);
    let analysis = sup.analyze_task("anything at all").await;
    assert_eq!(
        analysis.required_capabilities,
        BTreeSet::from(["text_generation".to_string()])
    );
    assert!(analysis.fallback);
}

#[tokio::test]
async fn test_keyword_analyzer_drives_selection() {
    let sup = Supervisor::new(
        AgentRegistry::new(),
        CommunicationHub::new(),
        Arc::new(KeywordAnalyzer),
    );
    sup.registry().register(agent("coder", "Coder", &["code_execution"]));
    sup.registry().register(agent("writer", "Writer", &["text_generation"]));

    let analysis = sup.analyze_task("Fix the programming bug").await;
    let selected = sup.select_agents(&analysis).unwrap();
    assert_eq!(ids(&selected), vec!["coder"]);
}

#[tokio::test]
async fn test_selection_ranks_by_coverage_and_dedupes() {
    let sup = supervisor_with(vec!["planning", "research"], false);
    sup.registry().register(agent("partial", "P", &["research"]));
    sup.registry().register(agent("full", "F", &["research", "planning"]));

    let analysis = sup.analyze_task("Plan a study").await;
    let selected = sup.select_agents(&analysis).unwrap();
    assert_eq!(ids(&selected), vec!["full", "partial"]);
}

#[tokio::test]
async fn test_empty_registry_has_no_suitable_agents() {
    let sup = supervisor_with(vec!["research"], false);
    let analysis = sup.analyze_task("t").await;
    let err = sup.select_agents(&analysis).unwrap_err();
    assert!(matches!(err, SupervisorError::NoSuitableAgents(_)));
}

// ============================================================
// Execution order properties
// ============================================================

#[test]
fn test_order_without_dependencies_is_a_stable_priority_sort() {
    let sup = supervisor_with(vec![], false);
    let names = [
        "Reviewer A", "Helper A", "Writer A", "Researcher A", "Strategist", "Helper B",
        "Writer B", "Evaluator", "Researcher B", "Content Lead",
    ];
    let agents: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| AgentRecord::new(format!("a{i}"), *name))
        .collect();

    let order = sup.determine_agent_execution_order(&agents).unwrap();

    let priorities: Vec<_> = order.iter().map(compute_priority).collect();
    assert!(priorities.windows(2).all(|w| w[0] <= w[1]));
    // Ties keep input order.
    for pair in order.windows(2) {
        if compute_priority(&pair[0]) == compute_priority(&pair[1]) {
            let pos = |a: &AgentRecord| agents.iter().position(|x| x.id == a.id).unwrap();
            assert!(pos(&pair[0]) < pos(&pair[1]));
        }
    }
}

#[test]
fn test_dependency_wins_over_priority_in_every_rotation() {
    let sup = supervisor_with(vec![], false);
    let base = vec![
        AgentRecord::new("research", "Researcher").with_config("depends_on", json!("review")),
        AgentRecord::new("review", "Reviewer"),
        AgentRecord::new("write", "Writer"),
        AgentRecord::new("plan", "Strategist"),
    ];
    for shift in 0..base.len() {
        let mut agents = base.clone();
        agents.rotate_left(shift);
        let order = ids(&sup.determine_agent_execution_order(&agents).unwrap());
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("review") < pos("research"), "rotation {shift}: {order:?}");
        assert_eq!(order.len(), 4);
    }
}

#[test]
fn test_order_is_deterministic() {
    let sup = supervisor_with(vec![], false);
    let agents = vec![
        AgentRecord::new("x", "Writer").with_config("depends_on", json!(["y", "z"])),
        AgentRecord::new("y", "Helper"),
        AgentRecord::new("z", "Research analyst"),
    ];
    let first = ids(&sup.determine_agent_execution_order(&agents).unwrap());
    for _ in 0..10 {
        assert_eq!(ids(&sup.determine_agent_execution_order(&agents).unwrap()), first);
    }
}

#[test]
fn test_cycle_is_reported_as_invalid_input() {
    let sup = supervisor_with(vec![], false);
    let agents = vec![
        AgentRecord::new("a", "A").with_config("depends_on", json!("c")),
        AgentRecord::new("b", "B").with_config("depends_on", json!("a")),
        AgentRecord::new("c", "C").with_config("depends_on", json!("b")),
    ];
    let err = sup.determine_agent_execution_order(&agents).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.to_string().contains("a -> c -> b -> a"));
}

// ============================================================
// Collaboration lifecycle
// ============================================================

#[tokio::test]
async fn test_create_collaboration_posts_supervisor_kickoff() {
    let sup = supervisor_with(vec!["research"], false);
    sup.registry().register(agent("r1", "R", &["research"]));
    let agents = sup.registry().list();

    let id = sup.create_collaboration(&agents, "Find sources").unwrap();

    let history = sup.hub().get_history(&id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].sender_name, "Supervisor");
    assert_eq!(history[1].sender_role, SenderRole::System);
    assert!(history[1].content.starts_with("Task: Find sources"));

    let report = sup.monitor_collaboration(&id).unwrap();
    assert_eq!(report.status, CollaborationStatus::Active);
    assert_eq!(report.message_count, 2);
    assert_eq!(report.last_update, history[1].timestamp);
}

#[test]
fn test_execution_plan_fails_for_deleted_participant() {
    let sup = supervisor_with(vec![], false);
    sup.registry().register(AgentRecord::new("a", "A"));
    let id = sup.create_collaboration(&sup.registry().list(), "t").unwrap();
    sup.registry().delete("a");

    let err = sup.execution_plan(&id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_terminate_is_idempotent_and_listed() {
    let sup = supervisor_with(vec![], false);
    sup.registry().register(AgentRecord::new("a", "A"));
    let id = sup.create_collaboration(&sup.registry().list(), "t").unwrap();

    sup.terminate_collaboration(&id).unwrap();
    sup.terminate_collaboration(&id).unwrap();

    let all = sup.list_collaborations();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, CollaborationStatus::Terminated);
    assert!(sup.begin_execution(&id).is_err());
    assert!(sup.hub().send_message(&id, "late", "a", "A", None).is_err());
}
