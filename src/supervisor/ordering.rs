//! Execution-order computation.
//!
//! Ordering happens in two phases:
//!
//! 1. **Priority.** Each agent gets an integer priority (lower runs earlier)
//!    from [`PRIORITY_RULES`], applied in sequence. A rule may settle the
//!    priority outright, propose a candidate (the running value only ever
//!    goes down), or abstain. Agents are then stable-sorted by priority.
//! 2. **Dependencies.** `depends_on` edges from agent configs are honoured by
//!    a depth-first walk over the priority-sorted list that emits each
//!    agent's dependencies before the agent itself.
//!
//! The result is deterministic for a given input slice.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::SupervisorError;
use crate::registry::AgentRecord;

/// Priority for agents no rule says anything about.
pub const DEFAULT_PRIORITY: i64 = 5;

/// Role keywords looked for in an agent's name and description.
pub const ROLE_PRIORITIES: &[(&str, i64)] = &[
    ("research", 1),
    ("strategist", 2),
    ("writer", 3),
    ("content", 3),
    ("evaluator", 4),
    ("reviewer", 4),
];

/// Extra stems recognised in capability names on top of [`ROLE_PRIORITIES`].
const CAPABILITY_STEMS: &[(&str, i64)] = &[("strategy", 2), ("evaluate", 4)];

/// What a single priority rule concludes about an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrioritySignal {
    /// Use this value and skip the remaining rules.
    Settled(i64),
    /// Lower the running priority to this value if it is smaller.
    Candidate(i64),
    Abstain,
}

pub type PriorityRule = fn(&AgentRecord) -> PrioritySignal;

/// Rules in precedence order.
pub const PRIORITY_RULES: &[PriorityRule] = &[
    explicit_priority,
    role_keyword_priority,
    capability_priority,
];

/// Integer value of a config entry, accepting integers, floats (truncated)
/// and numeric strings.
fn parse_priority(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn keyword_minimum(text: &str, table: &[(&str, i64)]) -> Option<i64> {
    table
        .iter()
        .filter(|(keyword, _)| text.contains(keyword))
        .map(|(_, priority)| *priority)
        .min()
}

/// `execution_priority` in the agent config, taken verbatim.
pub fn explicit_priority(agent: &AgentRecord) -> PrioritySignal {
    let Some(raw) = agent.config.get("execution_priority") else {
        return PrioritySignal::Abstain;
    };
    match parse_priority(raw) {
        Some(priority) => PrioritySignal::Settled(priority),
        None => {
            tracing::warn!(agent = %agent.name, value = %raw, "Invalid execution_priority in agent config");
            PrioritySignal::Abstain
        }
    }
}

/// Highest-precedence role keyword in the agent's name and description.
pub fn role_keyword_priority(agent: &AgentRecord) -> PrioritySignal {
    let text = format!("{} {}", agent.name, agent.description).to_lowercase();
    keyword_minimum(&text, ROLE_PRIORITIES)
        .map_or(PrioritySignal::Abstain, PrioritySignal::Candidate)
}

/// Role keywords in capability names and capability-level
/// `execution_priority` parameters.
pub fn capability_priority(agent: &AgentRecord) -> PrioritySignal {
    agent
        .capabilities
        .iter()
        .filter_map(|cap| {
            let name = cap.name.to_lowercase();
            let by_name = keyword_minimum(&name, ROLE_PRIORITIES)
                .into_iter()
                .chain(keyword_minimum(&name, CAPABILITY_STEMS))
                .min();
            let by_param = cap
                .parameters
                .as_ref()
                .and_then(|p| p.get("execution_priority"))
                .and_then(parse_priority);
            by_name.into_iter().chain(by_param).min()
        })
        .min()
        .map_or(PrioritySignal::Abstain, PrioritySignal::Candidate)
}

/// Run [`PRIORITY_RULES`] over one agent.
pub fn compute_priority(agent: &AgentRecord) -> i64 {
    let mut priority = DEFAULT_PRIORITY;
    for rule in PRIORITY_RULES {
        match rule(agent) {
            PrioritySignal::Settled(value) => return value,
            PrioritySignal::Candidate(value) => priority = priority.min(value),
            PrioritySignal::Abstain => {}
        }
    }
    priority
}

/// Dependency ids declared in the agent config: a single id or a list.
fn declared_dependencies(agent: &AgentRecord) -> Vec<&str> {
    match agent.config.get("depends_on") {
        Some(Value::String(id)) => vec![id.as_str()],
        Some(Value::Array(ids)) => ids.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Order `agents` by priority while emitting every dependency before its
/// dependent.
///
/// Dependencies on ids outside the input set are ignored. Duplicate ids keep
/// their first occurrence. A dependency cycle fails with
/// [`SupervisorError::CyclicDependency`] naming the ids on the cycle.
pub fn determine_execution_order(
    agents: &[AgentRecord],
) -> Result<Vec<AgentRecord>, SupervisorError> {
    let mut seen = HashSet::new();
    let unique: Vec<&AgentRecord> = agents.iter().filter(|a| seen.insert(a.id.as_str())).collect();

    let mut prioritized: Vec<(i64, &AgentRecord)> =
        unique.iter().map(|a| (compute_priority(a), *a)).collect();
    prioritized.sort_by_key(|(priority, _)| *priority);

    let by_id: HashMap<&str, &AgentRecord> = unique.iter().map(|a| (a.id.as_str(), *a)).collect();
    let dependencies: HashMap<&str, Vec<&str>> = unique
        .iter()
        .map(|a| {
            let deps = declared_dependencies(a)
                .into_iter()
                .filter(|d| by_id.contains_key(d))
                .collect();
            (a.id.as_str(), deps)
        })
        .collect();

    let mut walk = DependencyWalk {
        dependencies: &dependencies,
        emitted: HashSet::new(),
        in_progress: Vec::new(),
        order: Vec::with_capacity(unique.len()),
    };
    for (_, agent) in &prioritized {
        walk.emit(agent.id.as_str())?;
    }

    // Every agent is visited above; this only guards against a walk bug.
    for (_, agent) in &prioritized {
        if !walk.emitted.contains(agent.id.as_str()) {
            walk.emitted.insert(agent.id.as_str());
            walk.order.push(agent.id.as_str());
        }
    }

    Ok(walk
        .order
        .into_iter()
        .filter_map(|id| by_id.get(id).map(|a| (*a).clone()))
        .collect())
}

struct DependencyWalk<'a> {
    dependencies: &'a HashMap<&'a str, Vec<&'a str>>,
    emitted: HashSet<&'a str>,
    in_progress: Vec<&'a str>,
    order: Vec<&'a str>,
}

impl<'a> DependencyWalk<'a> {
    fn emit(&mut self, id: &'a str) -> Result<(), SupervisorError> {
        if self.emitted.contains(id) {
            return Ok(());
        }
        if let Some(pos) = self.in_progress.iter().position(|p| *p == id) {
            let mut cycle: Vec<String> =
                self.in_progress[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Err(SupervisorError::CyclicDependency { cycle });
        }

        self.in_progress.push(id);
        if let Some(deps) = self.dependencies.get(id) {
            for dep in deps {
                self.emit(dep)?;
            }
        }
        self.in_progress.pop();

        self.emitted.insert(id);
        self.order.push(id);
        Ok(())
    }
}
