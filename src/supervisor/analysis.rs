//! Task analysis: the [`TaskAnalyzer`] seam, the capability catalog, and the
//! keyword heuristic used when no model is configured.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AnalysisError, SupervisorError};

/// Capability every task falls back to when analysis yields nothing usable.
pub const DEFAULT_CAPABILITY: &str = "text_generation";

/// Minimum score for a capability to count as required.
pub const RELEVANCE_THRESHOLD: f64 = 0.5;

/// What a [`TaskAnalyzer`] reports before the supervisor applies the
/// relevance threshold.
#[derive(Clone, Debug, Default)]
pub struct AnalyzerReport {
    /// Capabilities the analyzer names outright. An entry with a score in
    /// `scores` is still subject to the threshold.
    pub required_capabilities: BTreeSet<String>,
    /// Relevance per capability, expected in `[0.0, 1.0]`.
    pub scores: BTreeMap<String, f64>,
    pub reasoning: Option<String>,
}

/// The supervisor's verdict on a task.
#[derive(Clone, Debug, Serialize)]
pub struct TaskAnalysis {
    pub task: String,
    pub required_capabilities: BTreeSet<String>,
    pub scores: BTreeMap<String, f64>,
    pub reasoning: String,
    /// True when the default capability was substituted.
    pub fallback: bool,
}

impl TaskAnalysis {
    pub(crate) fn fallback(task: &str, reasoning: impl Into<String>) -> Self {
        Self {
            task: task.to_string(),
            required_capabilities: BTreeSet::from([DEFAULT_CAPABILITY.to_string()]),
            scores: BTreeMap::new(),
            reasoning: reasoning.into(),
            fallback: true,
        }
    }
}

/// Scores a task against known capabilities.
#[async_trait]
pub trait TaskAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        task: &str,
        prior: Option<&TaskAnalysis>,
    ) -> Result<AnalyzerReport, AnalysisError>;
}

/// Reject scores that are not finite numbers in `[0.0, 1.0]`.
pub fn validate_score(capability: &str, score: f64) -> Result<f64, SupervisorError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(SupervisorError::InvalidInput(format!(
            "capability score for '{capability}' must be within [0, 1], got {score}"
        )))
    }
}

/// Description and sample tasks for one capability.
#[derive(Clone, Debug, Serialize)]
pub struct CapabilityInfo {
    pub description: String,
    pub examples: Vec<String>,
}

/// Known capability names, used to build analyzer prompts and to discard
/// names an analyzer invents.
#[derive(Clone, Debug, Default)]
pub struct CapabilityCatalog {
    entries: BTreeMap<String, CapabilityInfo>,
}

impl CapabilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in capability set.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.register(
            "text_generation",
            "Ability to generate text responses based on prompts. This includes writing, explaining, describing, summarizing, and creating various forms of textual content.",
            &["Write a blog post about artificial intelligence", "Explain how photosynthesis works"],
        );
        catalog.register(
            "code_generation",
            "Ability to write, understand, and debug code in various programming languages. Can implement algorithms, functions, and software solutions.",
            &["Write a Python function to sort a list", "Create a React component for a login form"],
        );
        catalog.register(
            "code_execution",
            "Ability to run programs and report their output.",
            &["Run this script and tell me what it prints"],
        );
        catalog.register(
            "research",
            "Ability to research information, gather data, and synthesize findings from various sources.",
            &["Research the impact of climate change on agriculture"],
        );
        catalog.register(
            "tool_use",
            "Ability to use tools and APIs to accomplish tasks by interacting with external systems.",
            &["Use a weather API to get the forecast"],
        );
        catalog.register(
            "planning",
            "Ability to create detailed plans and strategies, breaking complex problems into manageable steps.",
            &["Create a project plan for developing a mobile app"],
        );
        catalog.register(
            "evaluation",
            "Ability to evaluate, review, and give critical feedback on content, code, or ideas.",
            &["Review this essay and provide feedback"],
        );
        catalog.register(
            "calculation",
            "Ability to carry out mathematical and numeric computation.",
            &["Compute the compound interest on a loan"],
        );
        catalog.register(
            "data_analysis",
            "Ability to process, summarize, and draw conclusions from data.",
            &["Find trends in this sales spreadsheet"],
        );
        catalog
    }

    /// Add or replace a capability.
    pub fn register(&mut self, name: &str, description: &str, examples: &[&str]) {
        if self.entries.contains_key(name) {
            tracing::warn!(capability = %name, "Capability already registered; overwriting");
        }
        self.entries.insert(
            name.to_string(),
            CapabilityInfo {
                description: description.to_string(),
                examples: examples.iter().map(|e| e.to_string()).collect(),
            },
        );
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn describe(&self, name: &str) -> Option<&CapabilityInfo> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `- name: description` lines for prompts.
    pub fn prompt_listing(&self) -> String {
        self.entries
            .iter()
            .map(|(name, info)| format!("- {name}: {}", info.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Keyword table for [`KeywordAnalyzer`]: (keyword, capability).
const KEYWORD_CAPABILITIES: &[(&str, &str)] = &[
    ("code", "code_execution"),
    ("programming", "code_execution"),
    ("math", "calculation"),
    ("calculate", "calculation"),
    ("writing", "text_generation"),
    ("write", "text_generation"),
    ("research", "text_generation"),
    ("data", "data_analysis"),
];

/// Deterministic analyzer that maps task keywords to capabilities.
///
/// Every matched capability scores 1.0. A task that matches nothing yields
/// an empty report, which the supervisor turns into the default capability.
#[derive(Clone, Debug, Default)]
pub struct KeywordAnalyzer;

#[async_trait]
impl TaskAnalyzer for KeywordAnalyzer {
    async fn analyze(
        &self,
        task: &str,
        _prior: Option<&TaskAnalysis>,
    ) -> Result<AnalyzerReport, AnalysisError> {
        let lowered = task.to_lowercase();
        let mut report = AnalyzerReport::default();
        for (keyword, capability) in KEYWORD_CAPABILITIES {
            if lowered.contains(keyword) {
                report.scores.insert(capability.to_string(), 1.0);
                report.required_capabilities.insert(capability.to_string());
            }
        }
        report.reasoning = Some("Keyword-based analysis".to_string());
        Ok(report)
    }
}
