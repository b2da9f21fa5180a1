//! Model-backed task analyzer.
//!
//! Asks the configured model to score every catalog capability between 0.0
//! and 1.0 and parses the reply. Replies that are not a JSON object are
//! scanned line by line for `<capability> ... <number>` pairs.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use genai::Client;
use genai::chat::{ChatMessage, ChatRequest};
use regex::Regex;
use serde_json::Value;

use super::analysis::{AnalyzerReport, CapabilityCatalog, TaskAnalysis, TaskAnalyzer};
use crate::error::AnalysisError;
use crate::llm::{LlmSettings, complete};

pub struct LlmTaskAnalyzer {
    client: Client,
    settings: LlmSettings,
    catalog: CapabilityCatalog,
}

impl LlmTaskAnalyzer {
    pub fn new(settings: LlmSettings, catalog: CapabilityCatalog) -> Self {
        Self {
            client: Client::default(),
            settings,
            catalog,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a task analyzer that identifies which capabilities are required for a given task.\n\
             Analyze the task and determine which of the following capabilities are needed to complete it.\n\n\
             Available capabilities:\n{}\n\n\
             For each capability, assign a score between 0.0 and 1.0:\n\
             - 0.0: Not required at all for this task\n\
             - 0.1-0.3: Slightly relevant\n\
             - 0.4-0.6: Moderately relevant\n\
             - 0.7-0.9: Highly relevant\n\
             - 1.0: Essential, cannot complete the task without this capability\n\n\
             Return your analysis as a JSON object with capability names as keys and scores as values.\n\
             Example: {{\"text_generation\": 0.9, \"research\": 0.7, \"code_generation\": 0.0}}",
            self.catalog.prompt_listing()
        )
    }
}

#[async_trait]
impl TaskAnalyzer for LlmTaskAnalyzer {
    async fn analyze(
        &self,
        task: &str,
        prior: Option<&TaskAnalysis>,
    ) -> Result<AnalyzerReport, AnalysisError> {
        if self.catalog.is_empty() {
            return Err(AnalysisError::Failed("no capabilities registered".to_string()));
        }

        let mut user_prompt = format!("Task: {task}");
        if let Some(prior) = prior {
            let prior_json = serde_json::to_string_pretty(prior)
                .map_err(|e| AnalysisError::Failed(e.to_string()))?;
            user_prompt.push_str(&format!("\n\nAdditional analysis: {prior_json}"));
        }

        let request = ChatRequest::from_system(self.system_prompt())
            .append_message(ChatMessage::user(user_prompt));
        let reply = complete(&self.client, &self.settings, request)
            .await
            .map_err(AnalysisError::Failed)?;

        let scores = parse_scores(&reply, &self.catalog)?;
        tracing::info!(model = %self.settings.model, ?scores, "Capability analysis complete");
        Ok(AnalyzerReport {
            required_capabilities: Default::default(),
            scores,
            reasoning: Some(format!("Scored by {}", self.settings.model)),
        })
    }
}

/// Extract capability scores from a model reply, keeping catalog names only.
///
/// A reply that is neither a JSON object nor text naming a scored
/// capability is malformed.
pub fn parse_scores(
    reply: &str,
    catalog: &CapabilityCatalog,
) -> Result<BTreeMap<String, f64>, AnalysisError> {
    let body = strip_code_fence(reply);
    match serde_json::from_str::<serde_json::Map<String, Value>>(body) {
        Ok(object) => Ok(object
            .into_iter()
            .filter(|(name, _)| catalog.contains(name))
            .map(|(name, value)| {
                let score = value
                    .as_f64()
                    .filter(|s| (0.0..=1.0).contains(s))
                    .unwrap_or_else(|| {
                        tracing::warn!(capability = %name, %value, "Invalid capability score; using 0.0");
                        0.0
                    });
                (name, score)
            })
            .collect()),
        Err(_) => {
            tracing::warn!("Analyzer reply was not a JSON object; scanning text");
            let scores = extract_scores_from_text(reply, catalog);
            if scores.is_empty() {
                let excerpt: String = reply.chars().take(200).collect();
                return Err(AnalysisError::MalformedResponse(excerpt));
            }
            Ok(scores)
        }
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+\.\d+|\d+)").ok())
        .as_ref()
}

/// Free-text fallback: first number on a line naming the capability.
fn extract_scores_from_text(text: &str, catalog: &CapabilityCatalog) -> BTreeMap<String, f64> {
    let mut scores = BTreeMap::new();
    for name in catalog.names() {
        let needle = name.to_lowercase();
        let found = text
            .lines()
            .map(|line| line.trim().to_lowercase())
            .filter(|line| line.contains(&needle))
            .find_map(|line| {
                number_pattern()?
                    .find(&line.replace(&needle, ""))
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .filter(|s| (0.0..=1.0).contains(s))
            });
        if let Some(score) = found {
            scores.insert(name, score);
        }
    }
    scores
}
