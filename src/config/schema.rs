use serde::Deserialize;

/// The TOML file structure for ams.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub server: Option<ServerConfig>,
    pub llm: Option<LlmConfig>,
    pub orchestration: Option<OrchestrationConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Hide internal error details from API callers.
    pub production: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrchestrationConfig {
    pub relevance_threshold: Option<f64>,
    pub max_chars_per_message: Option<usize>,
    /// Keep only this many recent messages in agent prompts.
    pub transcript_max_messages: Option<usize>,
    pub include_framework: Option<bool>,
    /// "llm" (default) or "keyword".
    pub analyzer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

/// Which task analyzer the supervisor uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnalyzerKind {
    #[default]
    Llm,
    Keyword,
}

impl AnalyzerKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "llm" => Some(AnalyzerKind::Llm),
            "keyword" => Some(AnalyzerKind::Keyword),
            other => {
                tracing::warn!(analyzer = %other, "Unknown analyzer in config; using default");
                None
            }
        }
    }
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub production: bool,
    pub model: String,
    pub temperature: f64,
    pub llm_base_url: String,
    pub relevance_threshold: f64,
    pub max_chars_per_message: usize,
    pub transcript_max_messages: Option<usize>,
    pub include_framework: bool,
    pub analyzer: AnalyzerKind,
    pub log_level: String,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub production: Option<bool>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub llm_base_url: Option<String>,
    pub relevance_threshold: Option<f64>,
    pub max_chars_per_message: Option<usize>,
    pub transcript_max_messages: Option<usize>,
    pub include_framework: Option<bool>,
    pub analyzer: Option<AnalyzerKind>,
    pub log_level: Option<String>,
}

impl ConfigFile {
    /// Flatten the sectioned file into a [`PartialConfig`].
    pub fn to_partial(&self) -> PartialConfig {
        let mut partial = PartialConfig::default();
        if let Some(server) = &self.server {
            partial.host = server.host.clone();
            partial.port = server.port;
            partial.production = server.production;
        }
        if let Some(llm) = &self.llm {
            partial.model = llm.model.clone();
            partial.temperature = llm.temperature;
            partial.llm_base_url = llm.base_url.clone();
        }
        if let Some(orch) = &self.orchestration {
            partial.relevance_threshold = orch.relevance_threshold;
            partial.max_chars_per_message = orch.max_chars_per_message;
            partial.transcript_max_messages = orch.transcript_max_messages;
            partial.include_framework = orch.include_framework;
            partial.analyzer = orch.analyzer.as_deref().and_then(AnalyzerKind::parse);
        }
        if let Some(logging) = &self.logging {
            partial.log_level = logging.level.clone();
        }
        partial
    }
}
