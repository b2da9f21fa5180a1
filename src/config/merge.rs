use super::schema::{AppConfig, PartialConfig};
use crate::hub::session::DEFAULT_MAX_CHARS_PER_MESSAGE;
use crate::llm::LlmSettings;
use crate::supervisor::RELEVANCE_THRESHOLD;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            host: self.host.or(fallback.host),
            port: self.port.or(fallback.port),
            production: self.production.or(fallback.production),
            model: self.model.or(fallback.model),
            temperature: self.temperature.or(fallback.temperature),
            llm_base_url: self.llm_base_url.or(fallback.llm_base_url),
            relevance_threshold: self.relevance_threshold.or(fallback.relevance_threshold),
            max_chars_per_message: self.max_chars_per_message.or(fallback.max_chars_per_message),
            transcript_max_messages: self
                .transcript_max_messages
                .or(fallback.transcript_max_messages),
            include_framework: self.include_framework.or(fallback.include_framework),
            analyzer: self.analyzer.or(fallback.analyzer),
            log_level: self.log_level.or(fallback.log_level),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        let llm = LlmSettings::default();
        AppConfig {
            host: self.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: self.port.unwrap_or(8000),
            production: self.production.unwrap_or(false),
            model: self.model.unwrap_or(llm.model),
            temperature: self.temperature.unwrap_or(llm.temperature),
            llm_base_url: self.llm_base_url.unwrap_or(llm.base_url),
            relevance_threshold: self
                .relevance_threshold
                .map(clamp_threshold)
                .unwrap_or(RELEVANCE_THRESHOLD),
            max_chars_per_message: self
                .max_chars_per_message
                .unwrap_or(DEFAULT_MAX_CHARS_PER_MESSAGE),
            transcript_max_messages: self.transcript_max_messages,
            include_framework: self.include_framework.unwrap_or(true),
            analyzer: self.analyzer.unwrap_or_default(),
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
        }
    }
}

/// Relevance thresholds are scores in [0, 1]; anything else is clamped.
fn clamp_threshold(value: f64) -> f64 {
    if value.is_nan() {
        tracing::warn!("relevance_threshold is not a number; using {RELEVANCE_THRESHOLD}");
        return RELEVANCE_THRESHOLD;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        tracing::warn!(configured = value, using = clamped, "relevance_threshold outside [0, 1]; clamped");
    }
    clamped
}

impl AppConfig {
    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            base_url: self.llm_base_url.clone(),
        }
    }
}
