//! Orchestration engine: task analysis, agent selection, execution ordering
//! and collaboration lifecycle.

pub mod analysis;
pub mod llm_analyzer;
pub mod manager;
pub mod ordering;
pub mod selection;

pub use analysis::{
    AnalyzerReport, CapabilityCatalog, DEFAULT_CAPABILITY, KeywordAnalyzer, RELEVANCE_THRESHOLD,
    TaskAnalysis, TaskAnalyzer,
};
pub use llm_analyzer::LlmTaskAnalyzer;
pub use manager::{
    CollaborationInfo, CollaborationStatus, ExecutionTicket, MonitorReport, SUPERVISOR_NAME,
    Supervisor,
};
