use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use ams::api::{self, AppState};
use ams::cli::{Cli, Commands};
use ams::config::{self, AnalyzerKind, AppConfig};
use ams::executor::{ExecutorRegistry, LlmExecutor};
use ams::hub::{CommunicationHub, TranscriptOptions};
use ams::logging;
use ams::orchestration::{CollaborationDriver, manifest};
use ams::registry::AgentRegistry;
use ams::supervisor::{
    CapabilityCatalog, KeywordAnalyzer, LlmTaskAnalyzer, Supervisor, TaskAnalyzer, ordering,
};

/// Wire registry, hub, supervisor and executors from resolved config.
fn build_driver(config: &AppConfig) -> CollaborationDriver {
    let analyzer: Arc<dyn TaskAnalyzer> = match config.analyzer {
        AnalyzerKind::Llm => Arc::new(LlmTaskAnalyzer::new(
            config.llm_settings(),
            CapabilityCatalog::with_defaults(),
        )),
        AnalyzerKind::Keyword => Arc::new(KeywordAnalyzer),
    };
    let supervisor = Supervisor::new(AgentRegistry::new(), CommunicationHub::new(), analyzer)
        .with_relevance_threshold(config.relevance_threshold);
    let executors = ExecutorRegistry::new().with(Arc::new(LlmExecutor::new(config.llm_settings())));

    CollaborationDriver::new(supervisor, executors).with_transcript_options(
        TranscriptOptions::default()
            .with_framework(config.include_framework)
            .with_max_messages(config.transcript_max_messages)
            .with_max_chars(config.max_chars_per_message),
    )
}

fn register_manifest(driver: &CollaborationDriver, path: &Path) -> anyhow::Result<()> {
    let agents = manifest::load_manifest(path)
        .with_context(|| format!("Failed to load agent manifest {}", path.display()))?;
    manifest::register_all(driver.supervisor().registry(), agents);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing before config so config warnings are visible.
    let log = logging::init();

    let cli = Cli::parse();
    let config = config::load_config(&cli)?;
    log.apply_level(&config.log_level);

    tracing::info!(model = %config.model, analyzer = ?config.analyzer, "Config loaded");

    match cli.command {
        Commands::Serve { agents, .. } => {
            let driver = build_driver(&config);
            if let Some(path) = agents {
                register_manifest(&driver, &path)?;
            }
            api::serve(AppState::new(driver, config.production), &config.host, config.port).await?;
        }
        Commands::Run { task, agents, .. } => {
            let driver = build_driver(&config);
            register_manifest(&driver, &agents)?;

            let report = driver.create_and_execute(&task).await?;
            let transcript = driver.supervisor().hub().get_formatted_transcript(
                &report.session_id,
                &TranscriptOptions::default().with_framework(true).with_max_chars(usize::MAX),
            )?;
            println!("{}", transcript.trim());
            println!(
                "Session {} {} ({} of {} agents ran)",
                report.session_id,
                report.status,
                report.results.len(),
                report.order.len()
            );
        }
        Commands::Order { agents } => {
            let records = manifest::load_manifest(&agents)
                .with_context(|| format!("Failed to load agent manifest {}", agents.display()))?;
            let ordered = ordering::determine_execution_order(&records)?;
            for (position, agent) in ordered.iter().enumerate() {
                println!(
                    "{}. {} ({}) priority {}",
                    position + 1,
                    agent.name,
                    agent.id,
                    ordering::compute_priority(agent)
                );
            }
        }
    }

    Ok(())
}
