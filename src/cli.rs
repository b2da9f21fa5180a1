use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ams", version, about = "Multi-agent collaboration supervisor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Model used for analysis and LLM agents (e.g., "llama3.2")
        #[arg(short, long)]
        model: Option<String>,

        /// Hide internal error details from API responses
        #[arg(long)]
        production: bool,

        /// Agent manifest to register at startup
        #[arg(short, long)]
        agents: Option<PathBuf>,

        /// Path to config file (overrides ./ams.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run one task to completion and print the transcript
    Run {
        /// The task to hand to the agents
        task: String,

        /// Agent manifest to register before running
        #[arg(short, long)]
        agents: PathBuf,

        /// Model used for analysis and LLM agents
        #[arg(short, long)]
        model: Option<String>,

        /// Path to config file (overrides ./ams.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the execution order for a manifest's agents without running them
    Order {
        /// Agent manifest to order
        #[arg(short, long)]
        agents: PathBuf,
    },
}
