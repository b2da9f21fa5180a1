pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod hub;
pub mod llm;
pub mod logging;
pub mod orchestration;
pub mod registry;
pub mod supervisor;
