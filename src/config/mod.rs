pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Name of the config file looked up in the working directory and the
/// global config directory.
pub const CONFIG_FILE_NAME: &str = "ams.toml";

/// Load configuration by merging global, local, and CLI sources.
/// Precedence: CLI > `--config` file or ./ams.toml > global config > defaults.
///
/// Missing default config files are handled gracefully (defaults apply). A
/// file named with `--config` must exist and parse.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/ams/ams.toml or platform equivalent)
    let global = match global_config_path() {
        Some(p) => load_toml_file(&p).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    };

    // Layer 2: Explicit config file, else ./ams.toml
    let local = match cli_config_path(cli) {
        Some(path) => read_config_file(path)?,
        None => load_toml_file(Path::new(CONFIG_FILE_NAME)).unwrap_or_default(),
    };

    // Layer 3: CLI args
    let config = cli_to_partial(cli)
        .with_fallback(local)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Read and parse one config file, failing on any error.
pub fn read_config_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(file.to_partial())
}

/// Load an optional config file. Returns None when the file is absent or
/// unreadable; parse errors are logged, not fatal.
pub fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match read_config_file(path) {
        Ok(partial) => Some(partial),
        Err(ConfigError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Config error: {}", e);
            None
        }
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/ams/ams.toml
/// macOS: ~/Library/Application Support/ams/ams.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ams")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn cli_config_path(cli: &Cli) -> Option<&Path> {
    match &cli.command {
        Commands::Serve { config, .. } | Commands::Run { config, .. } => config.as_deref(),
        Commands::Order { .. } => None,
    }
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Serve {
            host,
            port,
            model,
            production,
            ..
        } => PartialConfig {
            host: host.clone(),
            port: *port,
            model: model.clone(),
            // A bare flag can only switch production mode on.
            production: production.then_some(true),
            ..Default::default()
        },
        Commands::Run { model, .. } => PartialConfig {
            model: model.clone(),
            ..Default::default()
        },
        Commands::Order { .. } => PartialConfig::default(),
    }
}
