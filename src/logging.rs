//! Tracing setup.
//!
//! The subscriber is installed before configuration is read so config
//! warnings are visible. The filter starts at `RUST_LOG` (or `info`) and is
//! swapped for the configured `logging.level` once config is loaded, unless
//! `RUST_LOG` was set.

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

const BOOT_LEVEL: &str = "info";

/// Handle for adjusting the installed filter after startup.
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogHandle {
    /// Apply the configured level. `RUST_LOG` keeps precedence.
    pub fn apply_level(&self, level: &str) {
        if self.from_env {
            return;
        }
        let filter = EnvFilter::try_new(level).unwrap_or_else(|e| {
            tracing::warn!(level = %level, error = %e, "Invalid log level in config; keeping {BOOT_LEVEL}");
            EnvFilter::new(BOOT_LEVEL)
        });
        if let Err(e) = self.filter.reload(filter) {
            tracing::warn!(error = %e, "Could not apply configured log level");
        }
    }
}

/// Install the global subscriber writing to stderr.
pub fn init() -> LogHandle {
    init_with_writer(std::io::stderr)
}

/// Install the global subscriber writing to `writer`.
pub fn init_with_writer<W>(writer: W) -> LogHandle
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env = EnvFilter::try_from_default_env().ok();
    let from_env = env.is_some();
    let (filter, handle) = reload::Layer::new(env.unwrap_or_else(|| EnvFilter::new(BOOT_LEVEL)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    LogHandle {
        filter: handle,
        from_env,
    }
}
