//! Tracing setup for the command-line driver
//!
//! The subscriber is installed before configuration is read, so warnings
//! emitted while loading config are not lost. It starts at `RUST_LOG` when
//! set, otherwise at `info`; the configured level replaces the latter once
//! config is loaded.

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const BOOTSTRAP_LEVEL: &str = "info";

/// Handle for switching to the configured level after startup
pub struct LevelControl {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LevelControl {
    /// Apply the configured level unless `RUST_LOG` already decided it
    pub fn apply_configured(&self, level: &str) -> Result<(), reload::Error> {
        if self.from_env {
            return Ok(());
        }
        self.handle.reload(EnvFilter::new(level))
    }
}

/// Build the subscriber around `writer`, filtering by `env_filter` or the bootstrap level
pub fn subscriber<W>(env_filter: Option<EnvFilter>, writer: W) -> (impl Subscriber + Send + Sync, LevelControl)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let from_env = env_filter.is_some();
    let (filter, handle) = reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(BOOTSTRAP_LEVEL)));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer));
    (subscriber, LevelControl { handle, from_env })
}

/// Install the global subscriber writing to stderr
pub fn init() -> LevelControl {
    let (subscriber, control) = subscriber(EnvFilter::try_from_default_env().ok(), std::io::stderr);
    subscriber.init();
    control
}
