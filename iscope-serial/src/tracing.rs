//! Logging for the transport and the tools built on it.
//!
//! Binaries call [`init_journald_or_stdout`] once at startup. Library code
//! uses `crate::tracing::prelude::*` for the level macros and never
//! installs a subscriber itself.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Initialize logging.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to journald. Otherwise
/// they go to stdout, filtered by RUST_LOG with `default_level` (e.g.
/// "info") when RUST_LOG is unset or invalid.
pub fn init_journald_or_stdout(default_level: &str) {
    let level = default_level.parse().unwrap_or(LevelFilter::INFO);

    if env::var("JOURNAL_STREAM").is_ok() {
        if let Ok(layer) = tracing_journald::layer() {
            tracing_subscriber::registry().with(layer).init();
        } else {
            use_stdout(level);
            error!("Failed to initialize journald logging, using stdout.");
        }
    } else {
        use_stdout(level);
    }

    if default_level.parse::<LevelFilter>().is_err() {
        warn!("Unknown log level {default_level:?}, using INFO.");
    }
}

fn use_stdout(level: LevelFilter) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .init();
}

// Local time to the millisecond; byte timing on a 19200 baud link is
// easier to follow than with whole seconds.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or(OffsetDateTime::now_utc());
        let formatted = now
            .format(time::macros::format_description!(
                "[hour]:[minute]:[second].[subsecond digits:3]"
            ))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{formatted}")
    }
}
