//! Tracing installation, grounded in `estuary-flow/crates/dekaf/src/logging.rs`'s
//! registry-with-layers pattern, trimmed to what this server actually needs:
//! an `EnvFilter` seeded from `LOG_LEVEL` plus a plain `fmt` layer to stderr.
//! Log shipping (Graylog) is an out-of-scope external collaborator (spec §1);
//! `GRAYLOG_*` config is accepted but never wired to a second layer here.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn install(log_level: &str) {
    let default_level = log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}
