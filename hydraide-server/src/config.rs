//! Process configuration (spec §6 "Environment used by core" plus the
//! installer's env file). Grounded in `estuary-flow`'s `dekaf` binary:
//! a single `clap::Parser` struct reading both CLI flags and env vars,
//! with `HYDRAIDE_*` taking the place of dekaf's own `*_ENDPOINT` family.
//!
//! Only `HYDRAIDE_ROOT_PATH` and the `HYDRAIDE_DEFAULT_*` knobs are acted
//! on by the core; the installer's peripheral vars (`GRAYLOG_*`,
//! `HEALTH_CHECK_PORT`, `SYSTEM_RESOURCE_LOGGING`,
//! `GRPC_SERVER_ERROR_LOGGING`) are accepted so the env file the install
//! wizard writes parses cleanly, but are not read by this crate (spec §6:
//! "All others are consumed by peripheral subsystems").

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(about = "HydrAIDE core server", version)]
pub struct Config {
    /// Directory chunk files are written under (spec §6 on-disk layout root).
    #[arg(long, env = "HYDRAIDE_ROOT_PATH")]
    pub root_path: PathBuf,

    /// TCP port the Gateway service listens on.
    #[arg(long, env = "HYDRAIDE_SERVER_PORT", default_value_t = 4444)]
    pub server_port: u16,

    /// Number of Islands (`N` in spec §3's `islandID` formula). Fixed at
    /// deployment time — changing it re-maps every existing Swamp's
    /// physical location and must never be done against data already on
    /// disk. Not part of the installer's env file in spec §6, since the
    /// installer predates a configurable Island count; added here because
    /// the core cannot compute `islandID` without it.
    #[arg(long, env = "HYDRAIDE_ISLAND_COUNT", default_value_t = 1000)]
    pub island_count: u64,

    /// Default `closeAfterIdle`, applied when a `RegisterSwamp` call omits
    /// an explicit per-pattern override.
    #[arg(long, env = "HYDRAIDE_DEFAULT_CLOSE_AFTER_IDLE", default_value_t = 3600)]
    pub default_close_after_idle_secs: u64,

    /// Default flush `writeInterval`, in seconds.
    #[arg(long, env = "HYDRAIDE_DEFAULT_WRITE_INTERVAL", default_value_t = 1)]
    pub default_write_interval_secs: u64,

    /// Default chunk `maxFileSize`, in bytes.
    #[arg(long, env = "HYDRAIDE_DEFAULT_FILE_SIZE", default_value_t = 8 * 1024 * 1024)]
    pub default_file_size: u64,

    /// Maximum accepted gRPC message size, in bytes, for both directions.
    #[arg(long, env = "GRPC_MAX_MESSAGE_SIZE", default_value_t = 16 * 1024 * 1024)]
    pub grpc_max_message_size: usize,

    /// PEM certificate used to terminate TLS. The install wizard generates
    /// this file; this process only ever reads it (spec §1 out-of-scope:
    /// "TLS certificate generation"). Omit both this and `tls_key_file` to
    /// serve plaintext, e.g. behind an already-terminating proxy.
    #[arg(long, env = "HYDRAIDE_TLS_CERT_FILE")]
    pub tls_cert_file: Option<PathBuf>,

    /// PEM private key paired with `tls_cert_file`.
    #[arg(long, env = "HYDRAIDE_TLS_KEY_FILE", requires = "tls_cert_file")]
    pub tls_key_file: Option<PathBuf>,

    /// Accepted but unused: peripheral subsystems' configuration, carried
    /// only so the installer's env file parses without error.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    #[arg(long, env = "GRAYLOG_ENABLED", default_value_t = false)]
    pub graylog_enabled: bool,
    #[arg(long, env = "GRAYLOG_SERVER")]
    pub graylog_server: Option<String>,
    #[arg(long, env = "GRAYLOG_SERVICE_NAME")]
    pub graylog_service_name: Option<String>,
    #[arg(long, env = "SYSTEM_RESOURCE_LOGGING", default_value_t = false)]
    pub system_resource_logging: bool,
    #[arg(long, env = "GRPC_SERVER_ERROR_LOGGING", default_value_t = false)]
    pub grpc_server_error_logging: bool,
    #[arg(long, env = "HEALTH_CHECK_PORT")]
    pub health_check_port: Option<u16>,
}

impl Config {
    pub fn close_after_idle(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_close_after_idle_secs)
    }

    pub fn write_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_write_interval_secs)
    }
}
