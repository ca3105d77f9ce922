//! Process configuration, parsed with `clap` the way `agent::main::Args` is
//! (long flags with `env` fallbacks; see §6.4).

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// URL of the Postgres database.
    #[clap(long = "database", env = "DATABASE_URL")]
    pub database_url: url::Url,

    /// Path to CA certificate of the database.
    #[clap(long = "database-ca", env = "DATABASE_CA")]
    pub database_ca: Option<String>,

    /// The port to listen on for control-surface API requests.
    #[clap(long, default_value = "8080", env = "API_PORT")]
    pub api_port: u16,

    /// FTP host of the upstream vendor feed.
    #[clap(long = "ftp-host", env = "TRAVELTEK_FTP_HOST")]
    pub ftp_host: String,

    /// FTP username.
    #[clap(long = "ftp-user", env = "TRAVELTEK_FTP_USER")]
    pub ftp_user: String,

    /// FTP password.
    #[clap(long = "ftp-password", env = "TRAVELTEK_FTP_PASSWORD")]
    pub ftp_password: String,

    /// Whether to use FTPS. Defaults to true.
    #[clap(long = "ftp-secure", env = "TRAVELTEK_FTP_SECURE", default_value_t = true)]
    pub ftp_secure: bool,

    /// Verbose FTP command tracing.
    #[clap(long = "ftp-verbose", env = "FTP_VERBOSE", default_value_t = false)]
    pub ftp_verbose: bool,

    /// The URL this process believes it is running against; used by the
    /// environment guard (§4.5) to refuse running outside production.
    #[clap(long = "api-url", env = "API_URL", default_value = "")]
    pub api_url: String,

    /// When `true`, disables the environment guard. Only ever set for
    /// non-production replicas that need to exercise the sync path.
    #[clap(
        long = "bypass-sync-environment-guard",
        env = "BYPASS_SYNC_ENVIRONMENT_GUARD",
        default_value_t = false
    )]
    pub bypass_sync_environment_guard: bool,

    /// Enables the 02:00 scheduled sync cron trigger.
    #[clap(
        long = "enable-scheduled-cruise-sync",
        env = "ENABLE_SCHEDULED_CRUISE_SYNC",
        default_value_t = false
    )]
    pub enable_scheduled_cruise_sync: bool,

    /// IANA timezone used for all cron triggers (§4.5, §4.6).
    #[clap(long = "cron-timezone", default_value = "America/New_York")]
    pub cron_timezone: String,
}

/// The production host this process must match (or have the guard
/// bypassed) before it is permitted to run a sync (§4.5).
pub const PRODUCTION_API_HOST: &str = "api.cruises.example.com";
