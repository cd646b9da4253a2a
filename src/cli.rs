use clap::Parser;

pub const DEFAULT_SERVER: &str = "http://localhost:5000";
pub const DEFAULT_REFRESH_MS: u64 = 5_000;
pub const DEFAULT_ALERT_MS: u64 = 30_000;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "periscope",
    version,
    about = "A terminal cockpit for cluster-monitoring servers."
)]
pub struct CliArgs {
    /// Base URL of the monitoring server
    #[arg(long, default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Cluster refresh interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_REFRESH_MS)]
    pub refresh_ms: u64,

    /// Alert check interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_ALERT_MS)]
    pub alert_ms: u64,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}
