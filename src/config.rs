use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "pflix-status")]
#[command(about = "Service health, uptime history and rate limiting for Pflix")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    // `pflix-status` with no subcommand behaves like `pflix-status serve`
    pub fn into_command(self) -> Command {
        self.command
            .unwrap_or_else(|| Command::Serve(ServeArgs::parse_from(["serve"])))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Trigger one uptime snapshot on a running service (for cron)
    Record(RecordArgs),
    /// Poll a service and report when it goes offline or recovers
    Watch(WatchArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://pflix-status.db")]
    pub database_url: String,

    // Origin the collector checks; falls back to the request Host header
    // (only when a cron secret is set), then to 127.0.0.1:<port>
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: Option<String>,

    // Shared secret for the record endpoint; unset means unauthenticated
    #[arg(long, env = "UPTIME_CRON_SECRET", hide_env_values = true)]
    pub cron_secret: Option<String>,

    // Object storage endpoint probed by /api/health/storage
    #[arg(long, env = "STORAGE_HEALTH_URL")]
    pub storage_url: Option<String>,

    // Transcoder health URL probed by /api/health/transcoder
    #[arg(long, env = "TRANSCODER_HEALTH_URL")]
    pub transcoder_url: Option<String>,

    #[command(flatten)]
    pub rate: RateArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RateArgs {
    // Rate limit max requests per window
    #[arg(long, default_value_t = 30)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // Expired entry sweep interval in seconds (0 disables)
    #[arg(long, default_value_t = 300)]
    pub rate_sweep_interval: u64,
}

impl RateArgs {
    pub fn limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_secs(self.rate_window),
            max: self.rate_limit,
        }
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.rate_sweep_interval > 0).then(|| Duration::from_secs(self.rate_sweep_interval))
    }
}

#[derive(Parser, Debug, Clone)]
pub struct RecordArgs {
    #[arg(long, env = "PUBLIC_URL", default_value = "http://127.0.0.1:8080")]
    pub url: String,

    #[arg(long, env = "UPTIME_CRON_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct WatchArgs {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub url: String,

    // Poll interval in seconds
    #[arg(long, default_value_t = 60)]
    pub interval: u64,
}

/// Runtime settings the handlers need, detached from clap.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub port: u16,
    pub public_url: Option<String>,
    pub cron_secret: Option<String>,
    pub storage_url: Option<String>,
    pub transcoder_url: Option<String>,
    // bound for the storage/transcoder probes; None means the 5s default
    pub dependency_timeout: Option<Duration>,
}

impl From<&ServeArgs> for Settings {
    fn from(args: &ServeArgs) -> Self {
        // empty env vars count as unset
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        Self {
            port: args.port,
            public_url: non_empty(&args.public_url),
            cron_secret: non_empty(&args.cron_secret),
            storage_url: non_empty(&args.storage_url),
            transcoder_url: non_empty(&args.transcoder_url),
            dependency_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve_with_defaults() {
        let cli = Cli::parse_from(["pflix-status"]);
        match cli.into_command() {
            Command::Serve(args) => {
                assert_eq!(args.rate.rate_limit, 30);
                assert_eq!(args.rate.limit_config().window, Duration::from_secs(60));
                assert_eq!(args.rate.sweep_interval(), Some(Duration::from_secs(300)));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn zero_sweep_interval_disables_sweeping() {
        let cli = Cli::parse_from(["pflix-status", "serve", "--rate-sweep-interval", "0"]);
        let Command::Serve(args) = cli.into_command() else {
            panic!("expected serve");
        };
        assert_eq!(args.rate.sweep_interval(), None);
    }

    #[test]
    fn blank_secret_is_treated_as_unset() {
        let cli = Cli::parse_from(["pflix-status", "serve", "--cron-secret", "  "]);
        let Command::Serve(args) = cli.into_command() else {
            panic!("expected serve");
        };
        assert_eq!(Settings::from(&args).cron_secret, None);
    }
}
