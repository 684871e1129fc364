//! Configuration and command-line surface for the worker agent.

use std::time::Duration;

use clap::Parser;

pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RECONNECT_BACKOFF_SECS: u64 = 10;
pub const DEFAULT_STOP_GRACE_SECS: u64 = 10;

/// Command-line arguments.
///
/// Every flag can also come from the environment, which is how fleet
/// provisioning normally injects them.
#[derive(Debug, Parser)]
#[command(
    name = "worker-agent",
    about = "Worker-side control agent for the Muster orchestration service",
    version
)]
pub struct Cli {
    /// API token issued by the master for this fleet.
    #[arg(long, env = "MUSTER_TOKEN")]
    pub token: String,

    /// WebSocket URL of the master control endpoint (ws:// or wss://).
    #[arg(long, env = "MUSTER_MASTER_URL")]
    pub master_url: String,

    /// Hostname to register under. Legacy installs only; new nodes take
    /// whatever id the master assigns.
    #[arg(long, env = "MUSTER_HOSTNAME")]
    pub hostname: Option<String>,

    /// Seconds between health reports on an active connection.
    #[arg(long, env = "MUSTER_HEALTH_INTERVAL", default_value_t = DEFAULT_HEALTH_INTERVAL_SECS)]
    pub health_interval_secs: u64,

    /// Seconds to wait before redialing after a lost connection.
    #[arg(long, env = "MUSTER_RECONNECT_BACKOFF", default_value_t = DEFAULT_RECONNECT_BACKOFF_SECS)]
    pub reconnect_backoff_secs: u64,

    /// Seconds a job gets to exit after a graceful stop request before it
    /// is force-killed.
    #[arg(long, env = "MUSTER_STOP_GRACE", default_value_t = DEFAULT_STOP_GRACE_SECS)]
    pub stop_grace_secs: u64,
}

/// Runtime configuration for one agent process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub credential: String,
    pub master_url: String,
    pub hostname: Option<String>,
    pub health_interval: Duration,
    pub reconnect_backoff: Duration,
    pub stop_grace: Duration,
}

impl AgentConfig {
    pub fn from_cli(cli: Cli) -> Self {
        Self {
            credential: cli.token,
            master_url: cli.master_url,
            hostname: cli.hostname,
            health_interval: Duration::from_secs(cli.health_interval_secs),
            reconnect_backoff: Duration::from_secs(cli.reconnect_backoff_secs),
            stop_grace: Duration::from_secs(cli.stop_grace_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_flag_set_parses() {
        let cli = Cli::try_parse_from([
            "worker-agent",
            "--token",
            "tok-123",
            "--master-url",
            "ws://master.example:9090/control",
            "--hostname",
            "rack-4.internal",
            "--stop-grace-secs",
            "5",
        ])
        .unwrap();

        let config = AgentConfig::from_cli(cli);
        assert_eq!(config.credential, "tok-123");
        assert_eq!(config.master_url, "ws://master.example:9090/control");
        assert_eq!(config.hostname.as_deref(), Some("rack-4.internal"));
        assert_eq!(config.stop_grace, Duration::from_secs(5));
        assert_eq!(
            config.health_interval,
            Duration::from_secs(DEFAULT_HEALTH_INTERVAL_SECS)
        );
    }

    #[test]
    fn test_missing_token_is_a_startup_error() {
        let result = Cli::try_parse_from(["worker-agent", "--master-url", "ws://m:1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_master_url_is_a_startup_error() {
        let result = Cli::try_parse_from(["worker-agent", "--token", "tok"]);
        assert!(result.is_err());
    }
}
