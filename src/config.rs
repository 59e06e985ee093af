use std::time::Duration;

use clap::Parser;
use tokio::sync::Semaphore;

use crate::{DEFAULT_HOST, DEFAULT_PORT};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://inventory.db";

/// Default ceiling on simultaneously served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 250;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Household inventory server
#[derive(Parser, Debug, Clone)]
#[command(name = "run_server")]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// SQLite database URL, e.g. `sqlite://inventory.db` or `sqlite::memory:`
    #[arg(long, default_value = DEFAULT_DATABASE_URL)]
    pub database: String,

    /// Maximum number of connections served at once (0 for no limit, capped
    /// at the largest limit the runtime supports)
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Close connections idle for this many seconds (0 to never close)
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout_secs: u64,
}

/// Household inventory client
#[derive(Parser, Debug, Clone)]
#[command(name = "run_client")]
#[command(author, version, about, long_about = None)]
pub struct ClientArgs {
    /// Server address
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

/// Runtime knobs for the accept loop and connection handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// `None` leaves the number of concurrent connections unbounded.
    pub max_connections: Option<usize>,
    /// `None` lets a silent client hold its connection forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            max_connections: Some(DEFAULT_MAX_CONNECTIONS),
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
        }
    }
}

impl ServerArgs {
    pub fn settings(&self) -> ServerSettings {
        ServerSettings {
            max_connections: (self.max_connections > 0)
                .then(|| self.max_connections.min(Semaphore::MAX_PERMITS)),
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults_to_localhost_5500() {
        let args = ServerArgs::parse_from(["run_server"]);

        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 5500);
        assert_eq!(args.database, DEFAULT_DATABASE_URL);
        assert_eq!(args.settings(), ServerSettings::default());
    }

    #[test]
    fn zero_disables_limits() {
        let args = ServerArgs::parse_from([
            "run_server",
            "--port",
            "6000",
            "--max-connections",
            "0",
            "--idle-timeout-secs",
            "0",
        ]);

        assert_eq!(args.port, 6000);
        assert_eq!(
            args.settings(),
            ServerSettings {
                max_connections: None,
                idle_timeout: None,
            }
        );
    }

    #[test]
    fn connection_limit_is_capped() {
        let args = ServerArgs::parse_from([
            "run_server",
            "--max-connections",
            "18446744073709551615",
        ]);

        assert_eq!(args.settings().max_connections, Some(Semaphore::MAX_PERMITS));
    }

    #[test]
    fn client_accepts_host_and_port() {
        let args = ClientArgs::parse_from(["run_client", "--host", "10.0.0.2", "--port", "7000"]);

        assert_eq!((args.host.as_str(), args.port), ("10.0.0.2", 7000));
    }
}
