use clap::Parser;
use std::net::SocketAddr;

/// CLI arguments for the relay server.
#[derive(Parser, Debug, Clone)]
#[command(name = "amps")]
#[command(about = "AMP relay server")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:9009", env = "AMPS_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "AMPS_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Seconds between heartbeat passes over registered connections.
    #[arg(long, default_value = "60", env = "AMPS_HEARTBEAT_INTERVAL")]
    pub heartbeat_interval: u64,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Seconds between heartbeat passes over registered connections.
    pub heartbeat_interval: u64,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns a description of the first value found out of range.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval == 0 {
            return Err("heartbeat_interval must be greater than 0".to_string());
        }
        if self.heartbeat_interval > 3600 {
            return Err("heartbeat_interval exceeds reasonable limit (3600 seconds)".to_string());
        }
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            heartbeat_interval: args.heartbeat_interval,
        }
    }
}
