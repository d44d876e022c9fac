/// Configuration management
use crate::account::Network;
use crate::error::{Result, WalletError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_PORT: u16 = 9470;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Page size for past activities; also the visible-count target of one sync round
    pub activity_batch_size: usize,

    /// Throttle window of the past-activities trigger
    pub past_activity_delay: Duration,

    /// Initial-load gate poll interval
    pub initial_load_poll_interval: Duration,

    /// Initial-load gate attempts before giving up
    pub initial_load_max_attempts: u32,

    /// Interval of the newest-page watcher in the daemon
    pub refresh_interval: Duration,

    pub network: Network,

    /// Optional data directory; enables activity persistence
    pub data_dir: Option<PathBuf>,

    /// API server address for local clients
    pub api_addr: Option<SocketAddr>,

    /// Recorded chain data served by the fixture adapters
    pub fixtures_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            activity_batch_size: 50,
            past_activity_delay: Duration::from_millis(200),
            initial_load_poll_interval: Duration::from_secs(1),
            initial_load_max_attempts: 60,
            refresh_interval: Duration::from_secs(5),
            network: Network::Mainnet,
            data_dir: None,
            api_addr: None,
            fixtures_path: None,
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(WalletError::Config(format!(
                "Usage: {} <fixtures.json> [--data-dir <path>] [--api-port <port>] [--batch <n>] [--testnet]",
                args.first().map(String::as_str).unwrap_or("walletfeed")
            )));
        }

        let fixtures_path = PathBuf::from(&args[1]);
        let mut data_dir: Option<PathBuf> = None;
        let mut api_port: Option<u16> = None;
        let mut activity_batch_size: Option<usize> = None;
        let mut network = Network::Mainnet;

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--data-dir" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        WalletError::Config("--data-dir requires a path argument".to_string())
                    })?;
                    data_dir = Some(PathBuf::from(path));
                    i += 2;
                }
                "--api-port" => {
                    let p = args.get(i + 1).ok_or_else(|| {
                        WalletError::Config("--api-port requires a port argument".to_string())
                    })?;
                    api_port = Some(p.parse::<u16>().map_err(|_| {
                        WalletError::Config("--api-port must be a valid number (0-65535)".to_string())
                    })?);
                    i += 2;
                }
                "--batch" => {
                    let n = args.get(i + 1).ok_or_else(|| {
                        WalletError::Config("--batch requires a number".to_string())
                    })?;
                    let n = n.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                        WalletError::Config("--batch must be a positive number".to_string())
                    })?;
                    activity_batch_size = Some(n);
                    i += 2;
                }
                "--testnet" => {
                    network = Network::Testnet;
                    i += 1;
                }
                other => {
                    return Err(WalletError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Some(p) = std::env::var("WALLETFEED_API_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
        {
            api_port = Some(p);
        }
        if let Ok(dir) = std::env::var("WALLETFEED_DATA_DIR") {
            if !dir.is_empty() {
                data_dir = Some(PathBuf::from(dir));
            }
        }

        let api_addr = format!("127.0.0.1:{}", api_port.unwrap_or(DEFAULT_API_PORT))
            .parse()
            .map_err(|_| WalletError::Config("Invalid api address".to_string()))?;

        let defaults = Self::default();
        Ok(Self {
            activity_batch_size: activity_batch_size.unwrap_or(defaults.activity_batch_size),
            network,
            data_dir,
            api_addr: Some(api_addr),
            fixtures_path: Some(fixtures_path),
            ..defaults
        })
    }

    pub fn api_addr_or_default(&self) -> SocketAddr {
        self.api_addr
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], DEFAULT_API_PORT)))
    }
}
