//! Client configuration
//!
//! Defaults match a vehicle driver running on the same machine; every value
//! can be overridden from the command line.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments
#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct Args {
    /// Base URL of the driver's control channel
    #[clap(long, default_value = "http://localhost:5000")]
    pub control_url: String,

    /// Address of the driver's persistent event channel
    #[clap(long, default_value = "127.0.0.1:5001")]
    pub stream_addr: String,

    /// Give up on a control request after this many seconds (default: wait forever)
    #[clap(long)]
    pub request_timeout_secs: Option<u64>,

    /// Directory for log files
    #[clap(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

/// Configuration for the persistent channel
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Driver event socket address
    pub address: String,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5001".into(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Top-level client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub control_url: String,
    /// `None` leaves control requests unbounded
    pub request_timeout: Option<Duration>,
    pub stream: StreamConfig,
    pub log_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            control_url: "http://localhost:5000".into(),
            request_timeout: None,
            stream: StreamConfig::default(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl ClientConfig {
    /// Create the log directory, parents included, if it is missing
    pub fn ensure_log_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir).with_context(|| {
            format!("failed to create log directory {}", self.log_dir.display())
        })
    }
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        Self {
            control_url: args.control_url,
            request_timeout: args.request_timeout_secs.map(Duration::from_secs),
            stream: StreamConfig {
                address: args.stream_addr,
                ..StreamConfig::default()
            },
            log_dir: args.log_dir,
        }
    }
}
