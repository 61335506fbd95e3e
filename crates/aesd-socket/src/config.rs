//! Server configuration
//!
//! Values come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, and command-line flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use aesd_core::{DEFAULT_CAPACITY, INITIAL_BUFFER_SIZE};

use crate::error::{ServerError, ServerResult};
use crate::logging::LogSettings;
use crate::session::SessionConfig;

/// Default listen port
pub const DEFAULT_PORT: u16 = 9000;

/// Default interval between timestamp records
pub const DEFAULT_TIMESTAMP_INTERVAL_SECS: u64 = 10;

/// Configuration for an [`AesdServer`](crate::AesdServer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_addr: String,
    /// Number of records the store holds before evicting
    pub capacity: usize,
    /// Seconds between timestamp records; 0 disables the timer
    pub timestamp_interval_secs: u64,
    /// Optional flat file mirroring every appended record
    pub backing_file: Option<PathBuf>,
    /// Bound on waiting for the store lock
    pub lock_timeout_ms: u64,
    /// Time in-flight sessions get to finish on shutdown
    pub shutdown_grace_ms: u64,
    /// Starting size of each session's framing buffer
    pub initial_buffer_size: usize,
    /// Optional cap on a single record's size
    pub max_record_len: Option<usize>,
    /// Logging configuration
    pub log: LogSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            capacity: DEFAULT_CAPACITY,
            timestamp_interval_secs: DEFAULT_TIMESTAMP_INTERVAL_SECS,
            backing_file: None,
            lock_timeout_ms: 30_000,
            shutdown_grace_ms: 5_000,
            initial_buffer_size: INITIAL_BUFFER_SIZE,
            max_record_len: None,
            log: LogSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(contents: &str) -> ServerResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Check values that would otherwise fail later at startup
    pub fn validate(&self) -> ServerResult<()> {
        if self.capacity == 0 {
            return Err(ServerError::Config("capacity must be at least 1".into()));
        }
        self.socket_addr()?;
        if self.max_record_len == Some(0) {
            return Err(ServerError::Config("max_record_len must be at least 1".into()));
        }
        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address {}: {e}", self.bind_addr)))
    }

    /// Timer period, or `None` when timestamps are disabled
    pub fn timestamp_interval(&self) -> Option<Duration> {
        (self.timestamp_interval_secs > 0).then(|| Duration::from_secs(self.timestamp_interval_secs))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Framing settings handed to each session
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            initial_buffer_size: self.initial_buffer_size,
            max_record_len: self.max_record_len,
        }
    }

    /// Set the listen address
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Set the store capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the timer period in seconds (0 disables it)
    pub fn with_timestamp_interval_secs(mut self, secs: u64) -> Self {
        self.timestamp_interval_secs = secs;
        self
    }

    /// Mirror appended records to a file
    pub fn with_backing_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.backing_file = Some(path.into());
        self
    }

    /// Set the bound on waiting for the store lock
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the starting size of each session's framing buffer
    pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }

    /// Cap the size of a single record
    pub fn with_max_record_len(mut self, max: usize) -> Self {
        self.max_record_len = Some(max);
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }
}

#[derive(Debug, Parser)]
#[command(name = "aesdsocket", about = "Line-oriented command log server")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Address to listen on (e.g. 0.0.0.0:9000)
    #[arg(long)]
    pub bind: Option<String>,
    /// Port to listen on, keeping the configured host
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Number of records to keep
    #[arg(long)]
    pub capacity: Option<usize>,
    /// Seconds between timestamp records (0 disables)
    #[arg(long)]
    pub timestamp_interval: Option<u64>,
    /// Mirror appended records to this file
    #[arg(long)]
    pub backing_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// Resolve the effective configuration: defaults, then file, then flags
    pub fn into_config(self) -> ServerResult<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(port) = self.port {
            let mut addr = config.socket_addr()?;
            addr.set_port(port);
            config.bind_addr = addr.to_string();
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(secs) = self.timestamp_interval {
            config.timestamp_interval_secs = secs;
        }
        if let Some(path) = self.backing_file {
            config.backing_file = Some(path);
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        if self.json_logs {
            config.log.json = true;
        }

        config.validate()?;
        Ok(config)
    }
}
