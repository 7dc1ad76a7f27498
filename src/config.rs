use crate::NumlogError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_POOL_SIZE: usize = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;
pub const DEFAULT_STORE_PATH: &str = "numbers.log";
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// How status reports are rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StatusFormat {
    /// `Received N unique numbers, M duplicates. Unique total: T`
    #[default]
    Text,
    /// One JSON object per report
    Json,
}

impl FromStr for StatusFormat {
    type Err = NumlogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(StatusFormat::Text),
            "json" => Ok(StatusFormat::Json),
            other => Err(NumlogError::Config(format!("unknown status format: {}", other))),
        }
    }
}

/// Everything the server needs to start
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Connections handled at the same time
    pub pool_size: usize,
    /// Accepted connections waiting for a free worker
    pub queue_capacity: usize,
    pub store_path: PathBuf,
    pub status_interval: Duration,
    pub shutdown_grace: Duration,
    pub status_format: StatusFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            status_interval: DEFAULT_STATUS_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            status_format: StatusFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `NUMLOG_*` environment variables
    pub fn from_env() -> Result<Self, NumlogError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for the `NUMLOG_*` keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NumlogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("NUMLOG_BIND") {
            config.bind_address = value;
        }
        if let Some(value) = lookup("NUMLOG_PORT") {
            config.port = parse_var("NUMLOG_PORT", &value)?;
        }
        if let Some(value) = lookup("NUMLOG_POOL_SIZE") {
            config.pool_size = parse_var("NUMLOG_POOL_SIZE", &value)?;
        }
        if let Some(value) = lookup("NUMLOG_QUEUE_CAPACITY") {
            config.queue_capacity = parse_var("NUMLOG_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("NUMLOG_STORE_PATH") {
            config.store_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("NUMLOG_STATUS_INTERVAL_SECS") {
            config.status_interval = Duration::from_secs(parse_var("NUMLOG_STATUS_INTERVAL_SECS", &value)?);
        }
        if let Some(value) = lookup("NUMLOG_SHUTDOWN_GRACE_SECS") {
            config.shutdown_grace = Duration::from_secs(parse_var("NUMLOG_SHUTDOWN_GRACE_SECS", &value)?);
        }
        if let Some(value) = lookup("NUMLOG_STATUS_FORMAT") {
            config.status_format = value.parse()?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NumlogError> {
        if self.pool_size == 0 {
            return Err(NumlogError::Config("pool size must be at least 1".to_string()));
        }
        if self.status_interval.is_zero() {
            return Err(NumlogError::Config("status interval must be greater than zero".to_string()));
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(NumlogError::Config("store path must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, NumlogError> {
    value
        .trim()
        .parse()
        .map_err(|_| NumlogError::Config(format!("{} has invalid value {:?}", key, value)))
}
