use clap::Parser;
use dotenv::dotenv;
use numlog::{server, NumlogError, ServerConfig, StatusFormat};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "numlog")]
#[command(about = "Collects unique 9-digit numbers from TCP clients into a numbers log", long_about = None)]
struct Cli {
    /// Port to accept client connections on
    #[arg(short, long)]
    port: Option<u16>,
    /// Address to bind to
    #[arg(long)]
    bind: Option<String>,
    /// Number of client connections handled at the same time
    #[arg(long)]
    pool_size: Option<usize>,
    /// Accepted connections allowed to wait for a free worker
    #[arg(long)]
    queue_capacity: Option<usize>,
    /// Numbers log file, recreated on every start
    #[arg(long)]
    store: Option<PathBuf>,
    /// Seconds between status reports
    #[arg(long)]
    status_interval: Option<u64>,
    /// Seconds to wait for workers on shutdown
    #[arg(long)]
    shutdown_grace: Option<u64>,
    #[arg(long, value_enum)]
    status_format: Option<StatusFormat>,
}

impl Cli {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(queue_capacity) = self.queue_capacity {
            config.queue_capacity = queue_capacity;
        }
        if let Some(store) = self.store {
            config.store_path = store;
        }
        if let Some(secs) = self.status_interval {
            config.status_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.shutdown_grace {
            config.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(format) = self.status_format {
            config.status_format = format;
        }
        config
    }
}

fn main() -> Result<(), NumlogError> {
    dotenv().ok();
    numlog::init_tracing("numlog");

    let cli = Cli::parse();
    let config = cli.apply(ServerConfig::from_env()?);

    server::start(config)
}
