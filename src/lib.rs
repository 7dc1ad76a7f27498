pub mod config;
pub mod connection;
pub mod error;
pub mod numbers;
pub mod record;
pub mod record_store;
pub mod server;
pub mod status_timer;
pub mod worker_pool;

pub use config::{ServerConfig, StatusFormat};
pub use error::*;
pub use numbers::{Addition, NumbersTracker, Status};
pub use server::{Server, ServerHandle, ServerState};

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Calling it again after a subscriber is installed does nothing.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("tracing initialized for {}", service_name);
    }
}
