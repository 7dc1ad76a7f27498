use crate::config::{ServerConfig, StatusFormat};
use crate::connection::ConnectionWorker;
use crate::numbers::{NumbersTracker, Status};
use crate::status_timer::StatusTimer;
use crate::worker_pool::WorkerPool;
use crate::NumlogError;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often the accept loop re-checks the state while no client is connecting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

const POOL_THREAD_PREFIX: &str = "numlog-client";
const STATUS_THREAD_NAME: &str = "numlog-status";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServerState {
    #[default]
    Running,
    Stopping,
    Stopped,
}

/// The server's state flag. Starts Running and only ever moves forward.
#[derive(Default)]
pub struct Lifecycle {
    state: Mutex<ServerState>,
}

impl Lifecycle {
    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ServerState {
        *self.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Move from Running to Stopping. Returns true if this call did it.
    pub fn request_shutdown(&self) -> bool {
        let mut state = self.lock();
        if *state == ServerState::Running {
            *state = ServerState::Stopping;
            true
        } else {
            false
        }
    }

    fn mark_stopped(&self) {
        *self.lock() = ServerState::Stopped;
    }
}

struct Shared {
    config: ServerConfig,
    lifecycle: Arc<Lifecycle>,
    tracker: Arc<NumbersTracker>,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    pool: Mutex<Option<Arc<WorkerPool>>>,
    status_timer: Mutex<Option<StatusTimer>>,
    /// Held for the whole teardown; true once it has run
    torn_down: Mutex<bool>,
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl Shared {
    /// Tear everything down once. Concurrent callers block until the first
    /// teardown has finished.
    fn shutdown(&self) {
        let mut torn_down = self.torn_down.lock().unwrap_or_else(PoisonError::into_inner);
        if *torn_down {
            return;
        }
        self.lifecycle.mark_stopped();
        info!("Shutting down server");

        let grace = self.config.shutdown_grace;
        if let Some(timer) = take(&self.status_timer) {
            timer.stop(grace);
        }
        if let Some(pool) = take(&self.pool) {
            pool.shutdown(grace);
        }
        if take(&self.listener).is_some() {
            debug!("listener on {} closed", self.local_addr);
        }

        *torn_down = true;
        info!("Server stopped, unique total: {}", self.tracker.unique_total());
    }
}

/// Accepts connections and hands each one to a worker.
///
/// `bind` resets the record store and starts listening; `run` blocks in the
/// accept loop until a shutdown is requested, then tears everything down.
pub struct Server {
    shared: Arc<Shared>,
}

/// Cloneable remote control for a running `Server`
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl Server {
    pub fn bind(config: ServerConfig) -> Result<Self, NumlogError> {
        config.validate()?;
        info!("Starting server");

        let pool = WorkerPool::new(POOL_THREAD_PREFIX, config.pool_size, config.queue_capacity)?;
        let tracker = Arc::new(NumbersTracker::create(&config.store_path)?);

        let listener = TcpListener::bind((config.bind_address.as_str(), config.port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let status_timer = {
            let tracker = Arc::clone(&tracker);
            let format = config.status_format;
            StatusTimer::start(STATUS_THREAD_NAME, config.status_interval, move || {
                emit_status(format, tracker.status());
            })?
        };

        info!(
            "Listening on {} (pool size {}, queue capacity {})",
            local_addr, config.pool_size, config.queue_capacity
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                lifecycle: Arc::new(Lifecycle::default()),
                tracker,
                local_addr,
                listener: Mutex::new(Some(listener)),
                pool: Mutex::new(Some(Arc::new(pool))),
                status_timer: Mutex::new(Some(status_timer)),
                torn_down: Mutex::new(false),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn tracker(&self) -> Arc<NumbersTracker> {
        Arc::clone(&self.shared.tracker)
    }

    pub fn state(&self) -> ServerState {
        self.shared.lifecycle.state()
    }

    pub fn request_shutdown(&self) {
        self.shared.lifecycle.request_shutdown();
    }

    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    /// Accept connections until the server leaves the Running state, then
    /// shut down. An accept failure also ends the loop and is returned after
    /// shutdown completes.
    pub fn run(&self) -> Result<(), NumlogError> {
        let result = self.accept_loop();
        self.shared.shutdown();
        result
    }

    fn accept_loop(&self) -> Result<(), NumlogError> {
        let shared = &self.shared;
        let Some(pool) = shared.pool.lock().unwrap_or_else(PoisonError::into_inner).clone() else {
            return Ok(());
        };

        while shared.lifecycle.is_running() {
            let accepted = {
                let listener = shared.listener.lock().unwrap_or_else(PoisonError::into_inner);
                match listener.as_ref() {
                    Some(listener) => listener.accept(),
                    None => break,
                }
            };

            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        warn!(%peer, "dropping connection, could not make it blocking: {}", e);
                        continue;
                    }
                    debug!(%peer, "accepted connection");

                    let worker = ConnectionWorker::new(
                        Arc::clone(&shared.tracker),
                        Arc::clone(&shared.lifecycle),
                        stream,
                    )
                    .with_peer(peer);

                    // Blocks while every worker is busy and the queue is full
                    if pool.execute(move || {
                        worker.run();
                    })
                    .is_err()
                    {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Accept failed, shutting down server: {}", e);
                    shared.lifecycle.request_shutdown();
                    return Err(NumlogError::Io(e));
                }
            }
        }

        Ok(())
    }
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn tracker(&self) -> Arc<NumbersTracker> {
        Arc::clone(&self.shared.tracker)
    }

    pub fn state(&self) -> ServerState {
        self.shared.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lifecycle.is_running()
    }

    /// Ask the accept loop to stop; it shuts the server down on its way out
    pub fn request_shutdown(&self) {
        self.shared.lifecycle.request_shutdown();
    }

    /// Tear the server down from this thread. Only the first call does any work.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

/// Bind with `config` and serve until shutdown
pub fn start(config: ServerConfig) -> Result<(), NumlogError> {
    Server::bind(config)?.run()
}

fn emit_status(format: StatusFormat, status: Status) {
    match format {
        StatusFormat::Text => info!(target: "numlog::status", "{}", status),
        StatusFormat::Json => match serde_json::to_string(&status) {
            Ok(line) => info!(target: "numlog::status", "{}", line),
            Err(e) => warn!("could not serialize status: {}", e),
        },
    }
}
