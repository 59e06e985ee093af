use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::cmd::Command;
use crate::config::ServerSettings;
use crate::connection::{Connection, ConnectionError};
use crate::frame::Frame;
use crate::service::InventoryService;

const LISTENER_TARGET: &str = "home_inventory::listener";

const LISTEN_BACKLOG: u32 = 4;

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("no address found for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("no request within {0:?}, closing idle connection")]
    IdleTimeout(Duration),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[derive(Debug)]
struct Listener {
    listener: TcpListener,
    service: InventoryService,
    limit_connections: Option<Arc<Semaphore>>,
    idle_timeout: Option<Duration>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
}

#[derive(Debug)]
struct Handler {
    peer: SocketAddr,
    connection: Connection,
    service: InventoryService,
    idle_timeout: Option<Duration>,
    shutdown: Shutdown,
    // Dropped with the handler; `run` waits until every clone is gone.
    _shutdown_complete: mpsc::Sender<()>,
}

/// Tracks whether the server asked this handler to stop.
#[derive(Debug)]
struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

/// Binds a listening socket with address reuse enabled and a small backlog.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, TransportError> {
    let addr = lookup_host((host, port))
        .await
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| TransportError::ResolveEmpty {
            host: host.to_string(),
            port,
        })?;

    let bind_err = |source| TransportError::Bind { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    #[cfg(unix)]
    socket.set_reuseport(true).map_err(bind_err)?;

    socket.bind(addr).map_err(bind_err)?;

    let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

    info!(target: LISTENER_TARGET, %addr, "listening");

    Ok(listener)
}

/// Serves connections from `listener` until `shutdown` completes.
///
/// Each accepted socket gets its own task. Once `shutdown` fires no new
/// connections are accepted; handlers finish the request they are on and
/// this function returns after all of them are gone.
pub async fn run(
    listener: TcpListener,
    service: InventoryService,
    settings: ServerSettings,
    shutdown: impl Future,
) {
    let (notify_shutdown, _) = broadcast::channel(1);
    let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

    let mut server = Listener {
        listener,
        service,
        limit_connections: settings
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max.min(Semaphore::MAX_PERMITS)))),
        idle_timeout: settings.idle_timeout,
        notify_shutdown,
        shutdown_complete_tx,
    };

    // select gives running handlers an opportunity to finish their request
    tokio::select! {
        res = server.run() => {
            if let Err(err) = res {
                error!(target: LISTENER_TARGET, error = %err, "listener stopped");
            }
        }
        _ = shutdown => {
            info!(target: LISTENER_TARGET, "shutting down");
        }
    }

    let Listener {
        notify_shutdown,
        shutdown_complete_tx,
        ..
    } = server;

    drop(notify_shutdown);
    drop(shutdown_complete_tx);

    let _ = shutdown_complete_rx.recv().await;
}

impl Listener {
    /// Accepts connections forever, spawning a handler task for each one.
    ///
    /// The loop never waits for a handler to finish. When a connection limit
    /// is configured it waits for a free slot before accepting, so excess
    /// clients queue in the kernel backlog instead of being served.
    async fn run(&mut self) -> Result<(), crate::Error> {
        loop {
            let permit = match &self.limit_connections {
                Some(semaphore) => Some(semaphore.clone().acquire_owned().await?),
                None => None,
            };

            let (socket, peer) = self.accept().await;

            debug!(target: LISTENER_TARGET, %peer, "accepted connection");

            let mut handler = Handler {
                peer,
                connection: Connection::new(socket),
                service: self.service.clone(),
                idle_timeout: self.idle_timeout,
                shutdown: Shutdown::new(self.notify_shutdown.subscribe()),
                _shutdown_complete: self.shutdown_complete_tx.clone(),
            };

            tokio::spawn(async move {
                if let Err(err) = handler.run().await {
                    warn!(target: LISTENER_TARGET, %peer, error = %err, "connection dropped");
                }

                debug!(target: LISTENER_TARGET, %peer, "connection closed");

                drop(permit);
            });
        }
    }

    /// Accept errors are usually transient (fd exhaustion, aborted
    /// handshakes), so they are logged and retried with a capped back-off.
    async fn accept(&mut self) -> (TcpStream, SocketAddr) {
        let mut backoff = MIN_ACCEPT_BACKOFF;

        loop {
            match self.listener.accept().await {
                Ok(accepted) => return accepted,
                Err(err) => {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %err,
                        retry_in = ?backoff,
                        "failed to accept connection"
                    );

                    time::sleep(backoff).await;

                    backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
                }
            }
        }
    }
}

impl Handler {
    /// Read-dispatch-write loop for a single client.
    ///
    /// Requests are answered strictly in order. Returns `Ok` when the peer
    /// hangs up or the server shuts down; any framing, protocol or socket
    /// error ends this connection only.
    async fn run(&mut self) -> Result<(), crate::Error> {
        while !self.shutdown.is_shutdown() {
            let maybe_frame = tokio::select! {
                res = read_request(&mut self.connection, self.idle_timeout) => res?,
                _ = self.shutdown.recv() => return Ok(()),
            };

            let frame = match maybe_frame {
                Some(frame) => frame,
                None => return Ok(()),
            };

            let cmd = Command::from_frame(&frame)?;

            debug!(target: LISTENER_TARGET, peer = %self.peer, operation = cmd.name(), "request");

            let response = cmd.apply(&self.service).await;

            self.connection
                .write_frame(&Frame::from_message(&response)?)
                .await?;
        }

        Ok(())
    }
}

async fn read_request(
    connection: &mut Connection,
    idle_timeout: Option<Duration>,
) -> Result<Option<Frame>, TransportError> {
    match idle_timeout {
        Some(limit) => time::timeout(limit, connection.read_frame())
            .await
            .map_err(|_| TransportError::IdleTimeout(limit))?
            .map_err(TransportError::from),
        None => Ok(connection.read_frame().await?),
    }
}

impl Shutdown {
    fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            notify,
        }
    }

    fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }

        // Either a value or a closed channel means the same thing.
        let _ = self.notify.recv().await;

        self.is_shutdown = true;
    }
}
