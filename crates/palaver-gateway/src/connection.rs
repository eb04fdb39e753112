//! Connection manager: the accept loop, one handling task per connection,
//! newline framing, and unconditional teardown.
//!
//! The transport is a byte stream, so a single read may hold part of a
//! request or several at once; `LinesCodec` buffers partial reads and hands
//! the dispatcher one complete line at a time. Payloads are single-line
//! JSON, so the newline delimiter cannot occur inside one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::registry::{ConnId, SessionRegistry};

/// Upper bound on one framed request line. A longer line is a framing
/// violation and terminates the connection.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Outbound line channels for every live connection, authenticated or not.
/// Mutated concurrently on accept and on disconnect; same locking
/// discipline as the session registry.
#[derive(Clone, Default)]
pub struct ActiveConnections {
    inner: Arc<RwLock<HashMap<ConnId, mpsc::UnboundedSender<String>>>>,
}

impl ActiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, conn: ConnId, tx: mpsc::UnboundedSender<String>) {
        self.inner.write().await.insert(conn, tx);
    }

    pub async fn remove(&self, conn: ConnId) {
        self.inner.write().await.remove(&conn);
    }

    pub async fn sender(&self, conn: ConnId) -> Option<mpsc::UnboundedSender<String>> {
        self.inner.read().await.get(&conn).cloned()
    }
}

struct ConnectionManager {
    dispatcher: Dispatcher,
    registry: SessionRegistry,
    connections: ActiveConnections,
    shutdown: watch::Receiver<bool>,
    next_id: AtomicU64,
}

/// A running relay server. [`RelayServer::stop`] is idempotent: stopping an
/// already-stopped server is a no-op.
pub struct RelayServer {
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl RelayServer {
    /// Take ownership of a bound listener and start accepting.
    pub fn start(
        listener: TcpListener,
        dispatcher: Dispatcher,
        registry: SessionRegistry,
        connections: ActiveConnections,
    ) -> Self {
        let (shutdown_tx, shutdown) = watch::channel(false);
        let manager = Arc::new(ConnectionManager {
            dispatcher,
            registry,
            connections,
            shutdown,
            next_id: AtomicU64::new(1),
        });

        let accept_task = tokio::spawn(async move { manager.run(listener).await });

        Self {
            shutdown_tx,
            accept_task,
        }
    }

    /// Close the listener and every active connection. Idempotent: stopping
    /// an already-stopped server is a no-op.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the accept loop to finish after `stop`.
    pub async fn stopped(self) {
        let _ = self.accept_task.await;
    }
}

impl ConnectionManager {
    async fn run(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let conn = self.next_id.fetch_add(1, Ordering::Relaxed);
                        info!("connection {} accepted from {}", conn, addr);
                        let manager = self.clone();
                        tokio::spawn(async move {
                            manager.handle_connection(conn, stream).await;
                        });
                    }
                    Err(e) => error!("accept failed: {}", e),
                },
                _ = shutdown.wait_for(|stopped| *stopped) => {
                    info!("listener closing");
                    break;
                }
            }
        }
        // Listener drops here; connection tasks exit via the same signal.
    }

    /// Read-decode-dispatch loop for one connection. Teardown — registry
    /// unbind plus active-set removal — runs on every exit path.
    async fn handle_connection(&self, conn: ConnId, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let mut frames = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        );
        let mut sink = FramedWrite::new(write_half, LinesCodec::new());

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        self.connections.insert(conn, tx).await;

        // Writer drains the outbound channel; it ends when the channel
        // closes (teardown removes the sender) or the peer stops reading.
        let writer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if sink.send(line).await.is_err() {
                    break;
                }
            }
        });

        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(line)) => {
                        if let Some(reply) = self.dispatcher.dispatch(conn, &line).await {
                            match self.connections.sender(conn).await {
                                Some(tx) => {
                                    let _ = tx.send(reply);
                                }
                                None => break,
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!("connection {}: read failed: {}", conn, e);
                        break;
                    }
                    None => {
                        debug!("connection {}: peer closed", conn);
                        break;
                    }
                },
                _ = async { let _ = shutdown.wait_for(|stopped| *stopped).await; } => {
                    debug!("connection {}: server shutting down", conn);
                    break;
                }
            }
        }

        self.registry.unbind(conn).await;
        self.connections.remove(conn).await;
        let _ = writer.await;
        info!("connection {} closed", conn);
    }
}
