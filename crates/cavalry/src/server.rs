//! Host side: the accept loop and the state every connection task shares.
//!
//! The [`LobbyManager`] and the outbound queues live behind one lock, so the
//! broadcasts produced by a mutation are queued before the next mutation
//! can run. Guests therefore see snapshots in version order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cavalry_lobby::{Effects, LobbyError, LobbyEvent, LobbyManager};
use cavalry_protocol::{
    ClientId, ClientRequest, Codec, Envelope, JsonCodec, RoomSnapshot,
    ServerBroadcast,
};
use cavalry_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::time::Instant;

use crate::handler::{handle_connection, send_broadcast};
use crate::LobbyConfig;

/// What a connection task should do next.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// Write this already-encoded envelope.
    Frame(Vec<u8>),
    /// Everything before this has been written; close the connection.
    Close,
}

pub(crate) type PeerSender = mpsc::UnboundedSender<Outbound>;

pub(crate) struct HostInner {
    pub(crate) manager: LobbyManager,
    peers: HashMap<ClientId, PeerSender>,
    closed: bool,
}

/// Shared host state passed to each connection task.
pub(crate) struct HostShared {
    inner: Mutex<HostInner>,
    events: broadcast::Sender<LobbyEvent>,
    pub(crate) codec: JsonCodec,
    pub(crate) config: LobbyConfig,
    clock: Instant,
    seq: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl HostShared {
    pub(crate) fn new(
        manager: LobbyManager,
        events: broadcast::Sender<LobbyEvent>,
        config: LobbyConfig,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            inner: Mutex::new(HostInner {
                manager,
                peers: HashMap::new(),
                closed: false,
            }),
            events,
            codec: JsonCodec,
            config,
            clock: Instant::now(),
            seq: AtomicU64::new(1),
            shutdown,
        })
    }

    /// Milliseconds since the host started.
    pub(crate) fn now_ms(&self) -> u64 {
        u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn encode(&self, msg: ServerBroadcast) -> Option<Vec<u8>> {
        let envelope = Envelope::broadcast(self.next_seq(), self.now_ms(), msg);
        match self.codec.encode(&envelope) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode broadcast");
                None
            }
        }
    }

    /// Runs a manager operation and carries out its effects under the
    /// same lock.
    pub(crate) async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut LobbyManager) -> Result<(T, Effects), LobbyError>,
    ) -> Result<T, LobbyError> {
        let mut inner = self.inner.lock().await;
        let (value, fx) = op(&mut inner.manager)?;
        self.dispatch(&mut inner, fx);
        Ok(value)
    }

    pub(crate) async fn snapshot(&self) -> RoomSnapshot {
        self.inner.lock().await.manager.snapshot()
    }

    /// Registers a freshly accepted connection.
    ///
    /// Returns `None` when the host is closing or already at
    /// `max_connections`.
    async fn admit(&self) -> Option<(ClientId, mpsc::UnboundedReceiver<Outbound>)> {
        let mut inner = self.inner.lock().await;
        if inner.closed || inner.manager.client_count() >= self.config.max_connections {
            return None;
        }
        let client = inner.manager.allocate_client_id();
        let (tx, rx) = mpsc::unbounded_channel();
        inner.peers.insert(client, tx);
        let fx = inner.manager.on_client_connected(client);
        self.dispatch(&mut inner, fx);
        Some((client, rx))
    }

    /// Applies a guest request. Returns whether the guest holds a seat
    /// afterwards.
    pub(crate) async fn handle_request(&self, client: ClientId, request: ClientRequest) -> bool {
        let mut inner = self.inner.lock().await;
        let fx = inner.manager.handle_request(client, request);
        self.dispatch(&mut inner, fx);
        inner.manager.is_seated(client)
    }

    /// Forgets a connection whose task has ended.
    pub(crate) async fn on_disconnected(&self, client: ClientId) {
        let mut inner = self.inner.lock().await;
        inner.peers.remove(&client);
        let fx = inner.manager.on_client_disconnected(client);
        self.dispatch(&mut inner, fx);
    }

    /// Tells every guest the room is closing and stops accepting.
    pub(crate) async fn close(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.closed = true;
            let fx = inner.manager.close_room();
            self.dispatch(&mut inner, fx);
        }
        self.shutdown.send_replace(true);
    }

    fn dispatch(&self, inner: &mut HostInner, fx: Effects) {
        for (to, msg) in fx.outbound {
            let Some(bytes) = self.encode(msg) else {
                continue;
            };
            for (client, peer) in &inner.peers {
                if to.includes(*client) {
                    // A closed queue means the task is already exiting.
                    let _ = peer.send(Outbound::Frame(bytes.clone()));
                }
            }
        }

        for event in fx.events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }

        for client in fx.disconnect {
            if let Some(peer) = inner.peers.remove(&client) {
                let _ = peer.send(Outbound::Close);
            }
        }
    }
}

/// Accepts guests until the host closes the room.
pub(crate) async fn run_accept_loop(mut transport: WebSocketTransport, host: Arc<HostShared>) {
    let mut shutdown = host.shutdown.subscribe();
    tracing::info!(addr = ?transport.local_addr().ok(), "lobby host accepting guests");

    loop {
        let conn = tokio::select! {
            _ = shutdown.wait_for(|closed| *closed) => break,
            accepted = transport.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    continue;
                }
            },
        };

        let Some((client, outbound)) = host.admit().await else {
            tracing::warn!(conn_id = %conn.id(), "connection limit reached, refusing");
            let host = Arc::clone(&host);
            tokio::spawn(async move { refuse(conn, &host).await });
            continue;
        };

        let host = Arc::clone(&host);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(conn, client, outbound, host).await {
                tracing::debug!(%client, error = %e, "connection ended with error");
            }
        });
    }

    if let Err(e) = transport.shutdown().await {
        tracing::debug!(error = %e, "transport shutdown failed");
    }
    tracing::info!("lobby host stopped accepting");
}

async fn refuse(conn: WebSocketConnection, host: &HostShared) {
    let full = LobbyError::RoomFull;
    let msg = ServerBroadcast::Error {
        code: full.code(),
        message: full.to_string(),
    };
    if let Err(e) = send_broadcast(&conn, host, msg).await {
        tracing::debug!(error = %e, "failed to tell refused client");
    }
    let _ = conn.close().await;
}
