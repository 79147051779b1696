//! Guest side: the link to a host, its handshake and background tasks.
//!
//! The handshake runs inline in `join_room`:
//!   1. Connect → wait for `Welcome` (our `ClientId`)
//!   2. Send `SubmitName`
//!   3. Read until a snapshot shows us seated
//!
//! After that a reader task turns host broadcasts into [`LobbyEvent`]s and
//! a heartbeat task keeps the connection from idling out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cavalry_lobby::{LobbyEvent, RoomMirror};
use cavalry_protocol::{
    ClientId, ClientRequest, Codec, Envelope, JsonCodec, Payload, PlayerId,
    ProtocolError, RoomSnapshot, ServerBroadcast, PROTOCOL_VERSION,
};
use cavalry_transport::{Connection, WebSocketConnection};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::service::Shared;
use crate::CavalryError;

/// A seated guest's connection to the host.
pub(crate) struct GuestLink {
    conn: WebSocketConnection,
    codec: JsonCodec,
    client_id: ClientId,
    seq: AtomicU64,
    clock: Instant,
    mirror: Mutex<RoomMirror>,
}

impl GuestLink {
    /// Dials the host and runs the join handshake.
    ///
    /// Resolves once the host's snapshot lists our seat.
    pub(crate) async fn join(
        url: &str,
        name: &str,
        handshake_timeout: Duration,
    ) -> Result<Self, CavalryError> {
        let conn = WebSocketConnection::connect(url).await?;
        let mut link = Self {
            conn,
            codec: JsonCodec,
            client_id: ClientId(0),
            seq: AtomicU64::new(1),
            clock: Instant::now(),
            mirror: Mutex::new(RoomMirror::new()),
        };

        match tokio::time::timeout(handshake_timeout, link.handshake(name)).await {
            Ok(Ok(())) => Ok(link),
            Ok(Err(e)) => {
                let _ = link.conn.close().await;
                Err(e)
            }
            Err(_) => {
                let _ = link.conn.close().await;
                Err(CavalryError::Timeout("the host to seat us"))
            }
        }
    }

    async fn handshake(&mut self, name: &str) -> Result<(), CavalryError> {
        self.client_id = loop {
            match self.recv().await? {
                ServerBroadcast::Welcome {
                    client_id,
                    protocol_version,
                } => {
                    if protocol_version != PROTOCOL_VERSION {
                        return Err(CavalryError::Refused {
                            code: 426,
                            message: format!(
                                "host speaks protocol {protocol_version}, we speak {PROTOCOL_VERSION}"
                            ),
                        });
                    }
                    break client_id;
                }
                other => Self::fail_on_terminal(other)?,
            }
        };
        tracing::debug!(client_id = %self.client_id, "welcomed by host");

        self.send(ClientRequest::SubmitName {
            protocol_version: PROTOCOL_VERSION,
            name: name.to_string(),
        })
        .await?;

        let me = PlayerId::from(self.client_id);
        loop {
            match self.recv().await? {
                ServerBroadcast::Snapshot(snapshot) => {
                    let seated = snapshot.find(me).is_some();
                    self.mirror.get_mut().apply(snapshot);
                    if seated {
                        return Ok(());
                    }
                }
                other => Self::fail_on_terminal(other)?,
            }
        }
    }

    /// Turns handshake-time messages that end the attempt into errors.
    fn fail_on_terminal(msg: ServerBroadcast) -> Result<(), CavalryError> {
        match msg {
            ServerBroadcast::Error { code, message } => Err(CavalryError::Refused { code, message }),
            ServerBroadcast::Kicked { reason } => Err(CavalryError::Refused {
                code: 403,
                message: reason,
            }),
            ServerBroadcast::RoomClosed => Err(CavalryError::ConnectionLost),
            _ => Ok(()),
        }
    }

    pub(crate) fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub(crate) async fn snapshot(&self) -> Option<RoomSnapshot> {
        self.mirror.lock().await.snapshot().cloned()
    }

    pub(crate) async fn send(&self, request: ClientRequest) -> Result<(), CavalryError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope::request(seq, self.now_ms(), request);
        let bytes = self.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    /// Receives the next broadcast. A closed connection is an error here.
    async fn recv(&self) -> Result<ServerBroadcast, CavalryError> {
        let data = self.conn.recv().await?.ok_or(CavalryError::ConnectionLost)?;
        let envelope = self.codec.decode_envelope(&data)?;
        match envelope.payload {
            Payload::Broadcast(msg) => Ok(msg),
            Payload::Request(_) => Err(ProtocolError::InvalidMessage(
                "host sent a request".into(),
            )
            .into()),
        }
    }

    /// Tells the host we're leaving and closes the socket.
    pub(crate) async fn leave(&self) {
        if let Err(e) = self.send(ClientRequest::Leave).await {
            tracing::debug!(error = %e, "failed to send leave");
        }
        let _ = self.conn.close().await;
        self.mirror.lock().await.clear();
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Reads host broadcasts until the connection ends.
///
/// When the host ends the session (kick, close, drop) the service is put
/// back to "not in a room", unless a newer session replaced this one.
pub(crate) async fn run_reader(link: Arc<GuestLink>, shared: Arc<Shared>, epoch: u64) {
    let ending = loop {
        let msg = match link.recv().await {
            Ok(msg) => msg,
            Err(CavalryError::Protocol(e)) => {
                tracing::debug!(error = %e, "ignoring undecodable frame");
                continue;
            }
            Err(e) => {
                tracing::info!(error = %e, "connection to host ended");
                break LobbyEvent::RoomClosed;
            }
        };

        let mut mirror = link.mirror.lock().await;
        let outcome = translate(msg, &mut mirror);
        drop(mirror);

        for event in outcome.events {
            shared.emit(event);
        }
        if let Some(ending) = outcome.ending {
            break ending;
        }
    };

    if shared.end_guest_session(epoch).await {
        shared.emit(ending);
        let _ = link.conn.close().await;
    }
}

/// Sends a heartbeat every `interval` until the connection fails.
pub(crate) async fn run_heartbeat(link: Arc<GuestLink>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let client_time = link.now_ms();
        if let Err(e) = link.send(ClientRequest::Heartbeat { client_time }).await {
            tracing::debug!(error = %e, "heartbeat failed, stopping");
            break;
        }
    }
}

/// What one broadcast means for a guest.
#[derive(Debug, Default, PartialEq, Eq)]
struct Outcome {
    events: Vec<LobbyEvent>,
    /// Set when the host ended our session; emitted after cleanup.
    ending: Option<LobbyEvent>,
}

fn translate(msg: ServerBroadcast, mirror: &mut RoomMirror) -> Outcome {
    let mut out = Outcome::default();
    match msg {
        ServerBroadcast::Snapshot(snapshot) => {
            let previous = mirror.snapshot().map(|s| s.settings.clone());
            let version = snapshot.version;
            let settings = snapshot.settings.clone();
            if mirror.apply(snapshot) {
                if previous.is_some_and(|p| p != settings) {
                    out.events.push(LobbyEvent::SettingsChanged { settings });
                }
                out.events.push(LobbyEvent::RosterChanged { version });
            }
        }
        ServerBroadcast::PlayerJoined { slot } => {
            out.events.push(LobbyEvent::PlayerJoined { slot });
        }
        ServerBroadcast::PlayerLeft {
            slot_index,
            player_id,
            name,
        } => {
            out.events.push(LobbyEvent::PlayerLeft {
                slot_index,
                player_id,
                name,
            });
        }
        ServerBroadcast::MatchStarting { settings } => {
            out.events.push(LobbyEvent::MatchStarting { settings });
        }
        ServerBroadcast::Kicked { reason } => {
            tracing::info!(%reason, "kicked by host");
            out.ending = Some(LobbyEvent::Kicked { reason });
        }
        ServerBroadcast::RoomClosed => {
            tracing::info!("host closed the room");
            out.ending = Some(LobbyEvent::RoomClosed);
        }
        ServerBroadcast::Error { code, message } => {
            tracing::warn!(code, %message, "host rejected a request");
            out.events.push(LobbyEvent::Error { message });
        }
        ServerBroadcast::HeartbeatAck { server_time, .. } => {
            tracing::trace!(server_time, "heartbeat acknowledged");
        }
        ServerBroadcast::Welcome { .. } => {
            tracing::debug!("ignoring repeated welcome");
        }
    }
    out
}
