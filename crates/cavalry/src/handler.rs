//! Per-connection handler on the host.
//!
//! Each admitted guest gets its own Tokio task running this handler. The
//! task owns the socket and multiplexes three things:
//!   1. Frames from the guest → decode → hand to the lobby manager
//!   2. Queued broadcasts for this guest → write to the socket
//!   3. A deadline: the handshake timeout until the guest is seated, then
//!      the idle timeout since the last frame it sent
//!
//! Whatever ends the loop, including a failed write, the guest's seat is
//! released afterwards. Nothing inside the loop may return early.

use std::sync::Arc;

use cavalry_protocol::{ClientId, ClientRequest, Codec, Payload, ServerBroadcast};
use cavalry_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::server::{HostShared, Outbound};
use crate::CavalryError;

/// Handles a single guest connection from admission to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    client: ClientId,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    host: Arc<HostShared>,
) -> Result<(), CavalryError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, %client, "handling new connection");

    let connected_at = Instant::now();
    let mut last_seen = connected_at;
    let mut seated = false;

    let result = loop {
        let deadline = if seated {
            last_seen + host.config.idle_timeout
        } else {
            connected_at + host.config.handshake_timeout
        };

        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(Outbound::Frame(bytes)) => {
                    if let Err(e) = conn.send(&bytes).await {
                        break Err(CavalryError::Transport(e));
                    }
                }
                Some(Outbound::Close) | None => {
                    tracing::debug!(%client, "closing connection on host request");
                    break Ok(());
                }
            },

            frame = conn.recv() => match frame {
                Ok(Some(data)) => {
                    last_seen = Instant::now();
                    match on_frame(&conn, &host, client, &data).await {
                        Ok(Some(now_seated)) => seated = now_seated,
                        Ok(None) => {}
                        Err(e) => break Err(e),
                    }
                }
                Ok(None) => {
                    tracing::info!(%client, "connection closed by guest");
                    break Ok(());
                }
                Err(e) => break Err(CavalryError::Transport(e)),
            },

            _ = tokio::time::sleep_until(deadline) => {
                if seated {
                    tracing::info!(%client, "connection timed out");
                } else {
                    tracing::info!(%client, "guest never submitted a name");
                }
                break Ok(());
            }
        }
    };

    let _ = conn.close().await;
    host.on_disconnected(client).await;
    result
}

/// Handles one frame from the guest.
///
/// Returns the guest's seated state if the frame was a room request, and
/// `None` for heartbeats and rejected frames.
async fn on_frame(
    conn: &WebSocketConnection,
    host: &HostShared,
    client: ClientId,
    data: &[u8],
) -> Result<Option<bool>, CavalryError> {
    let envelope = match host.codec.decode_envelope(data) {
        Ok(env) => env,
        Err(e) => {
            tracing::debug!(%client, error = %e, "failed to decode envelope");
            send_error(conn, host, 400, &format!("invalid message: {e}")).await?;
            return Ok(None);
        }
    };

    match envelope.payload {
        Payload::Request(ClientRequest::Heartbeat { client_time }) => {
            let ack = ServerBroadcast::HeartbeatAck {
                client_time,
                server_time: host.now_ms(),
            };
            send_broadcast(conn, host, ack).await?;
            Ok(None)
        }
        Payload::Request(request) => {
            tracing::debug!(%client, seq = envelope.seq, ?request, "request received");
            Ok(Some(host.handle_request(client, request).await))
        }
        Payload::Broadcast(_) => {
            send_error(conn, host, 400, "guests may only send requests").await?;
            Ok(None)
        }
    }
}

/// Encodes and writes one broadcast straight to a connection, bypassing
/// the room's outbound queues.
pub(crate) async fn send_broadcast(
    conn: &WebSocketConnection,
    host: &HostShared,
    msg: ServerBroadcast,
) -> Result<(), CavalryError> {
    let Some(bytes) = host.encode(msg) else {
        return Ok(());
    };
    conn.send(&bytes).await?;
    Ok(())
}

/// Sends a ServerBroadcast::Error to the guest.
async fn send_error(
    conn: &WebSocketConnection,
    host: &HostShared,
    code: u16,
    message: &str,
) -> Result<(), CavalryError> {
    send_broadcast(
        conn,
        host,
        ServerBroadcast::Error {
            code,
            message: message.to_string(),
        },
    )
    .await
}
