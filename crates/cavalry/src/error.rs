//! Unified error type for the Cavalry lobby.

use cavalry_lobby::LobbyError;
use cavalry_protocol::ProtocolError;
use cavalry_relay::RelayError;
use cavalry_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Every [`LobbyService`](crate::LobbyService) operation returns this, and
/// the same failure is also published as a
/// [`LobbyEvent::Error`](cavalry_lobby::LobbyEvent::Error).
#[derive(Debug, thiserror::Error)]
pub enum CavalryError {
    /// A transport-level error (bind, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unexpected message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The relay could not create, resolve or release an allocation.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The room rejected the operation (full, not ready, not host...).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// Create or join while already hosting, joined or connecting.
    #[error("already in a room")]
    AlreadyInRoom,

    /// A room operation while not in a room.
    #[error("not in a room")]
    NotInRoom,

    /// The join code is not in the expected format.
    #[error("malformed join code: {0:?}")]
    InvalidJoinCode(String),

    /// The host answered the join with an error.
    #[error("host refused to seat us: {message} (code {code})")]
    Refused { code: u16, message: String },

    /// The host did not answer in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The connection to the host dropped mid-operation.
    #[error("connection to host lost")]
    ConnectionLost,

    /// The user left (or started another create/join) while this one was
    /// still in flight. Whatever it built has been torn down.
    #[error("lobby operation superseded by a newer one")]
    Superseded,
}
