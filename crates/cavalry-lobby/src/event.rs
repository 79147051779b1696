//! Observable lobby notifications.

use cavalry_protocol::{ClientId, JoinCode, PlayerId, PlayerSlot, RoomSettings};

/// Something that happened in the lobby, as seen by the local participant.
///
/// Delivered to subscribers in the order it happened. Failures are
/// reported as [`LobbyEvent::Error`] in addition to the `Result` the
/// failing call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyEvent {
    /// We are hosting a new room reachable through `join_code`.
    RoomCreated { join_code: JoinCode },

    /// We joined someone else's room and hold a seat in it.
    RoomJoined { join_code: JoinCode, client_id: ClientId },

    /// We left the room on our own.
    RoomLeft,

    /// The host closed the room (or the connection to it was lost).
    RoomClosed,

    /// A human took a seat.
    PlayerJoined { slot: PlayerSlot },

    /// A human's seat was cleared.
    PlayerLeft {
        slot_index: u8,
        player_id: PlayerId,
        name: String,
    },

    /// The roster reached a new version.
    RosterChanged { version: u64 },

    /// The host changed the room settings.
    SettingsChanged { settings: RoomSettings },

    /// The host started the match.
    MatchStarting { settings: RoomSettings },

    /// We were removed from the room by the host.
    Kicked { reason: String },

    /// An operation failed.
    Error { message: String },
}

impl LobbyEvent {
    /// Builds an [`Error`](Self::Error) event from anything displayable.
    pub fn error(err: impl std::fmt::Display) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}
