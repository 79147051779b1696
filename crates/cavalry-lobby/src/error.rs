//! Error types for the lobby layer.

use cavalry_protocol::{ClientId, PlayerId};

/// Errors that can occur while mutating the room.
///
/// Every variant is raised before any state changes, so a failed operation
/// never leaves a partially-updated roster behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// No free seat below the room's player limit.
    #[error("room is full")]
    RoomFull,

    /// The identifier already owns a seat.
    #[error("player {0} already has a seat")]
    AlreadySeated(PlayerId),

    /// The identifier owns no seat.
    #[error("player {0} is not in the room")]
    NotInRoom(PlayerId),

    /// The slot index is past the end of the roster.
    #[error("slot {0} does not exist")]
    SlotOutOfRange(usize),

    /// The operation needs an AI slot and this one isn't.
    #[error("slot {0} is not an AI player")]
    NotAi(usize),

    /// The operation needs an occupied slot.
    #[error("slot {0} is empty")]
    SlotEmpty(usize),

    /// Kick targets must be human guests.
    #[error("player {0} is not a human guest")]
    NotHuman(PlayerId),

    /// The host can't kick itself.
    #[error("the host cannot be kicked")]
    CannotKickHost,

    /// A host-only operation was requested by someone else.
    #[error("client {0} is not the host")]
    NotHost(ClientId),

    /// Start was requested while some humans are not ready.
    #[error("not all players are ready: waiting for {}", .waiting.join(", "))]
    NotAllReady { waiting: Vec<String> },

    /// The team index is outside the current game mode's teams.
    #[error("team {0} does not exist in this game mode")]
    InvalidTeam(u8),

    /// The requested settings can't be applied.
    #[error("invalid room settings: {0}")]
    InvalidSettings(String),

    /// The display name is empty or too long.
    #[error("invalid player name: {0}")]
    InvalidName(String),

    /// The customization preset name is too long.
    #[error("invalid customization preset: {0}")]
    InvalidPreset(String),

    /// The guest speaks a different protocol version.
    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },
}

impl LobbyError {
    /// HTTP-style status code carried in error broadcasts.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotHost(_) => 403,
            Self::NotInRoom(_) => 404,
            Self::RoomFull | Self::AlreadySeated(_) | Self::NotAllReady { .. } => 409,
            Self::VersionMismatch { .. } => 426,
            _ => 400,
        }
    }
}
