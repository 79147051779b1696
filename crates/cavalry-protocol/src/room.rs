//! Room data model: the values the host replicates to every participant.
//!
//! Everything here is a plain value type. The host owns the only mutable
//! copy; guests only ever see whole [`RoomSnapshot`]s.

use serde::{Deserialize, Serialize};

use crate::{ClientId, PlayerId};

/// Number of seats in every room. Slot indices are `0..ROSTER_CAPACITY`.
pub const ROSTER_CAPACITY: usize = 8;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// The match rules a room is configured for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "PascalCase")]
pub enum GameMode {
    /// Every rider for themselves.
    #[default]
    FreeForAll,
    /// Two teams, most kills wins.
    TeamDeathmatch,
    /// Two teams, attackers against a defended keep.
    Siege,
}

impl GameMode {
    /// Returns `true` if players are split into teams.
    pub fn is_team_mode(&self) -> bool {
        matches!(self, Self::TeamDeathmatch | Self::Siege)
    }

    /// Number of teams a roster is balanced across.
    pub fn team_count(&self) -> u8 {
        if self.is_team_mode() { 2 } else { 1 }
    }
}

/// Skill level of a computer-controlled rider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "PascalCase")]
pub enum AiDifficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl std::fmt::Display for AiDifficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Easy => write!(f, "Easy"),
            Self::Normal => write!(f, "Normal"),
            Self::Hard => write!(f, "Hard"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// Room-wide configuration. Replicated as one atomic value; only the host
/// may change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    /// Display name shown in the lobby.
    pub room_name: String,

    /// Match rules.
    pub game_mode: GameMode,

    /// Seats open for this room, at most [`ROSTER_CAPACITY`].
    pub max_players: u8,

    /// Map the match will load.
    pub map_name: String,

    /// Match length in seconds.
    pub match_duration_secs: u32,

    /// Kills (or captures) needed to win early. 0 disables the limit.
    pub score_limit: u32,

    /// Whether teammates can damage each other.
    pub friendly_fire: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            room_name: "Cavalry Room".to_string(),
            game_mode: GameMode::FreeForAll,
            max_players: ROSTER_CAPACITY as u8,
            map_name: "Plains".to_string(),
            match_duration_secs: 600,
            score_limit: 20,
            friendly_fire: false,
        }
    }
}

impl RoomSettings {
    /// Checks the settings are usable, returning a reason if not.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_players == 0
            || usize::from(self.max_players) > ROSTER_CAPACITY
        {
            return Err(format!(
                "max_players must be between 1 and {ROSTER_CAPACITY}, got {}",
                self.max_players
            ));
        }
        if self.room_name.trim().is_empty() {
            return Err("room_name must not be empty".into());
        }
        if self.map_name.trim().is_empty() {
            return Err("map_name must not be empty".into());
        }
        Ok(())
    }

    /// Number of seats usable under these settings.
    pub fn seat_limit(&self) -> usize {
        usize::from(self.max_players).min(ROSTER_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// PlayerSlot
// ---------------------------------------------------------------------------

/// One seat in the room roster.
///
/// A slot is either empty (`player_id == 0`), held by a human
/// (`player_id > 0`) or held by an AI rider (`player_id < 0`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlot {
    /// Position in the roster. Stable for the lifetime of the room.
    pub slot_index: u8,
    pub player_id: PlayerId,
    pub player_name: String,
    pub is_ready: bool,
    pub team_index: u8,
    /// Only meaningful for AI slots.
    pub ai_difficulty: AiDifficulty,
    /// Name of the avatar preset the player picked. Empty means default.
    pub customization_preset: String,
}

impl PlayerSlot {
    /// Creates an empty slot at the given index.
    pub fn empty(slot_index: u8) -> Self {
        Self {
            slot_index,
            player_id: PlayerId::EMPTY,
            player_name: String::new(),
            is_ready: false,
            team_index: 0,
            ai_difficulty: AiDifficulty::default(),
            customization_preset: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.player_id.is_empty()
    }

    pub fn is_ai(&self) -> bool {
        self.player_id.is_ai()
    }

    pub fn is_human(&self) -> bool {
        self.player_id.is_human()
    }

    /// Resets the slot back to empty, keeping its index.
    pub fn clear(&mut self) {
        *self = Self::empty(self.slot_index);
    }
}

// ---------------------------------------------------------------------------
// RoomSnapshot
// ---------------------------------------------------------------------------

/// The whole replicated room state at one version.
///
/// The host sends one after every mutation. Receivers apply snapshots in
/// version order and ignore anything older than what they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Monotonic version, bumped by every accepted mutation.
    pub version: u64,
    pub settings: RoomSettings,
    pub slots: Vec<PlayerSlot>,
}

impl RoomSnapshot {
    /// Finds the slot owned by `player_id`, if any.
    pub fn find(&self, player_id: PlayerId) -> Option<&PlayerSlot> {
        if player_id.is_empty() {
            return None;
        }
        self.slots.iter().find(|s| s.player_id == player_id)
    }

    /// Number of occupied seats.
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }
}

// ---------------------------------------------------------------------------
// LobbyPlayerInfo
// ---------------------------------------------------------------------------

/// The local participant's own identity. Never replicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyPlayerInfo {
    pub client_id: ClientId,
    pub display_name: String,
    pub is_host: bool,
}

impl LobbyPlayerInfo {
    /// The roster identifier this participant's slot carries.
    pub fn player_id(&self) -> PlayerId {
        PlayerId::from(self.client_id)
    }
}
