//! Server-authoritative room state and its client-side mirror.
//!
//! [`RoomData`] lives on the host and is the only place room state is ever
//! written. Every accepted mutation bumps the version, and the host ships
//! the result as a [`RoomSnapshot`]. Guests keep a [`RoomMirror`] that only
//! moves forward.

use cavalry_protocol::{
    AiDifficulty, PlayerId, PlayerSlot, RoomSettings, RoomSnapshot,
};

use crate::roster::Roster;
use crate::LobbyError;

/// The authoritative copy of a room: settings, roster and version.
#[derive(Debug, Clone)]
pub struct RoomData {
    settings: RoomSettings,
    roster: Roster,
    version: u64,
}

impl RoomData {
    /// Creates a room with an empty roster at version 0.
    pub fn new(settings: RoomSettings) -> Result<Self, LobbyError> {
        settings.validate().map_err(LobbyError::InvalidSettings)?;
        Ok(Self {
            settings,
            roster: Roster::new(),
            version: 0,
        })
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Captures the current state for replication.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            version: self.version,
            settings: self.settings.clone(),
            slots: self.roster.slots().to_vec(),
        }
    }

    // -- Mutations --------------------------------------------------------
    //
    // Each wrapper forwards to the roster and bumps the version only when
    // the roster accepted the change.

    pub fn join(
        &mut self,
        player_id: PlayerId,
        name: &str,
    ) -> Result<PlayerSlot, LobbyError> {
        let slot = self.roster.join(player_id, name, &self.settings)?;
        self.bump();
        Ok(slot)
    }

    /// Clears a human seat. `None` (and no version bump) if there was none.
    pub fn leave(&mut self, player_id: PlayerId) -> Option<PlayerSlot> {
        let slot = self.roster.leave(player_id)?;
        self.bump();
        Some(slot)
    }

    pub fn set_ready(
        &mut self,
        player_id: PlayerId,
        ready: bool,
    ) -> Result<PlayerSlot, LobbyError> {
        let slot = self.roster.set_ready(player_id, ready)?;
        self.bump();
        Ok(slot)
    }

    pub fn set_customization(
        &mut self,
        player_id: PlayerId,
        preset: &str,
    ) -> Result<PlayerSlot, LobbyError> {
        let slot = self.roster.set_customization(player_id, preset)?;
        self.bump();
        Ok(slot)
    }

    pub fn add_ai(
        &mut self,
        difficulty: AiDifficulty,
        team: u8,
    ) -> Result<PlayerSlot, LobbyError> {
        let slot = self.roster.add_ai(difficulty, team, &self.settings)?;
        self.bump();
        Ok(slot)
    }

    pub fn remove_ai(&mut self, index: usize) -> Result<PlayerSlot, LobbyError> {
        let slot = self.roster.remove_ai(index)?;
        self.bump();
        Ok(slot)
    }

    pub fn set_ai_difficulty(
        &mut self,
        index: usize,
        difficulty: AiDifficulty,
    ) -> Result<PlayerSlot, LobbyError> {
        let slot = self.roster.set_ai_difficulty(index, difficulty)?;
        self.bump();
        Ok(slot)
    }

    pub fn set_team(&mut self, index: usize, team: u8) -> Result<PlayerSlot, LobbyError> {
        let teams = self.settings.game_mode.team_count();
        let slot = self.roster.set_team(index, team, teams)?;
        self.bump();
        Ok(slot)
    }

    /// Replaces the room settings.
    ///
    /// Rejected if the settings are invalid or if `max_players` would cut
    /// off an occupied seat. Team indices that no longer exist under the
    /// new game mode fall back to team 0.
    pub fn update_settings(&mut self, settings: RoomSettings) -> Result<(), LobbyError> {
        settings.validate().map_err(LobbyError::InvalidSettings)?;
        let extent = self.roster.occupied_extent();
        if settings.seat_limit() < extent {
            return Err(LobbyError::InvalidSettings(format!(
                "max_players {} is below occupied seat {}",
                settings.max_players, extent
            )));
        }

        if settings.game_mode != self.settings.game_mode {
            self.roster.clamp_teams(settings.game_mode.team_count());
        }
        self.settings = settings;
        self.bump();
        Ok(())
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

/// A guest's read-only copy of the room, fed by host snapshots.
#[derive(Debug, Clone, Default)]
pub struct RoomMirror {
    current: Option<RoomSnapshot>,
}

impl RoomMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a snapshot if it is newer than the one held.
    ///
    /// Returns `false` for stale or duplicate versions, which are dropped.
    pub fn apply(&mut self, snapshot: RoomSnapshot) -> bool {
        if let Some(current) = &self.current {
            if snapshot.version <= current.version {
                tracing::trace!(
                    held = current.version,
                    received = snapshot.version,
                    "dropping stale snapshot"
                );
                return false;
            }
        }
        self.current = Some(snapshot);
        true
    }

    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        self.current.as_ref()
    }

    pub fn version(&self) -> Option<u64> {
        self.current.as_ref().map(|s| s.version)
    }

    /// Forgets everything, for when the guest leaves the room.
    pub fn clear(&mut self) {
        self.current = None;
    }
}
