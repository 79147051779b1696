//! The room roster: a fixed-capacity, index-stable list of seats.
//!
//! Each slot moves through a small state machine:
//!
//! ```text
//!          join                set_ready(true)
//! Empty ─────────→ Human(NotReady) ⇄ Human(Ready)
//!   ↑  ←───────────────┴───────────────┘  leave / kick
//!   │
//!   │  add_ai               set_ai_difficulty
//!   └────────→ AI(difficulty) ⟲
//!   ←──────────────┘ remove_ai
//! ```
//!
//! Every failing operation returns before touching any slot.

use cavalry_protocol::{
    AiDifficulty, PlayerId, PlayerSlot, RoomSettings, ROSTER_CAPACITY,
};

use crate::LobbyError;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 24;

/// Trims a display name and checks it is usable.
pub fn validate_player_name(name: &str) -> Result<String, LobbyError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LobbyError::InvalidName("name must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(LobbyError::InvalidName(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Longest accepted customization preset name, in characters.
pub const MAX_PRESET_LEN: usize = 32;

/// Trims a customization preset name and checks its length. An empty
/// preset means "default look".
pub fn validate_preset(preset: &str) -> Result<String, LobbyError> {
    let trimmed = preset.trim();
    if trimmed.chars().count() > MAX_PRESET_LEN {
        return Err(LobbyError::InvalidPreset(format!(
            "preset must be at most {MAX_PRESET_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// The seats of one room.
#[derive(Debug, Clone)]
pub struct Roster {
    slots: Vec<PlayerSlot>,
    /// Next synthetic AI identifier. Only ever decreases, so AI ids are
    /// never reused within a room.
    next_ai_id: i64,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    /// Creates a roster of [`ROSTER_CAPACITY`] empty seats.
    pub fn new() -> Self {
        Self {
            slots: (0..ROSTER_CAPACITY as u8).map(PlayerSlot::empty).collect(),
            next_ai_id: -1,
        }
    }

    pub fn slots(&self) -> &[PlayerSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&PlayerSlot> {
        self.slots.get(index)
    }

    /// Finds the seat owned by `player_id`. Empty ids never match.
    pub fn find(&self, player_id: PlayerId) -> Option<&PlayerSlot> {
        self.position(player_id).map(|i| &self.slots[i])
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    pub fn human_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_human()).count()
    }

    pub fn ai_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_ai()).count()
    }

    /// Index one past the highest occupied seat (0 if the room is empty).
    pub fn occupied_extent(&self) -> usize {
        self.slots
            .iter()
            .rposition(|s| !s.is_empty())
            .map_or(0, |i| i + 1)
    }

    /// Returns `true` iff every occupied human seat is ready.
    /// AI seats never block.
    pub fn all_humans_ready(&self) -> bool {
        self.slots
            .iter()
            .filter(|s| s.is_human())
            .all(|s| s.is_ready)
    }

    /// Names of humans who are not ready yet, in seat order.
    pub fn waiting_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| s.is_human() && !s.is_ready)
            .map(|s| s.player_name.clone())
            .collect()
    }

    // -- Human seats ------------------------------------------------------

    /// Seats a human at the first free index below the room's player limit.
    ///
    /// In team modes the newcomer goes to the team with fewer members.
    pub fn join(
        &mut self,
        player_id: PlayerId,
        name: &str,
        settings: &RoomSettings,
    ) -> Result<PlayerSlot, LobbyError> {
        if !player_id.is_human() {
            return Err(LobbyError::NotHuman(player_id));
        }
        if self.position(player_id).is_some() {
            return Err(LobbyError::AlreadySeated(player_id));
        }
        let index = self
            .first_free(settings.seat_limit())
            .ok_or(LobbyError::RoomFull)?;
        let team = self.smallest_team(settings.game_mode.team_count());

        let slot = &mut self.slots[index];
        slot.player_id = player_id;
        slot.player_name = name.to_string();
        slot.is_ready = false;
        slot.team_index = team;
        Ok(slot.clone())
    }

    /// Clears the human seat owned by `player_id`.
    ///
    /// Returns the seat as it was before clearing, or `None` if the id owns
    /// no seat, which makes repeated leaves harmless.
    pub fn leave(&mut self, player_id: PlayerId) -> Option<PlayerSlot> {
        if !player_id.is_human() {
            return None;
        }
        let index = self.position(player_id)?;
        let previous = self.slots[index].clone();
        self.slots[index].clear();
        Some(previous)
    }

    /// Sets the ready flag on the seat owned by `player_id`.
    pub fn set_ready(
        &mut self,
        player_id: PlayerId,
        ready: bool,
    ) -> Result<PlayerSlot, LobbyError> {
        let slot = self.owned_human_mut(player_id)?;
        slot.is_ready = ready;
        Ok(slot.clone())
    }

    /// Sets the avatar preset on the seat owned by `player_id`.
    pub fn set_customization(
        &mut self,
        player_id: PlayerId,
        preset: &str,
    ) -> Result<PlayerSlot, LobbyError> {
        let preset = validate_preset(preset)?;
        let slot = self.owned_human_mut(player_id)?;
        slot.customization_preset = preset;
        Ok(slot.clone())
    }

    // -- AI seats ---------------------------------------------------------

    /// Seats an AI rider at the first free index below the player limit.
    pub fn add_ai(
        &mut self,
        difficulty: AiDifficulty,
        team: u8,
        settings: &RoomSettings,
    ) -> Result<PlayerSlot, LobbyError> {
        if team >= settings.game_mode.team_count() {
            return Err(LobbyError::InvalidTeam(team));
        }
        let index = self
            .first_free(settings.seat_limit())
            .ok_or(LobbyError::RoomFull)?;

        let player_id = PlayerId(self.next_ai_id);
        self.next_ai_id -= 1;

        let slot = &mut self.slots[index];
        slot.player_id = player_id;
        slot.player_name = format!("CPU {} ({difficulty})", -player_id.0);
        slot.is_ready = true;
        slot.team_index = team;
        slot.ai_difficulty = difficulty;
        Ok(slot.clone())
    }

    /// Clears an AI seat. Returns the seat as it was.
    pub fn remove_ai(&mut self, index: usize) -> Result<PlayerSlot, LobbyError> {
        let slot = self.ai_slot_mut(index)?;
        let previous = slot.clone();
        slot.clear();
        Ok(previous)
    }

    /// Changes an AI seat's difficulty in place.
    pub fn set_ai_difficulty(
        &mut self,
        index: usize,
        difficulty: AiDifficulty,
    ) -> Result<PlayerSlot, LobbyError> {
        let slot = self.ai_slot_mut(index)?;
        slot.ai_difficulty = difficulty;
        let ai_number = -slot.player_id.0;
        slot.player_name = format!("CPU {ai_number} ({difficulty})");
        Ok(slot.clone())
    }

    // -- Any seat ---------------------------------------------------------

    /// Moves an occupied seat to another team.
    pub fn set_team(
        &mut self,
        index: usize,
        team: u8,
        team_count: u8,
    ) -> Result<PlayerSlot, LobbyError> {
        if team >= team_count {
            return Err(LobbyError::InvalidTeam(team));
        }
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(LobbyError::SlotOutOfRange(index))?;
        if slot.is_empty() {
            return Err(LobbyError::SlotEmpty(index));
        }
        slot.team_index = team;
        Ok(slot.clone())
    }

    /// Resets team indices that no longer exist after a mode change.
    pub(crate) fn clamp_teams(&mut self, team_count: u8) {
        for slot in self.slots.iter_mut().filter(|s| !s.is_empty()) {
            if slot.team_index >= team_count {
                slot.team_index = 0;
            }
        }
    }

    // -- Helpers ----------------------------------------------------------

    fn position(&self, player_id: PlayerId) -> Option<usize> {
        if player_id.is_empty() {
            return None;
        }
        self.slots.iter().position(|s| s.player_id == player_id)
    }

    fn first_free(&self, limit: usize) -> Option<usize> {
        self.slots
            .iter()
            .take(limit)
            .position(PlayerSlot::is_empty)
    }

    fn smallest_team(&self, team_count: u8) -> u8 {
        (0..team_count)
            .min_by_key(|team| {
                self.slots
                    .iter()
                    .filter(|s| !s.is_empty() && s.team_index == *team)
                    .count()
            })
            .unwrap_or(0)
    }

    fn owned_human_mut(
        &mut self,
        player_id: PlayerId,
    ) -> Result<&mut PlayerSlot, LobbyError> {
        if !player_id.is_human() {
            return Err(LobbyError::NotInRoom(player_id));
        }
        let index = self
            .position(player_id)
            .ok_or(LobbyError::NotInRoom(player_id))?;
        Ok(&mut self.slots[index])
    }

    fn ai_slot_mut(&mut self, index: usize) -> Result<&mut PlayerSlot, LobbyError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(LobbyError::SlotOutOfRange(index))?;
        if !slot.is_ai() {
            return Err(LobbyError::NotAi(index));
        }
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cavalry_protocol::GameMode;

    fn pid(id: i64) -> PlayerId {
        PlayerId(id)
    }

    fn ffa() -> RoomSettings {
        RoomSettings::default()
    }

    fn teams() -> RoomSettings {
        RoomSettings {
            game_mode: GameMode::TeamDeathmatch,
            ..RoomSettings::default()
        }
    }

    /// Checks that no two occupied slots share an id and indices match
    /// positions.
    fn assert_roster_invariants(roster: &Roster) {
        assert_eq!(roster.slots().len(), ROSTER_CAPACITY);
        for (i, slot) in roster.slots().iter().enumerate() {
            assert_eq!(usize::from(slot.slot_index), i);
        }
        let mut ids: Vec<i64> = roster
            .slots()
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.player_id.0)
            .collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before, "duplicate player ids in roster");
    }

    // =====================================================================
    // join() / leave()
    // =====================================================================

    #[test]
    fn test_new_roster_is_all_empty() {
        let roster = Roster::new();
        assert_eq!(roster.slots().len(), ROSTER_CAPACITY);
        assert_eq!(roster.occupied_count(), 0);
        assert!(roster.all_humans_ready(), "vacuously ready");
        assert_roster_invariants(&roster);
    }

    #[test]
    fn test_join_takes_first_free_index_not_ready() {
        let mut roster = Roster::new();
        let a = roster.join(pid(1), "Host", &ffa()).unwrap();
        let b = roster.join(pid(2), "Guest", &ffa()).unwrap();

        assert_eq!(a.slot_index, 0);
        assert_eq!(b.slot_index, 1);
        assert!(!b.is_ready);
        assert_eq!(b.player_name, "Guest");
    }

    #[test]
    fn test_join_reuses_freed_index() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &ffa()).unwrap();
        roster.join(pid(2), "B", &ffa()).unwrap();
        roster.join(pid(3), "C", &ffa()).unwrap();

        roster.leave(pid(2));
        let d = roster.join(pid(4), "D", &ffa()).unwrap();
        assert_eq!(d.slot_index, 1);
        assert_eq!(roster.find(pid(3)).unwrap().slot_index, 2, "others keep their index");
    }

    #[test]
    fn test_ninth_join_fails_and_leaves_roster_unchanged() {
        let mut roster = Roster::new();
        for id in 1..=8 {
            roster.join(pid(id), &format!("P{id}"), &ffa()).unwrap();
        }
        let before = roster.slots().to_vec();

        let result = roster.join(pid(9), "Late", &ffa());

        assert_eq!(result, Err(LobbyError::RoomFull));
        assert_eq!(roster.slots(), &before[..]);
        assert_roster_invariants(&roster);
    }

    #[test]
    fn test_join_respects_max_players_setting() {
        let settings = RoomSettings {
            max_players: 2,
            ..RoomSettings::default()
        };
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &settings).unwrap();
        roster.join(pid(2), "B", &settings).unwrap();
        assert_eq!(roster.join(pid(3), "C", &settings), Err(LobbyError::RoomFull));
    }

    #[test]
    fn test_join_same_id_twice_rejected() {
        let mut roster = Roster::new();
        roster.join(pid(5), "A", &ffa()).unwrap();
        assert_eq!(
            roster.join(pid(5), "A again", &ffa()),
            Err(LobbyError::AlreadySeated(pid(5)))
        );
        assert_eq!(roster.human_count(), 1);
    }

    #[test]
    fn test_join_rejects_non_human_ids() {
        let mut roster = Roster::new();
        assert!(roster.join(PlayerId::EMPTY, "Nobody", &ffa()).is_err());
        assert!(roster.join(pid(-4), "Bot", &ffa()).is_err());
        assert_eq!(roster.occupied_count(), 0);
    }

    #[test]
    fn test_leave_unknown_id_is_noop() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &ffa()).unwrap();
        let before = roster.slots().to_vec();

        assert!(roster.leave(pid(42)).is_none());
        assert!(roster.leave(PlayerId::EMPTY).is_none());
        assert_eq!(roster.slots(), &before[..]);
    }

    #[test]
    fn test_leave_twice_second_is_noop() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &ffa()).unwrap();

        let left = roster.leave(pid(1)).expect("first leave clears slot");
        assert_eq!(left.player_name, "A");
        assert!(roster.leave(pid(1)).is_none());
        assert!(roster.slot(0).unwrap().is_empty());
    }

    #[test]
    fn test_leave_does_not_clear_ai_slots() {
        let mut roster = Roster::new();
        let ai = roster.add_ai(AiDifficulty::Easy, 0, &ffa()).unwrap();
        assert!(roster.leave(ai.player_id).is_none());
        assert_eq!(roster.ai_count(), 1);
    }

    #[test]
    fn test_join_balances_teams_in_team_mode() {
        let mut roster = Roster::new();
        let a = roster.join(pid(1), "A", &teams()).unwrap();
        let b = roster.join(pid(2), "B", &teams()).unwrap();
        let c = roster.join(pid(3), "C", &teams()).unwrap();
        assert_eq!((a.team_index, b.team_index, c.team_index), (0, 1, 0));
    }

    // =====================================================================
    // set_ready() / set_customization()
    // =====================================================================

    #[test]
    fn test_set_ready_toggles_only_owner_slot() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &ffa()).unwrap();
        roster.join(pid(2), "B", &ffa()).unwrap();

        roster.set_ready(pid(2), true).unwrap();

        assert!(!roster.find(pid(1)).unwrap().is_ready);
        assert!(roster.find(pid(2)).unwrap().is_ready);

        roster.set_ready(pid(2), false).unwrap();
        assert!(!roster.find(pid(2)).unwrap().is_ready);
    }

    #[test]
    fn test_set_ready_for_absent_player_fails() {
        let mut roster = Roster::new();
        assert_eq!(
            roster.set_ready(pid(9), true),
            Err(LobbyError::NotInRoom(pid(9)))
        );
    }

    #[test]
    fn test_set_ready_cannot_target_ai() {
        let mut roster = Roster::new();
        let ai = roster.add_ai(AiDifficulty::Normal, 0, &ffa()).unwrap();
        assert!(roster.set_ready(ai.player_id, false).is_err());
        assert!(roster.find(ai.player_id).unwrap().is_ready);
    }

    #[test]
    fn test_set_customization_trims_preset() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &ffa()).unwrap();
        let slot = roster.set_customization(pid(1), "  Knight  ").unwrap();
        assert_eq!(slot.customization_preset, "Knight");
    }

    #[test]
    fn test_set_customization_rejects_oversized_preset() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &ffa()).unwrap();
        roster.set_customization(pid(1), "Knight").unwrap();

        let huge = "x".repeat(1_000_000);
        let result = roster.set_customization(pid(1), &huge);
        assert!(matches!(result, Err(LobbyError::InvalidPreset(_))));
        assert_eq!(
            roster.find(pid(1)).unwrap().customization_preset,
            "Knight",
            "rejected preset leaves the seat untouched"
        );

        let longest = "y".repeat(MAX_PRESET_LEN);
        let slot = roster.set_customization(pid(1), &longest).unwrap();
        assert_eq!(slot.customization_preset, longest);
        assert!(roster.set_customization(pid(1), &format!("{longest}y")).is_err());
    }

    // =====================================================================
    // AI seats
    // =====================================================================

    #[test]
    fn test_add_ai_ids_strictly_decrease() {
        let mut roster = Roster::new();
        let a = roster.add_ai(AiDifficulty::Easy, 0, &ffa()).unwrap();
        let b = roster.add_ai(AiDifficulty::Hard, 0, &ffa()).unwrap();

        assert_eq!(a.player_id, pid(-1));
        assert_eq!(b.player_id, pid(-2));
        assert_eq!(a.ai_difficulty, AiDifficulty::Easy);
        assert_eq!(b.ai_difficulty, AiDifficulty::Hard);
        assert!(a.is_ready && b.is_ready);
    }

    #[test]
    fn test_ai_ids_not_reused_after_removal() {
        let mut roster = Roster::new();
        let a = roster.add_ai(AiDifficulty::Easy, 0, &ffa()).unwrap();
        roster.remove_ai(usize::from(a.slot_index)).unwrap();

        let b = roster.add_ai(AiDifficulty::Easy, 0, &ffa()).unwrap();
        assert_eq!(b.player_id, pid(-2));
        assert_eq!(b.slot_index, a.slot_index, "index is reused, id is not");
    }

    #[test]
    fn test_add_ai_when_full_fails() {
        let mut roster = Roster::new();
        for id in 1..=8 {
            roster.join(pid(id), "P", &ffa()).unwrap();
        }
        assert_eq!(
            roster.add_ai(AiDifficulty::Normal, 0, &ffa()),
            Err(LobbyError::RoomFull)
        );
    }

    #[test]
    fn test_add_ai_rejects_missing_team() {
        let mut roster = Roster::new();
        assert_eq!(
            roster.add_ai(AiDifficulty::Normal, 1, &ffa()),
            Err(LobbyError::InvalidTeam(1))
        );
        assert!(roster.add_ai(AiDifficulty::Normal, 1, &teams()).is_ok());
    }

    #[test]
    fn test_remove_ai_rejects_human_and_empty() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &ffa()).unwrap();

        assert_eq!(roster.remove_ai(0), Err(LobbyError::NotAi(0)));
        assert_eq!(roster.remove_ai(5), Err(LobbyError::NotAi(5)));
        assert_eq!(roster.remove_ai(8), Err(LobbyError::SlotOutOfRange(8)));
        assert!(roster.find(pid(1)).is_some());
    }

    #[test]
    fn test_set_ai_difficulty_in_place() {
        let mut roster = Roster::new();
        let ai = roster.add_ai(AiDifficulty::Easy, 0, &ffa()).unwrap();
        let index = usize::from(ai.slot_index);

        let updated = roster.set_ai_difficulty(index, AiDifficulty::Hard).unwrap();

        assert_eq!(updated.player_id, ai.player_id);
        assert_eq!(updated.ai_difficulty, AiDifficulty::Hard);
        assert_eq!(updated.player_name, "CPU 1 (Hard)");
    }

    #[test]
    fn test_set_ai_difficulty_rejects_human() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &ffa()).unwrap();
        assert_eq!(
            roster.set_ai_difficulty(0, AiDifficulty::Hard),
            Err(LobbyError::NotAi(0))
        );
    }

    // =====================================================================
    // Readiness and teams
    // =====================================================================

    #[test]
    fn test_all_humans_ready_ignores_ai() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &ffa()).unwrap();
        roster.add_ai(AiDifficulty::Easy, 0, &ffa()).unwrap();
        assert!(!roster.all_humans_ready());
        assert_eq!(roster.waiting_names(), vec!["A".to_string()]);

        roster.set_ready(pid(1), true).unwrap();
        assert!(roster.all_humans_ready());
        assert!(roster.waiting_names().is_empty());
    }

    #[test]
    fn test_set_team_on_empty_slot_fails() {
        let mut roster = Roster::new();
        assert_eq!(roster.set_team(3, 1, 2), Err(LobbyError::SlotEmpty(3)));
        assert_eq!(roster.set_team(0, 2, 2), Err(LobbyError::InvalidTeam(2)));
    }

    #[test]
    fn test_clamp_teams_after_mode_change() {
        let mut roster = Roster::new();
        roster.join(pid(1), "A", &teams()).unwrap();
        roster.join(pid(2), "B", &teams()).unwrap();
        assert_eq!(roster.find(pid(2)).unwrap().team_index, 1);

        roster.clamp_teams(1);
        assert_eq!(roster.find(pid(2)).unwrap().team_index, 0);
    }

    #[test]
    fn test_occupied_extent() {
        let mut roster = Roster::new();
        assert_eq!(roster.occupied_extent(), 0);
        roster.join(pid(1), "A", &ffa()).unwrap();
        roster.join(pid(2), "B", &ffa()).unwrap();
        roster.join(pid(3), "C", &ffa()).unwrap();
        roster.leave(pid(2));
        assert_eq!(roster.occupied_extent(), 3);
    }

    // =====================================================================
    // Mixed sequences
    // =====================================================================

    #[test]
    fn test_mixed_sequence_keeps_invariants() {
        let mut roster = Roster::new();
        let settings = ffa();
        for step in 0..40i64 {
            match step % 5 {
                0 | 1 => {
                    let _ = roster.join(pid(step + 1), "P", &settings);
                }
                2 => {
                    let _ = roster.add_ai(AiDifficulty::Normal, 0, &settings);
                }
                3 => {
                    roster.leave(pid(step - 2));
                }
                _ => {
                    let _ = roster.remove_ai((step as usize) % ROSTER_CAPACITY);
                }
            }
            assert!(roster.occupied_count() <= ROSTER_CAPACITY);
            assert_roster_invariants(&roster);
        }
    }

    #[test]
    fn test_validate_player_name() {
        assert_eq!(validate_player_name("  Rider ").unwrap(), "Rider");
        assert!(validate_player_name("   ").is_err());
        assert!(validate_player_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(validate_player_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
    }
}
