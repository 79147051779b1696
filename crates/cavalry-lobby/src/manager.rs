//! Lobby manager: maps connection lifecycle and guest requests onto the
//! authoritative room.
//!
//! The manager does no I/O. Each call returns an [`Effects`] value listing
//! what the host runtime must send, which local events to raise and which
//! connections to close. That keeps every rule here testable without a
//! socket, and leaves the runtime free to own the connections.
//!
//! Guests are identified by the [`ClientId`] their connection was given,
//! never by anything inside a request payload, so a guest can only ever
//! touch its own seat.

use std::collections::HashMap;

use cavalry_protocol::{
    AiDifficulty, ClientId, ClientRequest, PlayerId, PlayerSlot, Recipient,
    RoomSettings, RoomSnapshot, ServerBroadcast, PROTOCOL_VERSION,
};

use crate::room_data::RoomData;
use crate::roster::validate_player_name;
use crate::{LobbyError, LobbyEvent};

/// Work the host runtime must carry out after a manager call.
///
/// Apply in field order: queue `outbound`, raise `events`, then close the
/// `disconnect` connections once their queues drain.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Effects {
    pub outbound: Vec<(Recipient, ServerBroadcast)>,
    pub events: Vec<LobbyEvent>,
    pub disconnect: Vec<ClientId>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.events.is_empty() && self.disconnect.is_empty()
    }

    fn send(&mut self, to: Recipient, msg: ServerBroadcast) {
        self.outbound.push((to, msg));
    }

    fn emit(&mut self, event: LobbyEvent) {
        self.events.push(event);
    }

    fn reject(to: ClientId, err: &LobbyError) -> Self {
        let mut fx = Self::default();
        fx.send(
            Recipient::Client(to),
            ServerBroadcast::Error {
                code: err.code(),
                message: err.to_string(),
            },
        );
        fx
    }
}

/// Where a remote guest is in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    /// Connected and welcomed, no name submitted yet.
    Pending,
    /// Holds a seat.
    Seated,
}

/// Owns the room on the host and decides what every event does to it.
pub struct LobbyManager {
    room: RoomData,
    clients: HashMap<ClientId, Membership>,
    next_client: u64,
}

impl LobbyManager {
    /// Opens a room with the host seated at slot 0.
    pub fn new(settings: RoomSettings, host_name: &str) -> Result<Self, LobbyError> {
        let name = validate_player_name(host_name)?;
        let mut room = RoomData::new(settings)?;
        let slot = room.join(PlayerId::from(ClientId::HOST), &name)?;
        tracing::info!(host = %name, slot = slot.slot_index, "room opened");

        Ok(Self {
            room,
            clients: HashMap::new(),
            next_client: ClientId::FIRST_GUEST.0,
        })
    }

    // -- Queries ----------------------------------------------------------

    pub fn room(&self) -> &RoomData {
        &self.room
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.room.snapshot()
    }

    pub fn settings(&self) -> &RoomSettings {
        self.room.settings()
    }

    /// Number of remote connections, seated or not.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_seated(&self, client: ClientId) -> bool {
        self.clients.get(&client) == Some(&Membership::Seated)
    }

    // -- Connection lifecycle ---------------------------------------------

    /// Hands out the id for a new remote connection.
    pub fn allocate_client_id(&mut self) -> ClientId {
        let id = ClientId(self.next_client);
        self.next_client += 1;
        id
    }

    /// A transport connection finished its upgrade.
    ///
    /// The host's own loopback identity is already seated, so it needs
    /// nothing. Guests are welcomed and must then submit a name.
    pub fn on_client_connected(&mut self, client: ClientId) -> Effects {
        if client.is_host() {
            return Effects::default();
        }
        self.clients.insert(client, Membership::Pending);
        tracing::debug!(%client, "client connected, awaiting name");

        let mut fx = Effects::default();
        fx.send(
            Recipient::Client(client),
            ServerBroadcast::Welcome {
                client_id: client,
                protocol_version: PROTOCOL_VERSION,
            },
        );
        fx
    }

    /// A transport connection is gone, for whatever reason.
    ///
    /// Clears the guest's seat if it had one. Unknown or pending clients
    /// produce nothing.
    pub fn on_client_disconnected(&mut self, client: ClientId) -> Effects {
        if client.is_host() || self.clients.remove(&client).is_none() {
            return Effects::default();
        }
        let mut fx = Effects::default();
        self.clear_seat(client, &mut fx);
        fx
    }

    /// Applies a request from a connected guest.
    ///
    /// Rejections are answered to the sender only and never reach local
    /// subscribers.
    pub fn handle_request(&mut self, sender: ClientId, request: ClientRequest) -> Effects {
        let Some(membership) = self.clients.get(&sender).copied() else {
            tracing::warn!(client = %sender, "request from unknown client ignored");
            return Effects::default();
        };

        let result = match request {
            ClientRequest::SubmitName {
                protocol_version,
                name,
            } => return self.submit_name(sender, membership, protocol_version, &name),
            ClientRequest::SetReady { ready } => self.set_ready(sender, ready),
            ClientRequest::SetCustomization { preset } => {
                self.set_customization(sender, &preset)
            }
            ClientRequest::Leave => {
                tracing::info!(client = %sender, "client leaving");
                let mut fx = self.on_client_disconnected(sender);
                fx.disconnect.push(sender);
                Ok(fx)
            }
            // Answered by the runtime, which owns the clock.
            ClientRequest::Heartbeat { .. } => Ok(Effects::default()),
        };

        result.unwrap_or_else(|err| {
            tracing::warn!(client = %sender, %err, "request rejected");
            Effects::reject(sender, &err)
        })
    }

    fn submit_name(
        &mut self,
        sender: ClientId,
        membership: Membership,
        protocol_version: u32,
        name: &str,
    ) -> Effects {
        if protocol_version != PROTOCOL_VERSION {
            let err = LobbyError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: protocol_version,
            };
            tracing::warn!(client = %sender, %err, "handshake rejected");
            return self.refuse(sender, &err);
        }
        if membership == Membership::Seated {
            return Effects::reject(sender, &LobbyError::AlreadySeated(PlayerId::from(sender)));
        }
        let name = match validate_player_name(name) {
            Ok(name) => name,
            Err(err) => return Effects::reject(sender, &err),
        };

        match self.room.join(PlayerId::from(sender), &name) {
            Ok(slot) => {
                self.clients.insert(sender, Membership::Seated);
                tracing::info!(client = %sender, name = %slot.player_name, slot = slot.slot_index, "player joined");

                let mut fx = Effects::default();
                fx.send(Recipient::All, ServerBroadcast::PlayerJoined { slot: slot.clone() });
                fx.emit(LobbyEvent::PlayerJoined { slot });
                self.push_snapshot(&mut fx);
                fx
            }
            Err(err @ LobbyError::RoomFull) => {
                tracing::warn!(client = %sender, %name, "room full, refusing guest");
                self.refuse(sender, &err)
            }
            Err(err) => Effects::reject(sender, &err),
        }
    }

    /// Rejects and drops a guest that can't be seated.
    fn refuse(&mut self, sender: ClientId, err: &LobbyError) -> Effects {
        self.clients.remove(&sender);
        let mut fx = Effects::reject(sender, err);
        fx.disconnect.push(sender);
        fx
    }

    // -- Per-player operations --------------------------------------------

    /// Sets the ready flag on `requester`'s own seat.
    pub fn set_ready(&mut self, requester: ClientId, ready: bool) -> Result<Effects, LobbyError> {
        let slot = self.room.set_ready(PlayerId::from(requester), ready)?;
        tracing::debug!(client = %requester, ready, slot = slot.slot_index, "ready changed");
        Ok(self.roster_changed())
    }

    /// Sets the avatar preset on `requester`'s own seat.
    pub fn set_customization(
        &mut self,
        requester: ClientId,
        preset: &str,
    ) -> Result<Effects, LobbyError> {
        let slot = self.room.set_customization(PlayerId::from(requester), preset)?;
        tracing::debug!(client = %requester, preset = %slot.customization_preset, "customization changed");
        Ok(self.roster_changed())
    }

    // -- Host-only operations ---------------------------------------------

    pub fn update_settings(
        &mut self,
        requester: ClientId,
        settings: RoomSettings,
    ) -> Result<Effects, LobbyError> {
        ensure_host(requester)?;
        self.room.update_settings(settings)?;
        tracing::info!(room = %self.room.settings().room_name, "settings updated");

        let mut fx = Effects::default();
        fx.emit(LobbyEvent::SettingsChanged {
            settings: self.room.settings().clone(),
        });
        self.push_snapshot(&mut fx);
        Ok(fx)
    }

    /// Removes a human guest. The guest is told why, then disconnected.
    pub fn kick(
        &mut self,
        requester: ClientId,
        player_id: PlayerId,
        reason: &str,
    ) -> Result<Effects, LobbyError> {
        ensure_host(requester)?;
        let target = match player_id.client_id() {
            Some(client) if client.is_host() => return Err(LobbyError::CannotKickHost),
            Some(client) => client,
            None => return Err(LobbyError::NotHuman(player_id)),
        };
        if self.room.roster().find(player_id).is_none() {
            return Err(LobbyError::NotInRoom(player_id));
        }

        tracing::info!(%player_id, reason, "kicking player");
        self.clients.remove(&target);

        let mut fx = Effects::default();
        fx.send(
            Recipient::Client(target),
            ServerBroadcast::Kicked {
                reason: reason.to_string(),
            },
        );
        self.clear_seat(target, &mut fx);
        fx.disconnect.push(target);
        Ok(fx)
    }

    /// Seats an AI rider. Returns the new slot along with the effects.
    pub fn add_ai(
        &mut self,
        requester: ClientId,
        difficulty: AiDifficulty,
        team: u8,
    ) -> Result<(PlayerSlot, Effects), LobbyError> {
        ensure_host(requester)?;
        let slot = self.room.add_ai(difficulty, team)?;
        tracing::info!(player_id = %slot.player_id, %difficulty, slot = slot.slot_index, "AI player added");
        Ok((slot, self.roster_changed()))
    }

    pub fn remove_ai(&mut self, requester: ClientId, index: usize) -> Result<Effects, LobbyError> {
        ensure_host(requester)?;
        let slot = self.room.remove_ai(index)?;
        tracing::info!(player_id = %slot.player_id, slot = index, "AI player removed");
        Ok(self.roster_changed())
    }

    pub fn set_ai_difficulty(
        &mut self,
        requester: ClientId,
        index: usize,
        difficulty: AiDifficulty,
    ) -> Result<Effects, LobbyError> {
        ensure_host(requester)?;
        self.room.set_ai_difficulty(index, difficulty)?;
        tracing::debug!(slot = index, %difficulty, "AI difficulty changed");
        Ok(self.roster_changed())
    }

    pub fn set_team(
        &mut self,
        requester: ClientId,
        index: usize,
        team: u8,
    ) -> Result<Effects, LobbyError> {
        ensure_host(requester)?;
        self.room.set_team(index, team)?;
        tracing::debug!(slot = index, team, "team changed");
        Ok(self.roster_changed())
    }

    /// Starts the match if every human is ready. AI seats never block.
    pub fn start_match(&mut self, requester: ClientId) -> Result<Effects, LobbyError> {
        ensure_host(requester)?;
        let roster = self.room.roster();
        if !roster.all_humans_ready() {
            return Err(LobbyError::NotAllReady {
                waiting: roster.waiting_names(),
            });
        }

        let settings = self.room.settings().clone();
        tracing::info!(
            players = roster.occupied_count(),
            mode = ?settings.game_mode,
            map = %settings.map_name,
            "match starting"
        );

        let mut fx = Effects::default();
        fx.send(
            Recipient::All,
            ServerBroadcast::MatchStarting {
                settings: settings.clone(),
            },
        );
        fx.emit(LobbyEvent::MatchStarting { settings });
        Ok(fx)
    }

    /// Tells every guest the room is gone and drops them all.
    pub fn close_room(&mut self) -> Effects {
        tracing::info!(guests = self.clients.len(), "closing room");
        let mut fx = Effects::default();
        fx.send(Recipient::All, ServerBroadcast::RoomClosed);
        fx.disconnect = self.clients.drain().map(|(client, _)| client).collect();
        fx.disconnect.sort_by_key(|c| c.0);
        fx
    }

    // -- Helpers ----------------------------------------------------------

    fn clear_seat(&mut self, client: ClientId, fx: &mut Effects) {
        let Some(slot) = self.room.leave(PlayerId::from(client)) else {
            return;
        };
        tracing::info!(%client, name = %slot.player_name, slot = slot.slot_index, "player left");

        fx.send(
            Recipient::AllExcept(client),
            ServerBroadcast::PlayerLeft {
                slot_index: slot.slot_index,
                player_id: slot.player_id,
                name: slot.player_name.clone(),
            },
        );
        fx.emit(LobbyEvent::PlayerLeft {
            slot_index: slot.slot_index,
            player_id: slot.player_id,
            name: slot.player_name,
        });
        self.push_snapshot_except(client, fx);
    }

    fn roster_changed(&self) -> Effects {
        let mut fx = Effects::default();
        self.push_snapshot(&mut fx);
        fx
    }

    fn push_snapshot(&self, fx: &mut Effects) {
        fx.send(Recipient::All, ServerBroadcast::Snapshot(self.room.snapshot()));
        fx.emit(LobbyEvent::RosterChanged {
            version: self.room.version(),
        });
    }

    fn push_snapshot_except(&self, client: ClientId, fx: &mut Effects) {
        fx.send(
            Recipient::AllExcept(client),
            ServerBroadcast::Snapshot(self.room.snapshot()),
        );
        fx.emit(LobbyEvent::RosterChanged {
            version: self.room.version(),
        });
    }
}

fn ensure_host(requester: ClientId) -> Result<(), LobbyError> {
    if requester.is_host() {
        Ok(())
    } else {
        Err(LobbyError::NotHost(requester))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LobbyManager {
        LobbyManager::new(RoomSettings::default(), "Host").unwrap()
    }

    /// Connects and seats a guest, returning its id.
    fn seat(mgr: &mut LobbyManager, name: &str) -> ClientId {
        let client = mgr.allocate_client_id();
        mgr.on_client_connected(client);
        let fx = mgr.handle_request(
            client,
            ClientRequest::SubmitName {
                protocol_version: PROTOCOL_VERSION,
                name: name.to_string(),
            },
        );
        assert!(fx.disconnect.is_empty(), "seating {name} failed: {fx:?}");
        client
    }

    fn player_joined_count(fx: &Effects) -> usize {
        fx.events
            .iter()
            .filter(|e| matches!(e, LobbyEvent::PlayerJoined { .. }))
            .count()
    }

    fn error_to(fx: &Effects, client: ClientId) -> Option<u16> {
        fx.outbound.iter().find_map(|(to, msg)| match msg {
            ServerBroadcast::Error { code, .. } if *to == Recipient::Client(client) => {
                Some(*code)
            }
            _ => None,
        })
    }

    // =====================================================================
    // new() / connection lifecycle
    // =====================================================================

    #[test]
    fn test_new_seats_host_in_slot_zero() {
        let mgr = manager();
        let snap = mgr.snapshot();
        assert_eq!(snap.occupied_count(), 1);
        let host = &snap.slots[0];
        assert_eq!(host.player_id, PlayerId::from(ClientId::HOST));
        assert_eq!(host.player_name, "Host");
        assert!(!host.is_ready);
    }

    #[test]
    fn test_new_rejects_blank_host_name() {
        assert!(matches!(
            LobbyManager::new(RoomSettings::default(), "  "),
            Err(LobbyError::InvalidName(_))
        ));
    }

    #[test]
    fn test_allocated_ids_start_after_host() {
        let mut mgr = manager();
        assert_eq!(mgr.allocate_client_id(), ClientId::FIRST_GUEST);
        assert_eq!(mgr.allocate_client_id(), ClientId(3));
    }

    #[test]
    fn test_host_loopback_connect_is_noop() {
        let mut mgr = manager();
        assert!(mgr.on_client_connected(ClientId::HOST).is_empty());
        assert_eq!(mgr.client_count(), 0);
    }

    #[test]
    fn test_connect_sends_welcome_only_to_client() {
        let mut mgr = manager();
        let client = mgr.allocate_client_id();
        let fx = mgr.on_client_connected(client);

        assert_eq!(
            fx.outbound,
            vec![(
                Recipient::Client(client),
                ServerBroadcast::Welcome {
                    client_id: client,
                    protocol_version: PROTOCOL_VERSION,
                }
            )]
        );
        assert!(fx.events.is_empty());
        assert!(!mgr.is_seated(client));
    }

    #[test]
    fn test_submit_name_seats_guest_and_raises_joined_once() {
        let mut mgr = manager();
        let client = mgr.allocate_client_id();
        mgr.on_client_connected(client);

        let fx = mgr.handle_request(
            client,
            ClientRequest::SubmitName {
                protocol_version: PROTOCOL_VERSION,
                name: "Rider".into(),
            },
        );

        assert_eq!(player_joined_count(&fx), 1);
        assert!(fx.outbound.iter().any(|(to, msg)| *to == Recipient::All
            && matches!(msg, ServerBroadcast::Snapshot(s) if s.occupied_count() == 2)));
        let slot = mgr.snapshot().find(PlayerId::from(client)).cloned().unwrap();
        assert_eq!(slot.player_name, "Rider");
        assert_eq!(slot.slot_index, 1);
        assert!(!slot.is_ready);
    }

    #[test]
    fn test_submit_name_twice_is_rejected() {
        let mut mgr = manager();
        let client = seat(&mut mgr, "Rider");
        let version = mgr.room().version();

        let fx = mgr.handle_request(
            client,
            ClientRequest::SubmitName {
                protocol_version: PROTOCOL_VERSION,
                name: "Rider 2".into(),
            },
        );

        assert_eq!(error_to(&fx, client), Some(409));
        assert_eq!(player_joined_count(&fx), 0);
        assert_eq!(mgr.room().version(), version);
    }

    #[test]
    fn test_submit_name_version_mismatch_disconnects() {
        let mut mgr = manager();
        let client = mgr.allocate_client_id();
        mgr.on_client_connected(client);

        let fx = mgr.handle_request(
            client,
            ClientRequest::SubmitName {
                protocol_version: PROTOCOL_VERSION + 1,
                name: "Future".into(),
            },
        );

        assert_eq!(error_to(&fx, client), Some(426));
        assert_eq!(fx.disconnect, vec![client]);
        assert_eq!(mgr.client_count(), 0);
    }

    #[test]
    fn test_submit_blank_name_rejected_but_stays_connected() {
        let mut mgr = manager();
        let client = mgr.allocate_client_id();
        mgr.on_client_connected(client);

        let fx = mgr.handle_request(
            client,
            ClientRequest::SubmitName {
                protocol_version: PROTOCOL_VERSION,
                name: "   ".into(),
            },
        );

        assert_eq!(error_to(&fx, client), Some(400));
        assert!(fx.disconnect.is_empty());
        assert_eq!(mgr.client_count(), 1);
    }

    #[test]
    fn test_full_room_refuses_and_disconnects_guest() {
        let mut mgr = manager();
        for i in 0..7 {
            seat(&mut mgr, &format!("G{i}"));
        }
        let late = mgr.allocate_client_id();
        mgr.on_client_connected(late);
        let before = mgr.snapshot();

        let fx = mgr.handle_request(
            late,
            ClientRequest::SubmitName {
                protocol_version: PROTOCOL_VERSION,
                name: "Late".into(),
            },
        );

        assert_eq!(error_to(&fx, late), Some(409));
        assert_eq!(fx.disconnect, vec![late]);
        assert!(fx.events.is_empty());
        assert_eq!(mgr.snapshot(), before);
    }

    #[test]
    fn test_disconnect_clears_seat_and_raises_left_once() {
        let mut mgr = manager();
        let client = seat(&mut mgr, "Rider");

        let fx = mgr.on_client_disconnected(client);

        let left: Vec<_> = fx
            .events
            .iter()
            .filter(|e| matches!(e, LobbyEvent::PlayerLeft { .. }))
            .collect();
        assert_eq!(left.len(), 1);
        assert!(mgr.snapshot().slots[1].is_empty());

        let again = mgr.on_client_disconnected(client);
        assert!(again.is_empty(), "second disconnect is a no-op");
    }

    #[test]
    fn test_disconnect_of_pending_client_is_silent() {
        let mut mgr = manager();
        let client = mgr.allocate_client_id();
        mgr.on_client_connected(client);

        let fx = mgr.on_client_disconnected(client);
        assert!(fx.is_empty());
        assert_eq!(mgr.room().version(), 1);
    }

    #[test]
    fn test_leave_request_clears_seat_and_disconnects() {
        let mut mgr = manager();
        let client = seat(&mut mgr, "Rider");

        let fx = mgr.handle_request(client, ClientRequest::Leave);

        assert_eq!(fx.disconnect, vec![client]);
        assert!(mgr.snapshot().find(PlayerId::from(client)).is_none());
    }

    #[test]
    fn test_request_from_unknown_client_ignored() {
        let mut mgr = manager();
        let fx = mgr.handle_request(ClientId(99), ClientRequest::SetReady { ready: true });
        assert!(fx.is_empty());
    }

    #[test]
    fn test_heartbeat_has_no_room_effects() {
        let mut mgr = manager();
        let client = seat(&mut mgr, "Rider");
        let fx = mgr.handle_request(client, ClientRequest::Heartbeat { client_time: 5 });
        assert!(fx.is_empty());
    }

    // =====================================================================
    // Per-player requests
    // =====================================================================

    #[test]
    fn test_guest_ready_only_touches_own_slot() {
        let mut mgr = manager();
        let a = seat(&mut mgr, "A");
        let b = seat(&mut mgr, "B");

        mgr.handle_request(a, ClientRequest::SetReady { ready: true });

        let snap = mgr.snapshot();
        assert!(snap.find(PlayerId::from(a)).unwrap().is_ready);
        assert!(!snap.find(PlayerId::from(b)).unwrap().is_ready);
        assert!(!snap.find(PlayerId::from(ClientId::HOST)).unwrap().is_ready);
    }

    #[test]
    fn test_pending_guest_cannot_set_ready() {
        let mut mgr = manager();
        let client = mgr.allocate_client_id();
        mgr.on_client_connected(client);

        let fx = mgr.handle_request(client, ClientRequest::SetReady { ready: true });
        assert_eq!(error_to(&fx, client), Some(404));
        assert_eq!(mgr.room().version(), 1);
    }

    #[test]
    fn test_guest_customization_applies() {
        let mut mgr = manager();
        let client = seat(&mut mgr, "A");
        mgr.handle_request(
            client,
            ClientRequest::SetCustomization {
                preset: "Lancer".into(),
            },
        );
        assert_eq!(
            mgr.snapshot().find(PlayerId::from(client)).unwrap().customization_preset,
            "Lancer"
        );
    }

    #[test]
    fn test_oversized_preset_from_guest_is_rejected() {
        let mut mgr = manager();
        let client = seat(&mut mgr, "A");
        let version = mgr.snapshot().version;

        let fx = mgr.handle_request(
            client,
            ClientRequest::SetCustomization {
                preset: "x".repeat(10_000),
            },
        );

        assert_eq!(error_to(&fx, client), Some(400));
        assert!(fx.disconnect.is_empty());
        assert_eq!(mgr.snapshot().version, version);
        assert_eq!(
            mgr.snapshot().find(PlayerId::from(client)).unwrap().customization_preset,
            ""
        );
    }

    // =====================================================================
    // Host-only operations
    // =====================================================================

    #[test]
    fn test_host_only_operations_reject_guests() {
        let mut mgr = manager();
        let guest = seat(&mut mgr, "A");
        let version = mgr.room().version();

        assert_eq!(
            mgr.update_settings(guest, RoomSettings::default()),
            Err(LobbyError::NotHost(guest))
        );
        assert!(mgr.add_ai(guest, AiDifficulty::Easy, 0).is_err());
        assert!(mgr.remove_ai(guest, 0).is_err());
        assert!(mgr.set_ai_difficulty(guest, 0, AiDifficulty::Hard).is_err());
        assert!(mgr.set_team(guest, 0, 0).is_err());
        assert!(mgr.kick(guest, PlayerId::from(ClientId::HOST), "").is_err());
        assert!(mgr.start_match(guest).is_err());
        assert_eq!(mgr.room().version(), version);
    }

    #[test]
    fn test_kick_sends_reason_then_disconnects() {
        let mut mgr = manager();
        let guest = seat(&mut mgr, "A");

        let fx = mgr
            .kick(ClientId::HOST, PlayerId::from(guest), "be nice")
            .unwrap();

        assert_eq!(
            fx.outbound[0],
            (
                Recipient::Client(guest),
                ServerBroadcast::Kicked {
                    reason: "be nice".into()
                }
            )
        );
        assert_eq!(fx.disconnect, vec![guest]);
        assert!(fx.events.iter().any(|e| matches!(e, LobbyEvent::PlayerLeft { .. })));
        assert!(mgr.snapshot().find(PlayerId::from(guest)).is_none());

        // The transport drop that follows must not raise a second PlayerLeft.
        assert!(mgr.on_client_disconnected(guest).is_empty());
    }

    #[test]
    fn test_kick_rejects_host_ai_and_absent() {
        let mut mgr = manager();
        let (ai, _) = mgr.add_ai(ClientId::HOST, AiDifficulty::Easy, 0).unwrap();

        assert_eq!(
            mgr.kick(ClientId::HOST, PlayerId::from(ClientId::HOST), ""),
            Err(LobbyError::CannotKickHost)
        );
        assert_eq!(
            mgr.kick(ClientId::HOST, ai.player_id, ""),
            Err(LobbyError::NotHuman(ai.player_id))
        );
        assert_eq!(
            mgr.kick(ClientId::HOST, PlayerId(42), ""),
            Err(LobbyError::NotInRoom(PlayerId(42)))
        );
    }

    #[test]
    fn test_add_ai_ids_decrease_and_broadcast_snapshot() {
        let mut mgr = manager();
        let (easy, fx) = mgr.add_ai(ClientId::HOST, AiDifficulty::Easy, 0).unwrap();
        let (hard, _) = mgr.add_ai(ClientId::HOST, AiDifficulty::Hard, 0).unwrap();

        assert_eq!(easy.player_id, PlayerId(-1));
        assert_eq!(hard.player_id, PlayerId(-2));
        assert!(matches!(fx.outbound[0], (Recipient::All, ServerBroadcast::Snapshot(_))));
        assert_eq!(fx.events, vec![LobbyEvent::RosterChanged { version: 2 }]);
    }

    #[test]
    fn test_update_settings_raises_settings_changed() {
        let mut mgr = manager();
        let settings = RoomSettings {
            map_name: "Steppe".into(),
            ..RoomSettings::default()
        };
        let fx = mgr.update_settings(ClientId::HOST, settings.clone()).unwrap();
        assert!(fx.events.contains(&LobbyEvent::SettingsChanged { settings }));
    }

    #[test]
    fn test_start_match_gated_on_human_readiness() {
        let mut mgr = manager();
        let guest = seat(&mut mgr, "A");
        mgr.add_ai(ClientId::HOST, AiDifficulty::Normal, 0).unwrap();

        mgr.set_ready(ClientId::HOST, true).unwrap();
        let err = mgr.start_match(ClientId::HOST).unwrap_err();
        assert_eq!(
            err,
            LobbyError::NotAllReady {
                waiting: vec!["A".into()]
            }
        );

        mgr.set_ready(guest, true).unwrap();
        let fx = mgr.start_match(ClientId::HOST).unwrap();
        let starts = fx
            .events
            .iter()
            .filter(|e| matches!(e, LobbyEvent::MatchStarting { .. }))
            .count();
        assert_eq!(starts, 1);
        assert!(matches!(
            fx.outbound[0],
            (Recipient::All, ServerBroadcast::MatchStarting { .. })
        ));
    }

    #[test]
    fn test_close_room_disconnects_everyone() {
        let mut mgr = manager();
        let a = seat(&mut mgr, "A");
        let pending = mgr.allocate_client_id();
        mgr.on_client_connected(pending);

        let fx = mgr.close_room();

        assert_eq!(fx.outbound, vec![(Recipient::All, ServerBroadcast::RoomClosed)]);
        assert_eq!(fx.disconnect, vec![a, pending]);
        assert_eq!(mgr.client_count(), 0);
    }
}
