//! `LobbyService`: the one type the rest of the game talks to.
//!
//! A service is either idle, connecting, hosting a room or seated in
//! someone else's. Hosting mutates the room directly through the
//! [`LobbyManager`]; a guest turns the same calls into requests to the
//! host, and host-only calls fail locally with
//! [`LobbyError::NotHost`] without touching the network.
//!
//! Every `create_room`, `join_room` and `leave_room` bumps an epoch. An
//! in-flight create or join that finds the epoch moved on while it was
//! suspended tears down what it built and returns
//! [`CavalryError::Superseded`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cavalry_lobby::{
    validate_player_name, validate_preset, LobbyError, LobbyEvent, LobbyManager,
};
use cavalry_protocol::{
    AiDifficulty, ClientId, ClientRequest, JoinCode, LobbyPlayerInfo, PlayerId,
    PlayerSlot, RoomSettings, RoomSnapshot,
};
use cavalry_relay::{AllocationId, ConnectionDescriptor, Relay};
use cavalry_transport::{Transport, WebSocketTransport};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::guest::{run_heartbeat, run_reader, GuestLink};
use crate::server::{run_accept_loop, HostShared};
use crate::{CavalryError, LobbyConfig};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

enum Session {
    Idle,
    /// A create or join is in flight.
    Connecting,
    Hosting(HostSession),
    Guest(GuestSession),
}

struct HostSession {
    host: Arc<HostShared>,
    allocation: AllocationId,
    join_code: JoinCode,
    local: LobbyPlayerInfo,
    accept_task: JoinHandle<()>,
}

struct GuestSession {
    link: Arc<GuestLink>,
    join_code: JoinCode,
    local: LobbyPlayerInfo,
    tasks: Vec<JoinHandle<()>>,
}

impl GuestSession {
    fn stop_tasks(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// State shared between the service handles and their background tasks.
pub(crate) struct Shared {
    config: LobbyConfig,
    events: broadcast::Sender<LobbyEvent>,
    session: Mutex<Session>,
    epoch: AtomicU64,
}

impl Shared {
    pub(crate) fn emit(&self, event: LobbyEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops a guest session the host ended. Returns `false` if `epoch`
    /// no longer names the current session.
    pub(crate) async fn end_guest_session(&self, epoch: u64) -> bool {
        let mut session = self.session.lock().await;
        if self.current_epoch() != epoch || !matches!(*session, Session::Guest(_)) {
            return false;
        }
        *session = Session::Idle;
        true
    }
}

// ---------------------------------------------------------------------------
// LobbyService
// ---------------------------------------------------------------------------

/// Create, join and run a lobby room.
///
/// Cloning is cheap; every clone drives the same session.
///
/// ```rust,no_run
/// use cavalry::prelude::*;
///
/// # async fn demo() -> Result<(), CavalryError> {
/// let relay = LocalRelay::new();
/// let host = LobbyService::new(relay.clone(), LobbyConfig::default());
/// let code = host.create_room(RoomSettings::default(), "Host").await?;
///
/// let guest = LobbyService::new(relay, LobbyConfig::default());
/// guest.join_room(code.as_str(), "Guest").await?;
/// # Ok(())
/// # }
/// ```
pub struct LobbyService<R: Relay> {
    relay: Arc<R>,
    shared: Arc<Shared>,
}

impl<R: Relay> Clone for LobbyService<R> {
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: Relay> LobbyService<R> {
    pub fn new(relay: R, config: LobbyConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            relay: Arc::new(relay),
            shared: Arc::new(Shared {
                config,
                events,
                session: Mutex::new(Session::Idle),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Receives every [`LobbyEvent`] raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LobbyEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.shared.config
    }

    // -- Create / join / leave --------------------------------------------

    /// Hosts a new room and returns its join code.
    ///
    /// On failure nothing is left behind: the relay allocation is released
    /// and the service stays out of any room.
    pub async fn create_room(
        &self,
        settings: RoomSettings,
        player_name: &str,
    ) -> Result<JoinCode, CavalryError> {
        let result = self.try_create_room(settings, player_name).await;
        self.report(result)
    }

    async fn try_create_room(
        &self,
        settings: RoomSettings,
        player_name: &str,
    ) -> Result<JoinCode, CavalryError> {
        let epoch = self.begin_connecting().await?;

        let manager = match LobbyManager::new(settings, player_name) {
            Ok(manager) => manager,
            Err(e) => {
                self.abandon(epoch).await;
                return Err(e.into());
            }
        };
        let host_name = manager.snapshot().slots[0].player_name.clone();

        if let Err(e) = self.relay.initialize().await {
            self.abandon(epoch).await;
            return Err(e.into());
        }
        let allocation = match self
            .relay
            .create_allocation(self.shared.config.max_connections)
            .await
        {
            Ok(allocation) => allocation,
            Err(e) => {
                self.abandon(epoch).await;
                return Err(e.into());
            }
        };

        let started = self.start_hosting(allocation.id, allocation.listen, manager).await;
        let (host, join_code, accept_task) = match started {
            Ok(parts) => parts,
            Err(e) => {
                self.release(allocation.id).await;
                self.abandon(epoch).await;
                return Err(e);
            }
        };

        let mut session = self.shared.session.lock().await;
        if self.shared.current_epoch() != epoch {
            drop(session);
            tracing::info!(join_code = %join_code, "room creation abandoned, tearing down");
            host.close().await;
            self.release(allocation.id).await;
            return Err(CavalryError::Superseded);
        }

        *session = Session::Hosting(HostSession {
            host,
            allocation: allocation.id,
            join_code: join_code.clone(),
            local: LobbyPlayerInfo {
                client_id: ClientId::HOST,
                display_name: host_name,
                is_host: true,
            },
            accept_task,
        });
        drop(session);

        tracing::info!(join_code = %join_code, "room created");
        self.shared.emit(LobbyEvent::RoomCreated {
            join_code: join_code.clone(),
        });
        Ok(join_code)
    }

    /// Binds the transport, publishes it and starts accepting guests.
    async fn start_hosting(
        &self,
        allocation: AllocationId,
        listen: ConnectionDescriptor,
        manager: LobbyManager,
    ) -> Result<(Arc<HostShared>, JoinCode, JoinHandle<()>), CavalryError> {
        let join_code = self.relay.get_join_code(allocation).await?;

        let transport = WebSocketTransport::bind(&listen.address.to_string()).await?;
        let bound = transport.local_addr()?;
        self.relay
            .publish(allocation, ConnectionDescriptor::new(bound))
            .await?;

        let host = HostShared::new(
            manager,
            self.shared.events.clone(),
            self.shared.config.clone(),
        );
        let accept_task = tokio::spawn(run_accept_loop(transport, Arc::clone(&host)));
        Ok((host, join_code, accept_task))
    }

    /// Joins the room behind `join_code` as `player_name`.
    pub async fn join_room(&self, join_code: &str, player_name: &str) -> Result<(), CavalryError> {
        let result = self.try_join_room(join_code, player_name).await;
        self.report(result)
    }

    async fn try_join_room(&self, join_code: &str, player_name: &str) -> Result<(), CavalryError> {
        let code = JoinCode::parse(join_code)
            .ok_or_else(|| CavalryError::InvalidJoinCode(join_code.to_string()))?;
        let name = validate_player_name(player_name)?;
        let epoch = self.begin_connecting().await?;

        let link = match self.connect_guest(&code, &name).await {
            Ok(link) => Arc::new(link),
            Err(e) => {
                self.abandon(epoch).await;
                return Err(e);
            }
        };

        let mut session = self.shared.session.lock().await;
        if self.shared.current_epoch() != epoch {
            drop(session);
            tracing::info!(join_code = %code, "join abandoned, leaving");
            link.leave().await;
            return Err(CavalryError::Superseded);
        }

        let client_id = link.client_id();
        let tasks = vec![
            tokio::spawn(run_reader(Arc::clone(&link), Arc::clone(&self.shared), epoch)),
            tokio::spawn(run_heartbeat(
                Arc::clone(&link),
                self.shared.config.heartbeat_interval,
            )),
        ];
        *session = Session::Guest(GuestSession {
            link,
            join_code: code.clone(),
            local: LobbyPlayerInfo {
                client_id,
                display_name: name,
                is_host: false,
            },
            tasks,
        });
        drop(session);

        tracing::info!(join_code = %code, %client_id, "joined room");
        self.shared.emit(LobbyEvent::RoomJoined {
            join_code: code,
            client_id,
        });
        Ok(())
    }

    async fn connect_guest(&self, code: &JoinCode, name: &str) -> Result<GuestLink, CavalryError> {
        self.relay.initialize().await?;
        let endpoint = self.relay.join_allocation(code).await?;
        tracing::debug!(join_code = %code, url = %endpoint.url(), "resolved join code");
        GuestLink::join(&endpoint.url(), name, self.shared.config.handshake_timeout).await
    }

    /// Leaves the current room. Does nothing if not in one.
    ///
    /// A host closes the room for everyone. Calling this while a create or
    /// join is in flight abandons it.
    pub async fn leave_room(&self) -> Result<(), CavalryError> {
        let previous = {
            let mut session = self.shared.session.lock().await;
            self.shared.bump_epoch();
            std::mem::replace(&mut *session, Session::Idle)
        };

        match previous {
            Session::Idle => return Ok(()),
            Session::Connecting => {
                tracing::info!("abandoning in-flight create/join");
                return Ok(());
            }
            Session::Hosting(hosting) => {
                hosting.host.close().await;
                if tokio::time::timeout(self.shared.config.handshake_timeout, hosting.accept_task)
                    .await
                    .is_err()
                {
                    tracing::warn!("accept loop did not stop in time");
                }
                self.release(hosting.allocation).await;
                tracing::info!(join_code = %hosting.join_code, "room closed");
            }
            Session::Guest(guest) => {
                guest.stop_tasks();
                guest.link.leave().await;
                tracing::info!(join_code = %guest.join_code, "left room");
            }
        }

        self.shared.emit(LobbyEvent::RoomLeft);
        Ok(())
    }

    // -- Own seat ---------------------------------------------------------

    /// Marks our own seat ready or not ready.
    pub async fn set_ready(&self, ready: bool) -> Result<(), CavalryError> {
        let result = match self.role().await {
            Ok(Role::Host(host)) => host
                .mutate(|m| m.set_ready(ClientId::HOST, ready).map(|fx| ((), fx)))
                .await
                .map_err(CavalryError::from),
            Ok(Role::Guest(link)) => link.send(ClientRequest::SetReady { ready }).await,
            Err(e) => Err(e),
        };
        self.report(result)
    }

    /// Picks the avatar preset shown on our own seat.
    pub async fn set_customization(&self, preset: &str) -> Result<(), CavalryError> {
        let result = match self.role().await {
            Ok(Role::Host(host)) => host
                .mutate(|m| m.set_customization(ClientId::HOST, preset).map(|fx| ((), fx)))
                .await
                .map_err(CavalryError::from),
            Ok(Role::Guest(link)) => match validate_preset(preset) {
                Ok(preset) => link.send(ClientRequest::SetCustomization { preset }).await,
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };
        self.report(result)
    }

    // -- Host-only --------------------------------------------------------

    pub async fn update_settings(&self, settings: RoomSettings) -> Result<(), CavalryError> {
        self.host_op(|m| m.update_settings(ClientId::HOST, settings).map(|fx| ((), fx)))
            .await
    }

    /// Removes a human guest from the room.
    pub async fn kick_player(&self, player_id: PlayerId, reason: &str) -> Result<(), CavalryError> {
        self.host_op(|m| m.kick(ClientId::HOST, player_id, reason).map(|fx| ((), fx)))
            .await
    }

    /// Seats an AI rider and returns its slot.
    pub async fn add_cpu_player(
        &self,
        difficulty: AiDifficulty,
        team: u8,
    ) -> Result<PlayerSlot, CavalryError> {
        self.host_op(|m| m.add_ai(ClientId::HOST, difficulty, team)).await
    }

    pub async fn remove_cpu_player(&self, slot_index: usize) -> Result<(), CavalryError> {
        self.host_op(|m| m.remove_ai(ClientId::HOST, slot_index).map(|fx| ((), fx)))
            .await
    }

    pub async fn set_cpu_difficulty(
        &self,
        slot_index: usize,
        difficulty: AiDifficulty,
    ) -> Result<(), CavalryError> {
        self.host_op(|m| {
            m.set_ai_difficulty(ClientId::HOST, slot_index, difficulty)
                .map(|fx| ((), fx))
        })
        .await
    }

    pub async fn set_team(&self, slot_index: usize, team: u8) -> Result<(), CavalryError> {
        self.host_op(|m| m.set_team(ClientId::HOST, slot_index, team).map(|fx| ((), fx)))
            .await
    }

    /// Starts the match. Fails unless every human seat is ready.
    pub async fn start_match(&self) -> Result<(), CavalryError> {
        self.host_op(|m| m.start_match(ClientId::HOST).map(|fx| ((), fx)))
            .await
    }

    // -- Queries ----------------------------------------------------------

    pub async fn is_in_room(&self) -> bool {
        matches!(
            *self.shared.session.lock().await,
            Session::Hosting(_) | Session::Guest(_)
        )
    }

    pub async fn is_host(&self) -> bool {
        matches!(*self.shared.session.lock().await, Session::Hosting(_))
    }

    pub async fn current_join_code(&self) -> Option<JoinCode> {
        match &*self.shared.session.lock().await {
            Session::Hosting(h) => Some(h.join_code.clone()),
            Session::Guest(g) => Some(g.join_code.clone()),
            Session::Idle | Session::Connecting => None,
        }
    }

    pub async fn local_player(&self) -> Option<LobbyPlayerInfo> {
        match &*self.shared.session.lock().await {
            Session::Hosting(h) => Some(h.local.clone()),
            Session::Guest(g) => Some(g.local.clone()),
            Session::Idle | Session::Connecting => None,
        }
    }

    /// The room as this participant currently sees it.
    pub async fn snapshot(&self) -> Option<RoomSnapshot> {
        match self.role().await.ok()? {
            Role::Host(host) => Some(host.snapshot().await),
            Role::Guest(link) => link.snapshot().await,
        }
    }

    pub async fn slots(&self) -> Vec<PlayerSlot> {
        self.snapshot().await.map(|s| s.slots).unwrap_or_default()
    }

    pub async fn settings(&self) -> Option<RoomSettings> {
        self.snapshot().await.map(|s| s.settings)
    }

    // -- Helpers ----------------------------------------------------------

    /// Moves Idle → Connecting and returns the epoch of the new attempt.
    async fn begin_connecting(&self) -> Result<u64, CavalryError> {
        let mut session = self.shared.session.lock().await;
        if !matches!(*session, Session::Idle) {
            return Err(CavalryError::AlreadyInRoom);
        }
        *session = Session::Connecting;
        Ok(self.shared.bump_epoch())
    }

    /// Returns to Idle after a failed attempt, unless something newer
    /// already took over.
    async fn abandon(&self, epoch: u64) {
        let mut session = self.shared.session.lock().await;
        if self.shared.current_epoch() == epoch && matches!(*session, Session::Connecting) {
            *session = Session::Idle;
        }
    }

    async fn release(&self, allocation: AllocationId) {
        if let Err(e) = self.relay.release(allocation).await {
            tracing::warn!(%allocation, error = %e, "failed to release allocation");
        }
    }

    async fn role(&self) -> Result<Role, CavalryError> {
        match &*self.shared.session.lock().await {
            Session::Hosting(h) => Ok(Role::Host(Arc::clone(&h.host))),
            Session::Guest(g) => Ok(Role::Guest(Arc::clone(&g.link))),
            Session::Idle | Session::Connecting => Err(CavalryError::NotInRoom),
        }
    }

    async fn host_op<T>(
        &self,
        op: impl FnOnce(&mut LobbyManager) -> Result<(T, cavalry_lobby::Effects), LobbyError>,
    ) -> Result<T, CavalryError> {
        let result = match self.role().await {
            Ok(Role::Host(host)) => host.mutate(op).await.map_err(CavalryError::from),
            Ok(Role::Guest(link)) => {
                tracing::warn!(client_id = %link.client_id(), "host-only operation called on a guest");
                Err(LobbyError::NotHost(link.client_id()).into())
            }
            Err(e) => Err(e),
        };
        self.report(result)
    }

    /// Mirrors a failure onto the event channel.
    fn report<T>(&self, result: Result<T, CavalryError>) -> Result<T, CavalryError> {
        if let Err(err) = &result {
            if !matches!(err, CavalryError::Superseded) {
                tracing::warn!(error = %err, "lobby operation failed");
                self.shared.emit(LobbyEvent::error(err));
            }
        }
        result
    }
}

enum Role {
    Host(Arc<HostShared>),
    Guest(Arc<GuestLink>),
}
