//! # Cavalry
//!
//! Lobby service for Cavalry: host a room behind a short join code, or join
//! one, then manage seats, readiness, AI riders and match start.
//!
//! The host is authoritative. It owns the room through
//! [`cavalry_lobby::LobbyManager`], and every change reaches guests as a
//! versioned [`RoomSnapshot`](cavalry_protocol::RoomSnapshot). Guests only
//! ever ask; the host decides.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cavalry::prelude::*;
//!
//! # async fn run() -> Result<(), CavalryError> {
//! let relay = LocalRelay::new();
//! let lobby = LobbyService::new(relay, LobbyConfig::default());
//! let mut events = lobby.subscribe();
//!
//! let code = lobby.create_room(RoomSettings::default(), "Host").await?;
//! println!("share this code: {code}");
//!
//! lobby.add_cpu_player(AiDifficulty::Hard, 0).await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod guest;
mod handler;
mod server;
mod service;

pub use config::LobbyConfig;
pub use error::CavalryError;
pub use service::LobbyService;

/// Convenient re-exports for lobby users.
pub mod prelude {
    pub use crate::{CavalryError, LobbyConfig, LobbyService};
    pub use cavalry_lobby::{LobbyError, LobbyEvent};
    pub use cavalry_protocol::{
        AiDifficulty, ClientId, GameMode, JoinCode, LobbyPlayerInfo, PlayerId,
        PlayerSlot, RoomSettings, RoomSnapshot, ROSTER_CAPACITY,
    };
    pub use cavalry_relay::{LocalRelay, Relay, RelayError};
}
