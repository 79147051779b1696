//! Room roster and connection lifecycle for the Cavalry lobby.
//!
//! Everything in this crate is synchronous and does no I/O. The host
//! runtime feeds it connection events and guest requests, and carries out
//! the [`Effects`] it returns.
//!
//! # Key types
//!
//! - [`Roster`]: the eight seats and their state machine
//! - [`RoomData`]: authoritative settings + roster + version
//! - [`RoomMirror`]: a guest's monotonic copy of the room
//! - [`LobbyManager`]: maps connects, disconnects and requests onto the room
//! - [`LobbyEvent`]: what local subscribers get told

mod error;
mod event;
mod manager;
mod room_data;
mod roster;

pub use error::LobbyError;
pub use event::LobbyEvent;
pub use manager::{Effects, LobbyManager};
pub use room_data::{RoomData, RoomMirror};
pub use roster::{
    validate_player_name, validate_preset, Roster, MAX_NAME_LEN, MAX_PRESET_LEN,
};
