//! Wire protocol for the Cavalry lobby.
//!
//! This crate defines what host and guests say to each other:
//!
//! - **Room data** ([`RoomSettings`], [`PlayerSlot`], [`RoomSnapshot`]):
//!   the values the host replicates.
//! - **Messages** ([`ClientRequest`], [`ServerBroadcast`], [`Envelope`]):
//!   the two logical message kinds and their wire wrapper.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Lobby (roster state)
//! ```
//!
//! Nothing here knows about connections or relays.

mod codec;
mod error;
mod room;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use room::{
    AiDifficulty, GameMode, LobbyPlayerInfo, PlayerSlot, RoomSettings,
    RoomSnapshot, ROSTER_CAPACITY,
};
pub use types::{
    ClientId, ClientRequest, Envelope, JoinCode, Payload, PlayerId,
    Recipient, ServerBroadcast, PROTOCOL_VERSION,
};
