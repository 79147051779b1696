//! Core protocol types for the lobby wire format.
//!
//! Two logical message kinds travel between participants:
//!
//! - [`ClientRequest`]: guest → host. The host attributes each request to
//!   the connection it arrived on, never to anything inside the payload.
//! - [`ServerBroadcast`]: host → one guest or all guests.
//!
//! Both are wrapped in an [`Envelope`] on the wire.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::{PlayerSlot, RoomSettings, RoomSnapshot};

/// The current protocol version. Guests send it with their name and are
/// rejected on mismatch.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identity of one participant process, assigned by the host.
///
/// The host itself is always [`ClientId::HOST`]; remote guests are numbered
/// from 2 upwards in connection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl ClientId {
    /// The host's own loopback identity.
    pub const HOST: ClientId = ClientId(1);

    /// First id handed out to a remote guest.
    pub const FIRST_GUEST: ClientId = ClientId(2);

    pub fn is_host(&self) -> bool {
        *self == Self::HOST
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// Roster identifier carried by a [`PlayerSlot`].
///
/// `0` marks an empty slot, positive values are human participants (equal
/// to their [`ClientId`]) and negative values are synthetic AI riders.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize, Default,
)]
#[serde(transparent)]
pub struct PlayerId(pub i64);

impl PlayerId {
    /// The identifier of an empty slot.
    pub const EMPTY: PlayerId = PlayerId(0);

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_ai(&self) -> bool {
        self.0 < 0
    }

    pub fn is_human(&self) -> bool {
        self.0 > 0
    }

    /// The client owning this identifier, for human players.
    pub fn client_id(&self) -> Option<ClientId> {
        if self.is_human() {
            Some(ClientId(self.0 as u64))
        } else {
            None
        }
    }
}

impl From<ClientId> for PlayerId {
    fn from(id: ClientId) -> Self {
        PlayerId(id.0 as i64)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ai() {
            write!(f, "AI{}", self.0)
        } else {
            write!(f, "P-{}", self.0)
        }
    }
}

/// A short, human-shareable code that resolves to a host's endpoint.
///
/// Codes are upper case and drawn from [`JoinCode::ALPHABET`], which leaves
/// out characters that are easy to confuse when read aloud (`0`/`O`,
/// `1`/`I`/`L`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinCode(String);

impl JoinCode {
    /// Characters a code may contain.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

    /// Length of every code.
    pub const LENGTH: usize = 6;

    /// Parses user input into a code. Surrounding whitespace is trimmed and
    /// letters are upper-cased, so `" ab2cd3 "` and `"AB2CD3"` are the same.
    pub fn parse(input: &str) -> Option<Self> {
        let code = input.trim().to_ascii_uppercase();
        let valid = code.len() == Self::LENGTH
            && code.bytes().all(|b| Self::ALPHABET.contains(&b));
        valid.then_some(Self(code))
    }

    /// Builds a code by asking `pick` for an index into
    /// [`JoinCode::ALPHABET`] once per character.
    ///
    /// `pick(n)` must return a value below `n`; out-of-range values wrap.
    pub fn generate_with(mut pick: impl FnMut(usize) -> usize) -> Self {
        let n = Self::ALPHABET.len();
        let code = (0..Self::LENGTH)
            .map(|_| char::from(Self::ALPHABET[pick(n) % n]))
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient: who should receive a broadcast?
// ---------------------------------------------------------------------------

/// Specifies who should receive a host message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every connected guest.
    All,

    /// One specific guest.
    Client(ClientId),

    /// Every connected guest except one.
    AllExcept(ClientId),
}

impl Recipient {
    /// Returns `true` if `client` is addressed by this recipient.
    pub fn includes(&self, client: ClientId) -> bool {
        match self {
            Self::All => true,
            Self::Client(id) => *id == client,
            Self::AllExcept(id) => *id != client,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientRequest: guest → host
// ---------------------------------------------------------------------------

/// Requests a guest may send to the host.
///
/// Host-only operations (settings, kick, AI management, match start) have
/// no request form: guests can't ask for them at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// Registers the guest's display name and asks for a seat.
    SubmitName {
        protocol_version: u32,
        name: String,
    },

    /// Marks the sender's own slot ready or not ready.
    SetReady { ready: bool },

    /// Changes the avatar preset shown on the sender's own slot.
    SetCustomization { preset: String },

    /// The guest is leaving; the host clears its slot.
    Leave,

    /// Keep-alive. The host echoes `client_time` back.
    Heartbeat { client_time: u64 },
}

// ---------------------------------------------------------------------------
// ServerBroadcast: host → guests
// ---------------------------------------------------------------------------

/// Messages the host sends to guests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerBroadcast {
    /// First message on every connection: tells the guest who it is.
    Welcome {
        client_id: ClientId,
        protocol_version: u32,
    },

    /// Whole room state after a mutation.
    Snapshot(RoomSnapshot),

    /// A human took a seat.
    PlayerJoined { slot: PlayerSlot },

    /// A human's seat was cleared (leave, kick or disconnect).
    PlayerLeft {
        slot_index: u8,
        player_id: PlayerId,
        name: String,
    },

    /// The host started the match with these settings.
    MatchStarting { settings: RoomSettings },

    /// The receiving guest was removed by the host.
    Kicked { reason: String },

    /// The host closed the room.
    RoomClosed,

    /// Reply to [`ClientRequest::Heartbeat`].
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// A request was rejected. `code` follows HTTP conventions.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Payload / Envelope
// ---------------------------------------------------------------------------

/// The content of an envelope, tagged by direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Request(ClientRequest),
    Broadcast(ServerBroadcast),
}

/// The top-level message wrapper. Every message on the wire is an Envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number.
    pub seq: u64,

    /// Milliseconds since the sender's clock origin.
    pub timestamp: u64,

    pub payload: Payload,
}

impl Envelope {
    /// Wraps a guest request.
    pub fn request(seq: u64, timestamp: u64, request: ClientRequest) -> Self {
        Self {
            seq,
            timestamp,
            payload: Payload::Request(request),
        }
    }

    /// Wraps a host broadcast.
    pub fn broadcast(
        seq: u64,
        timestamp: u64,
        broadcast: ServerBroadcast,
    ) -> Self {
        Self {
            seq,
            timestamp,
            payload: Payload::Broadcast(broadcast),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
