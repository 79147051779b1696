//! Lobby service configuration.

use std::time::Duration;

/// Tunables for a [`LobbyService`](crate::LobbyService).
///
/// Override individual fields with struct update syntax:
///
/// ```
/// use std::time::Duration;
/// use cavalry::LobbyConfig;
///
/// let config = LobbyConfig {
///     idle_timeout: Duration::from_secs(30),
///     ..LobbyConfig::default()
/// };
/// assert_eq!(config.max_connections, 7);
/// ```
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Remote connections a host accepts at once, pending or seated.
    /// The host's own seat is not counted.
    pub max_connections: usize,

    /// How long a new connection has to submit its name (host side), and
    /// how long a guest waits for the host to seat it.
    pub handshake_timeout: Duration,

    /// A seated guest that sends nothing for this long is dropped.
    pub idle_timeout: Duration,

    /// How often a guest sends a heartbeat. Must be well below
    /// `idle_timeout`.
    pub heartbeat_interval: Duration,

    /// Events buffered per subscriber before the slowest one starts
    /// missing them.
    pub event_capacity: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            max_connections: 7,
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(5),
            event_capacity: 256,
        }
    }
}
