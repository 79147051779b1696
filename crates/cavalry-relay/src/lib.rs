//! Relay rendezvous for the Cavalry lobby.
//!
//! A relay turns "I want to host" into a short [`JoinCode`] that guests can
//! type in, and turns that code back into the address to dial:
//!
//! ```text
//! host:  initialize → create_allocation → get_join_code → (listen) → publish
//! guest: initialize → join_allocation(code) → ConnectionDescriptor → (dial)
//! ```
//!
//! The lobby only talks to the [`Relay`] trait, so a hosted rendezvous
//! service and the in-process [`LocalRelay`] are interchangeable.

mod error;
mod local;

pub use error::RelayError;
pub use local::LocalRelay;

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use cavalry_protocol::JoinCode;
use rand::Rng;

/// Identifier of one host allocation on the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationId(pub u64);

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alloc-{}", self.0)
    }
}

/// Transport parameters for reaching (or, for the host, listening on) an
/// allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub address: SocketAddr,
}

impl ConnectionDescriptor {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }

    /// The WebSocket URL a guest dials.
    pub fn url(&self) -> String {
        format!("ws://{}", self.address)
    }
}

/// A host's reservation on the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub id: AllocationId,
    /// Guests the host expects at most, excluding itself.
    pub max_connections: usize,
    /// Where the host transport should listen.
    pub listen: ConnectionDescriptor,
}

/// A relay / rendezvous service.
///
/// All methods are fail-soft: they return a [`RelayError`] and never leave a
/// half-created allocation behind.
pub trait Relay: Send + Sync + 'static {
    /// Brings up the relay client. Safe to call more than once.
    fn initialize(&self) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Reserves an allocation for a host expecting `max_connections` guests.
    fn create_allocation(
        &self,
        max_connections: usize,
    ) -> impl Future<Output = Result<Allocation, RelayError>> + Send;

    /// Returns the shareable code for an allocation.
    fn get_join_code(
        &self,
        allocation: AllocationId,
    ) -> impl Future<Output = Result<JoinCode, RelayError>> + Send;

    /// Records the endpoint the host is actually listening on.
    ///
    /// Until this is called, [`join_allocation`](Self::join_allocation)
    /// answers [`RelayError::NotReady`].
    fn publish(
        &self,
        allocation: AllocationId,
        endpoint: ConnectionDescriptor,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Resolves a join code to the host's endpoint.
    fn join_allocation(
        &self,
        code: &JoinCode,
    ) -> impl Future<Output = Result<ConnectionDescriptor, RelayError>> + Send;

    /// Frees an allocation and retires its join code.
    fn release(
        &self,
        allocation: AllocationId,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;
}

/// Generates a random join code.
pub fn generate_join_code() -> JoinCode {
    let mut rng = rand::rng();
    JoinCode::generate_with(|n| rng.random_range(0..n))
}
