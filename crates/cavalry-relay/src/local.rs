//! In-process relay: a join-code directory shared by every participant in
//! one process (or one test).

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use cavalry_protocol::JoinCode;
use tokio::sync::Mutex;

use crate::{
    generate_join_code, Allocation, AllocationId, ConnectionDescriptor,
    Relay, RelayError,
};

/// Most guests one allocation may be created for.
const MAX_CONNECTIONS_LIMIT: usize = 100;

/// A [`Relay`] that keeps allocations in memory.
///
/// Cloning is cheap and every clone shares the same directory, so a host
/// service and its guests can each hold one.
#[derive(Clone)]
pub struct LocalRelay {
    inner: Arc<Mutex<Directory>>,
    listen_ip: IpAddr,
}

#[derive(Default)]
struct Directory {
    offline: bool,
    next_allocation: u64,
    allocations: HashMap<AllocationId, AllocationEntry>,
    codes: HashMap<JoinCode, AllocationId>,
}

struct AllocationEntry {
    code: Option<JoinCode>,
    endpoint: Option<ConnectionDescriptor>,
}

impl LocalRelay {
    /// Creates a relay whose hosts listen on loopback.
    pub fn new() -> Self {
        Self::with_listen_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    /// Creates a relay whose hosts listen on `ip` with an OS-assigned port.
    pub fn with_listen_ip(ip: IpAddr) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Directory::default())),
            listen_ip: ip,
        }
    }

    /// Simulates the relay service going down (`true`) or coming back.
    pub async fn set_offline(&self, offline: bool) {
        self.inner.lock().await.offline = offline;
        tracing::info!(offline, "local relay availability changed");
    }

    /// Number of live allocations.
    pub async fn allocation_count(&self) -> usize {
        self.inner.lock().await.allocations.len()
    }
}

impl Default for LocalRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    fn ensure_online(&self) -> Result<(), RelayError> {
        if self.offline {
            return Err(RelayError::Unavailable("local relay is offline".into()));
        }
        Ok(())
    }
}

impl Relay for LocalRelay {
    async fn initialize(&self) -> Result<(), RelayError> {
        self.inner.lock().await.ensure_online()
    }

    async fn create_allocation(
        &self,
        max_connections: usize,
    ) -> Result<Allocation, RelayError> {
        let mut dir = self.inner.lock().await;
        dir.ensure_online()?;

        if max_connections == 0 || max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(RelayError::InvalidMaxConnections {
                requested: max_connections,
                limit: MAX_CONNECTIONS_LIMIT,
            });
        }

        dir.next_allocation += 1;
        let id = AllocationId(dir.next_allocation);
        dir.allocations.insert(
            id,
            AllocationEntry {
                code: None,
                endpoint: None,
            },
        );

        tracing::debug!(allocation = %id, max_connections, "allocation created");
        Ok(Allocation {
            id,
            max_connections,
            listen: ConnectionDescriptor::new(SocketAddr::new(self.listen_ip, 0)),
        })
    }

    async fn get_join_code(
        &self,
        allocation: AllocationId,
    ) -> Result<JoinCode, RelayError> {
        let mut dir = self.inner.lock().await;
        dir.ensure_online()?;

        let existing = dir
            .allocations
            .get(&allocation)
            .ok_or(RelayError::UnknownAllocation(allocation))?
            .code
            .clone();
        if let Some(code) = existing {
            return Ok(code);
        }

        let code = loop {
            let candidate = generate_join_code();
            if !dir.codes.contains_key(&candidate) {
                break candidate;
            }
        };
        dir.codes.insert(code.clone(), allocation);
        if let Some(entry) = dir.allocations.get_mut(&allocation) {
            entry.code = Some(code.clone());
        }

        tracing::info!(allocation = %allocation, join_code = %code, "join code issued");
        Ok(code)
    }

    async fn publish(
        &self,
        allocation: AllocationId,
        endpoint: ConnectionDescriptor,
    ) -> Result<(), RelayError> {
        let mut dir = self.inner.lock().await;
        dir.ensure_online()?;

        let entry = dir
            .allocations
            .get_mut(&allocation)
            .ok_or(RelayError::UnknownAllocation(allocation))?;
        entry.endpoint = Some(endpoint);

        tracing::debug!(allocation = %allocation, address = %endpoint.address, "endpoint published");
        Ok(())
    }

    async fn join_allocation(
        &self,
        code: &JoinCode,
    ) -> Result<ConnectionDescriptor, RelayError> {
        let dir = self.inner.lock().await;
        dir.ensure_online()?;

        let allocation = dir
            .codes
            .get(code)
            .ok_or_else(|| RelayError::InvalidJoinCode(code.clone()))?;
        dir.allocations
            .get(allocation)
            .and_then(|entry| entry.endpoint)
            .ok_or_else(|| RelayError::NotReady(code.clone()))
    }

    async fn release(&self, allocation: AllocationId) -> Result<(), RelayError> {
        let mut dir = self.inner.lock().await;

        let entry = dir
            .allocations
            .remove(&allocation)
            .ok_or(RelayError::UnknownAllocation(allocation))?;
        if let Some(code) = entry.code {
            dir.codes.remove(&code);
        }

        tracing::debug!(allocation = %allocation, "allocation released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(port: u16) -> ConnectionDescriptor {
        ConnectionDescriptor::new(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        ))
    }

    #[tokio::test]
    async fn test_allocation_listens_on_configured_ip_with_free_port() {
        let relay = LocalRelay::new();
        let alloc = relay.create_allocation(7).await.unwrap();
        assert_eq!(alloc.listen.address.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(alloc.listen.address.port(), 0);
        assert_eq!(alloc.max_connections, 7);
    }

    #[tokio::test]
    async fn test_get_join_code_is_stable_per_allocation() {
        let relay = LocalRelay::new();
        let alloc = relay.create_allocation(7).await.unwrap();
        let first = relay.get_join_code(alloc.id).await.unwrap();
        let second = relay.get_join_code(alloc.id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_create_allocation_rejects_zero_connections() {
        let relay = LocalRelay::new();
        let result = relay.create_allocation(0).await;
        assert!(matches!(
            result,
            Err(RelayError::InvalidMaxConnections { requested: 0, .. })
        ));
        assert_eq!(relay.allocation_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_unknown_allocation_fails() {
        let relay = LocalRelay::new();
        let result = relay.publish(AllocationId(99), endpoint(1)).await;
        assert!(matches!(result, Err(RelayError::UnknownAllocation(_))));
    }

    #[tokio::test]
    async fn test_release_twice_reports_unknown() {
        let relay = LocalRelay::new();
        let alloc = relay.create_allocation(1).await.unwrap();
        relay.release(alloc.id).await.unwrap();
        assert!(relay.release(alloc.id).await.is_err());
    }
}
