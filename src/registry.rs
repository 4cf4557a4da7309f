//! Registry of live, handshaken connections.
//!
//! `ClientRegistry` maps each [`ConnectionId`] to its shared [`Connection`].
//! Removal marks the connection closed while the shard lock is held, so a
//! connection observed through the registry has not been torn down yet.
//! Snapshots clone the handles out and release the lock before any caller
//! performs network I/O.
use std::sync::Arc;

use dashmap::DashMap;

use crate::connection::{Connection, ConnectionState};

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Concurrent registry of connections keyed by [`ConnectionId`].
#[derive(Default)]
pub struct ClientRegistry(DashMap<ConnectionId, Arc<Connection>>);

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a newly handshaken connection.
    pub fn insert(&self, connection: Arc<Connection>) {
        self.0.insert(connection.id(), connection);
    }

    /// Unregister `id`, marking the connection closed before the lock is
    /// released.
    ///
    /// Returns the removed connection, or `None` if it was already gone.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.0
            .remove_if(id, |_, conn| {
                conn.set_state(ConnectionState::Closed);
                true
            })
            .map(|(_, conn)| conn)
    }

    /// Retrieve the connection registered under `id`.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.0.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool { self.0.contains_key(id) }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Registered ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.0.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Clone every registered connection handle.
    ///
    /// The returned handles stay valid after the lock is released; a
    /// connection removed concurrently reports itself closed on send.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.0.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use futures::{SinkExt, sink};
    use rstest::{fixture, rstest};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::frame::{CodecError, Frame};

    fn connection(id: u64) -> Arc<Connection> {
        let peer: SocketAddr = "127.0.0.1:40000".parse().expect("addr");
        let sink = sink::drain::<Frame>().sink_map_err(|never| -> CodecError { match never {} });
        let conn = Connection::new(ConnectionId::new(id), peer, sink, CancellationToken::new());
        conn.set_state(ConnectionState::Open);
        Arc::new(conn)
    }

    #[fixture]
    fn registry() -> ClientRegistry {
        let registry = ClientRegistry::new();
        for id in [3, 1, 2] {
            registry.insert(connection(id));
        }
        registry
    }

    #[rstest]
    fn ids_are_sorted(registry: ClientRegistry) {
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.ids(),
            vec![ConnectionId::new(1), ConnectionId::new(2), ConnectionId::new(3)]
        );
    }

    #[rstest]
    fn remove_marks_closed(registry: ClientRegistry) {
        let id = ConnectionId::new(2);
        let held = registry.get(&id).expect("registered");
        let removed = registry.remove(&id).expect("removed");
        assert!(Arc::ptr_eq(&held, &removed));
        assert_eq!(held.state(), ConnectionState::Closed);
        assert!(!registry.contains(&id));
        assert!(registry.remove(&id).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn snapshot_outlives_removal(registry: ClientRegistry) {
        let snapshot = registry.snapshot();
        for id in registry.ids() {
            registry.remove(&id);
        }
        assert!(registry.is_empty());
        assert_eq!(snapshot.len(), 3);
        for conn in snapshot {
            assert!(conn.send_frame(Frame::text("late")).await.is_err());
        }
    }
}
