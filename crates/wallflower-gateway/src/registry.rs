use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use wallflower_types::events::GatewayEvent;

/// Outbound queue depth per connection. A receiver that falls this far
/// behind is disconnected rather than allowed to stall the router.
pub const OUTBOUND_QUEUE: usize = 256;

#[derive(Clone)]
struct ConnectionHandle {
    conn_id: Uuid,
    wall_id: Uuid,
    tx: mpsc::Sender<GatewayEvent>,
}

/// In-memory registry of live connections. Rebuilt empty on restart;
/// nothing here is durable.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// member -> live connections (one per device/tab)
    connections: RwLock<HashMap<Uuid, Vec<ConnectionHandle>>>,

    /// wall -> members with at least one live connection to it
    wall_index: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: RwLock::new(HashMap::new()),
                wall_index: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a connection under (member, wall). Returns the connection id
    /// and the bounded receiver the socket loop drains.
    pub async fn register(
        &self,
        member_id: Uuid,
        wall_id: Uuid,
    ) -> (Uuid, mpsc::Receiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);

        self.inner
            .connections
            .write()
            .await
            .entry(member_id)
            .or_default()
            .push(ConnectionHandle {
                conn_id,
                wall_id,
                tx,
            });

        self.inner
            .wall_index
            .write()
            .await
            .entry(wall_id)
            .or_default()
            .insert(member_id);

        debug!(%member_id, %wall_id, %conn_id, "connection registered");
        (conn_id, rx)
    }

    /// Remove one connection. When it was the member's last connection for
    /// the wall, the wall-level index entry is pruned too.
    pub async fn deregister(&self, member_id: Uuid, wall_id: Uuid, conn_id: Uuid) {
        let last_for_wall = {
            let mut connections = self.inner.connections.write().await;
            let Some(handles) = connections.get_mut(&member_id) else {
                return;
            };
            handles.retain(|h| h.conn_id != conn_id);

            let still_on_wall = handles.iter().any(|h| h.wall_id == wall_id);
            if handles.is_empty() {
                connections.remove(&member_id);
            }
            !still_on_wall
        };

        if last_for_wall {
            let mut wall_index = self.inner.wall_index.write().await;
            if let Some(members) = wall_index.get_mut(&wall_id) {
                members.remove(&member_id);
                if members.is_empty() {
                    wall_index.remove(&wall_id);
                }
            }
        }

        debug!(%member_id, %wall_id, %conn_id, "connection deregistered");
    }

    /// Push an event to every connection the member holds on the wall.
    /// A member with no live connection is not an error — the push is
    /// dropped and the member reconciles from the durable store later.
    /// Connections whose outbound queue is full are disconnected.
    pub async fn send_to_member(&self, wall_id: Uuid, member_id: Uuid, event: GatewayEvent) {
        let handles: Vec<(Uuid, mpsc::Sender<GatewayEvent>)> = {
            let connections = self.inner.connections.read().await;
            match connections.get(&member_id) {
                Some(handles) => handles
                    .iter()
                    .filter(|h| h.wall_id == wall_id)
                    .map(|h| (h.conn_id, h.tx.clone()))
                    .collect(),
                None => return,
            }
        };

        let mut stalled = Vec::new();
        for (conn_id, tx) in handles {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(%member_id, %conn_id, "outbound queue full, disconnecting");
                    stalled.push(conn_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    stalled.push(conn_id);
                }
            }
        }

        for conn_id in stalled {
            self.deregister(member_id, wall_id, conn_id).await;
        }
    }

    pub async fn is_online(&self, wall_id: Uuid, member_id: Uuid) -> bool {
        self.inner
            .wall_index
            .read()
            .await
            .get(&wall_id)
            .is_some_and(|members| members.contains(&member_id))
    }

    /// Members currently connected to a wall.
    pub async fn online_members(&self, wall_id: Uuid) -> Vec<Uuid> {
        self.inner
            .wall_index
            .read()
            .await
            .get(&wall_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self, member_id: Uuid) -> usize {
        self.inner
            .connections
            .read()
            .await
            .get(&member_id)
            .map(|handles| handles.len())
            .unwrap_or(0)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing_event() -> GatewayEvent {
        GatewayEvent::TypingIndicator {
            conversation_id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn member_may_hold_multiple_connections() {
        let registry = Registry::new();
        let member = Uuid::new_v4();
        let wall = Uuid::new_v4();

        let (_c1, mut rx1) = registry.register(member, wall).await;
        let (_c2, mut rx2) = registry.register(member, wall).await;
        assert_eq!(registry.connection_count(member).await, 2);

        registry
            .send_to_member(wall, member, typing_event())
            .await;
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn closing_last_connection_prunes_wall_index() {
        let registry = Registry::new();
        let member = Uuid::new_v4();
        let wall = Uuid::new_v4();

        let (c1, _rx1) = registry.register(member, wall).await;
        let (c2, _rx2) = registry.register(member, wall).await;
        assert!(registry.is_online(wall, member).await);

        registry.deregister(member, wall, c1).await;
        assert!(registry.is_online(wall, member).await);

        registry.deregister(member, wall, c2).await;
        assert!(!registry.is_online(wall, member).await);
        assert!(registry.online_members(wall).await.is_empty());
    }

    #[tokio::test]
    async fn push_to_absent_member_is_a_noop() {
        let registry = Registry::new();
        let wall = Uuid::new_v4();

        // No registration ever happened; must not panic or error.
        registry
            .send_to_member(wall, Uuid::new_v4(), typing_event())
            .await;
    }

    #[tokio::test]
    async fn wall_scoping_keeps_events_apart() {
        let registry = Registry::new();
        let member = Uuid::new_v4();
        let wall_one = Uuid::new_v4();
        let wall_two = Uuid::new_v4();

        let (_c1, mut rx_one) = registry.register(member, wall_one).await;
        let (_c2, mut rx_two) = registry.register(member, wall_two).await;

        registry
            .send_to_member(wall_one, member, typing_event())
            .await;
        assert!(rx_one.try_recv().is_ok());
        assert!(rx_two.try_recv().is_err());
    }

    #[tokio::test]
    async fn overflowing_connection_is_disconnected() {
        let registry = Registry::new();
        let member = Uuid::new_v4();
        let wall = Uuid::new_v4();

        // Never drain rx, so the queue fills.
        let (_conn, _rx) = registry.register(member, wall).await;
        for _ in 0..=OUTBOUND_QUEUE {
            registry
                .send_to_member(wall, member, typing_event())
                .await;
        }

        assert_eq!(registry.connection_count(member).await, 0);
        assert!(!registry.is_online(wall, member).await);
    }
}
