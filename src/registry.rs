use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::{Identity, ServerMsg};

/// A live transport bound to an identity.
pub struct Connection {
    pub conn_id: Uuid,
    pub identity: Identity,
    pub tx: mpsc::UnboundedSender<ServerMsg>,
}

/// Maps each stable key to its current transport handle.
///
/// The one structure shared across tasks: gateway tasks bind and release on
/// connect/disconnect, the world task sends outbound messages through it.
/// At most one live transport may be bound per stable key.
pub struct Registry {
    conns: DashMap<String, Connection>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            conns: DashMap::new(),
        })
    }

    /// Binds a transport to the identity's stable key. Returns false when the
    /// key already has a live transport (the new connection must be refused).
    pub fn bind(
        &self,
        identity: Identity,
        conn_id: Uuid,
        tx: mpsc::UnboundedSender<ServerMsg>,
    ) -> bool {
        match self.conns.entry(identity.stable_key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Connection {
                    conn_id,
                    identity,
                    tx,
                });
                true
            }
        }
    }

    /// Releases a binding, but only while it still belongs to `conn_id`;
    /// a reconnect that raced the old socket's teardown keeps its binding.
    pub fn release(&self, stable_key: &str, conn_id: Uuid) {
        self.conns
            .remove_if(stable_key, |_, conn| conn.conn_id == conn_id);
    }

    pub fn is_connected(&self, stable_key: &str) -> bool {
        self.conns.contains_key(stable_key)
    }

    /// Sends a message to the identity's live transport; silently dropped
    /// when the identity is currently offline.
    pub fn send_to(&self, stable_key: &str, msg: ServerMsg) {
        if let Some(conn) = self.conns.get(stable_key) {
            let _ = conn.tx.send(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::stable_key;

    fn identity(handle: &str) -> Identity {
        Identity {
            numeric_id: 7,
            display_name: handle.to_string(),
            stable_key: stable_key(handle),
        }
    }

    #[test]
    fn second_binding_for_same_key_is_refused() {
        let registry = Registry::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();

        assert!(registry.bind(identity("Ada"), Uuid::new_v4(), tx_a));
        // Same handle, different case: same stable key.
        assert!(!registry.bind(identity("ada"), Uuid::new_v4(), tx_b));
    }

    #[test]
    fn release_ignores_stale_conn_ids() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let live = Uuid::new_v4();

        assert!(registry.bind(identity("ada"), live, tx));
        registry.release(&stable_key("ada"), Uuid::new_v4());
        assert!(registry.is_connected(&stable_key("ada")));
        registry.release(&stable_key("ada"), live);
        assert!(!registry.is_connected(&stable_key("ada")));
    }

    #[test]
    fn send_to_reaches_the_bound_transport() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(registry.bind(identity("ada"), Uuid::new_v4(), tx));
        registry.send_to(
            &stable_key("ada"),
            ServerMsg::QueueOk {
                message: "hello".to_string(),
            },
        );
        assert!(matches!(rx.try_recv(), Ok(ServerMsg::QueueOk { .. })));

        // Unknown keys are a silent no-op.
        registry.send_to(
            &stable_key("nobody"),
            ServerMsg::QueueOk {
                message: "hello".to_string(),
            },
        );
    }
}
