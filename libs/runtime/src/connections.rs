//! Connection table
//!
//! Serializable descriptors and live socket handles, both keyed by
//! gateway id. Only descriptors ever leave the process.

use network::ConnectionHandle;
use std::collections::{BTreeMap, HashMap};
use types::{ConnectionDescriptor, ConnectionState};

#[derive(Debug, Default)]
pub struct ConnectionTable {
    descriptors: BTreeMap<String, ConnectionDescriptor>,
    handles: HashMap<String, ConnectionHandle>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection, replacing any previous one with the same gateway id
    pub fn register(&mut self, descriptor: ConnectionDescriptor, handle: ConnectionHandle) {
        let gateway_id = descriptor.gateway_id.clone();
        self.descriptors.insert(gateway_id.clone(), descriptor);
        self.handles.insert(gateway_id, handle);
    }

    /// Forget a connection; dropping the handle closes its socket
    pub fn remove(&mut self, gateway_id: &str) -> Option<ConnectionDescriptor> {
        self.handles.remove(gateway_id);
        self.descriptors.remove(gateway_id).map(|mut d| {
            d.state = ConnectionState::Closed;
            d
        })
    }

    pub fn handle(&self, gateway_id: &str) -> Option<&ConnectionHandle> {
        self.handles.get(gateway_id)
    }

    pub fn handles(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.handles.values()
    }

    pub fn descriptor(&self, gateway_id: &str) -> Option<&ConnectionDescriptor> {
        self.descriptors.get(gateway_id)
    }

    pub fn descriptors(&self) -> &BTreeMap<String, ConnectionDescriptor> {
        &self.descriptors
    }

    pub fn contains(&self, gateway_id: &str) -> bool {
        self.descriptors.contains_key(gateway_id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use types::Direction;

    #[test]
    fn test_register_and_remove() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut table = ConnectionTable::new();
        table.register(
            ConnectionDescriptor::websocket("P2", "ws://p2:3001/api/messages", "runtime@P1", Direction::Outbound),
            ConnectionHandle::new("P2", tx),
        );

        assert!(table.contains("P2"));
        assert_eq!(table.handles().count(), 1);

        let removed = table.remove("P2").unwrap();
        assert_eq!(removed.state, ConnectionState::Closed);
        assert!(table.handle("P2").is_none());
        assert!(table.is_empty());

        // the socket task sees the channel close
        let mut rx = rx;
        assert!(rx.try_recv().is_err());
    }
}
