//! Registry and dispatcher state
//!
//! The process-local map from [`Identity`] to whatever answers at that
//! address: the runtime itself, an in-process service, a proxy fronting
//! an out-of-process client, or the record of a service living in another
//! process. The store also keeps the last message seen per
//! `sender.method` and implements the unscoped broadcast primitive.

use crate::proxy::Proxy;
use crate::service::Service;
use network::ConnectionHandle;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use types::{Identity, Message, ServiceRecord};

pub enum ServiceHandle {
    /// Placeholder for the runtime, which is not owned by the store
    Runtime,
    Local(Box<dyn Service>),
    Proxy(Box<Proxy>),
    Remote(ServiceRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Runtime,
    Local,
    Proxy,
    Remote,
}

impl ServiceHandle {
    pub fn kind(&self) -> HandleKind {
        match self {
            ServiceHandle::Runtime => HandleKind::Runtime,
            ServiceHandle::Local(_) => HandleKind::Local,
            ServiceHandle::Proxy(_) => HandleKind::Proxy,
            ServiceHandle::Remote(_) => HandleKind::Remote,
        }
    }

    /// Live in this process (runtime, local service or proxy)
    pub fn is_hosted(&self) -> bool {
        !matches!(self, ServiceHandle::Remote(_))
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceHandle::Runtime => write!(f, "Runtime"),
            ServiceHandle::Local(s) => write!(f, "Local({})", s.identity()),
            ServiceHandle::Proxy(p) => write!(f, "Proxy({})", p.identity()),
            ServiceHandle::Remote(r) => write!(f, "Remote({})", r.fullname),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    Replaced,
    /// Identical remote record already held
    Unchanged,
    /// A hosted instance already answers at this identity
    Protected,
}

impl Registration {
    pub fn changed(self) -> bool {
        matches!(self, Registration::Inserted | Registration::Replaced)
    }
}

pub struct Store {
    local_id: String,
    registry: HashMap<Identity, ServiceHandle>,
    retained: BTreeMap<String, Message>,
}

impl Store {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            registry: HashMap::new(),
            retained: BTreeMap::new(),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn canonicalize(&self, raw: &str) -> types::Result<Identity> {
        Identity::resolve(raw, &self.local_id)
    }

    /// Insert or replace; never overwrites a hosted instance
    pub fn register(&mut self, identity: Identity, handle: ServiceHandle) -> Registration {
        let outcome = match (self.registry.get(&identity), &handle) {
            (Some(existing), _) if existing.is_hosted() => {
                debug!(identity = %identity, "Registration of live instance ignored");
                return Registration::Protected;
            }
            (Some(ServiceHandle::Remote(old)), ServiceHandle::Remote(new)) if old == new => {
                return Registration::Unchanged;
            }
            (Some(_), _) => Registration::Replaced,
            (None, _) => Registration::Inserted,
        };

        debug!(identity = %identity, kind = ?handle.kind(), ?outcome, "Registered");
        self.registry.insert(identity, handle);
        outcome
    }

    pub fn resolve(&self, raw: &str) -> Option<&ServiceHandle> {
        let identity = self.canonicalize(raw).ok()?;
        self.registry.get(&identity)
    }

    pub fn get(&self, identity: &Identity) -> Option<&ServiceHandle> {
        self.registry.get(identity)
    }

    pub fn get_mut(&mut self, identity: &Identity) -> Option<&mut ServiceHandle> {
        self.registry.get_mut(identity)
    }

    pub fn kind_of(&self, identity: &Identity) -> Option<HandleKind> {
        self.registry.get(identity).map(ServiceHandle::kind)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.registry.contains_key(identity)
    }

    pub fn remove(&mut self, identity: &Identity) -> Option<ServiceHandle> {
        self.registry.remove(identity)
    }

    /// All identities, sorted
    pub fn identities(&self) -> Vec<Identity> {
        let mut ids: Vec<_> = self.registry.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Identities living in process `process_id`
    pub fn identities_in(&self, process_id: &str) -> Vec<Identity> {
        let mut ids: Vec<_> = self
            .registry
            .keys()
            .filter(|id| id.id() == process_id)
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &ServiceHandle)> {
        self.registry.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Identity, &mut ServiceHandle)> {
        self.registry.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Keep the latest message per `sender.method`
    pub fn retain(&mut self, message: &Message) {
        self.retained.insert(message.retention_key(), message.clone());
    }

    pub fn retained(&self) -> &BTreeMap<String, Message> {
        &self.retained
    }

    /// Retained messages sent by `sender`
    pub fn retained_from<'a>(&'a self, sender: &'a str) -> impl Iterator<Item = &'a Message> {
        self.retained.values().filter(move |m| m.sender == sender)
    }

    /// Send to every socket regardless of subscriptions; returns the number reached
    pub fn broadcast<'a>(
        message: &Message,
        sockets: impl IntoIterator<Item = &'a ConnectionHandle>,
    ) -> usize {
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode broadcast {}: {}", message.method, e);
                return 0;
            }
        };

        sockets
            .into_iter()
            .filter(|socket| match socket.send_text(text.clone()) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Broadcast skipped {}: {}", socket.gateway_id(), e);
                    false
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn remote_record(fullname: &str) -> ServiceRecord {
        serde_json::from_value(json!({
            "id": types::split_id(fullname).unwrap(),
            "name": types::split_name(fullname),
            "fullname": fullname,
            "typeKey": "Servo"
        }))
        .unwrap()
    }

    #[test]
    fn test_runtime_registration_is_protected() {
        let mut store = Store::new("P1");
        let runtime = Identity::new("runtime", "P1").unwrap();

        assert_eq!(store.register(runtime.clone(), ServiceHandle::Runtime), Registration::Inserted);
        assert_eq!(store.register(runtime.clone(), ServiceHandle::Runtime), Registration::Protected);
        assert_eq!(
            store.register(runtime.clone(), ServiceHandle::Remote(remote_record("runtime@P1"))),
            Registration::Protected
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.kind_of(&runtime), Some(HandleKind::Runtime));
    }

    #[test]
    fn test_remote_last_write_wins() {
        let mut store = Store::new("P1");
        let servo = Identity::parse("servo01@P2").unwrap();

        let first = remote_record("servo01@P2");
        let mut second = first.clone();
        second.ready = true;

        assert_eq!(store.register(servo.clone(), ServiceHandle::Remote(first.clone())), Registration::Inserted);
        assert_eq!(store.register(servo.clone(), ServiceHandle::Remote(first)), Registration::Unchanged);
        assert_eq!(store.register(servo.clone(), ServiceHandle::Remote(second)), Registration::Replaced);

        match store.resolve("servo01@P2") {
            Some(ServiceHandle::Remote(record)) => assert!(record.ready),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_bare_name() {
        let mut store = Store::new("P1");
        store.register(Identity::new("runtime", "P1").unwrap(), ServiceHandle::Runtime);
        assert!(store.resolve("runtime").is_some());
        assert!(store.resolve("runtime@P2").is_none());
        assert!(store.resolve("runtime@").is_none());
    }

    #[test]
    fn test_identities_in_process() {
        let mut store = Store::new("P1");
        for name in ["a@P2", "b@P2", "c@P3"] {
            store.register(Identity::parse(name).unwrap(), ServiceHandle::Remote(remote_record(name)));
        }
        let ids: Vec<String> = store.identities_in("P2").iter().map(|i| i.to_string()).collect();
        assert_eq!(ids, vec!["a@P2", "b@P2"]);
    }

    #[test]
    fn test_retained_messages() {
        let mut store = Store::new("P1");
        store.retain(&Message::new("ui", "onEpoch", vec![json!(1)]).with_sender("clock01@P1"));
        store.retain(&Message::new("ui", "onEpoch", vec![json!(2)]).with_sender("clock01@P1"));
        store.retain(&Message::new("ui", "onTick", vec![]).with_sender("clock02@P1"));

        assert_eq!(store.retained().len(), 2);
        let latest: Vec<_> = store.retained_from("clock01@P1").collect();
        assert_eq!(latest[0].data, vec![json!(2)]);
    }

    #[test]
    fn test_broadcast_reaches_every_open_socket() {
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        drop(rx2);
        let sockets = vec![ConnectionHandle::new("P2", tx1), ConnectionHandle::new("P3", tx2)];

        let msg = Message::new("runtime@P1", "broadcastState", vec![]).with_sender("runtime@P1");
        assert_eq!(Store::broadcast(&msg, &sockets), 1);
        assert!(rx1.try_recv().unwrap().contains("broadcastState"));
    }
}
