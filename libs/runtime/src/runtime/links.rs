//! Connection lifecycle
//!
//! Socket events from the network crate: a link opening adds a route to
//! its peer (and, for outbound links, announces this process), every
//! inbound frame may teach a route to a process further away, and a link
//! closing releases everything that was only reachable through it. A
//! close is matched to its socket by uuid, so the late close of a socket
//! that was already replaced leaves the live one alone.

use super::Runtime;
use crate::service::Service;
use crate::store::ServiceHandle;
use crate::RUNTIME_NAME;
use network::{ConnectionHandle, LinkEvent};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use types::{split_id, ConnectionDescriptor, ConnectionState, Direction, HostData, Identity, Message};

impl Runtime {
    pub fn handle_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened {
                gateway_id,
                url,
                direction,
                handle,
            } => self.open_connection(&gateway_id, &url, direction, handle),
            LinkEvent::Message { gateway_id, text } => self.receive_frame(&gateway_id, &text),
            LinkEvent::Closed { gateway_id, uuid } => {
                let current = self.connections.descriptor(&gateway_id).map(|d| d.uuid.as_str());
                if current.is_some_and(|current| current != uuid) {
                    debug!(gateway = %gateway_id, uuid = %uuid, "Close of a replaced socket ignored");
                    return;
                }
                info!(gateway = %gateway_id, "Connection closed");
                self.remove_connection(&gateway_id);
            }
            LinkEvent::ConnectFailed { url, error } => {
                warn!(url = %url, "Connect failed: {}", error);
            }
        }
    }

    /// Track a live socket and route its peer through it
    pub fn open_connection(&mut self, gateway_id: &str, url: &str, direction: Direction, handle: ConnectionHandle) {
        let gateway = self.identity().to_string();
        let mut descriptor = ConnectionDescriptor::websocket(gateway_id, url, gateway.clone(), direction);
        descriptor.uuid = handle.uuid().to_string();
        descriptor.state = ConnectionState::Connected;

        info!(gateway = %gateway_id, url, ?direction, "Connection opened");
        self.connections.register(descriptor, handle.clone());
        self.routes.add_route(gateway_id, gateway_id, &gateway);

        match direction {
            Direction::Inbound => self.attach_proxy_client(gateway_id, handle),
            Direction::Outbound => self.announce(gateway_id),
        }

        self.broadcast_state();
        self.drain();
    }

    /// A proxy's client connects back with the proxy's id as its gateway id
    fn attach_proxy_client(&mut self, gateway_id: &str, handle: ConnectionHandle) {
        for identity in self.store.identities_in(gateway_id) {
            if let Some(ServiceHandle::Proxy(proxy)) = self.store.get_mut(&identity) {
                proxy.attach_client(handle.clone());
                let record = serde_json::to_value(proxy.record()).unwrap_or_default();
                self.notify(&identity, "broadcastState", record);
            }
        }
    }

    /// Introduce this process to the runtime at the far end of `gateway_id`
    fn announce(&mut self, gateway_id: &str) {
        let remote = match Identity::new(RUNTIME_NAME, gateway_id) {
            Ok(remote) => remote.to_string(),
            Err(e) => {
                warn!(gateway = %gateway_id, "Cannot address peer runtime: {}", e);
                return;
            }
        };
        let local = self.identity().to_string();
        let to_remote = |method: &str, data: Vec<Value>| Message::new(remote.clone(), method, data).with_sender(local.clone());

        let mut announcements = vec![
            to_remote("addListener", vec![json!("getRegistry"), json!(local), json!("onRegistry")]),
            to_remote("getRegistry", vec![]),
        ];

        if let Some(process) = self.processes.get(self.local_id()) {
            announcements.push(to_remote("registerProcess", vec![serde_json::to_value(process).unwrap_or_default()]));
        }
        for identity in self.hosted_identities() {
            if let Some(record) = self.record_of(&identity) {
                announcements.push(to_remote("register", vec![serde_json::to_value(record).unwrap_or_default()]));
            }
        }
        let host = self
            .hosts
            .get(&self.settings.hostname)
            .cloned()
            .unwrap_or_else(|| HostData::current(self.settings.hostname.clone()));
        announcements.push(to_remote("registerHost", vec![serde_json::to_value(host).unwrap_or_default()]));

        debug!(peer = %remote, messages = announcements.len(), "Announcing");
        for message in &announcements {
            self.send_remote(message);
        }
    }

    fn receive_frame(&mut self, gateway_id: &str, text: &str) {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(gateway = %gateway_id, "Undecodable frame dropped: {}", e);
                return;
            }
        };

        self.learn_route(gateway_id, &message);

        if let Some(proxy) = self.proxy_publisher(gateway_id, &message) {
            self.store.retain(&message);
            let value = match message.data.len() {
                1 => message.data.into_iter().next().unwrap_or(Value::Null),
                _ => Value::Array(message.data),
            };
            self.notify(&proxy, &message.method, value);
            self.drain();
            return;
        }

        self.dispatch_from(gateway_id, message);
    }

    /// A sender beyond the immediate peer is reachable through this gateway
    fn learn_route(&mut self, gateway_id: &str, message: &Message) {
        let Some(sender_id) = split_id(&message.sender) else {
            return;
        };
        if sender_id == self.local_id() || sender_id == gateway_id || self.routes.get(sender_id).is_some() {
            return;
        }

        info!(remote = sender_id, gateway = %gateway_id, "Learned route");
        let gateway = self.identity().to_string();
        self.routes.add_route(sender_id, gateway_id, &gateway);
    }

    /// Proxy whose client sent `message` as one of its own publications
    fn proxy_publisher(&self, gateway_id: &str, message: &Message) -> Option<Identity> {
        if message.sender.is_empty() || message.sender != message.name {
            return None;
        }
        let identity = Identity::parse(&message.sender).ok()?;
        match self.store.get(&identity)? {
            ServiceHandle::Proxy(proxy) if proxy.client_gateway() == Some(gateway_id) => Some(identity),
            _ => None,
        }
    }

    /// Drop a connection and everything only reachable through it.
    ///
    /// Every service in the peer's process, or in any process whose route
    /// went through the connection, is released. That includes a proxy
    /// whose client process was the peer, which is stopped first.
    pub fn remove_connection(&mut self, gateway_id: &str) -> bool {
        let descriptor = self.connections.remove(gateway_id);
        let mut unreachable: Vec<String> = self
            .routes
            .remove_gateway(gateway_id)
            .into_iter()
            .map(|route| route.remote_id)
            .collect();
        unreachable.push(gateway_id.to_string());

        let mut released = Vec::new();
        for identity in self.store.identities() {
            let gone = unreachable.iter().any(|id| id == identity.id());
            match self.store.get_mut(&identity) {
                Some(ServiceHandle::Proxy(_) | ServiceHandle::Remote(_)) if gone => released.push(identity),
                Some(ServiceHandle::Proxy(proxy)) if proxy.client_gateway() == Some(gateway_id) => {
                    proxy.detach_client();
                }
                _ => {}
            }
        }

        for identity in &released {
            let mut ctx = self.context();
            if let Some(ServiceHandle::Proxy(mut proxy)) = self.store.remove(identity) {
                proxy.stop_service(&mut ctx);
            }
            self.absorb(identity, ctx);
            info!(identity = %identity, gateway = %gateway_id, "Released with its connection");
            let local = self.identity().clone();
            self.notify(&local, "released", json!(identity.to_string()));
        }
        for id in &unreachable {
            self.processes.remove(id);
        }

        if descriptor.is_none() && released.is_empty() {
            debug!(gateway = %gateway_id, "No such connection");
            return false;
        }

        self.publish_registry();
        self.broadcast_state();
        self.drain();
        true
    }
}
