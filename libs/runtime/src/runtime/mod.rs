//! Runtime orchestrator
//!
//! One [`Runtime`] per process. It owns the [`Store`], the [`RouteTable`],
//! the [`ConnectionTable`] and the process/host descriptors, and it is
//! itself a service (`runtime@<id>`) answering registry, routing and
//! launch operations by message.
//!
//! All state changes happen through `&mut self`. The
//! [`RuntimeDriver`](crate::RuntimeDriver) feeds socket, timer and HTTP
//! events in one at a time, so nothing here needs a lock.

mod dispatch;
mod launch;
mod links;
mod operations;

use crate::connections::ConnectionTable;
use crate::error::Result;
use crate::event::{EventSender, RuntimeEvent};
use crate::launch::{builtin_packages, ServiceFactory};
use crate::proxy::Proxy;
use crate::routes::RouteTable;
use crate::service::{Args, InvokeResult, Service, ServiceContext, ServiceCore};
use crate::store::{HandleKind, Registration, ServiceHandle, Store};
use crate::RUNTIME_NAME;
use network::{LinkEvent, LinkSender, MESSAGES_PATH};
use node_config::{PackageRepo, RuntimeConfig, LOCAL_PLATFORM};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::{HostData, Identity, Message, NotifyList, ProcessData, ServiceRecord};

pub use self::operations::RUNTIME_TYPE_KEY;

/// Upper bound on messages delivered while draining one event
pub const MAX_CASCADE: usize = 10_000;

/// Process-level settings the runtime needs after startup
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub id: String,
    pub hostname: String,
    pub platform: String,
    pub port: u16,
}

impl RuntimeSettings {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hostname: "localhost".to_string(),
            platform: LOCAL_PLATFORM.to_string(),
            port: 3001,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            id: config.process_id().to_string(),
            hostname: config.hostname().to_string(),
            platform: config.platform.clone(),
            port: config.port,
        }
    }

    /// URL an out-of-process client uses to connect back as `client_id`
    pub fn client_url(&self, client_id: &str) -> String {
        format!("ws://localhost:{}{}?id={}", self.port, MESSAGES_PATH, client_id)
    }
}

/// Receiving ends handed to the driver
pub struct RuntimeInbox {
    pub events: mpsc::UnboundedReceiver<RuntimeEvent>,
    pub links: mpsc::UnboundedReceiver<LinkEvent>,
}

pub struct Runtime {
    core: ServiceCore,
    settings: RuntimeSettings,
    store: Store,
    routes: RouteTable,
    connections: ConnectionTable,
    processes: BTreeMap<String, ProcessData>,
    hosts: BTreeMap<String, HostData>,
    repo: PackageRepo,
    factory: ServiceFactory,
    pending: VecDeque<Message>,
    draining: bool,
    events: EventSender,
    links: LinkSender,
}

impl Runtime {
    pub fn new(settings: RuntimeSettings, repo: PackageRepo, factory: ServiceFactory) -> Result<(Self, RuntimeInbox)> {
        let identity = Identity::new(RUNTIME_NAME, settings.id.clone())?;
        let (events, events_rx) = mpsc::unbounded_channel();
        let (links, links_rx) = mpsc::unbounded_channel();

        let mut repo = repo;
        for pkg in builtin_packages() {
            repo.insert(pkg.type_key.to_lowercase(), pkg);
        }

        let mut core = ServiceCore::new(identity.clone(), RUNTIME_TYPE_KEY).with_hostname(settings.hostname.clone());
        core.start();

        let mut store = Store::new(settings.id.clone());
        store.register(identity, ServiceHandle::Runtime);

        let mut processes = BTreeMap::new();
        processes.insert(
            settings.id.clone(),
            ProcessData::current(settings.id.clone(), Some(settings.hostname.clone()), settings.platform.clone()),
        );
        let mut hosts = BTreeMap::new();
        hosts.insert(settings.hostname.clone(), HostData::current(settings.hostname.clone()));

        info!(id = %settings.id, hostname = %settings.hostname, packages = repo.len(), "Runtime created");

        let runtime = Self {
            core,
            settings,
            store,
            routes: RouteTable::new(),
            connections: ConnectionTable::new(),
            processes,
            hosts,
            repo,
            factory,
            pending: VecDeque::new(),
            draining: false,
            events,
            links,
        };
        let inbox = RuntimeInbox {
            events: events_rx,
            links: links_rx,
        };
        Ok((runtime, inbox))
    }

    pub fn identity(&self) -> &Identity {
        &self.core.identity
    }

    pub fn local_id(&self) -> &str {
        &self.settings.id
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn processes(&self) -> &BTreeMap<String, ProcessData> {
        &self.processes
    }

    pub fn hosts(&self) -> &BTreeMap<String, HostData> {
        &self.hosts
    }

    pub fn repo(&self) -> &PackageRepo {
        &self.repo
    }

    pub(crate) fn factory(&self) -> &ServiceFactory {
        &self.factory
    }

    /// Sender for timer and install results
    pub fn events_sender(&self) -> EventSender {
        self.events.clone()
    }

    /// Sender sockets use to report link activity
    pub fn links_sender(&self) -> LinkSender {
        self.links.clone()
    }

    /// Context for an operation run on behalf of this runtime
    pub(crate) fn context(&self) -> ServiceContext {
        ServiceContext::new(self.core.identity.clone(), self.events.clone())
    }

    /// Add an in-process service, start it and announce it
    pub fn add_service(&mut self, service: Box<dyn Service>) -> Registration {
        let identity = service.identity().clone();
        self.add_hosted(identity, ServiceHandle::Local(service))
    }

    pub fn add_proxy(&mut self, proxy: Proxy) -> Registration {
        let identity = proxy.identity().clone();
        self.add_hosted(identity, ServiceHandle::Proxy(Box::new(proxy)))
    }

    pub(crate) fn add_hosted(&mut self, identity: Identity, mut handle: ServiceHandle) -> Registration {
        let mut ctx = self.context();
        match &mut handle {
            ServiceHandle::Local(service) => service.start_service(&mut ctx),
            ServiceHandle::Proxy(proxy) => proxy.start_service(&mut ctx),
            ServiceHandle::Runtime | ServiceHandle::Remote(_) => {}
        }

        let outcome = self.store.register(identity.clone(), handle);
        if outcome.changed() {
            self.absorb(&identity, ctx);
            self.announce_registration(&identity);
        } else {
            warn!(identity = %identity, ?outcome, "Hosted service not registered");
        }
        self.drain();
        outcome
    }

    /// Serialized form of whatever answers at `identity`
    pub fn record_of(&self, identity: &Identity) -> Option<ServiceRecord> {
        match self.store.get(identity)? {
            ServiceHandle::Runtime => Some(self.record()),
            ServiceHandle::Local(service) => Some(service.record()),
            ServiceHandle::Proxy(proxy) => Some(proxy.record()),
            ServiceHandle::Remote(record) => Some(record.clone()),
        }
    }

    /// Registry as published to `getRegistry` listeners, keyed by fullname
    pub fn registry(&self) -> BTreeMap<String, ServiceRecord> {
        self.store
            .identities()
            .iter()
            .filter_map(|identity| Some((identity.to_string(), self.record_of(identity)?)))
            .collect()
    }

    /// Identities living in this process
    pub fn hosted_identities(&self) -> Vec<Identity> {
        self.store
            .identities()
            .into_iter()
            .filter(|identity| self.store.get(identity).is_some_and(ServiceHandle::is_hosted))
            .collect()
    }

    pub(crate) fn notify_list_of(&self, identity: &Identity) -> Option<&NotifyList> {
        match self.store.get(identity)? {
            ServiceHandle::Runtime => Some(&self.core.notify_list),
            ServiceHandle::Local(service) => Some(&service.core().notify_list),
            ServiceHandle::Proxy(proxy) => Some(&proxy.core().notify_list),
            ServiceHandle::Remote(_) => None,
        }
    }

    /// Mutable core of a service living in this process
    pub(crate) fn hosted_core_mut(&mut self, identity: &Identity) -> Option<&mut ServiceCore> {
        if *identity == self.core.identity {
            return Some(&mut self.core);
        }
        match self.store.get_mut(identity)? {
            ServiceHandle::Local(service) => Some(service.core_mut()),
            ServiceHandle::Proxy(proxy) => Some(proxy.core_mut()),
            ServiceHandle::Runtime | ServiceHandle::Remote(_) => None,
        }
    }

    /// Process one background event
    pub fn handle_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Deliver(message) => {
                self.dispatch(message);
            }
            RuntimeEvent::Install { proxy, outcome } => {
                let mut ctx = self.context();
                match self.store.get_mut(&proxy) {
                    Some(ServiceHandle::Proxy(p)) => p.apply_install(&mut ctx, outcome),
                    _ => {
                        debug!(proxy = %proxy, "Install result for a released proxy dropped");
                        return;
                    }
                }
                self.absorb(&proxy, ctx);
                self.drain();
            }
        }
    }

    /// Publish the runtime state snapshot to `broadcastState` listeners
    pub fn broadcast_state(&mut self) {
        let identity = self.core.identity.clone();
        match serde_json::to_value(self.record()) {
            Ok(record) => self.notify(&identity, "broadcastState", record),
            Err(e) => warn!("Failed to serialize runtime state: {}", e),
        }
        self.drain();
    }

    /// Unscoped fan-out to every connected socket
    pub fn broadcast(&self, message: &Message) -> usize {
        Store::broadcast(message, self.connections.handles())
    }

    fn kind_of(&self, identity: &Identity) -> Option<HandleKind> {
        self.store.kind_of(identity)
    }
}

impl Service for Runtime {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore {
        &mut self.core
    }

    fn invoke(&mut self, ctx: &mut ServiceContext, method: &str, args: &Args) -> InvokeResult {
        operations::RUNTIME_METHODS.call(self, ctx, method, args)
    }

    fn methods(&self) -> Vec<&'static str> {
        operations::RUNTIME_METHODS.names()
    }

    fn record(&self) -> ServiceRecord {
        let mut record = self.core.record();
        if let Ok(Value::Object(routes)) = serde_json::to_value(&self.routes) {
            record.extra.extend(routes);
        }
        let service_names: Vec<String> = self.store.identities().iter().map(Identity::to_string).collect();
        record.extra.insert(
            "connections".into(),
            serde_json::to_value(self.connections.descriptors()).unwrap_or_default(),
        );
        record.extra.insert("processes".into(), serde_json::to_value(&self.processes).unwrap_or_default());
        record.extra.insert("hosts".into(), serde_json::to_value(&self.hosts).unwrap_or_default());
        record.extra.insert("serviceNames".into(), json!(service_names));
        record
    }
}
