//! Operations answered by the runtime service

use super::Runtime;
use crate::error::{Result, RuntimeError};
use crate::service::{MethodTable, Service};
use crate::store::{HandleKind, Registration, ServiceHandle};
use network::spawn_connect;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use types::{full_name, HostData, Identity, LaunchAction, LaunchDescription, Message, ProcessData, ServiceRecord};

pub const RUNTIME_TYPE_KEY: &str = "Runtime";

pub(crate) static RUNTIME_METHODS: Lazy<MethodTable<Runtime>> = Lazy::new(|| {
    MethodTable::<Runtime>::with_base()
        .op("getId", |rt, _, _| Ok(json!(rt.local_id())))
        .op("getRegistry", |rt, _, _| Ok(serde_json::to_value(rt.registry())?))
        .op("onRegistry", |rt, _, args| {
            let registry: BTreeMap<String, ServiceRecord> = args.required(0)?;
            let changed = registry
                .into_values()
                .filter(|record| rt.register_record(record.clone()).is_some_and(Registration::changed))
                .count();
            Ok(json!(changed))
        })
        .op("register", |rt, _, args| {
            let record: ServiceRecord = args.required(0)?;
            let fullname = record.fullname.clone();
            rt.register_record(record);
            Ok(json!(fullname))
        })
        .op("onBroadcastState", |rt, _, args| {
            let record: ServiceRecord = args.required(0)?;
            rt.register_record(record);
            Ok(Value::Null)
        })
        .op("registered", |_, _, args| Ok(args.value(0).cloned().unwrap_or(Value::Null)))
        .op("released", |_, _, args| Ok(args.value(0).cloned().unwrap_or(Value::Null)))
        .op("registerProcess", |rt, _, args| {
            let process: ProcessData = args.required(0)?;
            info!(process = %process.id, "Registering process");
            rt.processes.insert(process.id.clone(), process);
            Ok(Value::Null)
        })
        .op("registerHost", |rt, _, args| {
            let host: HostData = args.required(0)?;
            info!(host = %host.hostname, "Registering host");
            rt.hosts.insert(host.hostname.clone(), host);
            Ok(Value::Null)
        })
        .op("getProcesses", |rt, _, _| Ok(serde_json::to_value(&rt.processes)?))
        .op("getHosts", |rt, _, _| Ok(serde_json::to_value(&rt.hosts)?))
        .op("getConnections", |rt, _, _| Ok(serde_json::to_value(rt.connections.descriptors())?))
        .op("getRouteTable", |rt, _, _| Ok(serde_json::to_value(&rt.routes)?))
        .op("addRoute", |rt, _, args| {
            let remote_id: String = args.required(0)?;
            let gateway_id: String = args.required(1)?;
            let gateway: String = args.required(2)?;
            Ok(json!(rt.routes.add_route(&remote_id, &gateway_id, &gateway)))
        })
        .op("removeRoute", |rt, _, args| {
            let remote_id: String = args.required(0)?;
            Ok(serde_json::to_value(rt.routes.remove_route(&remote_id))?)
        })
        .op("removeConnection", |rt, _, args| {
            let gateway_id: String = args.required(0)?;
            Ok(json!(rt.remove_connection(&gateway_id)))
        })
        .op("connect", |rt, _, args| {
            let url: String = args.required(0)?;
            info!(url = %url, "Connecting");
            spawn_connect(url, rt.local_id().to_string(), rt.links_sender());
            Ok(Value::Null)
        })
        .op("release", |rt, _, args| {
            let name: String = args.required(0)?;
            rt.release(&name)?;
            Ok(Value::Null)
        })
        .op("launch", |rt, _, args| {
            let description: LaunchDescription = args.required(0)?;
            let launched = rt.launch(&description)?;
            Ok(json!(launched.iter().map(Identity::to_string).collect::<Vec<_>>()))
        })
        .op("startServiceType", |rt, _, args| {
            let name: String = args.required(0)?;
            let package: String = args.required(1)?;
            let description = LaunchDescription {
                actions: vec![LaunchAction::new(package, name)],
                ..Default::default()
            };
            let launched = rt.launch(&description)?;
            Ok(launched.first().map(|id| json!(id.to_string())).unwrap_or(Value::Null))
        })
        .op("applyServiceConfig", |rt, ctx, args| {
            let name: String = args.required(0)?;
            let config = args.value(1).cloned().unwrap_or(Value::Null);
            let target = full_name(&name, rt.local_id());
            ctx.send(Message::new(target, "applyConfig", vec![config]).with_sender(rt.identity().to_string()));
            Ok(Value::Null)
        })
        .op("getServiceNames", |rt, _, _| {
            Ok(json!(rt.store.identities().iter().map(Identity::to_string).collect::<Vec<_>>()))
        })
        .op("getLocalServiceNames", |rt, _, _| {
            let local = rt.store.identities_in(rt.local_id());
            Ok(json!(local.iter().map(Identity::to_string).collect::<Vec<_>>()))
        })
        .op("getService", |rt, _, args| {
            let name: String = args.required(0)?;
            let identity = rt.store.canonicalize(&name)?;
            Ok(serde_json::to_value(rt.record_of(&identity))?)
        })
        .op("getRepo", |rt, _, _| {
            let repo: Map<String, Value> = rt
                .repo
                .packages()
                .map(|(key, pkg)| (key.to_string(), serde_json::to_value(pkg.as_ref()).unwrap_or_default()))
                .collect();
            Ok(Value::Object(repo))
        })
        .op("getMessages", |rt, _, _| Ok(serde_json::to_value(rt.store.retained())?))
        .op("getLatestServiceData", |rt, _, args| {
            let name: String = args.required(0)?;
            let identity = rt.store.canonicalize(&name)?;
            let key = format!("{}.onBroadcastState", identity);
            if let Some(latest) = rt.store.retained().get(&key).and_then(|m| m.data.first()) {
                return Ok(latest.clone());
            }
            Ok(serde_json::to_value(rt.record_of(&identity))?)
        })
        .op("getServicesFromInterface", |rt, _, args| {
            let method: String = args.required(0)?;
            Ok(json!(rt.services_with(&method)))
        })
        .op("broadcast", |rt, _, args| {
            let message: Message = args.required(0)?;
            Ok(json!(rt.broadcast(&message)))
        })
});

impl Runtime {
    /// Store a record announced by a peer.
    ///
    /// Returns `None` when the record was ignored outright.
    pub fn register_record(&mut self, record: ServiceRecord) -> Option<Registration> {
        let identity = match record.identity() {
            Ok(identity) => identity,
            Err(e) => {
                warn!(fullname = %record.fullname, "Ignoring record: {}", e);
                return None;
            }
        };

        if identity.is_local(self.local_id()) && !self.store.get(&identity).is_some_and(ServiceHandle::is_hosted) {
            warn!(identity = %identity, "Ignoring peer record claiming a local identity");
            return None;
        }

        let outcome = self.store.register(identity.clone(), ServiceHandle::Remote(record));
        if outcome.changed() {
            self.announce_registration(&identity);
            self.drain();
        }
        Some(outcome)
    }

    /// Tell `registered` and `getRegistry` listeners about a new entry
    pub(crate) fn announce_registration(&mut self, identity: &Identity) {
        let local = self.identity().clone();
        if let Some(record) = self.record_of(identity) {
            self.notify(&local, "registered", serde_json::to_value(record).unwrap_or_default());
        }
        self.publish_registry();
    }

    /// Full registry to every `getRegistry` listener
    pub fn publish_registry(&mut self) {
        let local = self.identity().clone();
        match serde_json::to_value(self.registry()) {
            Ok(registry) => self.notify(&local, "getRegistry", registry),
            Err(e) => warn!("Failed to serialize registry: {}", e),
        }
        self.drain();
    }

    /// Stop and forget a service this process owns
    pub fn release(&mut self, name: &str) -> Result<()> {
        let identity = self.store.canonicalize(name)?;

        if identity == *self.identity() {
            return Err(RuntimeError::refused("release", identity, "the runtime cannot release itself"));
        }
        match self.store.kind_of(&identity) {
            None => {
                return Err(RuntimeError::AddressResolution {
                    target: identity.to_string(),
                    method: "release".to_string(),
                })
            }
            Some(HandleKind::Remote) => {
                return Err(RuntimeError::refused(
                    "release",
                    identity,
                    "service is neither local nor a proxy",
                ))
            }
            Some(_) => {}
        }

        let mut ctx = self.context();
        match self.store.remove(&identity) {
            Some(ServiceHandle::Local(mut service)) => service.stop_service(&mut ctx),
            Some(ServiceHandle::Proxy(mut proxy)) => proxy.stop_service(&mut ctx),
            _ => {}
        }
        self.absorb(&identity, ctx);

        info!(identity = %identity, "Released");
        let local = self.identity().clone();
        self.notify(&local, "released", json!(identity.to_string()));
        self.publish_registry();
        self.drain();
        Ok(())
    }

    /// Services answering `method`, or declaring it as an interface
    pub fn services_with(&self, method: &str) -> Vec<String> {
        let declares = |pkg: Option<&types::Package>| pkg.is_some_and(|p| p.interfaces.iter().any(|i| i == method));

        self.store
            .identities()
            .into_iter()
            .filter(|identity| match self.store.get(identity) {
                Some(ServiceHandle::Runtime) => self.has_method(method),
                Some(ServiceHandle::Local(service)) => {
                    service.has_method(method) || declares(service.core().pkg.as_deref())
                }
                Some(ServiceHandle::Proxy(proxy)) => declares(proxy.core().pkg.as_deref()),
                Some(ServiceHandle::Remote(record)) => declares(record.pkg.as_ref()),
                None => false,
            })
            .map(|identity| identity.to_string())
            .inspect(|name| debug!(method, service = %name, "Interface match"))
            .collect()
    }
}
