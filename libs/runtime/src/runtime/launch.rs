//! Launching services from a description
//!
//! Each action is resolved against the package repository. A package on
//! this runtime's platform is built in-process; any other platform gets a
//! [`Proxy`] stamped with the real type. An action whose package or type
//! cannot be resolved still produces an [`Unknown`] service so the
//! registry and routes stay complete.

use super::Runtime;
use crate::error::Result;
use crate::launch::configure;
use crate::proxy::Proxy;
use crate::service::{Service, ServiceCore};
use crate::services::Unknown;
use crate::store::ServiceHandle;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{Identity, LaunchAction, LaunchDescription, Package};

impl Runtime {
    /// Construct, start and register every action; returns what was built.
    ///
    /// Actions naming a service that already runs here only reapply their
    /// config and listeners.
    pub fn launch(&mut self, description: &LaunchDescription) -> Result<Vec<Identity>> {
        info!(
            description = description.description.as_deref().unwrap_or(""),
            actions = description.actions.len(),
            "Launching"
        );

        let mut built = Vec::new();
        for action in &description.actions {
            if let Some(entry) = self.build(action) {
                built.push(entry);
            }
        }

        let mut launched = Vec::new();
        for (identity, mut handle) in built {
            let mut ctx = self.context();
            match &mut handle {
                ServiceHandle::Local(service) => service.start_service(&mut ctx),
                ServiceHandle::Proxy(proxy) => proxy.start_service(&mut ctx),
                ServiceHandle::Runtime | ServiceHandle::Remote(_) => {}
            }
            if self.store.register(identity.clone(), handle).changed() {
                self.absorb(&identity, ctx);
                launched.push(identity);
            }
        }
        for identity in &launched {
            self.announce_registration(identity);
        }

        self.drain();
        Ok(launched)
    }

    fn build(&mut self, action: &LaunchAction) -> Option<(Identity, ServiceHandle)> {
        let pkg = self.find_package(&action.package);
        let identity = match self.launch_identity(action, pkg.as_deref()) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(name = %action.name, "Skipping launch action: {}", e);
                return None;
            }
        };

        let local_id = self.local_id().to_string();
        if let Some(core) = self.hosted_core_mut(&identity) {
            debug!(identity = %identity, "Already running, reconfiguring");
            configure(core, action, &local_id);
            return None;
        }

        let core = ServiceCore::new(identity.clone(), action.package.clone()).with_hostname(self.settings().hostname.clone());
        let mut handle = match pkg {
            None => {
                warn!(identity = %identity, package = %action.package, "No package found, launching Unknown");
                ServiceHandle::Local(Box::new(Unknown::new(core, action.package.clone())))
            }
            Some(pkg) if self.is_local_platform(&pkg) => {
                let core = core.with_package(pkg.clone());
                match self.factory().create(&pkg.type_key, core.clone()) {
                    Some(service) => ServiceHandle::Local(service),
                    None => {
                        warn!(identity = %identity, type_key = %pkg.type_key, "No constructor, launching Unknown");
                        ServiceHandle::Local(Box::new(Unknown::new(core, pkg.type_key.clone())))
                    }
                }
            }
            Some(pkg) => {
                let proxy_type_key = pkg.proxy_type_key.clone().unwrap_or_else(|| pkg.type_key.clone());
                let url = self.settings().client_url(identity.id());
                let core = core.with_package(pkg);
                ServiceHandle::Proxy(Box::new(Proxy::new(core, proxy_type_key, url)))
            }
        };

        match &mut handle {
            ServiceHandle::Local(service) => configure(service.core_mut(), action, &local_id),
            ServiceHandle::Proxy(proxy) => configure(proxy.core_mut(), action, &local_id),
            ServiceHandle::Runtime | ServiceHandle::Remote(_) => {}
        }

        info!(identity = %identity, package = %action.package, "Built");
        Some((identity, handle))
    }

    /// Explicit `name@id`, else the local id for in-process types and the
    /// service name itself for out-of-process clients
    fn launch_identity(&self, action: &LaunchAction, pkg: Option<&Package>) -> types::Result<Identity> {
        if action.name.contains(types::identity::SEPARATOR) {
            return Identity::parse(&action.name);
        }
        match pkg {
            Some(pkg) if !self.is_local_platform(pkg) => Identity::new(action.name.clone(), action.name.clone()),
            _ => Identity::new(action.name.clone(), self.local_id()),
        }
    }

    fn is_local_platform(&self, pkg: &Package) -> bool {
        pkg.platform.is_none() || pkg.runs_on(&self.settings().platform)
    }

    /// Repo key as written, then a case-insensitive match
    fn find_package(&self, key: &str) -> Option<Arc<Package>> {
        self.repo().get(key).or_else(|| {
            let found = self.repo().keys().find(|k| k.eq_ignore_ascii_case(key))?.to_string();
            self.repo().get(&found)
        })
    }
}

