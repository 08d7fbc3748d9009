//! Service construction for launch
//!
//! In-process types are built by a [`ServiceFactory`] keyed by type key.
//! Launch actions may also carry initial config and subscriptions, which
//! [`configure`] applies to a freshly built or already running service.

use crate::service::{Service, ServiceCore};
use crate::services::{Clock, CLOCK_TYPE_KEY};
use node_config::LOCAL_PLATFORM;
use std::collections::HashMap;
use types::{full_name, LaunchAction, Package};

pub type Constructor = fn(ServiceCore) -> Box<dyn Service>;

/// Type key to constructor for in-process service types
#[derive(Clone, Default)]
pub struct ServiceFactory {
    constructors: HashMap<String, Constructor>,
}

impl ServiceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory knowing the services shipped with the runtime
    pub fn with_builtins() -> Self {
        Self::new().register(CLOCK_TYPE_KEY, Clock::boxed)
    }

    pub fn register(mut self, type_key: impl Into<String>, constructor: Constructor) -> Self {
        self.constructors.insert(type_key.into(), constructor);
        self
    }

    pub fn create(&self, type_key: &str, core: ServiceCore) -> Option<Box<dyn Service>> {
        self.constructors.get(type_key).map(|construct| construct(core))
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.constructors.contains_key(type_key)
    }
}

impl std::fmt::Debug for ServiceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.constructors.keys().collect();
        keys.sort();
        f.debug_struct("ServiceFactory").field("types", &keys).finish()
    }
}

/// Descriptors for the in-process types, used when the repo has none
pub fn builtin_packages() -> Vec<Package> {
    let mut clock = Package::new(CLOCK_TYPE_KEY, LOCAL_PLATFORM);
    clock.title = Some("Clock".to_string());
    clock.description = Some("Publishes the current epoch on a fixed interval".to_string());
    clock.version = Some(env!("CARGO_PKG_VERSION").to_string());
    clock.installed = true;
    clock.interfaces = vec!["publishEpoch".to_string()];
    vec![clock]
}

/// Apply an action's config and listeners; bare callback names get `local_id`
pub fn configure(core: &mut ServiceCore, action: &LaunchAction, local_id: &str) {
    if let Some(config) = &action.config {
        core.apply_config(config.clone());
    }
    for (method, specs) in &action.listeners {
        for spec in specs {
            core.notify_list.add(
                method,
                &full_name(&spec.callback_name, local_id),
                spec.callback_method.as_deref(),
            );
        }
    }
}
