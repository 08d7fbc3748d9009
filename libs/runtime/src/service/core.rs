use serde_json::{Map, Value};
use std::sync::Arc;
use types::{now_millis, Identity, NotifyList, Package, ServiceRecord};

/// State every service carries
#[derive(Debug, Clone)]
pub struct ServiceCore {
    pub identity: Identity,
    pub type_key: String,
    pub version: String,
    pub hostname: Option<String>,
    /// Opaque to the framework; always a JSON object
    pub config: Value,
    pub notify_list: NotifyList,
    pub pkg: Option<Arc<Package>>,
    pub installed: bool,
    start_time: Option<i64>,
}

impl ServiceCore {
    pub fn new(identity: Identity, type_key: impl Into<String>) -> Self {
        Self {
            identity,
            type_key: type_key.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: None,
            config: Value::Object(Map::new()),
            notify_list: NotifyList::new(),
            pkg: None,
            installed: true,
            start_time: None,
        }
    }

    pub fn with_package(mut self, pkg: Arc<Package>) -> Self {
        if let Some(version) = &pkg.version {
            self.version = version.clone();
        }
        self.pkg = Some(pkg);
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Record the start time; false when already started
    pub fn start(&mut self) -> bool {
        if self.start_time.is_some() {
            return false;
        }
        self.start_time = Some(now_millis());
        true
    }

    /// Clear the start time; false when already stopped
    pub fn stop(&mut self) -> bool {
        self.start_time.take().is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn uptime_ms(&self) -> Option<i64> {
        self.start_time.map(|t| now_millis() - t)
    }

    /// Replace the whole config; `null` resets it to `{}`
    pub fn apply_config(&mut self, config: Value) {
        self.config = match config {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
    }

    pub fn apply_config_value(&mut self, key: &str, value: Value) {
        if !self.config.is_object() {
            self.config = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.config {
            map.insert(key.to_string(), value);
        }
    }

    pub fn config_is_empty(&self) -> bool {
        match &self.config {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Typed view of one config key
    pub fn config_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn record(&self) -> ServiceRecord {
        ServiceRecord {
            id: self.identity.id().to_string(),
            name: self.identity.name().to_string(),
            fullname: self.identity.to_string(),
            type_key: self.type_key.clone(),
            version: self.version.clone(),
            hostname: self.hostname.clone(),
            config: self.config.clone(),
            notify_list: self.notify_list.clone(),
            pkg: self.pkg.as_deref().cloned(),
            ready: self.is_ready(),
            installed: self.installed,
            start_time: self.start_time,
            extra: Map::new(),
        }
    }
}
