//! Launch descriptions
//!
//! An ordered list of service instances to bring up. Each action names a
//! package (type key), the instance name and optional initial config and
//! subscriptions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchDescription {
    pub description: Option<String>,
    pub version: Option<String>,
    pub actions: Vec<LaunchAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchAction {
    pub package: String,
    /// Bare name or `name@id`
    #[serde(alias = "fullname")]
    pub name: String,
    #[serde(default)]
    pub config: Option<Value>,
    /// Topic method to subscribers
    #[serde(default)]
    pub listeners: BTreeMap<String, Vec<ListenerSpec>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
    pub callback_name: String,
    #[serde(default)]
    pub callback_method: Option<String>,
}

impl LaunchDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, package: impl Into<String>, name: impl Into<String>, config: Option<Value>) -> Self {
        let mut action = LaunchAction::new(package, name);
        action.config = config;
        self.actions.push(action);
        self
    }
}

impl LaunchAction {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            config: None,
            listeners: BTreeMap::new(),
        }
    }

    /// Subscribe `callback_name` to this service's `method` once launched
    pub fn listen(mut self, method: impl Into<String>, callback_name: impl Into<String>, callback_method: Option<String>) -> Self {
        self.listeners.entry(method.into()).or_default().push(ListenerSpec {
            callback_name: callback_name.into(),
            callback_method,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fullname_alias() {
        let desc: LaunchDescription = serde_json::from_value(json!({
            "actions": [
                { "package": "clock", "fullname": "clock01@P1", "config": { "intervalMs": 500 } },
                { "package": "clock", "name": "clock02",
                  "listeners": { "publishEpoch": [ { "callbackName": "ui" } ] } }
            ]
        }))
        .unwrap();

        assert_eq!(desc.actions[0].name, "clock01@P1");
        assert_eq!(desc.actions[1].listeners["publishEpoch"][0].callback_name, "ui");
        assert!(desc.actions[1].config.is_none());
    }
}
