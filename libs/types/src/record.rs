//! Registry records
//!
//! The serialized form of a service as it appears in `getRegistry`
//! answers and `register` announcements. Type-specific state (proxy
//! install flags, runtime tables) is flattened into `extra`.

use crate::identity::Identity;
use crate::notify::NotifyList;
use crate::package::Package;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    pub fullname: String,
    #[serde(default)]
    pub type_key: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub notify_list: NotifyList,
    #[serde(default)]
    pub pkg: Option<Package>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceRecord {
    /// Identity this record claims; `fullname` wins over `name`/`id`
    pub fn identity(&self) -> crate::Result<Identity> {
        if !self.fullname.is_empty() {
            Identity::parse(&self.fullname)
        } else {
            Identity::new(self.name.clone(), self.id.clone())
        }
    }
}
