use serde::{Deserialize, Serialize};

/// A runtime process as announced to peers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessData {
    pub id: String,
    pub pid: Option<u32>,
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub uptime: Option<i64>,
    pub status: Option<String>,
}

impl ProcessData {
    pub fn current(id: impl Into<String>, hostname: Option<String>, platform: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pid: Some(std::process::id()),
            hostname,
            platform: Some(platform.into()),
            platform_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            uptime: None,
            status: Some("running".to_string()),
        }
    }
}

/// A machine hosting one or more runtime processes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostData {
    pub hostname: String,
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub num_cpus: Option<usize>,
}

impl HostData {
    pub fn current(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            platform: Some(std::env::consts::OS.to_string()),
            arch: Some(std::env::consts::ARCH.to_string()),
            num_cpus: std::thread::available_parallelism().ok().map(|n| n.get()),
        }
    }
}
