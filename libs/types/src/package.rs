//! Package descriptors
//!
//! Per-type metadata loaded once from a `package.yml`. A descriptor is
//! shared by every instance of its type and never modified by them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Package {
    pub type_key: String,
    pub title: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub categories: Vec<String>,

    /// Language/runtime the real implementation runs on
    pub platform: Option<String>,
    pub platform_version: Option<String>,

    /// Launch command of an out-of-process client
    pub cmd: Option<String>,
    pub args: Vec<String>,
    pub cwd: Option<String>,

    pub dependencies: Vec<String>,
    /// pip requirements file, relative to `cwd`
    pub requirements: Option<String>,
    /// Sibling packages installed into the client environment
    pub repo_requirements: Vec<String>,

    pub proxy_type_key: Option<String>,
    pub installed: bool,
    pub interfaces: Vec<String>,
}

impl Package {
    pub fn new(type_key: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            platform: Some(platform.into()),
            ..Default::default()
        }
    }

    pub fn runs_on(&self, platform: &str) -> bool {
        self.platform.as_deref() == Some(platform)
    }
}
