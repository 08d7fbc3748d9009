//! Runtime Configuration
//!
//! Loads the node settings from an optional TOML file, overridden by
//! `SERVICENET_*` environment variables (`SERVICENET_PORT=3002`,
//! `SERVICENET_CONNECT=ws://a:3001/api/messages,ws://b:3001/api/messages`).

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Platform name of services implemented inside this process
pub const LOCAL_PLATFORM: &str = "rust";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Process id; generated when absent
    pub id: Option<String>,
    pub hostname: Option<String>,
    pub platform: String,
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    /// Peer websocket urls connected at start
    pub connect: Vec<String>,
    pub repo_dir: Option<PathBuf>,
    pub launch_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            id: None,
            hostname: None,
            platform: LOCAL_PLATFORM.to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: 3001,
            log_level: "info".to_string(),
            connect: Vec::new(),
            repo_dir: None,
            launch_file: None,
        }
    }
}

impl RuntimeConfig {
    /// Load from an optional file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading runtime config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SERVICENET")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("connect")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut runtime: RuntimeConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        runtime.expand_env_vars()?;
        runtime.fill_defaults();
        runtime.validate()?;
        debug!("Runtime config: {:?}", runtime);
        Ok(runtime)
    }

    /// Assign a process id and hostname when none were configured
    pub fn fill_defaults(&mut self) {
        if self.id.is_none() {
            let uuid = Uuid::new_v4().simple().to_string();
            self.id = Some(format!("node-{}", &uuid[..8]));
        }
        if self.hostname.is_none() {
            self.hostname = Some(std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.id {
            if id.is_empty() || id.contains('@') {
                bail!("Invalid process id '{}': must be non-empty and may not contain '@'", id);
            }
        }
        if self.port == 0 {
            bail!("Port must be non-zero");
        }
        Ok(())
    }

    /// Process id after [`fill_defaults`](Self::fill_defaults)
    pub fn process_id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    pub fn hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or("localhost")
    }

    /// Expand `$VAR` references in paths and peer urls
    pub fn expand_env_vars(&mut self) -> Result<()> {
        for url in &mut self.connect {
            let expanded = shellexpand::env(url.as_str())
                .context("Failed to expand peer url")?
                .to_string();
            *url = expanded;
        }

        if let Some(dir) = &self.repo_dir {
            let expanded = shellexpand::env(&dir.to_string_lossy())
                .context("Failed to expand repo dir")?
                .to_string();
            self.repo_dir = Some(PathBuf::from(expanded));
        }

        if let Some(file) = &self.launch_file {
            let expanded = shellexpand::env(&file.to_string_lossy())
                .context("Failed to expand launch file")?
                .to_string();
            self.launch_file = Some(PathBuf::from(expanded));
        }

        Ok(())
    }
}
