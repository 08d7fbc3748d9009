//! Proxy services
//!
//! A [`Proxy`] stands in for a service whose implementation runs in a
//! separate client process. Until that client connects back, operations
//! run on the proxy itself (install checks, config, subscriptions). Once
//! connected, every message is forwarded over the client's socket. The
//! first forward after each (re)connect is preceded by a replay of the
//! proxy's subscriptions and config so the client can rebuild its state.

mod install;

pub use self::install::{
    normalize_version, parse_python_version, version_at_least, InstallOutcome, InstallStep, Installer,
    DEFAULT_PIP_REQUIRED, DEFAULT_PYTHON, DEFAULT_PYTHON_REQUIRED, VENV_DIR,
};

use crate::error::{Result, RuntimeError};
use crate::service::{Args, InvokeResult, MethodTable, Service, ServiceContext, ServiceCore};
use network::ConnectionHandle;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{InstallLog, Message, ServiceRecord, StatusLevel};

pub const PROXY_TYPE_KEY: &str = "Proxy";
const INSTALL_LOG_LIMIT: usize = 500;

/// Operations a connected proxy also applies to itself after forwarding
const MIRRORED: &[&str] = &["addListener", "removeListener", "applyConfig", "applyConfigValue"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallState {
    pub python_version: Option<String>,
    pub python_version_ok: bool,
    pub pip_version: Option<String>,
    pub pip_version_ok: bool,
    pub venv_ok: bool,
    pub venv_path: Option<String>,
    pub requirements_ok: bool,
    pub client_installed_ok: bool,
}

/// What happened to a message handed to a proxy
#[derive(Debug)]
pub enum Delivery {
    /// Ran on the proxy itself
    Executed(InvokeResult),
    /// Written to the client socket
    Forwarded,
}

pub struct Proxy {
    core: ServiceCore,
    proxy_type_key: String,
    runtime_url: String,
    install: InstallState,
    client_state: ClientState,
    client: Option<ConnectionHandle>,
    replay_pending: bool,
    child: Option<JoinHandle<()>>,
    install_log: VecDeque<InstallLog>,
}

static PROXY_METHODS: Lazy<MethodTable<Proxy>> = Lazy::new(|| {
    MethodTable::<Proxy>::with_base()
        .op("getProxyTypeKey", |p, _, _| Ok(json!(p.proxy_type_key)))
        .op("getClientState", |p, _, _| Ok(serde_json::to_value(p.client_state)?))
        .op("getInstallLog", |p, _, _| Ok(serde_json::to_value(&p.install_log)?))
        .op("checkPythonVersion", |p, ctx, args| {
            let required = args.optional(0)?.unwrap_or_else(|| DEFAULT_PYTHON_REQUIRED.to_string());
            p.log(ctx, InstallLog::info(format!("Checking python version >= {}", required)));
            p.installer(ctx).check_python_version(required);
            Ok(Value::Null)
        })
        .op("checkPipVersion", |p, ctx, args| {
            let required = args.optional(0)?.unwrap_or_else(|| DEFAULT_PIP_REQUIRED.to_string());
            p.log(ctx, InstallLog::info(format!("Checking pip version >= {}", required)));
            p.installer(ctx).check_pip_version(required);
            Ok(Value::Null)
        })
        .op("installVirtualEnv", |p, ctx, _| {
            let installer = p.installer(ctx);
            p.log(ctx, InstallLog::info(format!("Creating virtual environment in {}", installer.venv_path().display())));
            installer.install_virtual_env();
            Ok(Value::Null)
        })
        .op("installPipRequirements", |p, ctx, _| {
            let requirements = p
                .core
                .pkg
                .as_ref()
                .and_then(|pkg| pkg.requirements.clone())
                .unwrap_or_else(|| "requirements.txt".to_string());
            p.log(ctx, InstallLog::info(format!("Installing {}", requirements)));
            p.installer(ctx).install_pip_requirements(requirements);
            Ok(Value::Null)
        })
        .op("installRepoRequirements", |p, ctx, _| {
            let installer = p.installer(ctx);
            let repo_root = installer.cwd().parent().map(PathBuf::from).unwrap_or_default();
            let packages: Vec<PathBuf> = p
                .core
                .pkg
                .as_ref()
                .map(|pkg| pkg.repo_requirements.iter().map(|r| repo_root.join(r)).collect())
                .unwrap_or_default();
            p.log(ctx, InstallLog::info(format!("Installing {} repo packages", packages.len())));
            installer.install_repo_requirements(packages);
            Ok(Value::Null)
        })
        .op("startProxy", |p, ctx, _| {
            p.start_proxy(ctx);
            Ok(json!(p.client_state))
        })
        .op("stopProxy", |p, ctx, _| {
            p.stop_proxy(ctx);
            Ok(json!(p.client_state))
        })
        .op("setInstalled", |p, ctx, args| {
            let installed: bool = args.required(0)?;
            p.core.installed = installed;
            p.install.client_installed_ok = installed;
            ctx.publish("broadcastState", serde_json::to_value(p.record())?);
            Ok(json!(installed))
        })
});

impl Proxy {
    pub fn new(core: ServiceCore, proxy_type_key: impl Into<String>, runtime_url: impl Into<String>) -> Self {
        let mut core = core;
        core.type_key = PROXY_TYPE_KEY.to_string();
        core.installed = core.pkg.as_ref().map(|p| p.installed).unwrap_or(false);
        Self {
            core,
            proxy_type_key: proxy_type_key.into(),
            runtime_url: runtime_url.into(),
            install: InstallState::default(),
            client_state: ClientState::Disconnected,
            client: None,
            replay_pending: false,
            child: None,
            install_log: VecDeque::new(),
        }
    }

    pub fn proxy_type_key(&self) -> &str {
        &self.proxy_type_key
    }

    pub fn client_state(&self) -> ClientState {
        self.client_state
    }

    pub fn install_state(&self) -> &InstallState {
        &self.install
    }

    pub fn install_log(&self) -> impl Iterator<Item = &InstallLog> {
        self.install_log.iter()
    }

    /// Gateway id of the attached client socket
    pub fn client_gateway(&self) -> Option<&str> {
        self.client.as_ref().map(ConnectionHandle::gateway_id)
    }

    /// Client connected back; the next forward replays subscriptions and config
    pub fn attach_client(&mut self, handle: ConnectionHandle) {
        info!(proxy = %self.core.identity, gateway = handle.gateway_id(), "Client attached");
        self.client = Some(handle);
        self.client_state = ClientState::Connected;
        self.replay_pending = true;
    }

    pub fn detach_client(&mut self) {
        if self.client.take().is_some() {
            info!(proxy = %self.core.identity, "Client detached");
        }
        self.client_state = ClientState::Disconnected;
        self.replay_pending = false;
    }

    /// Run locally while disconnected, forward while connected
    pub fn receive(&mut self, ctx: &mut ServiceContext, message: &Message) -> Delivery {
        if self.client_state != ClientState::Connected {
            let args = Args::new(&message.method, message.data.clone());
            return Delivery::Executed(self.invoke(ctx, &message.method, &args));
        }

        if let Err(e) = self.forward(ctx, message) {
            warn!(proxy = %self.core.identity, method = %message.method, "Forward failed, running locally: {}", e);
            self.detach_client();
            let args = Args::new(&message.method, message.data.clone());
            return Delivery::Executed(self.invoke(ctx, &message.method, &args));
        }

        if MIRRORED.contains(&message.method.as_str()) {
            let args = Args::new(&message.method, message.data.clone());
            if let Err(e) = PROXY_METHODS.call(self, ctx, &message.method, &args) {
                debug!(proxy = %self.core.identity, "Local mirror of {} failed: {}", message.method, e);
            }
        }
        Delivery::Forwarded
    }

    /// Write to the client, replaying state first when a reconnect is pending
    pub fn forward(&mut self, ctx: &ServiceContext, message: &Message) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| RuntimeError::connection(self.core.identity.to_string(), "no client attached"))?;

        if self.replay_pending {
            let target = self.core.identity.to_string();
            let sender = ctx.runtime().to_string();

            for listener in self.core.notify_list.iter() {
                let replay = Message::new(
                    target.clone(),
                    "addListener",
                    vec![
                        json!(listener.topic_method),
                        json!(listener.callback_name),
                        json!(listener.callback_method),
                    ],
                )
                .with_sender(sender.clone());
                client.send(&replay)?;
            }

            if !self.core.config_is_empty() {
                let replay = Message::new(target.clone(), "applyConfig", vec![self.core.config.clone()])
                    .with_sender(sender);
                client.send(&replay)?;
            }

            debug!(proxy = %target, subscriptions = self.core.notify_list.len(), "Replayed state to client");
            self.replay_pending = false;
        }

        client.send(message)?;
        Ok(())
    }

    /// Fold a background install result into the proxy state
    pub fn apply_install(&mut self, ctx: &mut ServiceContext, outcome: InstallOutcome) {
        let entry = match outcome {
            InstallOutcome::PythonVersion { version, required, ok } => {
                self.install.python_version = Some(version.clone());
                self.install.python_version_ok = ok;
                if ok {
                    InstallLog::info(format!("Python version {} >= required {}", version, required))
                } else {
                    InstallLog::error(format!("Python version {} < required {}", version, required))
                }
            }
            InstallOutcome::PipVersion { version, required, ok } => {
                self.install.pip_version = Some(version.clone());
                self.install.pip_version_ok = ok;
                if ok {
                    InstallLog::info(format!("pip version {} >= required {}", version, required))
                } else {
                    InstallLog::error(format!("pip version {} < required {}", version, required))
                }
            }
            InstallOutcome::VirtualEnv { path } => {
                self.install.venv_ok = true;
                self.install.venv_path = Some(path.display().to_string());
                InstallLog::info(format!("Virtual environment created at {}", path.display()))
            }
            InstallOutcome::PipRequirements => {
                self.install.requirements_ok = true;
                InstallLog::info("Requirements installed")
            }
            InstallOutcome::RepoRequirements { installed } => {
                self.install.client_installed_ok = true;
                self.core.installed = true;
                InstallLog::info(format!("Repo packages installed: {}", installed.join(", ")))
            }
            InstallOutcome::ClientStarted { pid } => {
                if self.client_state == ClientState::Disconnected {
                    self.client_state = ClientState::Connecting;
                }
                InstallLog::info(format!("Client started, pid {:?}", pid))
            }
            InstallOutcome::ClientOutput { line, stderr } => {
                if stderr {
                    InstallLog::new(StatusLevel::Warn, line)
                } else {
                    InstallLog::info(line)
                }
            }
            InstallOutcome::ClientExited { code } => {
                self.child = None;
                if self.client_state == ClientState::Connecting {
                    self.client_state = ClientState::Disconnected;
                }
                InstallLog::info(format!("Client exited with {:?}", code))
            }
            InstallOutcome::Failed { step, reason } => {
                match step {
                    InstallStep::PythonVersion => self.install.python_version_ok = false,
                    InstallStep::PipVersion => self.install.pip_version_ok = false,
                    InstallStep::VirtualEnv => self.install.venv_ok = false,
                    InstallStep::PipRequirements => self.install.requirements_ok = false,
                    InstallStep::RepoRequirements => self.install.client_installed_ok = false,
                    InstallStep::Client => {
                        self.child = None;
                        if self.client_state == ClientState::Connecting {
                            self.client_state = ClientState::Disconnected;
                        }
                    }
                }
                let error = RuntimeError::Installation {
                    step: step.to_string(),
                    reason,
                };
                let identity = self.core.identity.clone();
                ctx.status(&identity, StatusLevel::Error, error.to_string());
                InstallLog::error(error.to_string())
            }
        };

        self.log(ctx, entry);
        ctx.publish("broadcastState", serde_json::to_value(self.record()).unwrap_or_default());
    }

    fn log(&mut self, ctx: &mut ServiceContext, entry: InstallLog) {
        debug!(proxy = %self.core.identity, level = %entry.level, "{}", entry.msg);
        if self.install_log.len() >= INSTALL_LOG_LIMIT {
            self.install_log.pop_front();
        }
        ctx.publish("publishInstallLog", serde_json::to_value(&entry).unwrap_or_default());
        self.install_log.push_back(entry);
    }

    fn installer(&self, ctx: &ServiceContext) -> Installer {
        let python = self
            .core
            .config_value::<String>("pythonCmd")
            .unwrap_or_else(|| DEFAULT_PYTHON.to_string());
        let cwd = self
            .core
            .pkg
            .as_ref()
            .and_then(|pkg| pkg.cwd.clone())
            .unwrap_or_else(|| ".".to_string());
        Installer::new(self.core.identity.clone(), ctx.events(), python, cwd)
    }

    fn start_proxy(&mut self, ctx: &mut ServiceContext) {
        if self.child.is_some() {
            self.log(ctx, InstallLog::new(StatusLevel::Warn, "Client already running"));
            return;
        }

        let Some(pkg) = self.core.pkg.clone() else {
            self.log(ctx, InstallLog::error("No package descriptor, cannot start client"));
            return;
        };
        let Some(cmd) = pkg.cmd.clone() else {
            self.log(ctx, InstallLog::error(format!("Package {} has no cmd", pkg.type_key)));
            return;
        };

        let installer = self.installer(ctx);
        let program = if self.install.venv_ok && cmd.starts_with("python") {
            installer.venv_python().display().to_string()
        } else {
            cmd
        };

        let mut args = pkg.args.clone();
        args.extend([
            "--id".to_string(),
            self.core.identity.id().to_string(),
            "--url".to_string(),
            self.runtime_url.clone(),
        ]);

        self.log(ctx, InstallLog::info(format!("Starting client {} {}", program, args.join(" "))));
        self.child = Some(installer.start_client(program, args, self.runtime_url.clone()));
        if self.client_state == ClientState::Disconnected {
            self.client_state = ClientState::Connecting;
        }
    }

    fn stop_proxy(&mut self, ctx: &mut ServiceContext) {
        if let Some(child) = self.child.take() {
            child.abort();
            self.log(ctx, InstallLog::info("Client stopped"));
        }
        if self.client_state == ClientState::Connecting {
            self.client_state = ClientState::Disconnected;
        }
    }
}

impl Service for Proxy {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore {
        &mut self.core
    }

    fn invoke(&mut self, ctx: &mut ServiceContext, method: &str, args: &Args) -> InvokeResult {
        PROXY_METHODS.call(self, ctx, method, args)
    }

    fn methods(&self) -> Vec<&'static str> {
        PROXY_METHODS.names()
    }

    fn stop_service(&mut self, ctx: &mut ServiceContext) {
        self.stop_proxy(ctx);
        self.detach_client();
        self.core.stop();
    }

    fn record(&self) -> ServiceRecord {
        let mut record = self.core.record();
        if let Ok(Value::Object(install)) = serde_json::to_value(&self.install) {
            record.extra.extend(install);
        }
        record.extra.insert("proxyTypeKey".into(), json!(self.proxy_type_key));
        record.extra.insert("clientConnectionState".into(), json!(self.client_state));
        record.extra.insert("runtimeUrl".into(), json!(self.runtime_url));
        record
    }
}
