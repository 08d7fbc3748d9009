//! Proxy installation steps
//!
//! Every step shells out to a child process on a tokio task and reports
//! its result back to the runtime as a [`RuntimeEvent::Install`]. Nothing
//! here touches proxy state directly.

use crate::event::{EventSender, RuntimeEvent};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use types::Identity;

pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_PYTHON_REQUIRED: &str = "3.6.0";
pub const DEFAULT_PIP_REQUIRED: &str = "21.0.0";
pub const VENV_DIR: &str = "venv";

static PYTHON_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Python (\d+\.\d+\.\d+)").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    PythonVersion,
    PipVersion,
    VirtualEnv,
    PipRequirements,
    RepoRequirements,
    Client,
}

impl std::fmt::Display for InstallStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InstallStep::PythonVersion => "checkPythonVersion",
            InstallStep::PipVersion => "checkPipVersion",
            InstallStep::VirtualEnv => "installVirtualEnv",
            InstallStep::PipRequirements => "installPipRequirements",
            InstallStep::RepoRequirements => "installRepoRequirements",
            InstallStep::Client => "startProxy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstallOutcome {
    PythonVersion { version: String, required: String, ok: bool },
    PipVersion { version: String, required: String, ok: bool },
    VirtualEnv { path: PathBuf },
    PipRequirements,
    RepoRequirements { installed: Vec<String> },
    ClientStarted { pid: Option<u32> },
    ClientOutput { line: String, stderr: bool },
    ClientExited { code: Option<i32> },
    Failed { step: InstallStep, reason: String },
}

/// `Python 3.10.12` -> `3.10.12`
pub fn parse_python_version(output: &str) -> Option<String> {
    PYTHON_VERSION
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Pad a dotted version to at least three parts
pub fn normalize_version(version: &str) -> String {
    let mut parts: Vec<&str> = version.trim().split('.').filter(|p| !p.is_empty()).collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    parts.join(".")
}

/// Numeric comparison of dotted versions; unparsable parts count as 0
pub fn version_at_least(found: &str, required: &str) -> bool {
    let numbers = |v: &str| -> Vec<u64> {
        normalize_version(v)
            .split('.')
            .map(|p| {
                p.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };

    let mut found = numbers(found);
    let mut required = numbers(required);
    let len = found.len().max(required.len());
    found.resize(len, 0);
    required.resize(len, 0);
    found >= required
}

/// Where a proxy installs and runs its client
#[derive(Debug, Clone)]
pub struct Installer {
    proxy: Identity,
    events: EventSender,
    python: String,
    cwd: PathBuf,
}

impl Installer {
    pub fn new(proxy: Identity, events: EventSender, python: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            proxy,
            events,
            python: python.into(),
            cwd: cwd.into(),
        }
    }

    pub fn venv_path(&self) -> PathBuf {
        self.cwd.join(VENV_DIR)
    }

    /// Interpreter inside the virtual env
    pub fn venv_python(&self) -> PathBuf {
        if cfg!(windows) {
            self.venv_path().join("Scripts").join("python.exe")
        } else {
            self.venv_path().join("bin").join("python")
        }
    }

    pub fn check_python_version(&self, required: String) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = match run(Command::new(&this.python).arg("--version")).await {
                Ok(output) => match parse_python_version(&output) {
                    Some(version) => InstallOutcome::PythonVersion {
                        ok: version_at_least(&version, &required),
                        version,
                        required,
                    },
                    None => failed(InstallStep::PythonVersion, format!("unable to parse python version from '{}'", output.trim())),
                },
                Err(reason) => failed(InstallStep::PythonVersion, reason),
            };
            this.report(outcome);
        })
    }

    pub fn check_pip_version(&self, required: String) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut cmd = Command::new(&this.python);
            cmd.args(["-c", "import pip; print(pip.__version__)"]);
            let outcome = match run(&mut cmd).await {
                Ok(output) => {
                    let version = normalize_version(output.lines().next().unwrap_or_default());
                    InstallOutcome::PipVersion {
                        ok: version_at_least(&version, &required),
                        version,
                        required,
                    }
                }
                Err(reason) => failed(InstallStep::PipVersion, reason),
            };
            this.report(outcome);
        })
    }

    pub fn install_virtual_env(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let path = this.venv_path();
            let mut cmd = Command::new(&this.python);
            cmd.arg("-m").arg("venv").arg(&path);
            let outcome = match run(&mut cmd).await {
                Ok(_) if this.venv_python().exists() => InstallOutcome::VirtualEnv { path },
                Ok(_) => failed(InstallStep::VirtualEnv, format!("no interpreter found in {}", path.display())),
                Err(reason) => failed(InstallStep::VirtualEnv, reason),
            };
            this.report(outcome);
        })
    }

    /// `pip install -r <requirements>` inside the virtual env
    pub fn install_pip_requirements(&self, requirements: String) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let file = this.cwd.join(&requirements);
            let mut cmd = Command::new(this.venv_python());
            cmd.args(["-m", "pip", "install", "-r"]).arg(&file).current_dir(&this.cwd);
            let outcome = match run(&mut cmd).await {
                Ok(_) => InstallOutcome::PipRequirements,
                Err(reason) => failed(InstallStep::PipRequirements, reason),
            };
            this.report(outcome);
        })
    }

    /// Editable install of sibling packages from the repo
    pub fn install_repo_requirements(&self, packages: Vec<PathBuf>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut installed = Vec::new();
            for package in packages {
                let mut cmd = Command::new(this.venv_python());
                cmd.args(["-m", "pip", "install", "-e"]).arg(&package).current_dir(&this.cwd);
                if let Err(reason) = run(&mut cmd).await {
                    this.report(failed(InstallStep::RepoRequirements, format!("{}: {}", package.display(), reason)));
                    return;
                }
                installed.push(package.display().to_string());
            }
            this.report(InstallOutcome::RepoRequirements { installed });
        })
    }

    /// Spawn the client; the returned task owns the child, aborting it kills the client
    pub fn start_client(&self, program: String, args: Vec<String>, runtime_url: String) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut cmd = Command::new(&program);
            cmd.args(&args)
                .current_dir(&this.cwd)
                .env("SERVICENET_RUNTIME_URL", &runtime_url)
                .env("SERVICENET_SERVICE_ID", this.proxy.id())
                .env("SERVICENET_SERVICE_NAME", this.proxy.name())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    this.report(failed(InstallStep::Client, format!("failed to spawn {}: {}", program, e)));
                    return;
                }
            };

            info!(proxy = %this.proxy, pid = ?child.id(), program, "Client process started");
            this.report(InstallOutcome::ClientStarted { pid: child.id() });

            if let Some(stdout) = child.stdout.take() {
                this.stream_lines(stdout, false);
            }
            if let Some(stderr) = child.stderr.take() {
                this.stream_lines(stderr, true);
            }

            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    error!(proxy = %this.proxy, "Waiting on client failed: {}", e);
                    None
                }
            };
            this.report(InstallOutcome::ClientExited { code });
        })
    }

    fn stream_lines<R>(&self, reader: R, stderr: bool)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                this.report(InstallOutcome::ClientOutput { line, stderr });
            }
        });
    }

    fn report(&self, outcome: InstallOutcome) {
        debug!(proxy = %self.proxy, ?outcome, "Install step finished");
        let event = RuntimeEvent::Install {
            proxy: self.proxy.clone(),
            outcome,
        };
        if self.events.send(event).is_err() {
            debug!(proxy = %self.proxy, "Runtime gone, install result dropped");
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

fn failed(step: InstallStep, reason: impl Into<String>) -> InstallOutcome {
    InstallOutcome::Failed {
        step,
        reason: reason.into(),
    }
}

/// Run to completion; combined stdout and stderr on success
async fn run(cmd: &mut Command) -> std::result::Result<String, String> {
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| format!("failed to run {:?}: {}", cmd.as_std().get_program(), e))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(text)
    } else {
        Err(format!("exited with {}: {}", output.status, text.trim()))
    }
}
