use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusLevel::Info => write!(f, "info"),
            StatusLevel::Warn => write!(f, "warn"),
            StatusLevel::Error => write!(f, "error"),
        }
    }
}

/// Published on `publishStatus`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub level: StatusLevel,
    pub detail: String,
    pub source: String,
}

impl Status {
    pub fn new(level: StatusLevel, detail: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            level,
            detail: detail.into(),
            source: source.into(),
        }
    }
}

/// One line of installation progress, published on `publishInstallLog`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallLog {
    pub ts: i64,
    pub level: StatusLevel,
    pub msg: String,
}

impl InstallLog {
    pub fn new(level: StatusLevel, msg: impl Into<String>) -> Self {
        Self {
            ts: crate::now_millis(),
            level,
            msg: msg.into(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(StatusLevel::Info, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(StatusLevel::Error, msg)
    }
}
