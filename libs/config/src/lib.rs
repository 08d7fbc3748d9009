//! # servicenet node configuration
//!
//! Everything a node reads from disk before it starts routing:
//!
//! - [`RuntimeConfig`]: process id, listen address, peers to connect to
//!   (TOML file plus `SERVICENET_*` environment overrides)
//! - [`load_launch_file`]: declarative launch descriptions (JSON, TOML or YAML)
//! - [`PackageRepo`]: immutable per-type package descriptors from `package.yml`

pub mod launch;
pub mod repo;
pub mod runtime_config;

pub use launch::load_launch_file;
pub use repo::PackageRepo;
pub use runtime_config::{RuntimeConfig, LOCAL_PLATFORM};
