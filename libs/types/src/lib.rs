//! # servicenet types
//!
//! Data shared by every servicenet process: the `name@processId` identity
//! scheme, the JSON message envelope exchanged over sockets, and the
//! records a runtime publishes about itself (registry entries, routes,
//! connections, processes, hosts, packages).
//!
//! Nothing in this crate performs I/O.

pub mod connection;
pub mod error;
pub mod identity;
pub mod launch;
pub mod message;
pub mod notify;
pub mod package;
pub mod process;
pub mod record;
pub mod route;
pub mod status;

pub use connection::{ConnectionDescriptor, ConnectionState, Direction};
pub use error::{Result, TypesError};
pub use identity::{
    callback_topic_name, capitalize, full_name, is_local, split_id, split_name, Identity,
};
pub use launch::{LaunchAction, LaunchDescription, ListenerSpec};
pub use message::Message;
pub use notify::{Listener, NotifyList};
pub use package::Package;
pub use process::{HostData, ProcessData};
pub use record::ServiceRecord;
pub use route::RouteEntry;
pub use status::{InstallLog, Status, StatusLevel};

/// Milliseconds since the unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
