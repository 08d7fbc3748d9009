//! # servicenet runtime
//!
//! Registry, addressing, pub/sub and multi-hop routing for one servicenet
//! process.
//!
//! # Architecture
//!
//! ```text
//!   sockets ──LinkEvent──┐
//!   timers  ─RuntimeEvent┼──> RuntimeDriver ──> Runtime ──┬─> Local services
//!   HTTP    ─ApiRequest──┘     (one event        (Store,   ├─> Proxies ──> client socket
//!                               at a time)       routes)   └─> Remote ──> gateway socket
//! ```
//!
//! Every service is addressed as `name@processId`. A bare `name` always
//! means this process. Operation results fan out to the subscribers in
//! the invoked service's notify list; remote subscribers are reached
//! through the route table, one hop per gateway.

pub mod connections;
pub mod driver;
pub mod error;
pub mod event;
pub mod launch;
pub mod proxy;
pub mod routes;
pub mod runtime;
pub mod service;
pub mod services;
pub mod store;

/// Name of the runtime service in every process
pub const RUNTIME_NAME: &str = "runtime";

pub use connections::ConnectionTable;
pub use driver::RuntimeDriver;
pub use error::{Result, RuntimeError};
pub use event::{EventSender, RuntimeEvent};
pub use launch::{builtin_packages, ServiceFactory};
pub use proxy::{ClientState, Delivery, InstallOutcome, InstallStep, Proxy, PROXY_TYPE_KEY};
pub use routes::RouteTable;
pub use runtime::{Runtime, RuntimeInbox, RuntimeSettings, MAX_CASCADE, RUNTIME_TYPE_KEY};
pub use service::{Args, InvokeResult, MethodTable, Service, ServiceContext, ServiceCore};
pub use services::{Clock, Unknown, CLOCK_TYPE_KEY, UNKNOWN_TYPE_KEY};
pub use store::{HandleKind, Registration, ServiceHandle, Store};
