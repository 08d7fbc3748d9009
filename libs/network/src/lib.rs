//! # servicenet network
//!
//! Socket plumbing between runtimes. This crate never interprets messages:
//! it turns sockets into [`LinkEvent`]s for the runtime and turns
//! [`ConnectionHandle::send`] calls back into socket frames.
//!
//! - [`client`]: outbound connect (HTTP identity handshake, then WebSocket)
//! - [`server`]: inbound WebSocket accept and the HTTP API surface
//! - [`handle`]: cloneable write side of a live socket

pub mod client;
pub mod error;
pub mod event;
pub mod handle;
pub mod server;

pub use client::{handshake_url, spawn_connect, GET_ID_PATH};
pub use error::{NetworkError, Result};
pub use event::{ApiRequest, ApiSender, LinkEvent, LinkSender};
pub use handle::ConnectionHandle;
pub use server::{MessageServer, ServerConfig, MESSAGES_PATH};
