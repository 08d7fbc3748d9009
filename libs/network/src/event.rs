//! Events flowing from sockets and HTTP handlers into the runtime

use crate::error::NetworkError;
use crate::handle::ConnectionHandle;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use types::{Direction, Message};

#[derive(Debug)]
pub enum LinkEvent {
    /// A socket is ready; for outbound links the remote id is already known
    Opened {
        gateway_id: String,
        url: String,
        direction: Direction,
        handle: ConnectionHandle,
    },
    /// One text frame
    Message { gateway_id: String, text: String },
    /// The socket identified by `uuid` is gone
    Closed { gateway_id: String, uuid: String },
    /// Outbound connect gave up before the socket opened
    ConnectFailed { url: String, error: NetworkError },
}

pub type LinkSender = mpsc::UnboundedSender<LinkEvent>;

/// A message submitted over HTTP, answered with the invocation result
#[derive(Debug)]
pub struct ApiRequest {
    pub message: Message,
    pub reply: oneshot::Sender<Value>,
}

pub type ApiSender = mpsc::UnboundedSender<ApiRequest>;
