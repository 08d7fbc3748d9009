//! Write side of a live socket
//!
//! Frames are queued on an unbounded channel drained by the socket task.
//! Dropping every clone of the handle closes the socket. Each socket gets
//! its own uuid so a late close from a replaced socket can be told apart
//! from the live one sharing its gateway id.

use crate::error::{NetworkError, Result};
use tokio::sync::mpsc;
use types::Message;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    gateway_id: String,
    uuid: String,
    outbound: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(gateway_id: impl Into<String>, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            uuid: Uuid::new_v4().to_string(),
            outbound,
        }
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// Identifies this socket among all sockets ever opened to the same peer
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn send_text(&self, text: String) -> Result<()> {
        self.outbound.send(text).map_err(|_| NetworkError::Send {
            gateway_id: self.gateway_id.clone(),
        })
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        self.send_text(message.encode()?)
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_send_encodes_envelope() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new("P2", tx);

        assert_ok!(handle.send(&Message::new("runtime@P2", "getRegistry", vec![]).with_sender("runtime@P1")));

        let text = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["method"], "getRegistry");
        assert_eq!(value["data"], json!([]));
    }

    #[test]
    fn test_send_after_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new("P2", tx);
        drop(rx);
        assert!(handle.is_closed());
        let err = assert_err!(handle.send_text("{}".to_string()));
        assert!(matches!(err, NetworkError::Send { .. }));
    }

    #[test]
    fn test_each_socket_has_its_own_uuid() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = ConnectionHandle::new("P2", tx.clone());
        let second = ConnectionHandle::new("P2", tx);

        assert_ne!(first.uuid(), second.uuid());
        assert_eq!(first.clone().uuid(), first.uuid());
    }
}
