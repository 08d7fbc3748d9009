//! Connection descriptors
//!
//! Serializable metadata about a live socket. The socket handle itself is
//! kept elsewhere, keyed by the same `gatewayId`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    pub gateway_id: String,
    pub ts: i64,
    pub uuid: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub encoding: String,
    /// Identity of the service owning the socket
    pub gateway: String,
    pub state: ConnectionState,
    pub direction: Direction,
}

impl ConnectionDescriptor {
    pub fn websocket(
        gateway_id: impl Into<String>,
        url: impl Into<String>,
        gateway: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            ts: crate::now_millis(),
            uuid: Uuid::new_v4().to_string(),
            url: url.into(),
            kind: "websocket".to_string(),
            encoding: "json".to_string(),
            gateway: gateway.into(),
            state: ConnectionState::Connected,
            direction,
        }
    }
}
