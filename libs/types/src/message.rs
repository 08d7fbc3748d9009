//! Wire envelope
//!
//! One JSON object per socket frame:
//! `{ msgId?, type?, clientId?, name, method, sender, data? }`.
//! `data` is the positional argument list of the invoked method.

use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Target service, bare or fully qualified
    pub name: String,

    pub method: String,

    /// Originating service, fully qualified
    #[serde(default)]
    pub sender: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    pub fn new(name: impl Into<String>, method: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            msg_id: Some(Uuid::new_v4().to_string()),
            msg_type: None,
            client_id: None,
            name: name.into(),
            method: method.into(),
            sender: String::new(),
            data,
        }
    }

    /// Set the sender
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_type(mut self, msg_type: impl Into<String>) -> Self {
        self.msg_type = Some(msg_type.into());
        self
    }

    /// Key under which the latest message of this kind is retained
    pub fn retention_key(&self) -> String {
        format!("{}.{}", self.sender, self.method)
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_minimal_envelope() {
        let msg = Message::decode(r#"{"name":"clock01","method":"publishEpoch","sender":"caller@P1"}"#)
            .unwrap();
        assert_eq!(msg.name, "clock01");
        assert!(msg.data.is_empty());
        assert!(msg.msg_id.is_none());
    }

    #[test]
    fn test_decode_null_data() {
        let msg =
            Message::decode(r#"{"name":"a","method":"b","sender":"c@P1","data":null}"#).unwrap();
        assert!(msg.data.is_empty());
    }

    #[test]
    fn test_encode_uses_wire_names() {
        let msg = Message::new("clock01@P1", "startClock", vec![json!(1000)])
            .with_sender("runtime@P1")
            .with_type("service");
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "service");
        assert_eq!(value["sender"], "runtime@P1");
        assert_eq!(value["data"], json!([1000]));
        assert!(value.get("msgId").is_some());
        assert!(value.get("clientId").is_none());
    }

    #[test]
    fn test_retention_key() {
        let msg = Message::new("ui@P1", "onEpoch", vec![]).with_sender("clock01@P1");
        assert_eq!(msg.retention_key(), "clock01@P1.onEpoch");
    }
}
