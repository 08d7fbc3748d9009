use serde::{Deserialize, Serialize};

/// To reach `remote_id`, send through the connection `gateway_id` owned by `gateway`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub remote_id: String,
    pub gateway_id: String,
    pub gateway: String,
}

impl RouteEntry {
    pub fn new(
        remote_id: impl Into<String>,
        gateway_id: impl Into<String>,
        gateway: impl Into<String>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            gateway_id: gateway_id.into(),
            gateway: gateway.into(),
        }
    }
}
