//! Route table
//!
//! Maps a remote process id to the gateway connection that reaches it.
//! Explicit entries are first-write-wins per destination; the default
//! route always follows the most recent `add_route`, including calls that
//! did not insert anything.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error};
use types::RouteEntry;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    route_table: BTreeMap<String, RouteEntry>,
    default_route: Option<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless `remote_id` already has an entry; always moves the default.
    ///
    /// Returns whether an entry was inserted.
    pub fn add_route(&mut self, remote_id: &str, gateway_id: &str, gateway: &str) -> bool {
        if remote_id.is_empty() || gateway_id.is_empty() || gateway.is_empty() {
            error!(
                remote_id,
                gateway_id, gateway, "Refusing route with missing fields"
            );
            return false;
        }

        let entry = RouteEntry::new(remote_id, gateway_id, gateway);
        let inserted = if self.route_table.contains_key(remote_id) {
            false
        } else {
            debug!(remote_id, gateway_id, gateway, "Adding route");
            self.route_table.insert(remote_id.to_string(), entry.clone());
            true
        };

        self.default_route = Some(entry);
        inserted
    }

    /// Explicit entry, else the default route
    pub fn gateway_for(&self, remote_id: &str) -> Option<&RouteEntry> {
        self.route_table
            .get(remote_id)
            .or(self.default_route.as_ref())
    }

    /// Explicit entry only
    pub fn get(&self, remote_id: &str) -> Option<&RouteEntry> {
        self.route_table.get(remote_id)
    }

    pub fn remove_route(&mut self, remote_id: &str) -> Option<RouteEntry> {
        let removed = self.route_table.remove(remote_id);
        if self
            .default_route
            .as_ref()
            .is_some_and(|d| d.remote_id == remote_id)
        {
            self.default_route = None;
        }
        removed
    }

    /// Drop every entry going through `gateway_id`, including the default
    pub fn remove_gateway(&mut self, gateway_id: &str) -> Vec<RouteEntry> {
        let doomed: Vec<String> = self
            .route_table
            .iter()
            .filter(|(_, entry)| entry.gateway_id == gateway_id)
            .map(|(remote_id, _)| remote_id.clone())
            .collect();

        let removed = doomed
            .iter()
            .filter_map(|remote_id| self.route_table.remove(remote_id))
            .collect();

        if self
            .default_route
            .as_ref()
            .is_some_and(|d| d.gateway_id == gateway_id)
        {
            self.default_route = None;
        }
        removed
    }

    pub fn default_route(&self) -> Option<&RouteEntry> {
        self.default_route.as_ref()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.route_table.values()
    }

    pub fn references(&self, gateway_id: &str) -> bool {
        self.entries().any(|e| e.gateway_id == gateway_id)
            || self
                .default_route
                .as_ref()
                .is_some_and(|d| d.gateway_id == gateway_id)
    }

    pub fn len(&self) -> usize {
        self.route_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.route_table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_entry_wins_over_default() {
        let mut routes = RouteTable::new();
        assert!(routes.add_route("P2", "G1", "gwA"));
        assert!(routes.add_route("P3", "G2", "gwB"));

        assert_eq!(routes.gateway_for("P2").unwrap().gateway, "gwA");
        assert_eq!(routes.gateway_for("P3").unwrap().gateway, "gwB");
        assert_eq!(routes.gateway_for("P9").unwrap().gateway, "gwB");
    }

    #[test]
    fn test_first_write_wins_but_default_moves() {
        let mut routes = RouteTable::new();
        routes.add_route("P2", "G1", "gwA");
        routes.add_route("P3", "G2", "gwB");
        assert!(!routes.add_route("P2", "G3", "gwC"));

        assert_eq!(routes.gateway_for("P2").unwrap().gateway_id, "G1");
        assert_eq!(routes.default_route().unwrap().gateway_id, "G3");
        assert_eq!(routes.gateway_for("P7").unwrap().gateway, "gwC");
    }

    #[test]
    fn test_no_route() {
        let routes = RouteTable::new();
        assert!(routes.gateway_for("P2").is_none());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut routes = RouteTable::new();
        assert!(!routes.add_route("", "G1", "gwA"));
        assert!(routes.default_route().is_none());
    }

    #[test]
    fn test_remove_gateway() {
        let mut routes = RouteTable::new();
        routes.add_route("P2", "G1", "gwA");
        routes.add_route("P4", "G1", "gwA");
        routes.add_route("P3", "G2", "gwB");
        routes.add_route("P5", "G1", "gwA");

        let removed = routes.remove_gateway("G1");
        assert_eq!(removed.len(), 3);
        assert!(!routes.references("G1"));
        assert!(routes.default_route().is_none());
        assert_eq!(routes.gateway_for("P3").unwrap().gateway_id, "G2");
        assert!(routes.gateway_for("P2").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let mut routes = RouteTable::new();
        routes.add_route("P2", "G1", "runtime@P1");
        let value = serde_json::to_value(&routes).unwrap();
        assert_eq!(value["routeTable"]["P2"]["gatewayId"], "G1");
        assert_eq!(value["defaultRoute"]["remoteId"], "P2");
    }
}
