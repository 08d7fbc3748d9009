//! Subscription table
//!
//! Maps a locally published method to the subscribers that want its
//! results. A `(callbackName, callbackMethod)` pair appears at most once
//! per topic method.

use crate::identity::callback_topic_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub topic_method: String,
    pub callback_name: String,
    pub callback_method: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotifyList(BTreeMap<String, Vec<Listener>>);

impl NotifyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `callback_name` to `method`; returns false when already present.
    ///
    /// A missing callback method defaults to [`callback_topic_name`].
    pub fn add(&mut self, method: &str, callback_name: &str, callback_method: Option<&str>) -> bool {
        let callback_method = callback_method
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| callback_topic_name(method));

        let entries = self.0.entry(method.to_string()).or_default();
        if entries
            .iter()
            .any(|l| l.callback_name == callback_name && l.callback_method == callback_method)
        {
            return false;
        }

        entries.push(Listener {
            topic_method: method.to_string(),
            callback_name: callback_name.to_string(),
            callback_method,
        });
        true
    }

    /// Unsubscribe; returns false when nothing matched
    pub fn remove(&mut self, method: &str, callback_name: &str, callback_method: Option<&str>) -> bool {
        let callback_method = callback_method
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| callback_topic_name(method));

        let Some(entries) = self.0.get_mut(method) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|l| !(l.callback_name == callback_name && l.callback_method == callback_method));
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.0.remove(method);
        }
        removed
    }

    pub fn listeners(&self, method: &str) -> &[Listener] {
        self.0.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every subscription, topic by topic
    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.0.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
