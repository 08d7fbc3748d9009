//! Invocation context
//!
//! Handed to every operation. Whatever a service queues here is routed by
//! the runtime once the operation has returned, so a handler never
//! re-enters the registry.

use crate::event::EventSender;
use serde_json::Value;
use tracing::{error, info, warn};
use types::{Identity, Message, Status, StatusLevel};

pub struct ServiceContext {
    runtime: Identity,
    events: EventSender,
    outbox: Vec<Message>,
    publications: Vec<(String, Value)>,
}

impl ServiceContext {
    pub fn new(runtime: Identity, events: EventSender) -> Self {
        Self {
            runtime,
            events,
            outbox: Vec::new(),
            publications: Vec::new(),
        }
    }

    /// Identity of the runtime hosting the service
    pub fn runtime(&self) -> &Identity {
        &self.runtime
    }

    pub fn local_id(&self) -> &str {
        self.runtime.id()
    }

    /// Channel for background tasks to post results back to the runtime
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    /// Queue a message for addressed delivery
    pub fn send(&mut self, message: Message) {
        self.outbox.push(message);
    }

    /// Publish `value` on the current service's `method` topic
    pub fn publish(&mut self, method: impl Into<String>, value: Value) {
        self.publications.push((method.into(), value));
    }

    /// Log and publish a status line on `publishStatus`
    pub fn status(&mut self, source: &Identity, level: StatusLevel, detail: impl Into<String>) {
        let status = Status::new(level, detail, source.to_string());
        match level {
            StatusLevel::Info => info!(source = %source, "{}", status.detail),
            StatusLevel::Warn => warn!(source = %source, "{}", status.detail),
            StatusLevel::Error => error!(source = %source, "{}", status.detail),
        }
        self.publish("publishStatus", serde_json::to_value(&status).unwrap_or_default());
    }

    pub(crate) fn into_parts(self) -> (Vec<Message>, Vec<(String, Value)>) {
        (self.outbox, self.publications)
    }
}
