//! Event loop
//!
//! The driver owns the [`Runtime`] and feeds it one event at a time from
//! three sources: background tasks (timers, installers), sockets, and HTTP
//! requests waiting on an answer.

use crate::event::RuntimeEvent;
use crate::runtime::{Runtime, RuntimeInbox};
use network::{ApiRequest, LinkEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct RuntimeDriver {
    runtime: Runtime,
    inbox: RuntimeInbox,
    api: mpsc::UnboundedReceiver<ApiRequest>,
}

impl RuntimeDriver {
    pub fn new(runtime: Runtime, inbox: RuntimeInbox, api: mpsc::UnboundedReceiver<ApiRequest>) -> Self {
        Self { runtime, inbox, api }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// Run until every source is closed, then hand the runtime back
    pub async fn run(mut self) -> Runtime {
        info!(runtime = %self.runtime.identity(), "Runtime driver started");

        loop {
            tokio::select! {
                event = self.inbox.events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
                link = self.inbox.links.recv() => match link {
                    Some(link) => self.on_link(link),
                    None => break,
                },
                request = self.api.recv() => match request {
                    Some(request) => self.on_request(request),
                    None => {
                        debug!("API channel closed");
                        break;
                    }
                },
            }
        }

        info!(runtime = %self.runtime.identity(), "Runtime driver stopped");
        self.runtime
    }

    fn on_event(&mut self, event: RuntimeEvent) {
        self.runtime.handle_event(event);
    }

    fn on_link(&mut self, link: LinkEvent) {
        self.runtime.handle_link(link);
    }

    fn on_request(&mut self, request: ApiRequest) {
        let ApiRequest { message, reply } = request;
        let value = self.runtime.dispatch(message).unwrap_or(Value::Null);
        if reply.send(value).is_err() {
            debug!("HTTP caller went away before the answer");
        }
    }
}
