//! Addressed delivery
//!
//! `deliver` runs one message against whatever answers at its target.
//! Everything an invocation produces (subscriber notifications, messages
//! queued by the service) lands in `pending` and is drained afterwards, so
//! a handler never re-enters the registry.

use super::{Runtime, MAX_CASCADE};
use crate::error::RuntimeError;
use crate::proxy::Delivery;
use crate::service::{Args, InvokeResult, Service, ServiceContext};
use crate::store::{HandleKind, ServiceHandle};
use serde_json::Value;
use tracing::{debug, error, trace, warn};
use types::{full_name, split_id, Identity, Message};

impl Runtime {
    /// Deliver `message` and everything it triggers; returns the direct result
    pub fn dispatch(&mut self, message: Message) -> Option<Value> {
        let result = self.deliver(message, None);
        self.drain();
        result
    }

    /// Deliver a message that arrived over `gateway_id`
    pub(crate) fn dispatch_from(&mut self, gateway_id: &str, message: Message) -> Option<Value> {
        let result = self.deliver(message, Some(gateway_id));
        self.drain();
        result
    }

    /// Deliver everything queued. Calls made while a drain is already
    /// running leave their messages to the outer loop.
    pub(crate) fn drain(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;

        let mut delivered = 0usize;
        while let Some(message) = self.pending.pop_front() {
            if delivered >= MAX_CASCADE {
                error!(
                    dropped = self.pending.len() + 1,
                    "Notification cascade exceeded {} deliveries, dropping the rest", MAX_CASCADE
                );
                self.pending.clear();
                break;
            }
            delivered += 1;
            self.deliver(message, None);
        }

        self.draining = false;
    }

    fn deliver(&mut self, mut message: Message, origin: Option<&str>) -> Option<Value> {
        let target = match self.store.canonicalize(&message.name) {
            Ok(target) => target,
            Err(e) => {
                warn!(name = %message.name, method = %message.method, "Dropping message: {}", e);
                return None;
            }
        };
        message.name = target.to_string();
        if !message.sender.is_empty() {
            message.sender = full_name(&message.sender, self.local_id());
        }
        self.store.retain(&message);

        trace!(target = %target, method = %message.method, sender = %message.sender, "Deliver");

        match self.kind_of(&target) {
            Some(HandleKind::Runtime) => self.invoke_runtime(&message),
            Some(HandleKind::Local) => self.invoke_local(&target, &message),
            Some(HandleKind::Proxy) => self.invoke_proxy(&target, &message),
            Some(HandleKind::Remote) => {
                self.send_remote_from(&message, origin);
                None
            }
            None if !target.is_local(self.local_id()) => {
                self.send_remote_from(&message, origin);
                None
            }
            None => {
                let error = RuntimeError::AddressResolution {
                    target: target.to_string(),
                    method: message.method.clone(),
                };
                warn!(sender = %message.sender, "Dropping message: {}", error);
                None
            }
        }
    }

    fn invoke_runtime(&mut self, message: &Message) -> Option<Value> {
        let identity = self.core.identity.clone();
        let mut ctx = self.context();
        let args = Args::new(&message.method, message.data.clone());
        let result = self.invoke(&mut ctx, &message.method, &args);
        self.absorb(&identity, ctx);
        self.complete(&identity, &message.method, result)
    }

    fn invoke_local(&mut self, target: &Identity, message: &Message) -> Option<Value> {
        let mut ctx = self.context();
        let args = Args::new(&message.method, message.data.clone());
        let result = match self.store.get_mut(target) {
            Some(ServiceHandle::Local(service)) => service.invoke(&mut ctx, &message.method, &args),
            _ => return None,
        };
        self.absorb(target, ctx);
        self.complete(target, &message.method, result)
    }

    fn invoke_proxy(&mut self, target: &Identity, message: &Message) -> Option<Value> {
        let mut ctx = self.context();
        let delivery = match self.store.get_mut(target) {
            Some(ServiceHandle::Proxy(proxy)) => proxy.receive(&mut ctx, message),
            _ => return None,
        };
        self.absorb(target, ctx);
        match delivery {
            Delivery::Executed(result) => self.complete(target, &message.method, result),
            Delivery::Forwarded => None,
        }
    }

    /// Forward a successful result to subscribers; log and drop failures
    fn complete(&mut self, source: &Identity, method: &str, result: InvokeResult) -> Option<Value> {
        match result {
            Ok(value) => {
                self.notify(source, method, value.clone());
                Some(value)
            }
            Err(e) => {
                warn!(target = %source, method, "Dropping message: {}", e);
                None
            }
        }
    }

    /// Route what an operation queued on its context
    pub(crate) fn absorb(&mut self, source: &Identity, ctx: ServiceContext) {
        let (outbox, publications) = ctx.into_parts();
        for (method, value) in publications {
            self.notify(source, &method, value);
        }
        self.pending.extend(outbox);
    }

    /// Queue `value` for every subscriber of `source.method`
    pub(crate) fn notify(&mut self, source: &Identity, method: &str, value: Value) {
        let Some(notify_list) = self.notify_list_of(source) else {
            return;
        };
        let sender = source.to_string();
        let messages: Vec<Message> = notify_list
            .listeners(method)
            .iter()
            .map(|listener| {
                Message::new(listener.callback_name.clone(), listener.callback_method.clone(), vec![value.clone()])
                    .with_sender(sender.clone())
            })
            .collect();

        if !messages.is_empty() {
            debug!(source = %sender, method, subscribers = messages.len(), "Notify");
        }
        self.pending.extend(messages);
    }

    /// Write to the connection that reaches the target's process
    pub fn send_remote(&mut self, message: &Message) -> bool {
        self.send_remote_from(message, None)
    }

    pub(crate) fn send_remote_from(&mut self, message: &Message, origin: Option<&str>) -> bool {
        let Some(remote_id) = split_id(&message.name) else {
            warn!(name = %message.name, "Cannot route a message without a process id");
            return false;
        };

        let Some(route) = self.routes.gateway_for(remote_id) else {
            let error = RuntimeError::NoRoute {
                remote_id: remote_id.to_string(),
            };
            warn!(name = %message.name, method = %message.method, "Dropping message: {}", error);
            return false;
        };

        if origin == Some(route.gateway_id.as_str()) {
            warn!(
                name = %message.name,
                gateway = %route.gateway_id,
                "Dropping message: route leads back to the connection it arrived on"
            );
            return false;
        }

        let Some(handle) = self.connections.handle(&route.gateway_id) else {
            warn!(gateway = %route.gateway_id, "Route references a closed connection");
            return false;
        };

        match handle.send(message) {
            Ok(()) => {
                trace!(name = %message.name, method = %message.method, gateway = %route.gateway_id, "Sent remote");
                true
            }
            Err(e) => {
                warn!(gateway = %route.gateway_id, "Send failed: {}", e);
                false
            }
        }
    }
}
