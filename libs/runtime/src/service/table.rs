//! Per-type operation tables
//!
//! Built once per service type (usually in a `once_cell` `Lazy`) and
//! shared by all instances. [`MethodTable::with_base`] installs the
//! operations every service answers.

use super::{Args, InvokeResult, Service, ServiceContext};
use crate::error::RuntimeError;
use serde_json::{json, Value};
use std::collections::HashMap;
use types::{full_name, Message, Status};

pub type Handler<S> = fn(&mut S, &mut ServiceContext, &Args) -> InvokeResult;

pub struct MethodTable<S> {
    handlers: HashMap<&'static str, Handler<S>>,
}

impl<S: Service> MethodTable<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Table preloaded with the common service operations
    pub fn with_base() -> Self {
        Self::new()
            .op("addListener", add_listener::<S>)
            .op("removeListener", remove_listener::<S>)
            .op("applyConfig", apply_config::<S>)
            .op("applyConfigValue", apply_config_value::<S>)
            .op("getConfig", |s, _, _| Ok(s.core().config.clone()))
            .op("getNotifyList", |s, _, _| {
                Ok(serde_json::to_value(&s.core().notify_list)?)
            })
            .op("getName", |s, _, _| Ok(json!(s.core().identity.name())))
            .op("getId", |s, _, _| Ok(json!(s.core().identity.id())))
            .op("getFullname", |s, _, _| Ok(json!(s.core().identity.to_string())))
            .op("getTypeKey", |s, _, _| Ok(json!(s.core().type_key)))
            .op("getUptime", |s, _, _| Ok(json!(s.core().uptime_ms())))
            .op("isReady", |s, _, _| Ok(json!(s.core().is_ready())))
            .op("startService", |s, ctx, _| {
                s.start_service(ctx);
                Ok(Value::Null)
            })
            .op("stopService", |s, ctx, _| {
                s.stop_service(ctx);
                Ok(Value::Null)
            })
            .op("broadcastState", |s, _, _| Ok(serde_json::to_value(s.record())?))
            .op("publishStatus", publish_status::<S>)
            .op("getMethods", |s, _, _| Ok(json!(s.methods())))
            .op("releaseService", release_service::<S>)
    }

    pub fn op(mut self, name: &'static str, handler: Handler<S>) -> Self {
        self.handlers.insert(name, handler);
        self
    }

    pub fn call(&self, service: &mut S, ctx: &mut ServiceContext, method: &str, args: &Args) -> InvokeResult {
        match self.handlers.get(method) {
            Some(handler) => handler(service, ctx, args),
            None => Err(RuntimeError::unknown_method(service.identity(), method)),
        }
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<S: Service> Default for MethodTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn add_listener<S: Service>(s: &mut S, ctx: &mut ServiceContext, args: &Args) -> InvokeResult {
    let method: String = args.required(0)?;
    let remote: String = args.required(1)?;
    let callback: Option<String> = args.optional(2)?;

    let remote = full_name(&remote, ctx.local_id());
    s.core_mut()
        .notify_list
        .add(&method, &remote, callback.as_deref());
    Ok(Value::Null)
}

fn remove_listener<S: Service>(s: &mut S, ctx: &mut ServiceContext, args: &Args) -> InvokeResult {
    let method: String = args.required(0)?;
    let remote: String = args.required(1)?;
    let callback: Option<String> = args.optional(2)?;

    let remote = full_name(&remote, ctx.local_id());
    s.core_mut()
        .notify_list
        .remove(&method, &remote, callback.as_deref());
    Ok(Value::Null)
}

fn apply_config<S: Service>(s: &mut S, _ctx: &mut ServiceContext, args: &Args) -> InvokeResult {
    let config: Value = args.optional(0)?.unwrap_or(Value::Null);
    s.core_mut().apply_config(config);
    Ok(s.core().config.clone())
}

fn apply_config_value<S: Service>(s: &mut S, _ctx: &mut ServiceContext, args: &Args) -> InvokeResult {
    let key: String = args.required(0)?;
    let value = args.value(1).cloned().unwrap_or(Value::Null);
    s.core_mut().apply_config_value(&key, value);
    Ok(s.core().config.clone())
}

fn publish_status<S: Service>(_s: &mut S, _ctx: &mut ServiceContext, args: &Args) -> InvokeResult {
    let status: Status = args.required(0)?;
    Ok(serde_json::to_value(status)?)
}

fn release_service<S: Service>(s: &mut S, ctx: &mut ServiceContext, _args: &Args) -> InvokeResult {
    let fullname = s.core().identity.to_string();
    ctx.send(
        Message::new(ctx.runtime().to_string(), "release", vec![json!(fullname)])
            .with_sender(fullname),
    );
    Ok(Value::Null)
}
