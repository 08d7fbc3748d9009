//! Shared fixtures for runtime integration tests

#![allow(dead_code)]

use network::{ConnectionHandle, LinkEvent};
use node_config::PackageRepo;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use service_runtime::{
    Args, InvokeResult, MethodTable, Runtime, RuntimeInbox, RuntimeSettings, Service, ServiceContext, ServiceCore,
    ServiceFactory,
};
use tokio::sync::mpsc;
use types::{Direction, Identity, Message};

/// Accepts any method it does not know and remembers it
pub struct Recorder {
    core: ServiceCore,
    received: Vec<Value>,
}

static RECORDER_METHODS: Lazy<MethodTable<Recorder>> =
    Lazy::new(|| MethodTable::<Recorder>::with_base().op("getReceived", |r, _, _| Ok(Value::Array(r.received.clone()))));

impl Recorder {
    pub fn new(name: &str, local_id: &str) -> Box<Self> {
        let identity = Identity::new(name, local_id).unwrap();
        Box::new(Self {
            core: ServiceCore::new(identity, "Recorder"),
            received: Vec::new(),
        })
    }
}

impl Service for Recorder {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore {
        &mut self.core
    }

    fn invoke(&mut self, ctx: &mut ServiceContext, method: &str, args: &Args) -> InvokeResult {
        if RECORDER_METHODS.contains(method) {
            return RECORDER_METHODS.call(self, ctx, method, args);
        }
        self.received.push(json!({
            "method": method,
            "value": args.value(0).cloned().unwrap_or(Value::Null),
        }));
        Ok(Value::Null)
    }

    fn methods(&self) -> Vec<&'static str> {
        RECORDER_METHODS.names()
    }
}

pub fn runtime(id: &str) -> (Runtime, RuntimeInbox) {
    runtime_with_repo(id, PackageRepo::new())
}

pub fn runtime_with_repo(id: &str, repo: PackageRepo) -> (Runtime, RuntimeInbox) {
    Runtime::new(RuntimeSettings::new(id), repo, ServiceFactory::with_builtins()).unwrap()
}

/// What a recorder has been sent so far
pub fn received(rt: &mut Runtime, recorder: &str) -> Vec<Value> {
    match rt.dispatch(Message::new(recorder, "getReceived", vec![])) {
        Some(Value::Array(items)) => items,
        other => panic!("recorder {} answered {:?}", recorder, other),
    }
}

/// Open a fake socket to `gateway_id`; returns the frames written to it
pub fn connect(rt: &mut Runtime, gateway_id: &str, direction: Direction) -> mpsc::UnboundedReceiver<String> {
    open_socket(rt, gateway_id, direction).1
}

/// Like [`connect`], also returning the socket uuid its close will carry
pub fn open_socket(
    rt: &mut Runtime,
    gateway_id: &str,
    direction: Direction,
) -> (String, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(gateway_id, tx);
    let uuid = handle.uuid().to_string();
    rt.handle_link(LinkEvent::Opened {
        gateway_id: gateway_id.to_string(),
        url: format!("ws://{}:3001/api/messages", gateway_id),
        direction,
        handle,
    });
    (uuid, rx)
}

/// Report the socket `uuid` to `gateway_id` as closed
pub fn close(rt: &mut Runtime, gateway_id: &str, uuid: &str) {
    rt.handle_link(LinkEvent::Closed {
        gateway_id: gateway_id.to_string(),
        uuid: uuid.to_string(),
    });
}

/// Simulate a frame arriving over `gateway_id`
pub fn receive(rt: &mut Runtime, gateway_id: &str, message: Message) {
    rt.handle_link(LinkEvent::Message {
        gateway_id: gateway_id.to_string(),
        text: message.encode().unwrap(),
    });
}

/// Drain and decode everything written so far
pub fn frames(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(text) = rx.try_recv() {
        out.push(Message::decode(&text).unwrap());
    }
    out
}

pub fn methods(frames: &[Message]) -> Vec<&str> {
    frames.iter().map(|m| m.method.as_str()).collect()
}
