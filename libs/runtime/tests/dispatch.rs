//! Dispatch Integration Tests
//!
//! Addressed delivery, subscriber fan-out, release and the query
//! operations of the runtime service.

mod common;

use common::{connect, frames, receive, received, runtime, Recorder};
use serde_json::json;
use service_runtime::{Clock, Runtime, RuntimeError, RuntimeInbox, ServiceCore};
use types::{Direction, Identity, Message};

fn with_clock() -> (Runtime, RuntimeInbox) {
    let (mut rt, inbox) = runtime("P1");
    rt.add_service(Clock::boxed(ServiceCore::new(Identity::new("clock01", "P1").unwrap(), "Clock")));
    rt.add_service(Recorder::new("ui", "P1"));
    (rt, inbox)
}

#[test]
fn test_result_reaches_local_subscriber() {
    let (mut rt, _inbox) = with_clock();
    rt.dispatch(Message::new("clock01", "addListener", vec![json!("publishEpoch"), json!("ui")]));

    let epoch = rt.dispatch(Message::new("clock01", "publishEpoch", vec![])).unwrap();

    let got = received(&mut rt, "ui");
    assert_eq!(got.len(), 1);
    assert_eq!(got[0]["method"], "onEpoch");
    assert_eq!(got[0]["value"], epoch);
}

#[test]
fn test_explicit_callback_method() {
    let (mut rt, _inbox) = with_clock();
    rt.dispatch(Message::new(
        "clock01@P1",
        "addListener",
        vec![json!("publishEpoch"), json!("ui@P1"), json!("onTick")],
    ));
    rt.dispatch(Message::new("clock01", "publishEpoch", vec![]));

    assert_eq!(received(&mut rt, "ui")[0]["method"], "onTick");
}

#[test]
fn test_result_reaches_remote_subscriber() {
    let (mut rt, _inbox) = with_clock();
    let mut p2 = connect(&mut rt, "P2", Direction::Outbound);
    frames(&mut p2);

    rt.dispatch(Message::new("clock01", "addListener", vec![json!("publishEpoch"), json!("ui@P2")]));
    rt.dispatch(Message::new("clock01", "publishEpoch", vec![]));

    let sent = frames(&mut p2);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name, "ui@P2");
    assert_eq!(sent[0].method, "onEpoch");
    assert_eq!(sent[0].sender, "clock01@P1");
}

#[test]
fn test_unsubscribe() {
    let (mut rt, _inbox) = with_clock();
    rt.dispatch(Message::new("clock01", "addListener", vec![json!("publishEpoch"), json!("ui")]));
    rt.dispatch(Message::new("clock01", "removeListener", vec![json!("publishEpoch"), json!("ui")]));
    rt.dispatch(Message::new("clock01", "publishEpoch", vec![]));

    assert!(received(&mut rt, "ui").is_empty());
}

#[test]
fn test_unresolvable_targets_are_dropped() {
    let (mut rt, _inbox) = with_clock();
    let before = rt.store().len();

    assert_eq!(rt.dispatch(Message::new("ghost", "publishEpoch", vec![])), None);
    assert_eq!(rt.dispatch(Message::new("ghost@P1", "publishEpoch", vec![])), None);
    assert_eq!(rt.dispatch(Message::new("a@", "publishEpoch", vec![])), None);
    assert_eq!(rt.dispatch(Message::new("clock01", "fly", vec![])), None);

    assert_eq!(rt.store().len(), before);
    assert_eq!(rt.dispatch(Message::new("runtime", "getId", vec![])), Some(json!("P1")));
}

#[test]
fn test_runaway_cascade_is_bounded() {
    let (mut rt, _inbox) = with_clock();
    rt.dispatch(Message::new(
        "clock01",
        "addListener",
        vec![json!("publishEpoch"), json!("clock01"), json!("publishEpoch")],
    ));

    assert!(rt.dispatch(Message::new("clock01", "publishEpoch", vec![])).is_some());
    assert_eq!(rt.dispatch(Message::new("runtime", "getId", vec![])), Some(json!("P1")));
}

#[test]
fn test_release_rules() {
    let (mut rt, _inbox) = with_clock();
    rt.dispatch(Message::new("runtime", "addListener", vec![json!("released"), json!("ui")]));
    let remote = ServiceCore::new(Identity::new("servo", "P2").unwrap(), "Servo").record();
    rt.register_record(remote);

    assert!(matches!(rt.release("runtime"), Err(RuntimeError::Refused { .. })));
    assert!(matches!(rt.release("servo@P2"), Err(RuntimeError::Refused { .. })));
    assert!(matches!(rt.release("ghost"), Err(RuntimeError::AddressResolution { .. })));

    rt.release("clock01").unwrap();
    assert!(!rt.store().contains(&Identity::new("clock01", "P1").unwrap()));

    let got = received(&mut rt, "ui");
    assert_eq!(got.len(), 1);
    assert_eq!(got[0]["method"], "onReleased");
    assert_eq!(got[0]["value"], "clock01@P1");
}

#[test]
fn test_direct_calls_deliver_notifications() {
    let (mut rt, _inbox) = runtime("P1");
    rt.add_service(Recorder::new("ui", "P1"));
    for topic in ["registered", "broadcastState"] {
        rt.dispatch(Message::new("runtime", "addListener", vec![json!(topic), json!("ui")]));
    }

    rt.register_record(ServiceCore::new(Identity::new("servo", "P2").unwrap(), "Servo").record());
    rt.broadcast_state();

    let got = received(&mut rt, "ui");
    assert_eq!(got.len(), 2);
    assert_eq!(got[0]["method"], "onRegistered");
    assert_eq!(got[0]["value"]["fullname"], "servo@P2");
    assert_eq!(got[1]["method"], "onBroadcastState");
    assert_eq!(got[1]["value"]["fullname"], "runtime@P1");
}

#[test]
fn test_service_releases_itself() {
    let (mut rt, _inbox) = with_clock();
    rt.dispatch(Message::new("clock01", "releaseService", vec![]));
    assert!(!rt.store().contains(&Identity::new("clock01", "P1").unwrap()));
}

#[test]
fn test_latest_service_data_follows_broadcast_state() {
    let (mut rt, _inbox) = runtime("P1");
    let _p2 = connect(&mut rt, "P2", Direction::Inbound);

    let mut record = ServiceCore::new(Identity::new("servo", "P2").unwrap(), "Servo").record();
    record.config = json!({ "pos": 5 });
    receive(
        &mut rt,
        "P2",
        Message::new("runtime@P1", "onBroadcastState", vec![json!(record)]).with_sender("servo@P2"),
    );

    let latest = rt
        .dispatch(Message::new("runtime", "getLatestServiceData", vec![json!("servo@P2")]))
        .unwrap();
    assert_eq!(latest["config"]["pos"], 5);
    assert!(rt.store().retained().contains_key("servo@P2.onBroadcastState"));
}

#[test]
fn test_registry_queries() {
    let (mut rt, _inbox) = with_clock();
    rt.register_record(ServiceCore::new(Identity::new("servo", "P2").unwrap(), "Servo").record());

    let names = rt.dispatch(Message::new("runtime", "getServiceNames", vec![])).unwrap();
    assert_eq!(names, json!(["clock01@P1", "runtime@P1", "servo@P2", "ui@P1"]));

    let local = rt.dispatch(Message::new("runtime", "getLocalServiceNames", vec![])).unwrap();
    assert_eq!(local, json!(["clock01@P1", "runtime@P1", "ui@P1"]));

    let service = rt.dispatch(Message::new("runtime", "getService", vec![json!("clock01")])).unwrap();
    assert_eq!(service["typeKey"], "Clock");

    let registry = rt.dispatch(Message::new("runtime", "getRegistry", vec![])).unwrap();
    assert!(registry.get("servo@P2").is_some());

    let with_epoch = rt
        .dispatch(Message::new("runtime", "getServicesFromInterface", vec![json!("publishEpoch")]))
        .unwrap();
    assert_eq!(with_epoch, json!(["clock01@P1"]));
}

#[test]
fn test_apply_service_config() {
    let (mut rt, _inbox) = with_clock();
    rt.dispatch(Message::new(
        "runtime",
        "applyServiceConfig",
        vec![json!("clock01"), json!({ "intervalMs": 250 })],
    ));

    let config = rt.dispatch(Message::new("clock01", "getConfig", vec![])).unwrap();
    assert_eq!(config, json!({ "intervalMs": 250 }));
}

#[test]
fn test_broadcast_reaches_every_socket() {
    let (mut rt, _inbox) = runtime("P1");
    let mut p2 = connect(&mut rt, "P2", Direction::Inbound);
    let mut p3 = connect(&mut rt, "P3", Direction::Inbound);

    let note = json!({ "name": "ui", "method": "onNotice", "data": ["hello"] });
    let count = rt.dispatch(Message::new("runtime", "broadcast", vec![note])).unwrap();

    assert_eq!(count, json!(2));
    assert_eq!(frames(&mut p2)[0].method, "onNotice");
    assert_eq!(frames(&mut p3)[0].method, "onNotice");
}

#[test]
fn test_retained_messages() {
    let (mut rt, _inbox) = with_clock();
    rt.dispatch(Message::new("clock01", "publishEpoch", vec![]).with_sender("ui"));

    let messages = rt.dispatch(Message::new("runtime", "getMessages", vec![])).unwrap();
    let latest = &messages["ui@P1.publishEpoch"];
    assert_eq!(latest["name"], "clock01@P1");
    assert_eq!(latest["sender"], "ui@P1");
}
