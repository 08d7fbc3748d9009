//! Routing Integration Tests
//!
//! Connections, peer announcement, learned routes and what happens to the
//! registry when a link goes away.

mod common;

use common::{close, connect, frames, methods, open_socket, receive, received, runtime, Recorder};
use serde_json::json;
use tokio::sync::mpsc::error::TryRecvError;
use service_runtime::{Clock, Service, ServiceCore};
use types::{Direction, Identity, Message, ServiceRecord};

fn record(name: &str, id: &str) -> ServiceRecord {
    ServiceCore::new(Identity::new(name, id).unwrap(), "Servo").record()
}

#[test]
fn test_outbound_link_announces_in_order() {
    let (mut rt, _inbox) = runtime("P1");
    rt.add_service(Clock::boxed(ServiceCore::new(Identity::new("clock01", "P1").unwrap(), "Clock")));

    let mut p2 = connect(&mut rt, "P2", Direction::Outbound);
    let sent = frames(&mut p2);

    assert_eq!(
        methods(&sent),
        vec!["addListener", "getRegistry", "registerProcess", "register", "register", "registerHost"]
    );
    assert!(sent.iter().all(|m| m.name == "runtime@P2" && m.sender == "runtime@P1"));
    assert_eq!(sent[0].data, vec![json!("getRegistry"), json!("runtime@P1"), json!("onRegistry")]);

    let announced: Vec<&str> = sent[3..5]
        .iter()
        .map(|m| m.data[0]["fullname"].as_str().unwrap())
        .collect();
    assert_eq!(announced, vec!["clock01@P1", "runtime@P1"]);

    assert_eq!(rt.routes().get("P2").unwrap().gateway_id, "P2");
    assert!(rt.connections().contains("P2"));
}

#[test]
fn test_inbound_link_stays_quiet() {
    let (mut rt, _inbox) = runtime("P1");
    let mut p2 = connect(&mut rt, "P2", Direction::Inbound);

    assert!(frames(&mut p2).is_empty());
    assert_eq!(rt.routes().default_route().unwrap().gateway_id, "P2");
}

#[test]
fn test_peer_registry_is_merged() {
    let (mut rt, _inbox) = runtime("P1");
    let _p2 = connect(&mut rt, "P2", Direction::Outbound);

    let registry = json!({
        "runtime@P2": record("runtime", "P2"),
        "servo@P2": record("servo", "P2"),
        "fake@P1": record("fake", "P1"),
    });
    receive(
        &mut rt,
        "P2",
        Message::new("runtime@P1", "onRegistry", vec![registry]).with_sender("runtime@P2"),
    );

    let store = rt.store();
    assert!(store.contains(&Identity::new("servo", "P2").unwrap()));
    assert!(store.contains(&Identity::new("runtime", "P2").unwrap()));
    assert!(!store.contains(&Identity::new("fake", "P1").unwrap()));
}

#[test]
fn test_peer_cannot_replace_hosted_service() {
    let (mut rt, _inbox) = runtime("P1");
    let _p2 = connect(&mut rt, "P2", Direction::Inbound);

    let mut claim = record("runtime", "P1");
    claim.type_key = "Impostor".to_string();
    receive(
        &mut rt,
        "P2",
        Message::new("runtime@P1", "register", vec![json!(claim)]).with_sender("runtime@P2"),
    );

    let runtime = rt.record_of(&Identity::new("runtime", "P1").unwrap()).unwrap();
    assert_eq!(runtime.type_key, "Runtime");
}

#[test]
fn test_routes_are_learned_from_senders() {
    let (mut rt, _inbox) = runtime("P1");
    let mut p2 = connect(&mut rt, "P2", Direction::Inbound);

    receive(
        &mut rt,
        "P2",
        Message::new("runtime@P1", "getId", vec![]).with_sender("clock@P3"),
    );
    assert_eq!(rt.routes().get("P3").unwrap().gateway_id, "P2");

    // an existing route is not moved by traffic over another link
    let mut p4 = connect(&mut rt, "P4", Direction::Inbound);
    receive(
        &mut rt,
        "P4",
        Message::new("runtime@P1", "getId", vec![]).with_sender("clock@P3"),
    );
    assert_eq!(rt.routes().get("P3").unwrap().gateway_id, "P2");

    rt.dispatch(Message::new("ui@P3", "onEpoch", vec![json!(1)]));
    let via_p2 = frames(&mut p2);
    assert_eq!(methods(&via_p2), vec!["onEpoch"]);
    assert_eq!(via_p2[0].name, "ui@P3");
    assert!(frames(&mut p4).is_empty());
}

#[test]
fn test_unknown_process_uses_default_route() {
    let (mut rt, _inbox) = runtime("P1");
    let mut p2 = connect(&mut rt, "P2", Direction::Outbound);
    frames(&mut p2);

    assert_eq!(rt.dispatch(Message::new("svc@P9", "move", vec![json!(10)])), None);

    let sent = frames(&mut p2);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name, "svc@P9");
    assert_eq!(sent[0].data, vec![json!(10)]);
}

#[test]
fn test_no_route_drops() {
    let (mut rt, _inbox) = runtime("P1");
    let before = rt.store().len();

    assert_eq!(rt.dispatch(Message::new("svc@P9", "move", vec![])), None);
    assert_eq!(rt.store().len(), before);
}

#[test]
fn test_message_not_bounced_to_its_origin() {
    let (mut rt, _inbox) = runtime("P1");
    let mut p2 = connect(&mut rt, "P2", Direction::Inbound);

    receive(
        &mut rt,
        "P2",
        Message::new("svc@P9", "move", vec![]).with_sender("runtime@P2"),
    );

    assert!(frames(&mut p2).is_empty());
}

#[test]
fn test_closing_link_releases_what_it_reached() {
    let (mut rt, _inbox) = runtime("P1");
    rt.add_service(Recorder::new("ui", "P1"));
    rt.dispatch(Message::new("runtime", "addListener", vec![json!("released"), json!("ui")]));

    let _p2 = connect(&mut rt, "P2", Direction::Outbound);
    receive(
        &mut rt,
        "P2",
        Message::new("runtime@P1", "register", vec![json!(record("servo", "P2"))]).with_sender("runtime@P2"),
    );
    receive(
        &mut rt,
        "P2",
        Message::new("runtime@P1", "register", vec![json!(record("arm", "P3"))]).with_sender("runtime@P3"),
    );
    assert_eq!(rt.routes().get("P3").unwrap().gateway_id, "P2");

    assert!(rt.remove_connection("P2"));

    assert!(!rt.store().contains(&Identity::new("servo", "P2").unwrap()));
    assert!(!rt.store().contains(&Identity::new("arm", "P3").unwrap()));
    assert!(rt.routes().is_empty());
    assert!(rt.routes().default_route().is_none());
    assert!(rt.connections().is_empty());

    let released: Vec<_> = received(&mut rt, "ui")
        .into_iter()
        .filter(|r| r["method"] == "onReleased")
        .map(|r| r["value"].as_str().unwrap().to_string())
        .collect();
    assert!(released.contains(&"servo@P2".to_string()));
    assert!(released.contains(&"arm@P3".to_string()));

    assert!(!rt.remove_connection("P2"));
}

#[test]
fn test_late_close_of_replaced_socket_is_ignored() {
    let (mut rt, _inbox) = runtime("P1");
    let (old_uuid, mut old) = open_socket(&mut rt, "P2", Direction::Outbound);
    receive(
        &mut rt,
        "P2",
        Message::new("runtime@P1", "register", vec![json!(record("servo", "P2"))]).with_sender("runtime@P2"),
    );

    // P2 dials back while our own link is still up
    let (live_uuid, mut live) = open_socket(&mut rt, "P2", Direction::Inbound);
    assert_eq!(rt.connections().descriptor("P2").unwrap().uuid, live_uuid);
    frames(&mut old);
    assert_eq!(old.try_recv(), Err(TryRecvError::Disconnected));

    close(&mut rt, "P2", &old_uuid);

    assert!(rt.connections().contains("P2"));
    assert!(rt.store().contains(&Identity::new("servo", "P2").unwrap()));
    assert_eq!(rt.routes().get("P2").unwrap().gateway_id, "P2");

    rt.dispatch(Message::new("servo@P2", "move", vec![json!(5)]));
    assert_eq!(methods(&frames(&mut live)), vec!["move"]);

    close(&mut rt, "P2", &live_uuid);
    assert!(!rt.connections().contains("P2"));
    assert!(!rt.store().contains(&Identity::new("servo", "P2").unwrap()));
    assert!(rt.routes().get("P2").is_none());
}
