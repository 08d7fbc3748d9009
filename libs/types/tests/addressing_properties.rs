//! Addressing Property Tests
//!
//! Properties of the `name@processId` scheme that must hold for any input.

use proptest::prelude::*;
use types::{callback_topic_name, full_name, split_id, split_name, Identity, NotifyList};

fn bare_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_.-]{0,24}"
}

fn process_id() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9_-]{0,16}"
}

proptest! {
    /// Property: a bare name is promoted with the local id
    #[test]
    fn bare_names_get_local_id(name in bare_name(), local in process_id()) {
        prop_assert_eq!(full_name(&name, &local), format!("{}@{}", name, local));
    }

    /// Property: a qualified name is left untouched
    #[test]
    fn qualified_names_unchanged(name in bare_name(), id in process_id(), local in process_id()) {
        let qualified = format!("{}@{}", name, id);
        prop_assert_eq!(full_name(&qualified, &local), qualified);
    }

    /// Property: splitting recovers both halves, even when the name holds '@'
    #[test]
    fn split_uses_last_separator(prefix in bare_name(), name in bare_name(), id in process_id()) {
        let address = format!("{}@{}@{}", prefix, name, id);
        prop_assert_eq!(split_id(&address), Some(id.as_str()));
        let expected_name = format!("{}@{}", prefix, name);
        prop_assert_eq!(split_name(&address), expected_name.as_str());
    }

    /// Property: parse and display are inverse for valid identities
    #[test]
    fn identity_display_roundtrip(name in bare_name(), id in process_id()) {
        let identity = Identity::new(name.clone(), id.clone()).unwrap();
        let reparsed = Identity::parse(&identity.to_string()).unwrap();
        prop_assert_eq!(reparsed.name(), name.as_str());
        prop_assert_eq!(reparsed.id(), id.as_str());
    }

    /// Property: subscribing twice leaves one entry
    #[test]
    fn add_listener_idempotent(method in bare_name(), subscriber in bare_name(), local in process_id()) {
        let callback = full_name(&subscriber, &local);
        let mut list = NotifyList::new();
        list.add(&method, &callback, None);
        list.add(&method, &callback, None);
        list.add(&method, &callback, Some(&callback_topic_name(&method)));
        prop_assert_eq!(list.listeners(&method).len(), 1);
    }
}
