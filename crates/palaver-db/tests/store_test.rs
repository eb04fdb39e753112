use std::sync::Arc;
use std::thread;

use palaver_db::queries::DEFAULT_CHAT_NAME;
use palaver_db::{Store, StoreError};

fn store_with_users(users: &[&str]) -> Store {
    let store = Store::open_in_memory().unwrap();
    for user in users {
        store
            .register(user, &format!("{user} nick"), "pw")
            .unwrap();
    }
    store
}

#[test]
fn register_duplicate_keyword_is_conflict() {
    let store = Store::open_in_memory().unwrap();

    store.register("alice", "Alice", "pw1").unwrap();
    let err = store.register("alice", "Other", "pw2").unwrap_err();
    assert!(matches!(err, StoreError::Conflict));

    // The losing attempt must not have touched the row.
    let user = store.authenticate("alice", "pw1").unwrap();
    assert_eq!(user.nickname, "Alice");
}

#[test]
fn register_joins_default_chat_without_duplicating_it() {
    let store = store_with_users(&["alice", "bob"]);

    let alice_chats = store.chats_of("alice").unwrap();
    let bob_chats = store.chats_of("bob").unwrap();
    assert_eq!(alice_chats.len(), 1);
    assert_eq!(alice_chats[0].name, DEFAULT_CHAT_NAME);
    // Both registrations resolved to the same lazily created chat.
    assert_eq!(alice_chats[0].id, bob_chats[0].id);

    let members = store.members_of(&alice_chats[0].id).unwrap();
    assert_eq!(members.len(), 2);
}

#[test]
fn authenticate_rejects_bad_credentials() {
    let store = store_with_users(&["alice"]);

    assert!(matches!(
        store.authenticate("alice", "wrong").unwrap_err(),
        StoreError::Unauthorized
    ));
    assert!(matches!(
        store.authenticate("nobody", "pw").unwrap_err(),
        StoreError::Unauthorized
    ));

    let user = store.authenticate("alice", "pw").unwrap();
    assert_eq!(user.nickname, "alice nick");
}

#[test]
fn create_chat_with_unknown_member_writes_nothing() {
    let store = store_with_users(&["alice"]);

    let err = store
        .create_chat("Team", &["alice".into(), "ghost".into()])
        .unwrap_err();
    match err {
        StoreError::InvalidMember(unknown) => assert_eq!(unknown, vec!["ghost".to_string()]),
        other => panic!("expected InvalidMember, got {other:?}"),
    }

    // Only the default chat remains on alice's list.
    assert_eq!(store.chats_of("alice").unwrap().len(), 1);
}

#[test]
fn add_members_is_idempotent_and_atomic() {
    let store = store_with_users(&["alice", "bob", "carol"]);
    let chat_id = store.create_chat("Team", &["alice".into()]).unwrap();

    store
        .add_members(&chat_id, &["bob".into(), "bob".into()])
        .unwrap();
    assert_eq!(store.members_of(&chat_id).unwrap().len(), 2);

    // One unknown keyword rejects the whole batch.
    let err = store
        .add_members(&chat_id, &["carol".into(), "ghost".into()])
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidMember(_)));
    assert!(!store.members_of(&chat_id).unwrap().contains("carol"));
}

#[test]
fn remove_member_and_empty_chat_persists() {
    let store = store_with_users(&["alice", "bob"]);
    let chat_id = store
        .create_chat("Team", &["alice".into(), "bob".into()])
        .unwrap();

    store.remove_member(&chat_id, "alice").unwrap();
    store.remove_member(&chat_id, "bob").unwrap();

    // Empty chats are not auto-removed; deletion is the only cleanup.
    assert!(store.members_of(&chat_id).unwrap().is_empty());
    store.append_message(&chat_id, "alice", "still here").unwrap();
    assert_eq!(store.messages_of(&chat_id).unwrap().len(), 1);
}

#[test]
fn delete_chat_cascades_to_members_and_messages() {
    let store = store_with_users(&["alice", "bob"]);
    let chat_id = store
        .create_chat("Team", &["alice".into(), "bob".into()])
        .unwrap();
    store.append_message(&chat_id, "alice", "one").unwrap();
    store.append_message(&chat_id, "bob", "two").unwrap();

    store.delete_chat(&chat_id).unwrap();

    assert!(store.members_of(&chat_id).unwrap().is_empty());
    assert!(store.messages_of(&chat_id).unwrap().is_empty());
    assert_eq!(store.chats_of("alice").unwrap().len(), 1); // default chat only
}

#[test]
fn message_ids_are_monotonic_and_ordered() {
    let store = store_with_users(&["alice"]);
    let chat_id = store.create_chat("Team", &["alice".into()]).unwrap();

    let mut last_id = 0;
    for i in 0..10 {
        let id = store
            .append_message(&chat_id, "alice", &format!("m{i}"))
            .unwrap();
        assert!(id > last_id);
        last_id = id;
    }

    let contents: Vec<String> = store
        .messages_of(&chat_id)
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
    assert_eq!(contents, expected);
}

#[test]
fn concurrent_senders_keep_per_sender_order() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    for user in ["a", "b", "c", "d"] {
        store.register(user, user, "pw").unwrap();
    }
    let chat_id = store
        .create_chat("Busy", &["a".into(), "b".into(), "c".into(), "d".into()])
        .unwrap();

    let handles: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|sender| {
            let store = store.clone();
            let chat_id = chat_id.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    store
                        .append_message(&chat_id, sender, &format!("{sender}-{i}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let messages = store.messages_of(&chat_id).unwrap();
    assert_eq!(messages.len(), 100);

    // Whatever the interleaving, each sender's messages come back in the
    // order that sender appended them.
    for sender in ["a", "b", "c", "d"] {
        let seq: Vec<String> = messages
            .iter()
            .filter(|m| m.sender == sender)
            .map(|m| m.content.clone())
            .collect();
        let expected: Vec<String> = (0..25).map(|i| format!("{sender}-{i}")).collect();
        assert_eq!(seq, expected);
    }
}
