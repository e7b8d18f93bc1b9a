//! Speculative local mutations applied before the server acknowledges them.
//!
//! These go through the same sorted upsert/delete paths as the reducer, so
//! the authoritative event for the same id later replaces (or no-ops
//! against) the optimistic entry without any reconciliation pass.

use crate::model::{Message, Part};
use crate::reducer;
use crate::sorted;
use crate::store::{DirectoryStore, StoreChange};

/// Inserts `message` and replaces its parts.
pub fn add(
    store: &mut DirectoryStore,
    session_id: &str,
    mut message: Message,
    parts: Vec<Part>,
) -> Vec<StoreChange> {
    message.session_id = session_id.to_string();
    let message_id = message.id.clone();
    let mut changes = reducer::upsert_message(store, message).changes;

    let mut ordered = Vec::with_capacity(parts.len());
    for mut part in parts {
        part.message_id = message_id.clone();
        part.session_id = session_id.to_string();
        sorted::upsert(&mut ordered, part);
    }
    let parts_changed = if ordered.is_empty() {
        store.drop_parts(&message_id)
    } else if store.parts.get(&message_id) == Some(&ordered) {
        false
    } else {
        store.parts.insert(message_id.clone(), ordered);
        true
    };
    if parts_changed {
        changes.push(StoreChange::Parts { message_id });
    }
    changes
}

/// Removes a speculative message and its parts.
pub fn remove(store: &mut DirectoryStore, session_id: &str, message_id: &str) -> Vec<StoreChange> {
    reducer::remove_message(store, session_id, message_id).changes
}
