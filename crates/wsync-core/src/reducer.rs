//! Event-sourced reducer.
//!
//! `apply` routes one [`SyncEvent`] to the minimal slice of a
//! [`DirectoryStore`] and reports which sub-paths changed. Every path except
//! `message.part.delta` without a sequence number is idempotent: applying
//! the same event twice leaves the store as applying it once.
//!
//! Side effects (refetches, refreshes, durable writes) are returned as an
//! [`Effect`] for the caller to perform; the reducer itself never does I/O.

use crate::event::SyncEvent;
use crate::model::{Message, Part, PermissionRequest, QuestionRequest, Session, VcsInfo};
use crate::sorted::{self, Identified};
use crate::store::{DirectoryStore, GlobalStore, StoreChange};

/// Work the caller must perform after a reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Re-bootstrap the named directory (backing instance was disposed).
    RefreshDirectory(String),
    /// Re-bootstrap every resident directory and the global state.
    RefreshAll,
    /// LSP status changed server-side; fetch it.
    RefetchLsp,
    /// A durable field changed; write the side-cache record.
    PersistDurable,
}

/// What one event did to a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reduction {
    pub changes: Vec<StoreChange>,
    pub effect: Option<Effect>,
}

impl Reduction {
    fn changed(changes: Vec<StoreChange>) -> Self {
        Self {
            changes,
            effect: None,
        }
    }

    fn effect(effect: Effect) -> Self {
        Self {
            changes: Vec::new(),
            effect: Some(effect),
        }
    }

    fn unchanged() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty() && self.effect.is_none()
    }
}

/// Applies a directory-scoped event to `store`.
pub fn apply(store: &mut DirectoryStore, event: &SyncEvent) -> Reduction {
    match event {
        SyncEvent::SessionCreated { info } => upsert_session(store, info, true),
        SyncEvent::SessionUpdated { info } => upsert_session(store, info, false),
        SyncEvent::SessionDeleted { info } => remove_session(store, &info.id, info.is_root()),
        SyncEvent::SessionDiff { session_id, diff } => {
            if store.session_diff.get(session_id) == Some(diff) {
                return Reduction::unchanged();
            }
            store.session_diff.insert(session_id.clone(), diff.clone());
            Reduction::changed(vec![StoreChange::Diff {
                session_id: session_id.clone(),
            }])
        }
        SyncEvent::SessionStatusUpdated { session_id, status } => {
            if store.session_status.get(session_id) == Some(status) {
                return Reduction::unchanged();
            }
            store
                .session_status
                .insert(session_id.clone(), status.clone());
            Reduction::changed(vec![StoreChange::Status {
                session_id: session_id.clone(),
            }])
        }
        SyncEvent::TodoUpdated { session_id, todos } => {
            if store.todo.get(session_id) == Some(todos) {
                return Reduction::unchanged();
            }
            store.todo.insert(session_id.clone(), todos.clone());
            Reduction::changed(vec![StoreChange::Todo {
                session_id: session_id.clone(),
            }])
        }
        SyncEvent::MessageUpdated { info } => upsert_message(store, info.clone()),
        SyncEvent::MessageRemoved {
            session_id,
            message_id,
        } => remove_message(store, session_id, message_id),
        SyncEvent::MessagePartUpdated { part } => upsert_part(store, part.clone()),
        SyncEvent::MessagePartRemoved {
            message_id,
            part_id,
            ..
        } => remove_part(store, message_id, part_id),
        SyncEvent::MessagePartDelta {
            message_id,
            part_id,
            field,
            delta,
            seq,
            ..
        } => append_delta(store, message_id, part_id, field, delta, *seq),
        SyncEvent::PermissionAsked(request) => upsert_permission(store, request.clone()),
        SyncEvent::PermissionReplied {
            session_id,
            request_id,
        } => remove_permission(store, session_id, request_id),
        SyncEvent::QuestionAsked(request) => upsert_question(store, request.clone()),
        SyncEvent::QuestionReplied {
            session_id,
            request_id,
        }
        | SyncEvent::QuestionRejected {
            session_id,
            request_id,
        } => remove_question(store, session_id, request_id),
        SyncEvent::VcsBranchUpdated { branch } => {
            let current = store.vcs.as_ref().and_then(|v| v.branch.as_ref());
            if current == branch.as_ref() {
                return Reduction::unchanged();
            }
            store.vcs = Some(VcsInfo {
                branch: branch.clone(),
            });
            Reduction {
                changes: vec![StoreChange::Vcs],
                effect: Some(Effect::PersistDurable),
            }
        }
        SyncEvent::LspUpdated => Reduction::effect(Effect::RefetchLsp),
        SyncEvent::ServerInstanceDisposed { directory } => {
            Reduction::effect(Effect::RefreshDirectory(directory.clone()))
        }
        SyncEvent::ProjectUpdated(_) | SyncEvent::GlobalDisposed => Reduction::unchanged(),
    }
}

/// Applies a global-scope event. Returns true when the project list changed.
pub fn apply_global(global: &mut GlobalStore, event: &SyncEvent) -> (bool, Option<Effect>) {
    match event {
        SyncEvent::ProjectUpdated(project) => {
            (global.upsert_project(project.clone()).changed(), None)
        }
        SyncEvent::GlobalDisposed => (false, Some(Effect::RefreshAll)),
        _ => (false, None),
    }
}

fn upsert_session(store: &mut DirectoryStore, info: &Session, created: bool) -> Reduction {
    if info.is_archived() {
        return remove_session(store, &info.id, info.is_root());
    }

    let outcome = sorted::upsert(&mut store.sessions, info.clone());
    let mut changes = Vec::new();
    if outcome.changed() {
        changes.push(StoreChange::Sessions);
    }
    // Only creations count; an update for a session outside the window was
    // already counted when the total was computed.
    if created && outcome.inserted() && info.is_root() {
        store.session_total += 1;
        changes.push(StoreChange::SessionTotal);
    }
    Reduction::changed(changes)
}

fn remove_session(store: &mut DirectoryStore, session_id: &str, is_root: bool) -> Reduction {
    let removed = sorted::remove(&mut store.sessions, session_id).is_some();
    let mut changes = store.purge_session(session_id);
    if removed {
        changes.push(StoreChange::Sessions);
        if is_root && store.session_total > 0 {
            store.session_total -= 1;
            changes.push(StoreChange::SessionTotal);
        }
    }
    Reduction::changed(changes)
}

pub(crate) fn upsert_message(store: &mut DirectoryStore, info: Message) -> Reduction {
    let session_id = info.session_id.clone();
    let messages = store.messages.entry(session_id.clone()).or_default();
    if sorted::upsert(messages, info).changed() {
        Reduction::changed(vec![StoreChange::Messages { session_id }])
    } else {
        Reduction::unchanged()
    }
}

pub(crate) fn remove_message(
    store: &mut DirectoryStore,
    session_id: &str,
    message_id: &str,
) -> Reduction {
    let mut changes = Vec::new();
    if let Some(messages) = store.messages.get_mut(session_id)
        && sorted::remove(messages, message_id).is_some()
    {
        changes.push(StoreChange::Messages {
            session_id: session_id.to_string(),
        });
    }
    if store.drop_parts(message_id) {
        changes.push(StoreChange::Parts {
            message_id: message_id.to_string(),
        });
    }
    Reduction::changed(changes)
}

pub(crate) fn upsert_part(store: &mut DirectoryStore, part: Part) -> Reduction {
    let message_id = part.message_id.clone();
    let parts = store.parts.entry(message_id.clone()).or_default();
    if sorted::upsert(parts, part).changed() {
        Reduction::changed(vec![StoreChange::Parts { message_id }])
    } else {
        Reduction::unchanged()
    }
}

fn remove_part(store: &mut DirectoryStore, message_id: &str, part_id: &str) -> Reduction {
    let Some(parts) = store.parts.get_mut(message_id) else {
        return Reduction::unchanged();
    };
    if sorted::remove(parts, part_id).is_none() {
        return Reduction::unchanged();
    }
    if parts.is_empty() {
        store.parts.remove(message_id);
    }
    store.forget_deltas(part_id);
    Reduction::changed(vec![StoreChange::Parts {
        message_id: message_id.to_string(),
    }])
}

fn append_delta(
    store: &mut DirectoryStore,
    message_id: &str,
    part_id: &str,
    field: &str,
    delta: &str,
    seq: Option<u64>,
) -> Reduction {
    let key = (part_id.to_string(), field.to_string());
    if let Some(seq) = seq
        && store.delta_seq.get(&key).is_some_and(|last| *last >= seq)
    {
        tracing::debug!(part_id, field, seq, "[Reducer] Dropping replayed delta");
        return Reduction::unchanged();
    }

    let Some(part) = store
        .parts
        .get_mut(message_id)
        .and_then(|parts| sorted::find_mut(parts, part_id))
    else {
        tracing::debug!(message_id, part_id, "[Reducer] Delta for unknown part dropped");
        return Reduction::unchanged();
    };
    if !part.append_field(field, delta) {
        tracing::debug!(part_id = part.id(), field, "[Reducer] Delta for unknown field dropped");
        return Reduction::unchanged();
    }
    if let Some(seq) = seq {
        store.delta_seq.insert(key, seq);
    }
    Reduction::changed(vec![StoreChange::Parts {
        message_id: message_id.to_string(),
    }])
}

fn upsert_permission(store: &mut DirectoryStore, request: PermissionRequest) -> Reduction {
    let session_id = request.session_id.clone();
    let pending = store.permission.entry(session_id.clone()).or_default();
    if sorted::upsert(pending, request).changed() {
        Reduction::changed(vec![StoreChange::Permission { session_id }])
    } else {
        Reduction::unchanged()
    }
}

fn remove_permission(store: &mut DirectoryStore, session_id: &str, request_id: &str) -> Reduction {
    let Some(pending) = store.permission.get_mut(session_id) else {
        return Reduction::unchanged();
    };
    if sorted::remove(pending, request_id).is_none() {
        return Reduction::unchanged();
    }
    if pending.is_empty() {
        store.permission.remove(session_id);
    }
    Reduction::changed(vec![StoreChange::Permission {
        session_id: session_id.to_string(),
    }])
}

fn upsert_question(store: &mut DirectoryStore, request: QuestionRequest) -> Reduction {
    let session_id = request.session_id.clone();
    let pending = store.question.entry(session_id.clone()).or_default();
    if sorted::upsert(pending, request).changed() {
        Reduction::changed(vec![StoreChange::Question { session_id }])
    } else {
        Reduction::unchanged()
    }
}

fn remove_question(store: &mut DirectoryStore, session_id: &str, request_id: &str) -> Reduction {
    let Some(pending) = store.question.get_mut(session_id) else {
        return Reduction::unchanged();
    };
    if sorted::remove(pending, request_id).is_none() {
        return Reduction::unchanged();
    }
    if pending.is_empty() {
        store.question.remove(session_id);
    }
    Reduction::changed(vec![StoreChange::Question {
        session_id: session_id.to_string(),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        DirectoryCache, FileDiff, MessageRole, MessageTime, PartKind, Project, SessionStatus,
        SessionTime, Todo, TodoStatus,
    };

    fn store() -> DirectoryStore {
        DirectoryStore::new("/work/api", 5, DirectoryCache::default())
    }

    fn session(id: &str, parent: Option<&str>) -> Session {
        Session {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            title: format!("Session {id}"),
            directory: "/work/api".to_string(),
            time: SessionTime {
                created: 1,
                updated: 1,
                archived: None,
            },
            permission: Vec::new(),
            share: None,
        }
    }

    fn archived(mut session: Session) -> Session {
        session.time.archived = Some(100);
        session
    }

    fn message(id: &str, session_id: &str) -> Message {
        Message {
            id: id.to_string(),
            session_id: session_id.to_string(),
            role: MessageRole::Assistant,
            time: MessageTime {
                created: 1,
                completed: None,
            },
            agent: Some("build".to_string()),
            model: None,
            error: None,
        }
    }

    fn text_part(id: &str, message_id: &str, text: &str) -> Part {
        Part {
            id: id.to_string(),
            session_id: "ses_1".to_string(),
            message_id: message_id.to_string(),
            kind: PartKind::Text {
                text: text.to_string(),
                synthetic: false,
            },
        }
    }

    fn delta(part_id: &str, text: &str, seq: Option<u64>) -> SyncEvent {
        SyncEvent::MessagePartDelta {
            session_id: "ses_1".to_string(),
            message_id: "msg_1".to_string(),
            part_id: part_id.to_string(),
            field: "text".to_string(),
            delta: text.to_string(),
            seq,
        }
    }

    fn session_ids(store: &DirectoryStore) -> Vec<&str> {
        store.sessions.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_session_events_keep_sorted_unique() {
        let mut store = store();
        for id in ["ses_c", "ses_a", "ses_d", "ses_a", "ses_b", "ses_c"] {
            apply(
                &mut store,
                &SyncEvent::SessionCreated {
                    info: session(id, None),
                },
            );
            apply(
                &mut store,
                &SyncEvent::SessionUpdated {
                    info: session(id, None),
                },
            );
        }
        assert_eq!(session_ids(&store), vec!["ses_a", "ses_b", "ses_c", "ses_d"]);
        assert_eq!(store.session_total, 4);
    }

    #[test]
    fn test_child_creation_does_not_count() {
        let mut store = store();
        apply(
            &mut store,
            &SyncEvent::SessionCreated {
                info: session("ses_1", None),
            },
        );
        apply(
            &mut store,
            &SyncEvent::SessionCreated {
                info: session("ses_2", Some("ses_1")),
            },
        );
        assert_eq!(store.sessions.len(), 2);
        assert_eq!(store.session_total, 1);
    }

    #[test]
    fn test_archive_root_cascades_and_decrements() {
        let mut store = store();
        for id in ["ses_1", "ses_2", "ses_3", "ses_4", "ses_5"] {
            store.sessions.push(session(id, None));
        }
        store.session_total = 5;
        store
            .messages
            .insert("ses_1".to_string(), vec![message("msg_1", "ses_1")]);
        store.parts.insert(
            "msg_1".to_string(),
            vec![text_part("prt_1", "msg_1", "hello")],
        );
        store.session_diff.insert(
            "ses_1".to_string(),
            vec![FileDiff {
                file: "src/lib.rs".to_string(),
                before: String::new(),
                after: "fn main() {}".to_string(),
                additions: 1,
                deletions: 0,
            }],
        );
        store.todo.insert(
            "ses_1".to_string(),
            vec![Todo {
                id: "t1".to_string(),
                content: "write tests".to_string(),
                status: TodoStatus::Pending,
                priority: "high".to_string(),
            }],
        );
        store
            .session_status
            .insert("ses_1".to_string(), SessionStatus::Busy);
        apply(
            &mut store,
            &SyncEvent::PermissionAsked(PermissionRequest {
                id: "per_1".to_string(),
                session_id: "ses_1".to_string(),
                permission: "edit".to_string(),
                patterns: vec!["*".to_string()],
                metadata: serde_json::Value::Null,
            }),
        );
        apply(
            &mut store,
            &SyncEvent::QuestionAsked(QuestionRequest {
                id: "que_1".to_string(),
                session_id: "ses_1".to_string(),
                questions: Vec::new(),
            }),
        );

        let reduction = apply(
            &mut store,
            &SyncEvent::SessionUpdated {
                info: archived(session("ses_1", None)),
            },
        );

        assert!(store.session("ses_1").is_none());
        assert_eq!(store.session_total, 4);
        assert!(!store.messages.contains_key("ses_1"));
        assert!(!store.parts.contains_key("msg_1"));
        assert!(!store.session_diff.contains_key("ses_1"));
        assert!(!store.todo.contains_key("ses_1"));
        assert!(!store.session_status.contains_key("ses_1"));
        assert!(!store.permission.contains_key("ses_1"));
        assert!(!store.question.contains_key("ses_1"));
        assert!(reduction.changes.contains(&StoreChange::SessionTotal));
    }

    #[test]
    fn test_archive_child_keeps_total() {
        let mut store = store();
        store.sessions.push(session("ses_1", None));
        store.sessions.push(session("ses_2", Some("ses_1")));
        store.session_total = 1;

        apply(
            &mut store,
            &SyncEvent::SessionUpdated {
                info: archived(session("ses_2", Some("ses_1"))),
            },
        );

        assert_eq!(session_ids(&store), vec!["ses_1"]);
        assert_eq!(store.session_total, 1);
    }

    #[test]
    fn test_events_are_idempotent() {
        let events = vec![
            SyncEvent::SessionCreated {
                info: session("ses_1", None),
            },
            SyncEvent::SessionCreated {
                info: session("ses_1_child", Some("ses_1")),
            },
            SyncEvent::SessionUpdated {
                info: session("ses_1", None),
            },
            SyncEvent::SessionDeleted {
                info: session("ses_1", None),
            },
            SyncEvent::SessionUpdated {
                info: archived(session("ses_1", None)),
            },
            SyncEvent::MessageUpdated {
                info: message("msg_2", "ses_1"),
            },
            SyncEvent::MessageRemoved {
                session_id: "ses_1".to_string(),
                message_id: "msg_1".to_string(),
            },
            SyncEvent::MessagePartUpdated {
                part: text_part("prt_2", "msg_1", "x"),
            },
            SyncEvent::MessagePartRemoved {
                session_id: "ses_1".to_string(),
                message_id: "msg_1".to_string(),
                part_id: "prt_1".to_string(),
            },
            SyncEvent::MessagePartDelta {
                session_id: "ses_1".to_string(),
                message_id: "msg_1".to_string(),
                part_id: "prt_1".to_string(),
                field: "text".to_string(),
                delta: "!".to_string(),
                seq: Some(1),
            },
            SyncEvent::SessionStatusUpdated {
                session_id: "ses_1".to_string(),
                status: SessionStatus::Idle,
            },
            SyncEvent::TodoUpdated {
                session_id: "ses_1".to_string(),
                todos: Vec::new(),
            },
            SyncEvent::SessionDiff {
                session_id: "ses_1".to_string(),
                diff: Vec::new(),
            },
            SyncEvent::PermissionAsked(PermissionRequest {
                id: "per_2".to_string(),
                session_id: "ses_1".to_string(),
                permission: "bash".to_string(),
                patterns: vec!["cargo *".to_string()],
                metadata: serde_json::Value::Null,
            }),
            SyncEvent::QuestionAsked(QuestionRequest {
                id: "que_2".to_string(),
                session_id: "ses_1".to_string(),
                questions: Vec::new(),
            }),
            SyncEvent::PermissionReplied {
                session_id: "ses_1".to_string(),
                request_id: "per_1".to_string(),
            },
            SyncEvent::QuestionRejected {
                session_id: "ses_1".to_string(),
                request_id: "que_1".to_string(),
            },
            SyncEvent::VcsBranchUpdated {
                branch: Some("feature".to_string()),
            },
        ];

        for event in events {
            let mut seeded = store();
            seeded.sessions.push(session("ses_1", None));
            seeded.session_total = 1;
            seeded
                .messages
                .insert("ses_1".to_string(), vec![message("msg_1", "ses_1")]);
            seeded
                .parts
                .insert("msg_1".to_string(), vec![text_part("prt_1", "msg_1", "ab")]);

            let mut once = seeded.clone();
            apply(&mut once, &event);
            let mut twice = seeded;
            apply(&mut twice, &event);
            let second = apply(&mut twice, &event);

            assert_eq!(once.sessions, twice.sessions, "{}", event.kind());
            assert_eq!(once.session_total, twice.session_total, "{}", event.kind());
            assert_eq!(once.messages, twice.messages, "{}", event.kind());
            assert_eq!(once.parts, twice.parts, "{}", event.kind());
            assert_eq!(once.vcs, twice.vcs, "{}", event.kind());
            assert_eq!(once.permission, twice.permission, "{}", event.kind());
            assert_eq!(once.question, twice.question, "{}", event.kind());
            assert!(second.changes.is_empty(), "{}", event.kind());
        }
    }

    #[test]
    fn test_delta_appends_and_duplicates_double_append() {
        let mut store = store();
        store
            .parts
            .insert("msg_1".to_string(), vec![text_part("prt_1", "msg_1", "ab")]);

        apply(&mut store, &delta("prt_1", "c", None));
        assert_eq!(store.part("msg_1", "prt_1").and_then(Part::text), Some("abc"));

        apply(&mut store, &delta("prt_1", "c", None));
        assert_eq!(store.part("msg_1", "prt_1").and_then(Part::text), Some("abcc"));
    }

    #[test]
    fn test_sequenced_delta_is_applied_once() {
        let mut store = store();
        store
            .parts
            .insert("msg_1".to_string(), vec![text_part("prt_1", "msg_1", "ab")]);

        apply(&mut store, &delta("prt_1", "c", Some(1)));
        apply(&mut store, &delta("prt_1", "c", Some(1)));
        apply(&mut store, &delta("prt_1", "d", Some(2)));

        assert_eq!(store.part("msg_1", "prt_1").and_then(Part::text), Some("abcd"));
    }

    #[test]
    fn test_delta_for_unknown_part_is_dropped() {
        let mut store = store();
        let reduction = apply(&mut store, &delta("prt_missing", "c", None));
        assert!(reduction.is_noop());
        assert!(store.parts.is_empty());
    }

    #[test]
    fn test_removing_last_part_drops_entry() {
        let mut store = store();
        apply(
            &mut store,
            &SyncEvent::MessagePartUpdated {
                part: text_part("prt_1", "msg_1", "a"),
            },
        );
        apply(
            &mut store,
            &SyncEvent::MessagePartRemoved {
                session_id: "ses_1".to_string(),
                message_id: "msg_1".to_string(),
                part_id: "prt_1".to_string(),
            },
        );
        assert!(!store.parts.contains_key("msg_1"));
    }

    #[test]
    fn test_vcs_update_persists_only_on_change() {
        let mut store = store();
        let event = SyncEvent::VcsBranchUpdated {
            branch: Some("main".to_string()),
        };
        assert_eq!(apply(&mut store, &event).effect, Some(Effect::PersistDurable));
        assert_eq!(apply(&mut store, &event).effect, None);
    }

    #[test]
    fn test_side_effect_events_do_not_mutate() {
        let mut store = store();
        let reduction = apply(
            &mut store,
            &SyncEvent::ServerInstanceDisposed {
                directory: "/work/api".to_string(),
            },
        );
        assert!(reduction.changes.is_empty());
        assert_eq!(
            reduction.effect,
            Some(Effect::RefreshDirectory("/work/api".to_string()))
        );
        assert_eq!(
            apply(&mut store, &SyncEvent::LspUpdated).effect,
            Some(Effect::RefetchLsp)
        );
    }

    #[test]
    fn test_project_update_is_idempotent() {
        let event = SyncEvent::ProjectUpdated(Project {
            id: "p1".to_string(),
            worktree: "/work/p1".to_string(),
            name: Some("one".to_string()),
            vcs: None,
            time: Default::default(),
        });
        let mut once = GlobalStore::default();
        apply_global(&mut once, &event);
        let mut twice = once.clone();

        let (changed, effect) = apply_global(&mut twice, &event);

        assert!(!changed);
        assert_eq!(effect, None);
        assert_eq!(once.projects, twice.projects);
    }

    #[test]
    fn test_project_updates_upsert_globally() {
        let mut global = GlobalStore::default();
        let project = |id: &str, name: &str| Project {
            id: id.to_string(),
            worktree: format!("/work/{id}"),
            name: Some(name.to_string()),
            vcs: Some("git".to_string()),
            time: Default::default(),
        };
        apply_global(&mut global, &SyncEvent::ProjectUpdated(project("p2", "two")));
        apply_global(&mut global, &SyncEvent::ProjectUpdated(project("p1", "one")));
        let (changed, _) =
            apply_global(&mut global, &SyncEvent::ProjectUpdated(project("p1", "uno")));

        assert!(changed);
        let ids: Vec<_> = global.projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(global.projects[0].name.as_deref(), Some("uno"));
        assert_eq!(
            apply_global(&mut global, &SyncEvent::GlobalDisposed).1,
            Some(Effect::RefreshAll)
        );
    }
}
