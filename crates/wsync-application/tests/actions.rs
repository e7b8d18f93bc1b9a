mod support;

use support::{Harness, message, session, text_part};
use wsync_application::NoticeLevel;
use wsync_core::remote::NewSession;
use wsync_core::{DirectoryEvent, SyncEvent};

async fn loaded(h: &Harness, roots: i64) -> wsync_application::StoreLease {
    for i in 1..=roots {
        h.remote
            .add_session(session("/a", &format!("ses_{i:02}"), None, i));
    }
    let lease = h.sync.child("/a", false).await;
    h.sync.loader().load_sessions("/a").await.unwrap();
    lease
}

#[tokio::test]
async fn test_archive_missing_session_is_not_found() {
    let mut h = Harness::with_defaults();
    let _lease = loaded(&h, 2).await;

    let err = h
        .sync
        .actions()
        .archive("/a", "ses_missing")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    let notice = h.notices.try_recv().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.title, "Failed to archive session");
}

#[tokio::test]
async fn test_archive_removes_session_and_caches() {
    let h = Harness::with_defaults();
    let lease = loaded(&h, 4).await;
    h.sync
        .dispatch(DirectoryEvent::new(
            "/a",
            SyncEvent::MessageUpdated {
                info: message("ses_03", "msg_1"),
            },
        ))
        .await;
    assert_eq!(lease.read(|s| s.session_total), 4);

    let archived = h.sync.actions().archive("/a", "ses_03").await.unwrap();

    assert!(archived.is_archived());
    let store = lease.snapshot();
    assert!(store.session("ses_03").is_none());
    assert!(!store.messages.contains_key("ses_03"));
    assert_eq!(store.session_total, 3);
}

#[tokio::test]
async fn test_create_counts_new_root() {
    let h = Harness::with_defaults();
    let lease = loaded(&h, 2).await;

    let created = h
        .sync
        .actions()
        .create(
            "/a",
            NewSession {
                parent_id: None,
                title: Some("fresh".to_string()),
            },
        )
        .await
        .unwrap();

    // The server event that follows changes nothing.
    h.sync
        .dispatch(DirectoryEvent::new(
            "/a",
            SyncEvent::SessionCreated {
                info: created.clone(),
            },
        ))
        .await;

    let store = lease.snapshot();
    assert_eq!(store.session(&created.id).map(|s| s.title.as_str()), Some("fresh"));
    assert_eq!(store.session_total, 3);
}

#[tokio::test]
async fn test_set_title_and_share_update_store() {
    let h = Harness::with_defaults();
    let lease = loaded(&h, 1).await;
    let actions = h.sync.actions();

    actions.set_title("/a", "ses_01", "renamed").await.unwrap();
    let shared = actions.share("/a", "ses_01").await.unwrap();

    let stored = lease.read(|s| s.session("ses_01").cloned()).unwrap();
    assert_eq!(stored.title, "renamed");
    assert_eq!(stored.share, shared.share);
    assert!(stored.share.is_some());
}

#[tokio::test]
async fn test_optimistic_message_is_superseded_by_server() {
    let h = Harness::with_defaults();
    let lease = loaded(&h, 1).await;
    let actions = h.sync.actions();

    actions
        .optimistic_add(
            "/a",
            "ses_01",
            message("ses_01", "msg_1"),
            vec![text_part("ses_01", "msg_1", "prt_1", "draft")],
        )
        .unwrap();
    assert_eq!(lease.read(|s| s.messages_of("ses_01").len()), 1);

    let mut confirmed = message("ses_01", "msg_1");
    confirmed.agent = Some("build".to_string());
    h.sync
        .dispatch(DirectoryEvent::new(
            "/a",
            SyncEvent::MessageUpdated {
                info: confirmed.clone(),
            },
        ))
        .await;

    let store = lease.snapshot();
    assert_eq!(store.messages_of("ses_01"), std::slice::from_ref(&confirmed));
    assert_eq!(
        store.part("msg_1", "prt_1").and_then(|p| p.text()),
        Some("draft")
    );
}

#[tokio::test]
async fn test_optimistic_rollback_clears_parts() {
    let h = Harness::with_defaults();
    let lease = loaded(&h, 1).await;
    let actions = h.sync.actions();
    actions
        .optimistic_add(
            "/a",
            "ses_01",
            message("ses_01", "msg_1"),
            vec![text_part("ses_01", "msg_1", "prt_1", "draft")],
        )
        .unwrap();

    actions.optimistic_remove("/a", "ses_01", "msg_1").unwrap();

    let store = lease.snapshot();
    assert!(store.messages_of("ses_01").is_empty());
    assert!(store.parts_of("msg_1").is_empty());
}
