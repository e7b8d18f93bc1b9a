//! Session window trimming and total estimation.

use std::collections::HashSet;
use std::time::Duration;

use crate::model::Session;
use crate::sorted;

/// How many roots a trimmed window keeps.
#[derive(Debug, Clone, Copy)]
pub struct WindowPolicy {
    /// Most recently updated roots always kept
    pub limit: usize,
    /// Roots updated within this span are kept beyond `limit`...
    pub recent_window: Duration,
    /// ...up to this many extra roots
    pub recent_limit: usize,
    /// Current time in milliseconds since the UNIX epoch
    pub now_ms: i64,
}

/// Root-session total after a listing.
///
/// `reported` is the server's exact count when it provides one. Otherwise,
/// when the server filled the requested `limit`, more roots may exist and
/// the returned value is a lower bound.
pub fn estimate_session_total(count: usize, limit: Option<usize>, reported: Option<usize>) -> usize {
    if let Some(total) = reported {
        return total.max(count);
    }
    match limit {
        Some(limit) if count >= limit => count + 1,
        _ => count,
    }
}

/// Merges a fresh root listing with the child sessions already resident.
/// Fetched entries win over resident ones with the same id.
pub fn merge_with_children(fetched: Vec<Session>, existing: &[Session]) -> Vec<Session> {
    let mut merged = Vec::with_capacity(fetched.len() + existing.len());
    for session in existing.iter().filter(|s| !s.is_root()) {
        sorted::upsert(&mut merged, session.clone());
    }
    for session in fetched {
        sorted::upsert(&mut merged, session);
    }
    merged
}

/// Trims `sessions` to the window: archived sessions go, the `limit` most
/// recently updated roots stay, recently active roots stay up to
/// `recent_limit`, and children stay when their parent stays.
///
/// The result is sorted by id.
pub fn trim_sessions(sessions: Vec<Session>, policy: WindowPolicy) -> Vec<Session> {
    let live: Vec<Session> = sessions.into_iter().filter(|s| !s.is_archived()).collect();

    let mut roots: Vec<&Session> = live.iter().filter(|s| s.is_root()).collect();
    roots.sort_by(|a, b| {
        b.time
            .updated
            .cmp(&a.time.updated)
            .then_with(|| b.id.cmp(&a.id))
    });

    let recent_ms = i64::try_from(policy.recent_window.as_millis()).unwrap_or(i64::MAX);
    let mut kept: HashSet<&str> = roots
        .iter()
        .take(policy.limit)
        .map(|s| s.id.as_str())
        .collect();
    kept.extend(
        roots
            .iter()
            .skip(policy.limit)
            .filter(|s| policy.now_ms.saturating_sub(s.time.updated) <= recent_ms)
            .take(policy.recent_limit)
            .map(|s| s.id.as_str()),
    );

    // Children may nest several levels deep; grow until stable.
    loop {
        let before = kept.len();
        for session in &live {
            if let Some(parent) = session.parent_id.as_deref()
                && kept.contains(parent)
            {
                kept.insert(session.id.as_str());
            }
        }
        if kept.len() == before {
            break;
        }
    }

    let kept: HashSet<String> = kept.into_iter().map(str::to_string).collect();
    let mut trimmed = Vec::with_capacity(kept.len());
    for session in live {
        if kept.contains(&session.id) {
            sorted::upsert(&mut trimmed, session);
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionTime;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn session(id: &str, parent: Option<&str>, updated: i64) -> Session {
        Session {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            title: String::new(),
            directory: "/work/api".to_string(),
            time: SessionTime {
                created: updated,
                updated,
                archived: None,
            },
            permission: Vec::new(),
            share: None,
        }
    }

    fn policy(limit: usize, now_ms: i64) -> WindowPolicy {
        WindowPolicy {
            limit,
            recent_window: Duration::from_secs(4 * 60 * 60),
            recent_limit: 50,
            now_ms,
        }
    }

    fn ids(sessions: &[Session]) -> Vec<&str> {
        sessions.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_estimate_total() {
        assert_eq!(estimate_session_total(3, Some(5), None), 3);
        assert_eq!(estimate_session_total(5, Some(5), None), 6);
        assert_eq!(estimate_session_total(5, None, None), 5);
        assert_eq!(estimate_session_total(5, Some(5), Some(42)), 42);
    }

    #[test]
    fn test_trim_keeps_most_recent_roots_and_their_children() {
        let now = 100 * HOUR_MS;
        let sessions = vec![
            session("ses_a", None, 1),
            session("ses_b", None, 3),
            session("ses_c", None, 2),
            session("ses_d", Some("ses_b"), 1),
            session("ses_e", Some("ses_a"), 1),
            session("ses_f", Some("ses_d"), 1),
        ];

        let trimmed = trim_sessions(sessions, policy(2, now));

        assert_eq!(ids(&trimmed), vec!["ses_b", "ses_c", "ses_d", "ses_f"]);
    }

    #[test]
    fn test_trim_retains_recently_active_roots() {
        let now = 100 * HOUR_MS;
        let sessions = vec![
            session("ses_a", None, now - HOUR_MS),
            session("ses_b", None, now - 2 * HOUR_MS),
            session("ses_c", None, now - 10 * HOUR_MS),
        ];

        let trimmed = trim_sessions(sessions, policy(1, now));

        assert_eq!(ids(&trimmed), vec!["ses_a", "ses_b"]);
    }

    #[test]
    fn test_trim_drops_archived() {
        let mut gone = session("ses_a", None, 5);
        gone.time.archived = Some(6);
        let trimmed = trim_sessions(vec![gone, session("ses_b", None, 1)], policy(5, 10));
        assert_eq!(ids(&trimmed), vec!["ses_b"]);
    }

    #[test]
    fn test_merge_keeps_resident_children() {
        let existing = vec![
            session("ses_a", None, 1),
            session("ses_z", Some("ses_b"), 1),
        ];
        let fetched = vec![session("ses_b", None, 2)];

        let merged = merge_with_children(fetched, &existing);

        assert_eq!(ids(&merged), vec!["ses_b", "ses_z"]);
    }
}
