//! Store contract tests, run against both backends.
//!
//! Every test takes the store through the `IntegrityStore` trait so
//! the memory and `SQLite` implementations stay behaviorally
//! interchangeable.

use super::*;
use crate::fingerprint::FingerprintBinding;
use crate::session::{ExamSession, SessionState};
use crate::violation::{
    DetectionSource, Severity, ViolationContext, ViolationEvent, ViolationType,
};

fn backends() -> Vec<(&'static str, Box<dyn IntegrityStore>)> {
    vec![
        ("memory", Box::new(MemoryStore::new())),
        ("sqlite", Box::new(SqliteStore::in_memory().unwrap())),
    ]
}

fn session(id: &str, state: SessionState) -> ExamSession {
    let started = match state {
        SessionState::Pending => None,
        _ => Some(1_000_000),
    };
    ExamSession::new(id, "exam-1", "user-1", 1, state, started)
}

fn violation(id: &str, session_id: &str, timestamp_ms: u64) -> ViolationEvent {
    let ctx = ViolationContext::default();
    ViolationEvent {
        violation_id: id.to_string(),
        session_id: session_id.to_string(),
        user_id: "user-1".to_string(),
        exam_id: "exam-1".to_string(),
        violation_type: ViolationType::TabSwitch,
        severity: Severity::Medium,
        timestamp_ms,
        elapsed_into_exam_ms: timestamp_ms.saturating_sub(1_000_000),
        question_ref: ctx.question_ref,
        description: ctx.description,
        source: ctx.source,
        risk_score: 15,
        is_repeated: false,
        prior_count_in_window: 0,
    }
}

fn binding(user_id: &str, version: u32, hash: &str) -> FingerprintBinding {
    FingerprintBinding {
        user_id: user_id.to_string(),
        version,
        fingerprint_hash: hash.to_string(),
        bound_session_id: Some("s-1".to_string()),
        first_seen_ms: 1_000_000,
        last_seen_ms: 1_000_000,
        superseded: false,
    }
}

#[test]
fn test_session_round_trip() {
    for (name, store) in backends() {
        let original = session("s-1", SessionState::InProgress);
        store.insert_session(&original).unwrap();
        let loaded = store.get_session("s-1").unwrap().unwrap();
        assert_eq!(loaded, original, "backend: {name}");
        assert!(store.get_session("missing").unwrap().is_none(), "backend: {name}");
    }
}

#[test]
fn test_duplicate_session_id_conflicts() {
    for (name, store) in backends() {
        store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();
        let mut other = session("s-1", SessionState::Pending);
        other.user_id = "user-2".to_string();
        let err = store.insert_session(&other).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }), "backend: {name}");
    }
}

#[test]
fn test_single_active_session_per_user_and_exam() {
    for (name, store) in backends() {
        store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();
        let err = store
            .insert_session(&session("s-2", SessionState::InProgress))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }), "backend: {name}");

        // A terminal sibling does not block a new attempt.
        store
            .finish_session("s-1", SessionState::Submitted, 2_000_000, None)
            .unwrap()
            .unwrap();
        store.insert_session(&session("s-2", SessionState::InProgress)).unwrap();
    }
}

#[test]
fn test_find_open_session_prefers_in_progress() {
    for (name, store) in backends() {
        assert!(
            store.find_open_session("user-1", "exam-1").unwrap().is_none(),
            "backend: {name}"
        );

        store.insert_session(&session("s-1", SessionState::Pending)).unwrap();
        let open = store.find_open_session("user-1", "exam-1").unwrap().unwrap();
        assert_eq!(open.session_id, "s-1", "backend: {name}");

        // Closed sessions are never "open".
        let mut done = session("s-2", SessionState::InProgress);
        done.user_id = "user-2".to_string();
        store.insert_session(&done).unwrap();
        store
            .finish_session("s-2", SessionState::Cancelled, 2_000_000, None)
            .unwrap()
            .unwrap();
        assert!(
            store.find_open_session("user-2", "exam-1").unwrap().is_none(),
            "backend: {name}"
        );
    }
}

#[test]
fn test_count_sessions_counts_all_attempts() {
    for (name, store) in backends() {
        assert_eq!(store.count_sessions("user-1", "exam-1").unwrap(), 0);
        store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();
        store
            .finish_session("s-1", SessionState::Terminated, 2_000_000, Some("escalation"))
            .unwrap()
            .unwrap();
        store.insert_session(&session("s-2", SessionState::InProgress)).unwrap();
        assert_eq!(store.count_sessions("user-1", "exam-1").unwrap(), 2, "backend: {name}");
        assert_eq!(store.count_sessions("user-1", "exam-2").unwrap(), 0, "backend: {name}");
    }
}

#[test]
fn test_start_pending_session_is_conditional() {
    for (name, store) in backends() {
        store.insert_session(&session("s-1", SessionState::Pending)).unwrap();
        let started = store.start_pending_session("s-1", 1_500_000).unwrap().unwrap();
        assert_eq!(started.state, SessionState::InProgress, "backend: {name}");
        assert_eq!(started.started_at_ms, Some(1_500_000), "backend: {name}");

        // Already started and missing both reject without error.
        assert!(store.start_pending_session("s-1", 1_600_000).unwrap().is_none());
        assert!(store.start_pending_session("missing", 1_600_000).unwrap().is_none());
        let unchanged = store.get_session("s-1").unwrap().unwrap();
        assert_eq!(unchanged.started_at_ms, Some(1_500_000), "backend: {name}");
    }
}

#[test]
fn test_finish_session_is_conditional_and_single_winner() {
    for (name, store) in backends() {
        store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();

        let closed = store
            .finish_session("s-1", SessionState::Terminated, 1_090_000, Some("escalation"))
            .unwrap()
            .unwrap();
        assert_eq!(closed.state, SessionState::Terminated, "backend: {name}");
        assert_eq!(closed.ended_at_ms, Some(1_090_000), "backend: {name}");
        assert_eq!(closed.elapsed_ms, 90_000, "backend: {name}");
        assert_eq!(closed.auto_submission_reason.as_deref(), Some("escalation"));

        // The losing finalizer matches no row and changes nothing.
        assert!(store
            .finish_session("s-1", SessionState::AutoSubmitted, 1_100_000, Some("expiry"))
            .unwrap()
            .is_none());
        let unchanged = store.get_session("s-1").unwrap().unwrap();
        assert_eq!(unchanged.state, SessionState::Terminated, "backend: {name}");
        assert_eq!(unchanged.auto_submission_reason.as_deref(), Some("escalation"));
    }
}

#[test]
fn test_violation_append_and_window_queries() {
    for (name, store) in backends() {
        store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();
        store.append_violation(&violation("v-1", "s-1", 1_100_000)).unwrap();
        store.append_violation(&violation("v-2", "s-1", 1_200_000)).unwrap();
        store.append_violation(&violation("v-3", "s-1", 1_300_000)).unwrap();

        assert_eq!(store.count_violations_since("s-1", 0).unwrap(), 3, "backend: {name}");
        assert_eq!(
            store.count_violations_since("s-1", 1_200_000).unwrap(),
            2,
            "backend: {name}"
        );
        assert_eq!(
            store.count_violations_since("s-1", 1_300_001).unwrap(),
            0,
            "backend: {name}"
        );

        let listed = store.violations_for_session("s-1", 2).unwrap();
        assert_eq!(listed.len(), 2, "backend: {name}");
        assert_eq!(listed[0].violation_id, "v-3", "backend: {name}");
        assert_eq!(listed[1].violation_id, "v-2", "backend: {name}");

        let err = store.append_violation(&violation("v-1", "s-1", 1_400_000)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }), "backend: {name}");
    }
}

#[test]
fn test_violation_round_trip_preserves_fields() {
    for (name, store) in backends() {
        store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();
        let mut event = violation("v-1", "s-1", 1_100_000);
        event.violation_type = ViolationType::DeveloperTools;
        event.severity = Severity::Critical;
        event.question_ref = Some("q-3".to_string());
        event.description = Some("devtools opened".to_string());
        event.source = DetectionSource::GateDetected;
        event.risk_score = 80;
        event.is_repeated = true;
        event.prior_count_in_window = 2;

        store.append_violation(&event).unwrap();
        let listed = store.violations_for_session("s-1", 1).unwrap();
        assert_eq!(listed[0], event, "backend: {name}");
    }
}

#[test]
fn test_increment_returns_post_increment_count() {
    for (name, store) in backends() {
        store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();

        let first = store
            .increment_violation_counters("s-1", Severity::Medium, 1_100_000)
            .unwrap();
        assert_eq!(first, Some(1), "backend: {name}");
        let second = store
            .increment_violation_counters("s-1", Severity::High, 1_200_000)
            .unwrap();
        assert_eq!(second, Some(2), "backend: {name}");

        let loaded = store.get_session("s-1").unwrap().unwrap();
        assert_eq!(loaded.violation_count, 2, "backend: {name}");
        assert_eq!(loaded.medium_count, 1, "backend: {name}");
        assert_eq!(loaded.high_count, 1, "backend: {name}");
        assert_eq!(loaded.last_violation_ms, Some(1_200_000), "backend: {name}");
    }
}

#[test]
fn test_increment_rejects_closed_sessions() {
    for (name, store) in backends() {
        store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();
        store
            .finish_session("s-1", SessionState::Submitted, 1_500_000, None)
            .unwrap()
            .unwrap();

        assert!(
            store
                .increment_violation_counters("s-1", Severity::Medium, 1_600_000)
                .unwrap()
                .is_none(),
            "backend: {name}"
        );
        assert!(
            store
                .increment_violation_counters("missing", Severity::Medium, 1_600_000)
                .unwrap()
                .is_none(),
            "backend: {name}"
        );
        let unchanged = store.get_session("s-1").unwrap().unwrap();
        assert_eq!(unchanged.violation_count, 0, "backend: {name}");
    }
}

#[test]
fn test_binding_insert_and_supersede_keeps_history() {
    for (name, store) in backends() {
        assert!(store.get_binding("user-1").unwrap().is_none(), "backend: {name}");

        let first = binding("user-1", 1, "hash-a");
        store.insert_binding(&first).unwrap();
        assert_eq!(store.get_binding("user-1").unwrap().unwrap(), first, "backend: {name}");

        // Only one current binding per user.
        let err = store.insert_binding(&binding("user-1", 2, "hash-b")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }), "backend: {name}");

        let replacement = binding("user-1", 2, "hash-b");
        store.supersede_binding("user-1", &replacement).unwrap();
        let current = store.get_binding("user-1").unwrap().unwrap();
        assert_eq!(current, replacement, "backend: {name}");
    }
}

#[test]
fn test_touch_binding_bumps_last_seen_only() {
    for (name, store) in backends() {
        let first = binding("user-1", 1, "hash-a");
        store.insert_binding(&first).unwrap();
        store.touch_binding("user-1", 2_000_000).unwrap();

        let current = store.get_binding("user-1").unwrap().unwrap();
        assert_eq!(current.last_seen_ms, 2_000_000, "backend: {name}");
        assert_eq!(current.first_seen_ms, first.first_seen_ms, "backend: {name}");
        assert_eq!(current.fingerprint_hash, "hash-a", "backend: {name}");
    }
}

#[test]
fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("examguard.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();
        store.append_violation(&violation("v-1", "s-1", 1_100_000)).unwrap();
        store
            .increment_violation_counters("s-1", Severity::Medium, 1_100_000)
            .unwrap()
            .unwrap();
    }

    let reopened = SqliteStore::open(&path).unwrap();
    let loaded = reopened.get_session("s-1").unwrap().unwrap();
    assert_eq!(loaded.violation_count, 1);
    assert_eq!(reopened.violations_for_session("s-1", 10).unwrap().len(), 1);
}

#[test]
fn test_concurrent_increments_yield_unique_counts() {
    use std::sync::Arc;

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.insert_session(&session("s-1", SessionState::InProgress)).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                store
                    .increment_violation_counters("s-1", Severity::Medium, 1_100_000 + i)
                    .unwrap()
                    .unwrap()
            })
        })
        .collect();

    let mut counts: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    counts.sort_unstable();
    assert_eq!(counts, (1..=16).collect::<Vec<u32>>());
}
