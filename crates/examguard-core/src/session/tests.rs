//! Session state machine tests.

use std::sync::Arc;

use super::*;
use crate::clock::ManualClock;
use crate::store::{IntegrityStore, MemoryStore};

fn machine() -> (SessionMachine, Arc<ManualClock>) {
    let store: Arc<dyn IntegrityStore> = Arc::new(MemoryStore::new());
    let clock = ManualClock::at(1_000_000);
    (SessionMachine::new(store, clock.clone()), clock)
}

#[test]
fn test_start_creates_in_progress_attempt() {
    let (machine, _clock) = machine();
    let session = machine.start("user-1", "exam-1").unwrap();
    assert_eq!(session.state, SessionState::InProgress);
    assert_eq!(session.attempt, 1);
    assert_eq!(session.started_at_ms, Some(1_000_000));
    assert!(session.ended_at_ms.is_none());
}

#[test]
fn test_start_resumes_existing_active_session() {
    let (machine, _clock) = machine();
    let first = machine.start("user-1", "exam-1").unwrap();
    let second = machine.start("user-1", "exam-1").unwrap();
    assert_eq!(first.session_id, second.session_id);
}

#[test]
fn test_new_attempt_after_terminal_session() {
    let (machine, _clock) = machine();
    let first = machine.start("user-1", "exam-1").unwrap();
    machine.submit(&first.session_id).unwrap();
    let second = machine.start("user-1", "exam-1").unwrap();
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(second.attempt, 2);
}

#[test]
fn test_pending_session_begins_on_start() {
    let (machine, _clock) = machine();
    let pending = machine.create_pending("user-1", "exam-1").unwrap();
    assert_eq!(pending.state, SessionState::Pending);
    assert!(pending.started_at_ms.is_none());

    let started = machine.start("user-1", "exam-1").unwrap();
    assert_eq!(started.session_id, pending.session_id);
    assert_eq!(started.state, SessionState::InProgress);
    assert!(started.started_at_ms.is_some());
}

#[test]
fn test_submit_sets_end_time_and_elapsed() {
    let (machine, clock) = machine();
    let session = machine.start("user-1", "exam-1").unwrap();
    clock.advance(90_000);
    let outcome = machine.submit(&session.session_id).unwrap();
    assert!(outcome.applied());
    let closed = outcome.session();
    assert_eq!(closed.state, SessionState::Submitted);
    assert_eq!(closed.ended_at_ms, Some(1_090_000));
    assert_eq!(closed.elapsed_ms, 90_000);
}

#[test]
fn test_terminate_is_idempotent() {
    let (machine, _clock) = machine();
    let session = machine.start("user-1", "exam-1").unwrap();

    let first = machine.terminate(&session.session_id, "integrity escalation").unwrap();
    assert!(first.applied());
    assert_eq!(first.session().state, SessionState::Terminated);
    assert_eq!(
        first.session().auto_submission_reason.as_deref(),
        Some("integrity escalation")
    );

    // Second call observes the final state and performs no writes:
    // the record comes back unchanged, original reason intact.
    let second = machine.terminate(&session.session_id, "different reason").unwrap();
    assert!(!second.applied());
    assert_eq!(second.session(), first.session());
}

#[test]
fn test_finalize_and_terminate_race_has_one_winner() {
    let (machine, _clock) = machine();
    let session = machine.start("user-1", "exam-1").unwrap();

    let finalized = machine.finalize(&session.session_id, "time limit expired").unwrap();
    assert!(finalized.applied());
    assert_eq!(finalized.session().state, SessionState::AutoSubmitted);

    // The late terminator loses, observes the final record, and is
    // treated as success.
    let terminated = machine.terminate(&session.session_id, "violation escalation").unwrap();
    assert!(!terminated.applied());
    assert_eq!(terminated.session().state, SessionState::AutoSubmitted);
    assert_eq!(
        terminated.session().auto_submission_reason.as_deref(),
        Some("time limit expired")
    );
}

#[test]
fn test_terminal_states_are_absorbing() {
    let (machine, _clock) = machine();
    let session = machine.start("user-1", "exam-1").unwrap();
    machine.cancel(&session.session_id).unwrap();

    for outcome in [
        machine.submit(&session.session_id).unwrap(),
        machine.complete(&session.session_id).unwrap(),
        machine.finalize(&session.session_id, "expiry").unwrap(),
        machine.terminate(&session.session_id, "escalation").unwrap(),
    ] {
        assert!(!outcome.applied());
        assert_eq!(outcome.session().state, SessionState::Cancelled);
    }
}

#[test]
fn test_unknown_session_is_not_found() {
    let (machine, _clock) = machine();
    let err = machine.terminate("missing", "reason").unwrap_err();
    assert!(matches!(err, SessionError::SessionNotFound { .. }));
}

#[test]
fn test_finalizing_pending_session_is_invalid() {
    let (machine, _clock) = machine();
    let pending = machine.create_pending("user-1", "exam-1").unwrap();
    let err = machine.submit(&pending.session_id).unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
}

#[test]
fn test_summary_projection() {
    let (machine, _clock) = machine();
    let session = machine.start("user-1", "exam-1").unwrap();
    machine.finalize(&session.session_id, "time limit expired").unwrap();

    let summary = machine.summary(&session.session_id).unwrap();
    assert_eq!(summary.status, SessionState::AutoSubmitted);
    assert!(summary.auto_submitted);
    assert_eq!(
        summary.auto_submission_reason.as_deref(),
        Some("time limit expired")
    );
}

#[test]
fn test_concurrent_starts_share_one_session() {
    let store: Arc<dyn IntegrityStore> = Arc::new(MemoryStore::new());
    let clock = ManualClock::at(1_000_000);
    let machine = SessionMachine::new(store, clock);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let machine = machine.clone();
            std::thread::spawn(move || machine.start("user-1", "exam-1").unwrap())
        })
        .collect();

    let sessions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let first_id = &sessions[0].session_id;
    assert!(sessions.iter().all(|s| &s.session_id == first_id));
    assert!(sessions.iter().all(|s| s.state == SessionState::InProgress));
}
