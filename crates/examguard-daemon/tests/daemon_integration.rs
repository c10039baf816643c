//! End-to-end daemon tests: configuration to wire response.
//!
//! Drives the daemon the way the route layer does, with JSON wire
//! messages, against a durable `SQLite` store:
//!
//! 1. Build `DaemonState` from TOML configuration.
//! 2. Start a session, report violations, watch escalation.
//! 3. Run guarded requests through the fullscreen gate.
//! 4. Confirm the terminated session survives a daemon restart.

use examguard_daemon::{
    CallerIdentity, DaemonState, FullscreenSignal, FullscreenStatusRequest, GateDecision,
    ReportViolationRequest, ReportViolationResponse,
};
use examguard_core::config::EngineConfig;
use examguard_core::session::SessionState;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn report_json(exam_id: &str, violation_type: &str) -> ReportViolationRequest {
    serde_json::from_value(serde_json::json!({
        "examId": exam_id,
        "type": violation_type,
        "severity": "medium",
    }))
    .unwrap()
}

#[test]
fn test_escalation_over_the_wire() {
    init_tracing();
    let state = DaemonState::new(EngineConfig::default()).unwrap();
    let dispatcher = state.dispatcher();
    let identity = CallerIdentity::candidate("candidate-1");
    let session = dispatcher.machine().start("candidate-1", "final-exam").unwrap();

    let mut last: Option<ReportViolationResponse> = None;
    for _ in 0..3 {
        last = Some(
            dispatcher
                .report_violation(&identity, &report_json("final-exam", "tab_switch"))
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert_eq!(last.action_taken, "exam_terminated");
    assert!(last.exam_terminated);

    let summary = dispatcher.machine().summary(&session.session_id).unwrap();
    assert_eq!(summary.status, SessionState::Terminated);

    // A fourth report finds no active session: 404-class, stable code.
    let err = dispatcher
        .report_violation(&identity, &report_json("final-exam", "tab_switch"))
        .unwrap_err();
    assert_eq!(err.code(), "SESSION_NOT_ACTIVE");
    assert_eq!(err.status_class(), 404);
}

#[test]
fn test_gate_guards_requests_until_reengaged() {
    init_tracing();
    let state = DaemonState::new(EngineConfig::default()).unwrap();
    let dispatcher = state.dispatcher();
    let identity = CallerIdentity::candidate("candidate-1");
    dispatcher.machine().start("candidate-1", "final-exam").unwrap();

    let disengaged = FullscreenSignal {
        engaged: false,
        reported_at_ms: 1_000_000,
    };
    let decision = dispatcher.check_fullscreen(&identity, "final-exam", &disengaged);
    let GateDecision::Rejected(notice) = decision else {
        panic!("expected rejection, got {decision:?}");
    };
    assert_eq!(notice.violation_count, 1);
    assert!(!notice.terminated);

    let engaged = FullscreenSignal {
        engaged: true,
        reported_at_ms: 1_000_500,
    };
    assert!(dispatcher
        .check_fullscreen(&identity, "final-exam", &engaged)
        .allowed());

    let status = dispatcher
        .fullscreen_status(
            &identity,
            &FullscreenStatusRequest {
                exam_id: "final-exam".to_string(),
            },
        )
        .unwrap();
    assert_eq!(status.total_violations, 1);
}

#[test]
fn test_termination_survives_daemon_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let toml = format!(
        "[store]\nbackend = \"sqlite\"\npath = \"{}\"\n",
        dir.path().join("integrity.db").display()
    );
    let identity = CallerIdentity::candidate("candidate-1");

    let session_id = {
        let state = DaemonState::new(EngineConfig::from_toml(&toml).unwrap()).unwrap();
        let dispatcher = state.dispatcher();
        let session = dispatcher.machine().start("candidate-1", "final-exam").unwrap();
        dispatcher
            .report_violation(&identity, &report_json("final-exam", "virtual_machine"))
            .unwrap();
        session.session_id
    };

    let state = DaemonState::new(EngineConfig::from_toml(&toml).unwrap()).unwrap();
    let summary = state.dispatcher().machine().summary(&session_id).unwrap();
    assert_eq!(summary.status, SessionState::Terminated);
    assert!(summary.auto_submission_reason.is_some());

    // The next attempt starts clean.
    let fresh = state.dispatcher().machine().start("candidate-1", "final-exam").unwrap();
    assert_ne!(fresh.session_id, session_id);
    assert_eq!(fresh.attempt, 2);
}
