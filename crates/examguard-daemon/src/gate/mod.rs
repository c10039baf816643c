//! Fullscreen/focus enforcement gate.
//!
//! A request-scoped check invoked for routes that require an
//! undisturbed session (fetching or saving progress, submitting
//! answers). The client attaches a fullscreen status signal to each
//! guarded request; the gate turns a disengaged signal into a
//! `fullscreen_exit` violation and blocks the request, with a
//! structured notice the candidate can act on.
//!
//! The check is stateless about future signals: a violating request
//! is logged once even if fullscreen is re-engaged a moment later.
//!
//! # Failure Semantics
//!
//! The gate fails open. Any internal fault while looking up the
//! session or recording the violation is logged and the request
//! proceeds: a proctoring false negative is preferred to denying a
//! legitimate exam-taker access because of an internal fault. Every
//! other write path in the engine propagates store faults.

use std::sync::Arc;

use examguard_core::ledger::LedgerError;
use examguard_core::session::SessionState;
use examguard_core::store::IntegrityStore;
use examguard_core::violation::{Severity, ViolationContext, ViolationType};
use examguard_core::ViolationLedger;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Client-supplied fullscreen status attached to a guarded request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullscreenSignal {
    /// Whether fullscreen is currently engaged.
    pub engaged: bool,
    /// When the client sampled the signal, ms since the Unix epoch.
    pub reported_at_ms: u64,
}

/// Structured payload returned with a blocked request.
///
/// Never a generic opaque error: the exam-taker must understand why
/// an action was blocked and how close the session is to
/// termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateNotice {
    /// Post-increment total violation count for the session.
    pub violation_count: u32,
    /// Count at which questions lock.
    pub warning_threshold: u32,
    /// Count at which the session terminates.
    pub termination_threshold: u32,
    /// Whether the session is now terminated.
    pub terminated: bool,
}

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Continue to the underlying route handler.
    Proceed,
    /// Block the request; the session remains `in_progress`.
    Rejected(GateNotice),
    /// Block the request; the violation terminated the session.
    Terminated(GateNotice),
}

impl GateDecision {
    /// Whether the request may continue to the route handler.
    #[must_use]
    pub const fn allowed(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// Request-scoped fullscreen enforcement.
#[derive(Clone)]
pub struct FullscreenGate {
    store: Arc<dyn IntegrityStore>,
    ledger: ViolationLedger,
}

impl FullscreenGate {
    /// Creates a gate over the given store and ledger.
    #[must_use]
    pub fn new(store: Arc<dyn IntegrityStore>, ledger: ViolationLedger) -> Self {
        Self { store, ledger }
    }

    /// Checks one guarded request.
    ///
    /// No `in_progress` session for (user, exam) means the gate is
    /// irrelevant and the request proceeds. An engaged signal
    /// proceeds. A disengaged signal records a `fullscreen_exit` at
    /// `high` severity and blocks the request with a notice.
    /// Internal faults are logged and the request proceeds.
    pub fn check(
        &self,
        user_id: &str,
        exam_id: &str,
        signal: &FullscreenSignal,
    ) -> GateDecision {
        let session = match self.store.find_open_session(user_id, exam_id) {
            Ok(Some(session)) if session.state == SessionState::InProgress => session,
            Ok(_) => return GateDecision::Proceed,
            Err(err) => {
                warn!(user_id, exam_id, error = %err, "gate session lookup failed, failing open");
                return GateDecision::Proceed;
            },
        };

        if signal.engaged {
            return GateDecision::Proceed;
        }

        debug!(
            session_id = %session.session_id,
            reported_at_ms = signal.reported_at_ms,
            "fullscreen disengaged on guarded request"
        );
        let context = ViolationContext::gate_detected("fullscreen disengaged during guarded request");
        match self.ledger.record(
            &session.session_id,
            ViolationType::FullscreenExit,
            Severity::High,
            context,
        ) {
            Ok(outcome) => {
                let notice = GateNotice {
                    violation_count: outcome.total_count,
                    warning_threshold: self.ledger.policy().warning_threshold,
                    termination_threshold: self.ledger.policy().termination_threshold,
                    terminated: outcome.terminated,
                };
                if outcome.terminated {
                    GateDecision::Terminated(notice)
                } else {
                    GateDecision::Rejected(notice)
                }
            },
            // The session closed between lookup and record; the gate
            // is irrelevant outside active sessions.
            Err(LedgerError::SessionNotActive { .. }) => GateDecision::Proceed,
            Err(err) => {
                warn!(
                    session_id = %session.session_id,
                    error = %err,
                    "gate violation record failed, failing open"
                );
                GateDecision::Proceed
            },
        }
    }
}
