//! Append-only violation ledger.
//!
//! The ledger is the single entry point for violation events, from
//! client reports and from the enforcement gate alike, and the only
//! writer of session integrity counters. Recording a violation:
//!
//! 1. Looks up the session; anything but `in_progress` is
//!    [`LedgerError::SessionNotActive`] — violations cannot be
//!    recorded against a closed session.
//! 2. Counts prior violations in the trailing window to feed the
//!    scoring engine.
//! 3. Computes the risk score (pure, reproducible from the stored
//!    fields).
//! 4. Persists the immutable event.
//! 5. Atomically increments the session counters; the store returns
//!    the post-increment count, so concurrent callers each see a
//!    unique, strictly increasing count.
//! 6. Maps that unique count (and the immediate-action predicate)
//!    through the escalation policy table; on `exam_terminated` the
//!    session machine's idempotent `terminate` runs as part of the
//!    same logical operation, and only the winning transition logs
//!    the triggering cause.
//!
//! Store faults on these audit-critical writes are retried once with
//! no backoff and then propagated — a termination is never silently
//! lost.


use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::IntegrityConfig;
use crate::risk::{self, RecommendedAction};
use crate::session::{SessionError, SessionMachine, SessionState};
use crate::store::{IntegrityStore, StoreError};
use crate::violation::{Severity, ViolationContext, ViolationEvent, ViolationType};

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No eligible `in_progress` session for the violation.
    #[error("no active session: {session_id}")]
    SessionNotActive {
        /// The session that was looked up.
        session_id: String,
    },

    /// Durable store fault (after the single retry).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Session machine fault while escalating.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result of recording one violation.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// The persisted immutable event.
    pub violation: ViolationEvent,

    /// Prior violations in the trailing window at ingestion.
    pub prior_count_in_window: u32,

    /// Post-increment total violation count for the session.
    pub total_count: u32,

    /// The escalation policy's response.
    pub action: RecommendedAction,

    /// Whether this record call terminated the session (either by
    /// performing the transition or by observing a concurrent
    /// terminal transition).
    pub terminated: bool,
}

/// Rolling violation counts for one session, for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityStatus {
    /// Total violations recorded against the session.
    pub total_violations: u32,
    /// Violations within the trailing window.
    pub recent_violations: u32,
    /// Count at which questions lock.
    pub warning_threshold: u32,
    /// Count at which the session terminates.
    pub termination_threshold: u32,
}

/// Records violation events and drives escalation.
#[derive(Clone)]
pub struct ViolationLedger {
    store: Arc<dyn IntegrityStore>,
    machine: SessionMachine,
    clock: Arc<dyn Clock>,
    policy: IntegrityConfig,
}

impl ViolationLedger {
    /// Creates a ledger over the given store, machine, and policy.
    #[must_use]
    pub fn new(
        store: Arc<dyn IntegrityStore>,
        machine: SessionMachine,
        clock: Arc<dyn Clock>,
        policy: IntegrityConfig,
    ) -> Self {
        Self {
            store,
            machine,
            clock,
            policy,
        }
    }

    /// The escalation policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &IntegrityConfig {
        &self.policy
    }

    /// Records a violation against an active session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::SessionNotActive`] when the session is
    /// missing or not `in_progress` (no event row is created), or a
    /// store fault after the single retry.
    pub fn record(
        &self,
        session_id: &str,
        violation_type: ViolationType,
        severity: Severity,
        context: ViolationContext,
    ) -> Result<RecordOutcome, LedgerError> {
        let session = self
            .store
            .get_session(session_id)?
            .filter(|s| s.state == SessionState::InProgress)
            .ok_or_else(|| LedgerError::SessionNotActive {
                session_id: session_id.to_string(),
            })?;

        let now = self.clock.now_ms();
        let since = now.saturating_sub(self.policy.window_ms());
        let prior = with_retry(|| self.store.count_violations_since(session_id, since))?;

        let window_minutes = self.policy.window_ms() as f64 / 60_000.0;
        let frequency_per_minute = f64::from(prior) / window_minutes;
        let score = risk::score(violation_type, severity, prior, frequency_per_minute);
        let immediate = risk::requires_immediate_action(violation_type, severity, score);

        let event = ViolationEvent {
            violation_id: Uuid::new_v4().to_string(),
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            exam_id: session.exam_id.clone(),
            violation_type,
            severity,
            timestamp_ms: now,
            elapsed_into_exam_ms: now.saturating_sub(session.started_at_ms.unwrap_or(now)),
            question_ref: context.question_ref,
            description: context.description,
            source: context.source,
            risk_score: score,
            is_repeated: prior > 0,
            prior_count_in_window: prior,
        };
        with_retry(|| self.store.append_violation(&event))?;

        // The unique post-increment count drives the escalation
        // decision; two racing calls cannot both observe the
        // threshold crossing.
        let total_count = with_retry(|| {
            self.store
                .increment_violation_counters(session_id, severity, now)
        })?
        .ok_or_else(|| LedgerError::SessionNotActive {
            session_id: session_id.to_string(),
        })?;

        let action = risk::recommended_action(
            total_count,
            immediate,
            self.policy.warning_threshold,
            self.policy.termination_threshold,
        );

        let mut terminated = false;
        if action == RecommendedAction::ExamTerminated {
            let reason = if immediate {
                format!("critical integrity violation: {violation_type}")
            } else {
                format!(
                    "integrity violation threshold exceeded: {violation_type} ({total_count} violations)"
                )
            };
            let outcome = self.machine.terminate(session_id, &reason)?;
            if outcome.applied() {
                info!(
                    session_id,
                    violation_type = violation_type.as_str(),
                    risk_score = score,
                    total_count,
                    "session terminated by integrity escalation"
                );
            }
            terminated = true;
        }

        Ok(RecordOutcome {
            violation: event,
            prior_count_in_window: prior,
            total_count,
            action,
            terminated,
        })
    }

    /// Rolling counts and thresholds for one session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::SessionNotActive`] for unknown
    /// sessions, or a store fault.
    pub fn status(&self, session_id: &str) -> Result<IntegrityStatus, LedgerError> {
        let session =
            self.store
                .get_session(session_id)?
                .ok_or_else(|| LedgerError::SessionNotActive {
                    session_id: session_id.to_string(),
                })?;

        let since = self.clock.now_ms().saturating_sub(self.policy.window_ms());
        let recent = self.store.count_violations_since(session_id, since)?;
        Ok(IntegrityStatus {
            total_violations: session.violation_count,
            recent_violations: recent,
            warning_threshold: self.policy.warning_threshold,
            termination_threshold: self.policy.termination_threshold,
        })
    }

    /// Lists recorded violations for a session, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub fn history(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<ViolationEvent>, LedgerError> {
        Ok(self.store.violations_for_session(session_id, limit)?)
    }
}

/// Retries a store operation exactly once, with no blocking backoff.
fn with_retry<T>(mut op: impl FnMut() -> Result<T, StoreError>) -> Result<T, StoreError> {
    match op() {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!(error = %first, "store operation failed, retrying once");
            op()
        },
    }
}
