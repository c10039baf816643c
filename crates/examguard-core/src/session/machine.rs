//! Exam session state machine.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::error::SessionError;
use super::state::{ExamSession, SessionState, SessionSummary};
use crate::clock::Clock;
use crate::store::{IntegrityStore, StoreError};

/// Result of a terminal-transition attempt.
///
/// Terminal states are absorbing, so losing a race to another
/// finalizer is success, not failure: callers branch on the variant
/// without exception-driven control flow.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// This call performed the transition.
    Applied(ExamSession),
    /// The session was already final; no write was performed and the
    /// existing record is returned unchanged.
    AlreadyFinal(ExamSession),
}

impl TransitionOutcome {
    /// The session record after the attempt.
    #[must_use]
    pub const fn session(&self) -> &ExamSession {
        match self {
            Self::Applied(s) | Self::AlreadyFinal(s) => s,
        }
    }

    /// Whether this call performed the write.
    #[must_use]
    pub const fn applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// The exclusive owner of `ExamSession.state` transitions.
///
/// All terminal transitions go through a conditional store update
/// (transition only if the current state is `in_progress`), so a race
/// between time-expiry finalization and violation-driven termination
/// resolves to exactly one winner; the loser observes the final
/// record and treats it as success.
#[derive(Clone)]
pub struct SessionMachine {
    store: Arc<dyn IntegrityStore>,
    clock: Arc<dyn Clock>,
}

impl SessionMachine {
    /// Creates a machine over the given store and clock.
    #[must_use]
    pub fn new(store: Arc<dyn IntegrityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Starts (or resumes) the exam attempt for a (user, exam) pair.
    ///
    /// If a non-terminal session already exists for the pair it is
    /// resumed: an `in_progress` session is returned unchanged and a
    /// `pending` one is started. Otherwise a new attempt is created
    /// directly in `in_progress`. The store's partial unique index
    /// guarantees at most one `in_progress` session per pair even
    /// when two start requests race; the loser resumes the winner's
    /// session.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    pub fn start(&self, user_id: &str, exam_id: &str) -> Result<ExamSession, SessionError> {
        if let Some(open) = self.store.find_open_session(user_id, exam_id)? {
            return match open.state {
                SessionState::InProgress => Ok(open),
                _ => self.begin(&open.session_id),
            };
        }

        let attempt = self.store.count_sessions(user_id, exam_id)? + 1;
        let session = ExamSession::new(
            Uuid::new_v4().to_string(),
            exam_id,
            user_id,
            attempt,
            SessionState::InProgress,
            Some(self.clock.now_ms()),
        );

        match self.store.insert_session(&session) {
            Ok(()) => {
                info!(
                    session_id = %session.session_id,
                    user_id,
                    exam_id,
                    attempt,
                    "exam session started"
                );
                Ok(session)
            },
            // Lost a start race: another request created the active
            // session between our lookup and insert. Resume it.
            Err(StoreError::Conflict { .. }) => self
                .store
                .find_open_session(user_id, exam_id)?
                .ok_or(SessionError::SessionNotActive {
                    session_id: format!("{user_id}/{exam_id}"),
                }),
            Err(err) => Err(err.into()),
        }
    }

    /// Creates a pre-scheduled attempt without starting it.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    pub fn create_pending(&self, user_id: &str, exam_id: &str) -> Result<ExamSession, SessionError> {
        let attempt = self.store.count_sessions(user_id, exam_id)? + 1;
        let session = ExamSession::new(
            Uuid::new_v4().to_string(),
            exam_id,
            user_id,
            attempt,
            SessionState::Pending,
            None,
        );
        self.store.insert_session(&session)?;
        debug!(session_id = %session.session_id, user_id, exam_id, "pending session created");
        Ok(session)
    }

    /// Starts a `pending` session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown ids and
    /// `InvalidTransition` when the session is not `pending` and not
    /// already `in_progress` (an already-started session is returned
    /// unchanged, idempotently).
    pub fn begin(&self, session_id: &str) -> Result<ExamSession, SessionError> {
        if let Some(started) = self
            .store
            .start_pending_session(session_id, self.clock.now_ms())?
        {
            info!(session_id, "exam session started");
            return Ok(started);
        }

        let existing =
            self.store
                .get_session(session_id)?
                .ok_or_else(|| SessionError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;
        match existing.state {
            SessionState::InProgress => Ok(existing),
            other => Err(SessionError::InvalidTransition {
                session_id: session_id.to_string(),
                from_state: other.as_str().to_string(),
            }),
        }
    }

    /// Explicit, validated submission: `in_progress -> submitted`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a store fault.
    pub fn submit(&self, session_id: &str) -> Result<TransitionOutcome, SessionError> {
        self.finish(session_id, SessionState::Submitted, None)
    }

    /// Marks a graded submission complete: `in_progress -> completed`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a store fault.
    pub fn complete(&self, session_id: &str) -> Result<TransitionOutcome, SessionError> {
        self.finish(session_id, SessionState::Completed, None)
    }

    /// Time-limit expiry path, driven by the external scheduler:
    /// `in_progress -> auto_submitted`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a store fault.
    pub fn finalize(
        &self,
        session_id: &str,
        reason: &str,
    ) -> Result<TransitionOutcome, SessionError> {
        self.finish(session_id, SessionState::AutoSubmitted, Some(reason))
    }

    /// Integrity-driven termination: `in_progress -> terminated`.
    ///
    /// Safe to call multiple times: the second call observes the
    /// already-final state and returns the existing record unchanged
    /// with no additional writes.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a store fault. A store fault here
    /// is always propagated so no termination is silently lost.
    pub fn terminate(
        &self,
        session_id: &str,
        reason: &str,
    ) -> Result<TransitionOutcome, SessionError> {
        self.finish(session_id, SessionState::Terminated, Some(reason))
    }

    /// Administrative cancellation: `in_progress -> cancelled`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a store fault.
    pub fn cancel(&self, session_id: &str) -> Result<TransitionOutcome, SessionError> {
        self.finish(session_id, SessionState::Cancelled, None)
    }

    /// Read-only projection for reporting collaborators.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a store fault.
    pub fn summary(&self, session_id: &str) -> Result<SessionSummary, SessionError> {
        let session =
            self.store
                .get_session(session_id)?
                .ok_or_else(|| SessionError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;
        Ok(session.summary())
    }

    /// Conditional terminal transition shared by all finalizers.
    fn finish(
        &self,
        session_id: &str,
        state: SessionState,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, SessionError> {
        debug_assert!(state.is_terminal());

        let now = self.clock.now_ms();
        if let Some(updated) = self.store.finish_session(session_id, state, now, reason)? {
            info!(
                session_id,
                state = state.as_str(),
                reason = reason.unwrap_or("-"),
                violation_count = updated.violation_count,
                "exam session closed"
            );
            return Ok(TransitionOutcome::Applied(updated));
        }

        // The conditional update matched no in_progress row: either
        // the session is already final (idempotent success) or it
        // never left pending / does not exist.
        let existing =
            self.store
                .get_session(session_id)?
                .ok_or_else(|| SessionError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;
        if existing.state.is_terminal() {
            Ok(TransitionOutcome::AlreadyFinal(existing))
        } else {
            Err(SessionError::InvalidTransition {
                session_id: session_id.to_string(),
                from_state: existing.state.as_str().to_string(),
            })
        }
    }
}
