//! Session lifecycle error types.

use thiserror::Error;

use crate::store::StoreError;

/// Errors from session lifecycle operations.
///
/// Already-final observations are deliberately not errors: retried
/// network calls and duplicate violation reports must not surface
/// idempotent no-ops as failures. They are returned as
/// [`super::TransitionOutcome::AlreadyFinal`] values instead.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No eligible `in_progress` session exists.
    #[error("no active session: {session_id}")]
    SessionNotActive {
        /// The session id (or pair description) that was looked up.
        session_id: String,
    },

    /// Session not found for the given id.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The session id that was not found.
        session_id: String,
    },

    /// The session is in a state the operation does not apply to
    /// (e.g. beginning a session that was never created as pending).
    #[error("invalid transition for {session_id}: session is {from_state}")]
    InvalidTransition {
        /// The session id.
        session_id: String,
        /// The observed state name.
        from_state: String,
    },

    /// Durable store fault.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
