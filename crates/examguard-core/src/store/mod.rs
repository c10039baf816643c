//! Pluggable durable store for sessions, violations, and bindings.
//!
//! The store is the only shared mutable resource in the engine and is
//! passed as an explicit dependency to every component; there is no
//! module-level singleton and no availability probing inside request
//! paths. Two implementations are selected at startup:
//!
//! - [`SqliteStore`]: `SQLite` with WAL mode for durable deployments.
//! - [`MemoryStore`]: in-process maps for tests and single-process
//!   deployments.
//!
//! # Atomicity Contract
//!
//! [`IntegrityStore::increment_violation_counters`] is a single
//! atomic find-and-increment that returns the *post-increment* total
//! violation count, and only succeeds while the session is
//! `in_progress`. Each racing caller therefore observes a unique,
//! strictly increasing count, which is what makes the ledger's
//! termination decision single-winner.
//! [`IntegrityStore::finish_session`] is a conditional update
//! (only-if-`in_progress`); a rejected write is observed as `None`
//! and mapped to an idempotent already-final outcome by the session
//! machine.

mod memory;
mod sqlite;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::fingerprint::FingerprintBinding;
use crate::session::{ExamSession, SessionState};
use crate::violation::{Severity, ViolationEvent};

/// Errors from durable store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store is unreachable or timed out.
    #[error("store unavailable: {detail}")]
    Unavailable {
        /// What failed.
        detail: String,
    },

    /// A uniqueness constraint rejected the write (e.g. a second
    /// `in_progress` session for the same (user, exam) pair).
    #[error("conflict: {detail}")]
    Conflict {
        /// Which constraint rejected the write.
        detail: String,
    },

    /// A stored row failed to decode into its domain type.
    #[error("corrupt row: {detail}")]
    Corrupt {
        /// What failed to decode.
        detail: String,
    },
}

/// Durable store operations required by the integrity engine.
pub trait IntegrityStore: Send + Sync {
    /// Inserts a new session row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the session id already
    /// exists or the single-active invariant would be violated.
    fn insert_session(&self, session: &ExamSession) -> Result<(), StoreError>;

    /// Fetches a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn get_session(&self, session_id: &str) -> Result<Option<ExamSession>, StoreError>;

    /// Finds the non-terminal (`pending` or `in_progress`) session
    /// for a (user, exam) pair, preferring `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn find_open_session(
        &self,
        user_id: &str,
        exam_id: &str,
    ) -> Result<Option<ExamSession>, StoreError>;

    /// Counts all attempts for a (user, exam) pair.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn count_sessions(&self, user_id: &str, exam_id: &str) -> Result<u32, StoreError>;

    /// Conditionally starts a `pending` session. Returns the updated
    /// row, or `None` when the session is missing or not `pending`.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn start_pending_session(
        &self,
        session_id: &str,
        started_at_ms: u64,
    ) -> Result<Option<ExamSession>, StoreError>;

    /// Conditionally closes an `in_progress` session: sets the
    /// terminal state, end time, elapsed time, and (for engine-driven
    /// closures) the recorded reason. Returns the updated row, or
    /// `None` when the session is missing or not `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn finish_session(
        &self,
        session_id: &str,
        state: SessionState,
        ended_at_ms: u64,
        reason: Option<&str>,
    ) -> Result<Option<ExamSession>, StoreError>;

    /// Appends an immutable violation event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on a duplicate violation id.
    fn append_violation(&self, event: &ViolationEvent) -> Result<(), StoreError>;

    /// Counts violations for a session at or after `since_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn count_violations_since(&self, session_id: &str, since_ms: u64) -> Result<u32, StoreError>;

    /// Lists violations for a session, newest first, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn violations_for_session(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<ViolationEvent>, StoreError>;

    /// Atomic find-and-increment of the session integrity counters.
    ///
    /// Increments the total count and the per-severity count, bumps
    /// the last-violation timestamp, and returns the post-increment
    /// total — all in one store-level operation, and only while the
    /// session is `in_progress`. Returns `None` when the session is
    /// missing or no longer `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn increment_violation_counters(
        &self,
        session_id: &str,
        severity: Severity,
        at_ms: u64,
    ) -> Result<Option<u32>, StoreError>;

    /// Fetches the current (non-superseded) binding for a user.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn get_binding(&self, user_id: &str) -> Result<Option<FingerprintBinding>, StoreError>;

    /// Inserts a first-contact binding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a current binding
    /// already exists for the user.
    fn insert_binding(&self, binding: &FingerprintBinding) -> Result<(), StoreError>;

    /// Bumps the last-seen time on the current binding.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn touch_binding(&self, user_id: &str, last_seen_ms: u64) -> Result<(), StoreError>;

    /// Marks the current binding superseded and installs the
    /// replacement as the new current binding. The old row is kept.
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    fn supersede_binding(
        &self,
        user_id: &str,
        replacement: &FingerprintBinding,
    ) -> Result<(), StoreError>;
}
