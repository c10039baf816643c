//! Exam session lifecycle state machine.
//!
//! Sessions progress through states based on explicit operations:
//!
//! ```text
//!                      start / begin
//!     ┌─────────┐    ┌─────────────┐
//!     │ Pending │───▶│ InProgress  │
//!     └─────────┘    └──────┬──────┘
//!                           │
//!       ┌───────────┬───────┼───────────┬───────────┐
//!       ▼           ▼       ▼           ▼           ▼
//!   Completed   Submitted  AutoSubmitted Terminated Cancelled
//!   (submit)    (submit)   (finalize)   (terminate) (cancel)
//! ```
//!
//! All terminal states are absorbing. A second finalizer observes
//! [`TransitionOutcome::AlreadyFinal`] and performs no writes, so a
//! race between "time expired" and "violation escalation" resolves
//! to exactly one winner and duplicate reports never double-close a
//! session.

pub mod error;
pub mod machine;
pub mod state;

#[cfg(test)]
mod tests;

pub use error::SessionError;
pub use machine::{SessionMachine, TransitionOutcome};
pub use state::{ExamSession, SessionState, SessionSummary};
