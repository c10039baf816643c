//! Exam session record and lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::violation::Severity;

/// Lifecycle state of one exam attempt.
///
/// Terminal states are absorbing: once a session reaches one, every
/// further mutation attempt observes `AlreadyFinal` and is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created but not yet started.
    Pending,
    /// The candidate is actively taking the exam.
    InProgress,
    /// Finished normally with a validated submission.
    Completed,
    /// Explicitly submitted by the candidate.
    Submitted,
    /// Closed by the time-limit scheduler.
    AutoSubmitted,
    /// Closed by integrity escalation or admin action.
    Terminated,
    /// Administratively cancelled.
    Cancelled,
}

impl SessionState {
    /// Returns the wire name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Submitted => "submitted",
            Self::AutoSubmitted => "auto_submitted",
            Self::Terminated => "terminated",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the state is terminal (absorbing).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::Submitted
                | Self::AutoSubmitted
                | Self::Terminated
                | Self::Cancelled
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "submitted" => Ok(Self::Submitted),
            "auto_submitted" => Ok(Self::AutoSubmitted),
            "terminated" => Ok(Self::Terminated),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}

/// One timed attempt by a user at an exam.
///
/// Invariants maintained by the machine and store:
/// - `ended_at_ms` is set if and only if the state is terminal.
/// - Integrity counters are monotonically non-decreasing while
///   `in_progress`; the ledger is their only writer.
/// - At most one `in_progress` session exists per (user, exam) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSession {
    /// Opaque session id.
    pub session_id: String,

    /// Exam being attempted.
    pub exam_id: String,

    /// User taking the exam.
    pub user_id: String,

    /// Attempt number for this (user, exam) pair, starting at 1.
    pub attempt: u32,

    /// Current lifecycle state.
    pub state: SessionState,

    /// Start time; unset while `pending`.
    pub started_at_ms: Option<u64>,

    /// End time; set only on the terminal transition.
    pub ended_at_ms: Option<u64>,

    /// Accumulated elapsed time, fixed at the terminal transition.
    pub elapsed_ms: u64,

    /// Total violations recorded against the session.
    pub violation_count: u32,

    /// Violations by severity.
    pub low_count: u32,
    pub medium_count: u32,
    pub high_count: u32,
    pub critical_count: u32,

    /// Time of the most recent violation.
    pub last_violation_ms: Option<u64>,

    /// Why the session was auto-submitted or terminated.
    pub auto_submission_reason: Option<String>,
}

impl ExamSession {
    /// Creates a new session record in the given state.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        exam_id: impl Into<String>,
        user_id: impl Into<String>,
        attempt: u32,
        state: SessionState,
        started_at_ms: Option<u64>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            exam_id: exam_id.into(),
            user_id: user_id.into(),
            attempt,
            state,
            started_at_ms,
            ended_at_ms: None,
            elapsed_ms: 0,
            violation_count: 0,
            low_count: 0,
            medium_count: 0,
            high_count: 0,
            critical_count: 0,
            last_violation_ms: None,
            auto_submission_reason: None,
        }
    }

    /// Violation count for one severity.
    #[must_use]
    pub const fn severity_count(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Low => self.low_count,
            Severity::Medium => self.medium_count,
            Severity::High => self.high_count,
            Severity::Critical => self.critical_count,
        }
    }

    /// Read-only projection for history and reporting collaborators.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            status: self.state,
            violation_count: self.violation_count,
            auto_submitted: matches!(
                self.state,
                SessionState::AutoSubmitted | SessionState::Terminated
            ),
            auto_submission_reason: self.auto_submission_reason.clone(),
        }
    }
}

/// Persisted-state shape exposed to reporting collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id.
    pub session_id: String,
    /// Lifecycle status.
    pub status: SessionState,
    /// Total violations recorded.
    pub violation_count: u32,
    /// Whether the engine closed the session itself.
    pub auto_submitted: bool,
    /// The recorded closing cause, if the engine closed it.
    pub auto_submission_reason: Option<String>,
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Pending.is_terminal());
        assert!(!SessionState::InProgress.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Submitted.is_terminal());
        assert!(SessionState::AutoSubmitted.is_terminal());
        assert!(SessionState::Terminated.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
    }

    #[test]
    fn test_state_round_trips_through_wire_name() {
        for state in [
            SessionState::Pending,
            SessionState::InProgress,
            SessionState::Completed,
            SessionState::Submitted,
            SessionState::AutoSubmitted,
            SessionState::Terminated,
            SessionState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
    }

    #[test]
    fn test_summary_marks_engine_closures() {
        let mut session = ExamSession::new("s-1", "exam-1", "user-1", 1, SessionState::InProgress, Some(100));
        session.state = SessionState::Terminated;
        session.auto_submission_reason = Some("integrity threshold exceeded".to_string());
        let summary = session.summary();
        assert!(summary.auto_submitted);
        assert_eq!(summary.status, SessionState::Terminated);

        session.state = SessionState::Submitted;
        assert!(!session.summary().auto_submitted);
    }
}
