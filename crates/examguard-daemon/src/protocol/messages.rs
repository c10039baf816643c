//! Wire message types for the inbound protocol.
//!
//! Messages are JSON with camelCase keys, matching what the exam
//! client sends. Violation type and severity arrive as strings and
//! are validated by the dispatcher before any ledger write.

use serde::{Deserialize, Serialize};

/// Caller identity resolved by the out-of-scope identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    /// The authenticated user.
    pub user_id: String,
    /// The caller's role.
    pub role: CallerRole,
}

impl CallerIdentity {
    /// Identity for an exam-taking candidate.
    #[must_use]
    pub fn candidate(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: CallerRole::Candidate,
        }
    }
}

/// Role of the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    /// An exam-taking candidate.
    Candidate,
    /// A human proctor observing sessions.
    Proctor,
    /// An administrator.
    Admin,
}

/// A client-reported integrity violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportViolationRequest {
    /// Exam the violation was observed in.
    pub exam_id: String,

    /// Violation type wire name, validated against the closed set.
    #[serde(rename = "type")]
    pub violation_type: String,

    /// Severity wire name; defaults per type when omitted.
    #[serde(default)]
    pub severity: Option<String>,

    /// Free-form detail from the client-side detector.
    #[serde(default)]
    pub description: Option<String>,

    /// Question the candidate was on, if known.
    #[serde(default)]
    pub question_ref: Option<String>,

    /// Raw device/browser fingerprint material for baseline
    /// verification, when the client supplies it.
    #[serde(default)]
    pub fingerprint: Option<String>,
}

/// Response to a violation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportViolationResponse {
    /// Id of the persisted violation event.
    pub violation_id: String,

    /// `warning_shown`, `question_locked`, or `exam_terminated`.
    pub action_taken: String,

    /// Whether the session is now terminated.
    pub exam_terminated: bool,

    /// When the violation was recorded, ms since the Unix epoch.
    pub timestamp_ms: u64,
}

/// Query for the caller's integrity standing in an exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullscreenStatusRequest {
    /// Exam to report on.
    pub exam_id: String,
}

/// Rolling violation counts and the thresholds in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullscreenStatusResponse {
    /// Total violations recorded against the session.
    pub total_violations: u32,
    /// Violations within the trailing window.
    pub recent_violations: u32,
    /// Count at which questions lock.
    pub warning_threshold: u32,
    /// Count at which the session terminates.
    pub termination_threshold: u32,
}
