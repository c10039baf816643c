//! Pure, deterministic risk scoring.
//!
//! `score()` maps a violation and its recent history to a number in
//! [0, 100]. It is a pure function of its inputs, uses only integer
//! arithmetic for the weighted base, and is byte-identical for
//! identical inputs so stored scores can be reproduced in audits.
//!
//! The scoring model:
//!
//! ```text
//! weighted  = base_weight(type) * multiplier(severity)   // 0.5x..2.0x
//! repeated  = 5 * prior_count_in_window                  // trailing 10 min
//! frequency = 15 if frequency_per_minute > 0.5 else 0
//! score     = clamp(weighted + repeated + frequency, 0, 100)
//! ```

use serde::{Deserialize, Serialize};

use crate::violation::{Severity, ViolationType};

/// Upper bound of the risk score range.
pub const MAX_RISK_SCORE: u8 = 100;

/// Flat penalty per prior violation in the trailing window.
pub const REPEAT_PENALTY: u32 = 5;

/// Flat penalty applied when violation frequency exceeds the cutoff.
pub const FREQUENCY_PENALTY: u32 = 15;

/// Violations per minute above which the frequency penalty applies.
pub const FREQUENCY_CUTOFF_PER_MINUTE: f64 = 0.5;

/// Score above which a violation requires immediate action.
pub const IMMEDIATE_ACTION_SCORE: u8 = 70;

/// Computes the risk score for a violation.
///
/// Deterministic: the severity multiplier is applied in halves
/// (`base * halves / 2`, flooring) so no floating-point enters the
/// weighted base. `frequency_per_minute` only feeds the flat-penalty
/// comparison.
#[must_use]
pub fn score(
    violation_type: ViolationType,
    severity: Severity,
    prior_count_in_window: u32,
    frequency_per_minute: f64,
) -> u8 {
    let weighted =
        u32::from(violation_type.base_weight()) * u32::from(severity.multiplier_halves()) / 2;

    let mut total = weighted + REPEAT_PENALTY * prior_count_in_window;
    if frequency_per_minute > FREQUENCY_CUTOFF_PER_MINUTE {
        total += FREQUENCY_PENALTY;
    }

    u8::try_from(total.min(u32::from(MAX_RISK_SCORE))).unwrap_or(MAX_RISK_SCORE)
}

/// Whether a violation demands immediate termination-level response.
///
/// True when the type is in the fixed critical set, the severity is
/// `critical`, or the score exceeds [`IMMEDIATE_ACTION_SCORE`].
#[must_use]
pub fn requires_immediate_action(
    violation_type: ViolationType,
    severity: Severity,
    risk_score: u8,
) -> bool {
    violation_type.is_critical()
        || severity == Severity::Critical
        || risk_score > IMMEDIATE_ACTION_SCORE
}

/// Response recommended by the escalation policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// First occurrence: warn the candidate.
    WarningShown,
    /// Second occurrence: lock the current question.
    QuestionLocked,
    /// Threshold crossed or immediate-action violation: terminate.
    ExamTerminated,
}

impl RecommendedAction {
    /// Returns the wire name of the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WarningShown => "warning_shown",
            Self::QuestionLocked => "question_locked",
            Self::ExamTerminated => "exam_terminated",
        }
    }
}

/// Maps the session's post-increment violation count to a response.
///
/// `total_count` is the unique count returned by the store's atomic
/// find-and-increment, so under concurrency each caller lands on a
/// distinct row of the policy table and the terminate decision has
/// exactly one first crossing.
#[must_use]
pub fn recommended_action(
    total_count: u32,
    immediate: bool,
    warning_threshold: u32,
    termination_threshold: u32,
) -> RecommendedAction {
    if immediate || total_count >= termination_threshold {
        RecommendedAction::ExamTerminated
    } else if total_count >= warning_threshold {
        RecommendedAction::QuestionLocked
    } else {
        RecommendedAction::WarningShown
    }
}
