//! Per-request dispatch of inbound protocol operations.
//!
//! The dispatcher owns the control flow for a violation report:
//! resolve the caller's active session, verify the device
//! fingerprint against its baseline, then hand the violation to the
//! ledger and map the outcome onto the wire response.
//!
//! Fingerprint policy: first contact binds a baseline silently
//! (never itself a violation). A high-confidence mismatch (signature
//! changed within the rapid-change threshold, possible session
//! hijack) raises a `suspicious_activity` violation at `high`
//! severity. A medium-confidence mismatch is flagged for audit only,
//! so legitimate device changes around login/logout are not forced
//! through the violation path. A mismatch never overwrites the
//! stored baseline.

use std::sync::Arc;

use examguard_core::fingerprint::{FingerprintError, MismatchConfidence, Verification};
use examguard_core::ledger::RecordOutcome;
use examguard_core::session::SessionState;
use examguard_core::store::IntegrityStore;
use examguard_core::violation::{DetectionSource, Severity, ViolationContext, ViolationType};
use examguard_core::{ExamSession, FingerprintBinder, SessionMachine, ViolationLedger};
use tracing::{info, warn};

use super::error::ProtocolError;
use super::messages::{
    CallerIdentity, FullscreenStatusRequest, FullscreenStatusResponse, ReportViolationRequest,
    ReportViolationResponse,
};
use crate::gate::{FullscreenGate, FullscreenSignal, GateDecision};

/// Dispatches inbound operations to the engine components.
#[derive(Clone)]
pub struct SessionDispatcher {
    store: Arc<dyn IntegrityStore>,
    machine: SessionMachine,
    ledger: ViolationLedger,
    binder: FingerprintBinder,
    gate: FullscreenGate,
}

impl SessionDispatcher {
    /// Creates a dispatcher over already-wired components.
    #[must_use]
    pub fn new(
        store: Arc<dyn IntegrityStore>,
        machine: SessionMachine,
        ledger: ViolationLedger,
        binder: FingerprintBinder,
        gate: FullscreenGate,
    ) -> Self {
        Self {
            store,
            machine,
            ledger,
            binder,
            gate,
        }
    }

    /// The session machine, for start/submit routes.
    #[must_use]
    pub const fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    /// Handles a client-reported violation.
    ///
    /// Type and severity strings are validated before any ledger
    /// write. If the request carries fingerprint material it is
    /// verified first; a high-confidence mismatch raises its own
    /// `suspicious_activity` violation, and if that alone terminates
    /// the session the terminating event is what the response
    /// describes.
    ///
    /// # Errors
    ///
    /// `Validation` for unknown type or severity names,
    /// `SessionNotActive` when the caller has no `in_progress`
    /// session for the exam, or a store-fault code.
    pub fn report_violation(
        &self,
        identity: &CallerIdentity,
        request: &ReportViolationRequest,
    ) -> Result<ReportViolationResponse, ProtocolError> {
        let violation_type: ViolationType = request.violation_type.parse()?;
        let severity = match request.severity.as_deref() {
            Some(raw) => raw.parse()?,
            None => violation_type.default_severity(),
        };

        let session = self.active_session(&identity.user_id, &request.exam_id)?;

        if let Some(material) = request.fingerprint.as_deref() {
            if let Some(outcome) =
                self.verify_fingerprint(&identity.user_id, &session.session_id, material)?
            {
                if outcome.terminated {
                    info!(
                        user_id = %identity.user_id,
                        session_id = %session.session_id,
                        "session terminated on fingerprint mismatch before report was recorded"
                    );
                    return Ok(Self::response(&outcome));
                }
            }
        }

        let context = ViolationContext {
            question_ref: request.question_ref.clone(),
            description: request.description.clone(),
            source: DetectionSource::ClientReported,
        };
        let outcome = self
            .ledger
            .record(&session.session_id, violation_type, severity, context)?;
        Ok(Self::response(&outcome))
    }

    /// Reports the caller's integrity standing in an exam.
    ///
    /// # Errors
    ///
    /// `SessionNotActive` when the caller has no `in_progress`
    /// session for the exam, or a store-fault code.
    pub fn fullscreen_status(
        &self,
        identity: &CallerIdentity,
        request: &FullscreenStatusRequest,
    ) -> Result<FullscreenStatusResponse, ProtocolError> {
        let session = self.active_session(&identity.user_id, &request.exam_id)?;
        let status = self.ledger.status(&session.session_id)?;
        Ok(FullscreenStatusResponse {
            total_violations: status.total_violations,
            recent_violations: status.recent_violations,
            warning_threshold: status.warning_threshold,
            termination_threshold: status.termination_threshold,
        })
    }

    /// Runs the fullscreen gate for one guarded request.
    ///
    /// Infallible by design: the gate fails open on internal faults.
    pub fn check_fullscreen(
        &self,
        identity: &CallerIdentity,
        exam_id: &str,
        signal: &FullscreenSignal,
    ) -> GateDecision {
        self.gate.check(&identity.user_id, exam_id, signal)
    }

    fn active_session(
        &self,
        user_id: &str,
        exam_id: &str,
    ) -> Result<ExamSession, ProtocolError> {
        self.store
            .find_open_session(user_id, exam_id)?
            .filter(|s| s.state == SessionState::InProgress)
            .ok_or_else(|| ProtocolError::SessionNotActive {
                detail: format!("{user_id}/{exam_id}"),
            })
    }

    /// Fingerprint verification step of the report flow.
    ///
    /// Returns the `suspicious_activity` record outcome for a
    /// high-confidence mismatch, `None` otherwise. Verification
    /// faults are logged and skipped: the report itself must not be
    /// lost to a fingerprint-side fault.
    fn verify_fingerprint(
        &self,
        user_id: &str,
        session_id: &str,
        material: &str,
    ) -> Result<Option<RecordOutcome>, ProtocolError> {
        match self.binder.verify(user_id, material) {
            Ok(Verification::Match) => Ok(None),
            Ok(Verification::NoBaseline) => {
                match self.binder.bind(user_id, material, Some(session_id)) {
                    // A concurrent request bound first; theirs wins.
                    Ok(_) | Err(FingerprintError::BaselineExists { .. }) => {},
                    Err(err) => {
                        warn!(user_id, error = %err, "fingerprint baseline bind failed");
                    },
                }
                Ok(None)
            },
            Ok(Verification::Mismatch {
                confidence: MismatchConfidence::High,
                elapsed_ms,
                ..
            }) => {
                let context = ViolationContext {
                    question_ref: None,
                    description: Some(format!(
                        "device fingerprint changed {elapsed_ms}ms after last observation"
                    )),
                    source: DetectionSource::GateDetected,
                };
                let outcome = self.ledger.record(
                    session_id,
                    ViolationType::SuspiciousActivity,
                    Severity::High,
                    context,
                )?;
                Ok(Some(outcome))
            },
            Ok(Verification::Mismatch {
                confidence: MismatchConfidence::Medium,
                elapsed_ms,
                observed_hash,
            }) => {
                warn!(
                    user_id,
                    session_id,
                    elapsed_ms,
                    observed_hash = %observed_hash,
                    "fingerprint changed after long gap, flagged for audit"
                );
                Ok(None)
            },
            Err(err) => {
                warn!(user_id, error = %err, "fingerprint verification failed, skipping");
                Ok(None)
            },
        }
    }

    fn response(outcome: &RecordOutcome) -> ReportViolationResponse {
        ReportViolationResponse {
            violation_id: outcome.violation.violation_id.clone(),
            action_taken: outcome.action.as_str().to_string(),
            exam_terminated: outcome.terminated,
            timestamp_ms: outcome.violation.timestamp_ms,
        }
    }
}
