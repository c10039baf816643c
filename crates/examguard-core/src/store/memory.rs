//! In-process integrity store.
//!
//! Backs tests and single-process deployments. Every operation runs
//! under one mutex, which trivially satisfies the store's atomicity
//! contract: the counter increment and the conditional transition
//! each happen in a single critical section.

// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::Mutex;

use super::{IntegrityStore, StoreError};
use crate::fingerprint::FingerprintBinding;
use crate::session::{ExamSession, SessionState};
use crate::violation::{Severity, ViolationEvent};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, ExamSession>,
    violations: Vec<ViolationEvent>,
    /// All binding versions per user; at most one non-superseded.
    bindings: HashMap<String, Vec<FingerprintBinding>>,
}

/// In-memory implementation of [`IntegrityStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IntegrityStore for MemoryStore {
    fn insert_session(&self, session: &ExamSession) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.sessions.contains_key(&session.session_id) {
            return Err(StoreError::Conflict {
                detail: format!("session already exists: {}", session.session_id),
            });
        }
        if session.state == SessionState::InProgress
            && inner.sessions.values().any(|s| {
                s.user_id == session.user_id
                    && s.exam_id == session.exam_id
                    && s.state == SessionState::InProgress
            })
        {
            return Err(StoreError::Conflict {
                detail: format!(
                    "pair already active: {}/{}",
                    session.user_id, session.exam_id
                ),
            });
        }
        inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<ExamSession>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sessions.get(session_id).cloned())
    }

    fn find_open_session(
        &self,
        user_id: &str,
        exam_id: &str,
    ) -> Result<Option<ExamSession>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut open: Vec<&ExamSession> = inner
            .sessions
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && s.exam_id == exam_id
                    && matches!(s.state, SessionState::Pending | SessionState::InProgress)
            })
            .collect();
        // Prefer in_progress, then the latest attempt.
        open.sort_by_key(|s| (s.state != SessionState::InProgress, std::cmp::Reverse(s.attempt)));
        Ok(open.first().map(|s| (*s).clone()))
    }

    fn count_sessions(&self, user_id: &str, exam_id: &str) -> Result<u32, StoreError> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.exam_id == exam_id)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn start_pending_session(
        &self,
        session_id: &str,
        started_at_ms: u64,
    ) -> Result<Option<ExamSession>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(current) = inner.sessions.get(session_id) else {
            return Ok(None);
        };
        if current.state != SessionState::Pending {
            return Ok(None);
        }
        let (user_id, exam_id) = (current.user_id.clone(), current.exam_id.clone());
        if inner.sessions.values().any(|s| {
            s.user_id == user_id && s.exam_id == exam_id && s.state == SessionState::InProgress
        }) {
            return Err(StoreError::Conflict {
                detail: format!("pair already active: {user_id}/{exam_id}"),
            });
        }
        let session = inner
            .sessions
            .get_mut(session_id)
            .expect("checked above while holding the lock");
        session.state = SessionState::InProgress;
        session.started_at_ms = Some(started_at_ms);
        Ok(Some(session.clone()))
    }

    fn finish_session(
        &self,
        session_id: &str,
        state: SessionState,
        ended_at_ms: u64,
        reason: Option<&str>,
    ) -> Result<Option<ExamSession>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.sessions.get_mut(session_id) else {
            return Ok(None);
        };
        if session.state != SessionState::InProgress {
            return Ok(None);
        }
        session.state = state;
        session.ended_at_ms = Some(ended_at_ms);
        session.elapsed_ms = ended_at_ms.saturating_sub(session.started_at_ms.unwrap_or(ended_at_ms));
        if let Some(reason) = reason {
            session.auto_submission_reason = Some(reason.to_string());
        }
        Ok(Some(session.clone()))
    }

    fn append_violation(&self, event: &ViolationEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .violations
            .iter()
            .any(|v| v.violation_id == event.violation_id)
        {
            return Err(StoreError::Conflict {
                detail: format!("violation id already recorded: {}", event.violation_id),
            });
        }
        inner.violations.push(event.clone());
        Ok(())
    }

    fn count_violations_since(&self, session_id: &str, since_ms: u64) -> Result<u32, StoreError> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .violations
            .iter()
            .filter(|v| v.session_id == session_id && v.timestamp_ms >= since_ms)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn violations_for_session(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<ViolationEvent>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<ViolationEvent> = inner
            .violations
            .iter()
            .filter(|v| v.session_id == session_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            b.timestamp_ms
                .cmp(&a.timestamp_ms)
                .then_with(|| b.violation_id.cmp(&a.violation_id))
        });
        events.truncate(limit as usize);
        Ok(events)
    }

    fn increment_violation_counters(
        &self,
        session_id: &str,
        severity: Severity,
        at_ms: u64,
    ) -> Result<Option<u32>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.sessions.get_mut(session_id) else {
            return Ok(None);
        };
        if session.state != SessionState::InProgress {
            return Ok(None);
        }
        session.violation_count += 1;
        match severity {
            Severity::Low => session.low_count += 1,
            Severity::Medium => session.medium_count += 1,
            Severity::High => session.high_count += 1,
            Severity::Critical => session.critical_count += 1,
        }
        session.last_violation_ms = Some(at_ms);
        Ok(Some(session.violation_count))
    }

    fn get_binding(&self, user_id: &str) -> Result<Option<FingerprintBinding>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bindings
            .get(user_id)
            .and_then(|versions| versions.iter().find(|b| !b.superseded))
            .cloned())
    }

    fn insert_binding(&self, binding: &FingerprintBinding) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let versions = inner.bindings.entry(binding.user_id.clone()).or_default();
        if versions.iter().any(|b| !b.superseded) {
            return Err(StoreError::Conflict {
                detail: format!("current binding already exists for user: {}", binding.user_id),
            });
        }
        versions.push(binding.clone());
        Ok(())
    }

    fn touch_binding(&self, user_id: &str, last_seen_ms: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(current) = inner
            .bindings
            .get_mut(user_id)
            .and_then(|versions| versions.iter_mut().find(|b| !b.superseded))
        {
            current.last_seen_ms = last_seen_ms;
        }
        Ok(())
    }

    fn supersede_binding(
        &self,
        user_id: &str,
        replacement: &FingerprintBinding,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let versions = inner.bindings.entry(user_id.to_string()).or_default();
        for binding in versions.iter_mut() {
            binding.superseded = true;
        }
        versions.push(replacement.clone());
        Ok(())
    }
}
