//! Device/browser fingerprint binding and verification.
//!
//! The binder associates each user with a normalized digest of their
//! device/browser signals and classifies later observations against
//! it. It never blocks a request by itself: verification returns a
//! classification and the caller decides whether to raise a violation
//! or merely flag for audit, so login/logout flows that legitimately
//! change fingerprints are not forced through the violation path.
//!
//! A mismatch never silently overwrites the stored baseline — that
//! would defeat session-hijack detection. Replacement only happens
//! through the explicit [`FingerprintBinder::accept_change`] step,
//! which supersedes (keeps) the old binding rather than deleting it.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::store::{IntegrityStore, StoreError};

/// Default elapsed time under which a fingerprint change is treated
/// as a possible session hijack (5 minutes).
pub const DEFAULT_RAPID_CHANGE_THRESHOLD_MS: u64 = 5 * 60 * 1000;

/// Errors from binding operations.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// `bind` was called while a current baseline already exists.
    #[error("baseline already exists for user: {user_id}")]
    BaselineExists {
        /// The user with an existing binding.
        user_id: String,
    },

    /// `accept_change` was called with no baseline to replace.
    #[error("no baseline to replace for user: {user_id}")]
    NoBaseline {
        /// The user without a binding.
        user_id: String,
    },

    /// Durable store fault.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The association between a user and a device/browser signature.
///
/// At most one current (non-superseded) binding exists per user;
/// superseded versions are kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintBinding {
    /// The bound user.
    pub user_id: String,

    /// Binding version, starting at 1; bumped on accepted changes.
    pub version: u32,

    /// SHA-256 hex digest of the normalized fingerprint material.
    pub fingerprint_hash: String,

    /// Session active when the binding was created, if any.
    pub bound_session_id: Option<String>,

    /// First time this signature was observed.
    pub first_seen_ms: u64,

    /// Most recent matching observation.
    pub last_seen_ms: u64,

    /// Whether a later accepted change replaced this binding.
    pub superseded: bool,
}

/// Confidence that a fingerprint mismatch is an integrity problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchConfidence {
    /// The signature changed after a long gap; plausibly a
    /// legitimate device change.
    Medium,
    /// The signature changed within the rapid-change threshold;
    /// possible session hijack.
    High,
}

/// Classification of one observed fingerprint against the baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Observation matches the current baseline; last-seen bumped.
    Match,
    /// No baseline exists. First contact is never itself a
    /// violation; the caller should bind and proceed.
    NoBaseline,
    /// Observation differs from the baseline. The baseline is left
    /// untouched.
    Mismatch {
        /// Hijack confidence from the elapsed time since last-seen.
        confidence: MismatchConfidence,
        /// Milliseconds since the baseline was last seen.
        elapsed_ms: u64,
        /// Digest of the observed (non-matching) fingerprint.
        observed_hash: String,
    },
}

/// Derives and verifies the per-user device signature.
#[derive(Clone)]
pub struct FingerprintBinder {
    store: Arc<dyn IntegrityStore>,
    clock: Arc<dyn Clock>,
    rapid_change_threshold_ms: u64,
}

impl FingerprintBinder {
    /// Creates a binder with the given rapid-change threshold.
    #[must_use]
    pub fn new(
        store: Arc<dyn IntegrityStore>,
        clock: Arc<dyn Clock>,
        rapid_change_threshold_ms: u64,
    ) -> Self {
        Self {
            store,
            clock,
            rapid_change_threshold_ms,
        }
    }

    /// Normalizes raw fingerprint material to a stable hex digest.
    #[must_use]
    pub fn digest(material: &str) -> String {
        let hash = Sha256::digest(material.as_bytes());
        hash.iter().fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }

    /// Classifies an observed fingerprint against the user's baseline.
    ///
    /// On a match the baseline's last-seen time is bumped. On a
    /// mismatch nothing is written; the elapsed time since last-seen
    /// decides the confidence (under the rapid-change threshold is
    /// high, else medium).
    ///
    /// # Errors
    ///
    /// Returns an error on store faults.
    pub fn verify(
        &self,
        user_id: &str,
        observed_material: &str,
    ) -> Result<Verification, StoreError> {
        let observed_hash = Self::digest(observed_material);
        let Some(binding) = self.store.get_binding(user_id)? else {
            return Ok(Verification::NoBaseline);
        };

        let now = self.clock.now_ms();
        if binding.fingerprint_hash == observed_hash {
            self.store.touch_binding(user_id, now)?;
            return Ok(Verification::Match);
        }

        let elapsed_ms = now.saturating_sub(binding.last_seen_ms);
        let confidence = if elapsed_ms < self.rapid_change_threshold_ms {
            MismatchConfidence::High
        } else {
            MismatchConfidence::Medium
        };
        debug!(
            user_id,
            elapsed_ms,
            confidence = ?confidence,
            "fingerprint mismatch against baseline"
        );
        Ok(Verification::Mismatch {
            confidence,
            elapsed_ms,
            observed_hash,
        })
    }

    /// Creates the first-contact baseline for a user.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError::BaselineExists`] when a current
    /// binding is already present.
    pub fn bind(
        &self,
        user_id: &str,
        fingerprint_material: &str,
        session_id: Option<&str>,
    ) -> Result<FingerprintBinding, FingerprintError> {
        let now = self.clock.now_ms();
        let binding = FingerprintBinding {
            user_id: user_id.to_string(),
            version: 1,
            fingerprint_hash: Self::digest(fingerprint_material),
            bound_session_id: session_id.map(str::to_string),
            first_seen_ms: now,
            last_seen_ms: now,
            superseded: false,
        };
        match self.store.insert_binding(&binding) {
            Ok(()) => Ok(binding),
            Err(StoreError::Conflict { .. }) => Err(FingerprintError::BaselineExists {
                user_id: user_id.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the baseline after an external review accepted the
    /// device change. The old binding is superseded, not deleted.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError::NoBaseline`] when there is nothing
    /// to replace.
    pub fn accept_change(
        &self,
        user_id: &str,
        fingerprint_material: &str,
        session_id: Option<&str>,
    ) -> Result<FingerprintBinding, FingerprintError> {
        let current =
            self.store
                .get_binding(user_id)?
                .ok_or_else(|| FingerprintError::NoBaseline {
                    user_id: user_id.to_string(),
                })?;

        let now = self.clock.now_ms();
        let replacement = FingerprintBinding {
            user_id: user_id.to_string(),
            version: current.version + 1,
            fingerprint_hash: Self::digest(fingerprint_material),
            bound_session_id: session_id.map(str::to_string),
            first_seen_ms: now,
            last_seen_ms: now,
            superseded: false,
        };
        self.store.supersede_binding(user_id, &replacement)?;
        debug!(
            user_id,
            version = replacement.version,
            "fingerprint baseline replaced after accepted device change"
        );
        Ok(replacement)
    }
}
