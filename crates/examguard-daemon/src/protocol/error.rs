//! Protocol error types with stable codes for the route layer.
//!
//! Expected business outcomes (no active session, already final) are
//! values inside the engine; only at this boundary do they become
//! errors, with codes the route layer maps onto its transport.
//!
//! # Error Classification
//!
//! - `VALIDATION_ERROR`: malformed input, rejected before any ledger
//!   write (400-class).
//! - `SESSION_NOT_ACTIVE`: no eligible `in_progress` session for the
//!   caller, user-correctable (404-class).
//! - `STORE_UNAVAILABLE`: durable store fault after the single retry
//!   (503-class). Never silently swallowed for audit-critical
//!   writes.
//! - `INTERNAL`: anything else (500-class).

use examguard_core::ledger::LedgerError;
use examguard_core::session::SessionError;
use examguard_core::store::StoreError;
use examguard_core::violation::ValidationError;
use thiserror::Error;

/// Protocol-level failure, carrying a stable code.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed violation type or severity; rejected before any
    /// ledger write.
    #[error("validation error: {detail}")]
    Validation {
        /// What failed to parse.
        detail: String,
    },

    /// No eligible `in_progress` session for the caller and exam.
    #[error("no active session: {detail}")]
    SessionNotActive {
        /// The (user, exam) or session that was looked up.
        detail: String,
    },

    /// The durable store is unreachable after the single retry.
    #[error("store unavailable: {detail}")]
    Unavailable {
        /// What failed.
        detail: String,
    },

    /// Unexpected internal fault.
    #[error("internal error: {detail}")]
    Internal {
        /// What failed.
        detail: String,
    },
}

impl ProtocolError {
    /// Stable machine-readable code for the route layer.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::SessionNotActive { .. } => "SESSION_NOT_ACTIVE",
            Self::Unavailable { .. } => "STORE_UNAVAILABLE",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// HTTP-style status class the code maps to.
    #[must_use]
    pub const fn status_class(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::SessionNotActive { .. } => 404,
            Self::Unavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }
}

impl From<ValidationError> for ProtocolError {
    fn from(err: ValidationError) -> Self {
        Self::Validation {
            detail: err.to_string(),
        }
    }
}

impl From<StoreError> for ProtocolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { detail } => Self::Unavailable { detail },
            other => Self::Internal {
                detail: other.to_string(),
            },
        }
    }
}

impl From<LedgerError> for ProtocolError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::SessionNotActive { session_id } => Self::SessionNotActive {
                detail: session_id,
            },
            LedgerError::Store(store) => store.into(),
            LedgerError::Session(session) => session.into(),
        }
    }
}

impl From<SessionError> for ProtocolError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionNotActive { session_id }
            | SessionError::SessionNotFound { session_id } => Self::SessionNotActive {
                detail: session_id,
            },
            SessionError::InvalidTransition { session_id, from_state } => Self::Internal {
                detail: format!("invalid transition for {session_id} from {from_state}"),
            },
            SessionError::Store(store) => store.into(),
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let validation = ProtocolError::Validation {
            detail: "unknown violation type: flying".to_string(),
        };
        assert_eq!(validation.code(), "VALIDATION_ERROR");
        assert_eq!(validation.status_class(), 400);

        let not_active = ProtocolError::from(LedgerError::SessionNotActive {
            session_id: "s-1".to_string(),
        });
        assert_eq!(not_active.code(), "SESSION_NOT_ACTIVE");
        assert_eq!(not_active.status_class(), 404);

        let unavailable = ProtocolError::from(StoreError::Unavailable {
            detail: "timeout".to_string(),
        });
        assert_eq!(unavailable.code(), "STORE_UNAVAILABLE");
        assert_eq!(unavailable.status_class(), 503);
    }
}
