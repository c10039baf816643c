//! examguard-core - Exam-Session Integrity Engine
//!
//! This library implements the proctoring core for timed, remotely
//! proctored assessments: the exam-session lifecycle state machine,
//! the violation ingestion and risk-scoring pipeline, and the
//! device-fingerprint binding logic. It reacts to client-side
//! integrity signals (fullscreen loss, tab switches, developer-tools
//! usage, fingerprint mismatches) in real time without trusting the
//! client.
//!
//! # Architecture
//!
//! Components are layered leaves-first:
//!
//! - [`risk`]: pure deterministic scoring, no dependencies.
//! - [`fingerprint`]: device/browser signature binding and
//!   verification.
//! - [`ledger`]: append-only violation ledger; the only writer of
//!   session integrity counters.
//! - [`session`]: the session lifecycle state machine; the exclusive
//!   owner of state transitions.
//! - [`store`]: the pluggable durable store (`SQLite` or in-memory)
//!   injected into every component. No module-level singletons.
//!
//! The request-facing fullscreen enforcement gate and protocol
//! dispatch live in the `examguard-daemon` crate.
//!
//! # Concurrency Model
//!
//! One logical request per thread; the durable store is the only
//! shared mutable resource. Integrity counter updates are single
//! atomic find-and-increment operations that return the
//! post-increment count, so concurrent `record()` calls each observe
//! a unique, strictly increasing count and the termination decision
//! has exactly one winner.

pub mod clock;
pub mod config;
pub mod fingerprint;
pub mod ledger;
pub mod risk;
pub mod session;
pub mod store;
pub mod violation;

pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, EngineConfig, FingerprintConfig, IntegrityConfig, StoreConfig};
pub use fingerprint::{FingerprintBinder, FingerprintBinding, Verification};
pub use ledger::{LedgerError, RecordOutcome, ViolationLedger};
pub use risk::{RecommendedAction, requires_immediate_action, score};
pub use session::{ExamSession, SessionError, SessionMachine, SessionState, TransitionOutcome};
pub use store::{IntegrityStore, MemoryStore, SqliteStore, StoreError};
pub use violation::{
    DetectionSource, Severity, ValidationError, ViolationContext, ViolationEvent, ViolationType,
};
