//! examguard-daemon - Request-Facing Integrity Daemon
//!
//! The daemon layers the request-facing surface over
//! `examguard-core`: the fullscreen/focus enforcement gate that
//! guards exam routes, the protocol message types and dispatcher for
//! inbound violation reports and status queries, and the startup
//! wiring that composes the engine from configuration.
//!
//! # Request Flow
//!
//! ```text
//! route layer (identity already resolved)
//!     |
//!     v
//! SessionDispatcher ---- fingerprint verify (binder)
//!     |
//!     v
//! FullscreenGate ------- fullscreen_exit synthesis
//!     |
//!     v
//! ViolationLedger ------ score, persist, escalate
//!     |
//!     v
//! SessionMachine ------- terminate (single winner)
//! ```
//!
//! The gate fails open on internal faults (availability over strict
//! enforcement); every other write path propagates store faults so
//! no termination is silently lost.

pub mod gate;
pub mod protocol;
pub mod state;

pub use gate::{FullscreenGate, FullscreenSignal, GateDecision, GateNotice};
pub use protocol::{
    CallerIdentity, CallerRole, FullscreenStatusRequest, FullscreenStatusResponse, ProtocolError,
    ReportViolationRequest, ReportViolationResponse, SessionDispatcher,
};
pub use state::{DaemonError, DaemonState};
