//! Inbound protocol surface for the route layer.
//!
//! The route layer hands the daemon fully-parsed messages and a
//! resolved caller identity; authentication, rate limiting, and
//! transport framing happen before this layer. The dispatcher wires
//! the fingerprint binder, enforcement gate, violation ledger, and
//! session machine into the per-request control flow and maps engine
//! outcomes to stable protocol error codes.

pub mod dispatch;
pub mod error;
pub mod messages;

pub use dispatch::SessionDispatcher;
pub use error::ProtocolError;
pub use messages::{
    CallerIdentity, CallerRole, FullscreenStatusRequest, FullscreenStatusResponse,
    ReportViolationRequest, ReportViolationResponse,
};
