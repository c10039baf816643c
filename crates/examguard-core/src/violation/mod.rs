//! Violation domain types.
//!
//! The violation type enumeration is a closed set: it is part of the
//! external contract and may only be extended by an explicit
//! versioned change. Each type carries a fixed base risk weight and a
//! default severity used when a client report omits one, so client
//! underreporting cannot shrink a score below the type's floor.
//!
//! [`ViolationEvent`] rows are append-only: once written they are
//! never mutated, and the stored fields are sufficient to reproduce
//! the risk score byte-for-byte.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejection of a malformed violation report before any ledger write.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The violation type string is not in the closed set.
    #[error("unknown violation type: {value}")]
    UnknownViolationType {
        /// The rejected input.
        value: String,
    },

    /// The severity string is not one of `low|medium|high|critical`.
    #[error("unknown severity: {value}")]
    UnknownSeverity {
        /// The rejected input.
        value: String,
    },
}

/// The closed set of detectable integrity violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    FullscreenExit,
    TabSwitch,
    WindowBlur,
    RightClick,
    CopyPaste,
    KeyboardShortcut,
    TextSelection,
    BrowserNavigation,
    DeveloperTools,
    MultipleMonitors,
    SuspiciousActivity,
    NetworkDisconnection,
    UnauthorizedSoftware,
    FaceNotDetected,
    MultipleFaces,
    AudioDetection,
    ScreenSharing,
    VirtualMachine,
    MobileDeviceDetected,
    UnusualMouseBehavior,
    RapidClicking,
    AutomatedBehavior,
}

/// All violation types, in contract order.
pub const ALL_VIOLATION_TYPES: [ViolationType; 22] = [
    ViolationType::FullscreenExit,
    ViolationType::TabSwitch,
    ViolationType::WindowBlur,
    ViolationType::RightClick,
    ViolationType::CopyPaste,
    ViolationType::KeyboardShortcut,
    ViolationType::TextSelection,
    ViolationType::BrowserNavigation,
    ViolationType::DeveloperTools,
    ViolationType::MultipleMonitors,
    ViolationType::SuspiciousActivity,
    ViolationType::NetworkDisconnection,
    ViolationType::UnauthorizedSoftware,
    ViolationType::FaceNotDetected,
    ViolationType::MultipleFaces,
    ViolationType::AudioDetection,
    ViolationType::ScreenSharing,
    ViolationType::VirtualMachine,
    ViolationType::MobileDeviceDetected,
    ViolationType::UnusualMouseBehavior,
    ViolationType::RapidClicking,
    ViolationType::AutomatedBehavior,
];

impl ViolationType {
    /// Returns the wire name of the violation type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FullscreenExit => "fullscreen_exit",
            Self::TabSwitch => "tab_switch",
            Self::WindowBlur => "window_blur",
            Self::RightClick => "right_click",
            Self::CopyPaste => "copy_paste",
            Self::KeyboardShortcut => "keyboard_shortcut",
            Self::TextSelection => "text_selection",
            Self::BrowserNavigation => "browser_navigation",
            Self::DeveloperTools => "developer_tools",
            Self::MultipleMonitors => "multiple_monitors",
            Self::SuspiciousActivity => "suspicious_activity",
            Self::NetworkDisconnection => "network_disconnection",
            Self::UnauthorizedSoftware => "unauthorized_software",
            Self::FaceNotDetected => "face_not_detected",
            Self::MultipleFaces => "multiple_faces",
            Self::AudioDetection => "audio_detection",
            Self::ScreenSharing => "screen_sharing",
            Self::VirtualMachine => "virtual_machine",
            Self::MobileDeviceDetected => "mobile_device_detected",
            Self::UnusualMouseBehavior => "unusual_mouse_behavior",
            Self::RapidClicking => "rapid_clicking",
            Self::AutomatedBehavior => "automated_behavior",
        }
    }

    /// Fixed base risk weight for this violation type.
    ///
    /// Part of the external contract: changing a weight is a
    /// versioned change, not a tuning knob.
    #[must_use]
    pub const fn base_weight(&self) -> u16 {
        match self {
            Self::TextSelection => 5,
            Self::WindowBlur | Self::RightClick | Self::NetworkDisconnection => 10,
            Self::TabSwitch | Self::KeyboardShortcut => 15,
            Self::FullscreenExit | Self::BrowserNavigation | Self::RapidClicking => 20,
            Self::CopyPaste | Self::AudioDetection => 25,
            Self::SuspiciousActivity | Self::FaceNotDetected | Self::UnusualMouseBehavior => 30,
            Self::MultipleMonitors | Self::MobileDeviceDetected => 35,
            Self::DeveloperTools => 40,
            Self::MultipleFaces => 45,
            Self::ScreenSharing => 50,
            Self::UnauthorizedSoftware => 60,
            Self::VirtualMachine => 65,
            Self::AutomatedBehavior => 70,
        }
    }

    /// Whether this type is in the fixed critical set that requires
    /// immediate action regardless of severity or score.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::DeveloperTools
                | Self::ScreenSharing
                | Self::VirtualMachine
                | Self::AutomatedBehavior
                | Self::UnauthorizedSoftware
        )
    }

    /// Severity applied when a client report omits one.
    #[must_use]
    pub const fn default_severity(&self) -> Severity {
        match self {
            Self::TextSelection | Self::RightClick | Self::WindowBlur => Severity::Low,
            Self::DeveloperTools
            | Self::ScreenSharing
            | Self::VirtualMachine
            | Self::AutomatedBehavior
            | Self::UnauthorizedSoftware => Severity::Critical,
            Self::FullscreenExit | Self::MultipleFaces | Self::MultipleMonitors => Severity::High,
            _ => Severity::Medium,
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_VIOLATION_TYPES
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| ValidationError::UnknownViolationType {
                value: s.to_string(),
            })
    }
}

/// Violation severity, reported by the client or defaulted per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Returns the wire name of the severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Severity multiplier expressed in halves so scoring stays in
    /// integer arithmetic: low=0.5, medium=1.0, high=1.5, critical=2.0.
    #[must_use]
    pub const fn multiplier_halves(&self) -> u16 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(ValidationError::UnknownSeverity {
                value: other.to_string(),
            }),
        }
    }
}

/// Where a violation was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Reported explicitly by the client.
    ClientReported,
    /// Synthesized by the fullscreen enforcement gate.
    GateDetected,
}

impl DetectionSource {
    /// Returns the wire name of the source.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClientReported => "client_reported",
            Self::GateDetected => "gate_detected",
        }
    }
}

impl FromStr for DetectionSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_reported" => Ok(Self::ClientReported),
            "gate_detected" => Ok(Self::GateDetected),
            other => Err(ValidationError::UnknownViolationType {
                value: other.to_string(),
            }),
        }
    }
}

/// Caller-supplied context attached to a violation report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViolationContext {
    /// Question the candidate was on, if known.
    pub question_ref: Option<String>,

    /// Free-form detail from the detector.
    pub description: Option<String>,

    /// Detection source; defaults to client-reported.
    #[serde(default = "ViolationContext::default_source")]
    pub source: DetectionSource,
}

impl ViolationContext {
    const fn default_source() -> DetectionSource {
        DetectionSource::ClientReported
    }

    /// Context for a gate-synthesized violation.
    #[must_use]
    pub fn gate_detected(description: impl Into<String>) -> Self {
        Self {
            question_ref: None,
            description: Some(description.into()),
            source: DetectionSource::GateDetected,
        }
    }
}

impl Default for DetectionSource {
    fn default() -> Self {
        Self::ClientReported
    }
}

/// An immutable record of one detected or reported integrity issue.
///
/// Append-only: never mutated after the ledger writes it. The risk
/// score is computed once at ingestion and is a pure function of
/// `(violation_type, severity, prior_count_in_window, frequency)`,
/// so it is fully reproducible from the stored fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// Unique violation id.
    pub violation_id: String,

    /// Session the violation was recorded against.
    pub session_id: String,

    /// User who owns the session.
    pub user_id: String,

    /// Exam the session belongs to.
    pub exam_id: String,

    /// Violation type.
    pub violation_type: ViolationType,

    /// Severity after per-type defaulting.
    pub severity: Severity,

    /// Ingestion time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,

    /// Time elapsed into the exam at ingestion.
    pub elapsed_into_exam_ms: u64,

    /// Question the candidate was on, if known.
    pub question_ref: Option<String>,

    /// Free-form detail from the detector.
    pub description: Option<String>,

    /// Detection source.
    pub source: DetectionSource,

    /// Risk score in [0, 100], computed once at ingestion.
    pub risk_score: u8,

    /// Whether prior violations existed in the trailing window.
    pub is_repeated: bool,

    /// Count of prior violations for the session in the trailing
    /// window at ingestion time.
    pub prior_count_in_window: u32,
}
