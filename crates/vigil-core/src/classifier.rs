//! Rule-ordered reduction of a feature set to status, threat level and alert.

use crate::features::FeatureSet;
use serde::Serialize;
use std::fmt;

/// Gaze summary reported when no face is in view.
pub const UNKNOWN_GAZE: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NoTarget,
    TargetLocked,
    EyesClosed,
    ExcessiveMovement,
    SuspiciousGaze,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::NoTarget => "NO_TARGET",
            Status::TargetLocked => "TARGET_LOCKED",
            Status::EyesClosed => "EYES_CLOSED",
            Status::ExcessiveMovement => "EXCESSIVE_MOVEMENT",
            Status::SuspiciousGaze => "SUSPICIOUS_GAZE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    Secure,
    Caution,
    Warning,
    Alert,
}

impl ThreatLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreatLevel::Secure => "SECURE",
            ThreatLevel::Caution => "CAUTION",
            ThreatLevel::Warning => "WARNING",
            ThreatLevel::Alert => "ALERT",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which audible alert, if any, a classification calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    None,
    Standard,
    Warning,
    Critical,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::None => "NONE",
            AlertKind::Standard => "STANDARD",
            AlertKind::Warning => "WARNING",
            AlertKind::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub status: Status,
    pub threat_level: ThreatLevel,
    pub alert_kind: AlertKind,
    /// `L:<left> | R:<right>`, or `UNKNOWN` without a face.
    pub gaze_summary: String,
}

impl ClassificationResult {
    /// Result for a frame with no face in view. Never alerts.
    pub fn no_target() -> Self {
        Self {
            status: Status::NoTarget,
            threat_level: ThreatLevel::Secure,
            alert_kind: AlertKind::None,
            gaze_summary: UNKNOWN_GAZE.to_string(),
        }
    }
}

/// Classify one frame's features. `None` means no face was detected.
///
/// Rules are evaluated top-down and the first match wins:
/// closed eyes, then head movement, then extreme gaze on either eye.
pub fn classify(features: Option<&FeatureSet>) -> ClassificationResult {
    let Some(f) = features else {
        return ClassificationResult::no_target();
    };

    let (status, threat_level, alert_kind) = if !f.eyes_open {
        (Status::EyesClosed, ThreatLevel::Alert, AlertKind::Warning)
    } else if f.head_moved {
        (
            Status::ExcessiveMovement,
            ThreatLevel::Warning,
            AlertKind::Standard,
        )
    } else if f.gaze_left.is_extreme() || f.gaze_right.is_extreme() {
        (
            Status::SuspiciousGaze,
            ThreatLevel::Caution,
            AlertKind::Standard,
        )
    } else {
        (Status::TargetLocked, ThreatLevel::Secure, AlertKind::None)
    };

    ClassificationResult {
        status,
        threat_level,
        alert_kind,
        gaze_summary: format!("L:{} | R:{}", f.gaze_left, f.gaze_right),
    }
}
