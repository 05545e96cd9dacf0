//! Alarm metadata.
//!
//! Severities form a total order so that merging per-field alarms into a
//! group-level alarm is a plain "worst wins". The precise tie-break
//! between equal severities is deliberately underspecified in the domain;
//! the merge here keeps the earlier contributor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alarm severity, ordered from healthy to invalid.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AlarmSeverity {
    /// No alarm condition.
    #[default]
    NoAlarm,
    /// Minor alarm.
    Minor,
    /// Major alarm.
    Major,
    /// Value is invalid (disconnected, undefined, driver fault).
    Invalid,
}

impl fmt::Display for AlarmSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlarmSeverity::NoAlarm => "NO_ALARM",
            AlarmSeverity::Minor => "MINOR",
            AlarmSeverity::Major => "MAJOR",
            AlarmSeverity::Invalid => "INVALID",
        };
        write!(f, "{s}")
    }
}

/// Alarm state attached to a reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Severity of the condition.
    pub severity: AlarmSeverity,
    /// Human-readable status message, empty when healthy.
    pub message: String,
}

impl Alarm {
    /// A healthy, message-free alarm state.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// An invalid-severity alarm with the given message.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            severity: AlarmSeverity::Invalid,
            message: message.into(),
        }
    }

    /// Creates an alarm from components.
    #[must_use]
    pub fn new(severity: AlarmSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    /// Merges another alarm in, keeping the worse severity.
    /// Ties keep `self` (the earlier contributor).
    #[must_use]
    pub fn worst(self, other: &Alarm) -> Alarm {
        if other.severity > self.severity {
            other.clone()
        } else {
            self
        }
    }
}
