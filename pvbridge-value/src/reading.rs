//! The reading triple.

use crate::{Alarm, Timestamp, Value};
use serde::{Deserialize, Serialize};

/// One observation of a backing field: value plus alarm and time
/// metadata. Every backing read and every monitor delivery carries one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldReading {
    /// The scalar value, possibly empty when the field is undefined.
    pub value: Value,
    /// Alarm state at the time of the reading.
    pub alarm: Alarm,
    /// Timestamp of the reading.
    pub time: Timestamp,
}

impl FieldReading {
    /// Creates a reading from components.
    #[must_use]
    pub fn new(value: Value, alarm: Alarm, time: Timestamp) -> Self {
        Self { value, alarm, time }
    }

    /// A healthy reading of the given value, stamped now.
    #[must_use]
    pub fn of(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            alarm: Alarm::none(),
            time: Timestamp::now(),
        }
    }
}
