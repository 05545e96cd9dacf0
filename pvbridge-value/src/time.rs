//! Timestamps and the nanoseconds tag-split transform.
//!
//! Some installations repurpose the low bits of a record's nanoseconds
//! field as a hardware tag (pulse ID, beam mode). The `nsec:lsb:<N>`
//! transform splits the raw 32-bit nanoseconds pattern: the low N bits
//! move to `user_tag`, the remaining high bits stay in `nanos` without
//! shifting.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// A wall-clock timestamp with an application-defined tag field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub secs: u64,
    /// Nanoseconds within the second. After a tag split this holds only
    /// the high bits of the raw pattern.
    pub nanos: u32,
    /// Application-defined tag, zero unless a split is configured.
    pub user_tag: u32,
}

impl Timestamp {
    /// Creates a timestamp from components with a zero tag.
    #[must_use]
    pub const fn new(secs: u64, nanos: u32) -> Self {
        Self {
            secs,
            nanos,
            user_tag: 0,
        }
    }

    /// Creates a timestamp at the current time.
    #[must_use]
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: elapsed.as_secs(),
            nanos: elapsed.subsec_nanos(),
            user_tag: 0,
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.secs.cmp(&other.secs) {
            Ordering::Equal => self.nanos.cmp(&other.nanos),
            other => other,
        }
    }
}

/// Splits a raw 32-bit nanoseconds pattern at bit `bits`.
///
/// Returns `(high, low)` where `low` carries the least significant
/// `bits` bits and `high` the rest, in place and unshifted. `bits = 0`
/// is the identity; `bits` must already be validated to [0,32].
#[must_use]
pub fn split_nanos(raw: u32, bits: u8) -> (u32, u32) {
    debug_assert!(bits <= 32);
    let mask = if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    };
    (raw & !mask, raw & mask)
}

/// Configured timestamp transform for one backing field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeTagMode {
    /// No transform; readings pass through unchanged.
    #[default]
    None,
    /// Move the low N bits of nanoseconds into the user tag.
    NsecLsb(u8),
}

impl TimeTagMode {
    /// Applies the transform to a timestamp.
    #[must_use]
    pub fn apply(&self, ts: Timestamp) -> Timestamp {
        match *self {
            TimeTagMode::None => ts,
            TimeTagMode::NsecLsb(bits) => {
                let (high, low) = split_nanos(ts.nanos, bits);
                Timestamp {
                    secs: ts.secs,
                    nanos: high,
                    user_tag: low,
                }
            }
        }
    }
}

impl FromStr for TimeTagMode {
    type Err = Error;

    /// Parses the `nsec:lsb:<N>` configuration string. The split point is
    /// validated here, at load time, so the transform itself never fails.
    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("nsec:lsb:")
            .ok_or_else(|| Error::InvalidTimestampSplit(format!("unrecognized tag mode {s:?}")))?;
        let bits: u8 = rest
            .parse()
            .map_err(|_| Error::InvalidTimestampSplit(format!("bad split point {rest:?}")))?;
        if bits > 32 {
            return Err(Error::InvalidTimestampSplit(format!(
                "split point {bits} outside [0,32]"
            )));
        }
        Ok(TimeTagMode::NsecLsb(bits))
    }
}
