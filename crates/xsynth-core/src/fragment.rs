//! TLS ClientHello fragmentation parameters
//!
//! Ranges are always serialized as `"min-max"`; a range can only be
//! constructed with `min <= max`.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Inclusive numeric range rendered as `"min-max"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRange {
    min: u32,
    max: u32,
}

impl FragmentRange {
    /// Create a range, rejecting `min > max`
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min > max {
            return Err(Error::invalid(
                "fragment",
                format!("range minimum {min} exceeds maximum {max}"),
            ));
        }
        Ok(Self { min, max })
    }

    /// Lower bound
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Upper bound
    pub fn max(&self) -> u32 {
        self.max
    }
}

impl fmt::Display for FragmentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for FragmentRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| Error::invalid("fragment", format!("'{s}' is not a min-max range")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| Error::invalid("fragment", format!("'{s}': {e}")))
        };
        Self::new(parse(min)?, parse(max)?)
    }
}

impl Serialize for FragmentRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Packet-length rungs of the fragmentation ladder, in document order
pub const LADDER_LENGTHS: [(u32, u32); 18] = [
    (10, 20),
    (20, 30),
    (30, 40),
    (40, 50),
    (50, 60),
    (60, 70),
    (70, 80),
    (80, 90),
    (90, 100),
    (10, 30),
    (20, 40),
    (30, 50),
    (40, 60),
    (50, 70),
    (60, 80),
    (70, 90),
    (80, 100),
    (100, 200),
];

/// Interval used on every ladder rung
pub const LADDER_INTERVAL: FragmentRange = FragmentRange { min: 1, max: 1 };

/// The ladder as validated ranges
pub fn ladder() -> impl Iterator<Item = FragmentRange> {
    LADDER_LENGTHS
        .iter()
        .map(|&(min, max)| FragmentRange { min, max })
}
