use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;
use std::ops::Add;

/// Block production interval.
pub const BLOCK_INTERVAL_MS: i64 = 500;

/// Millisecond offset of 2000-01-01T00:00:00Z from the unix epoch; block
/// timestamp slots count half-second intervals from there.
const BLOCK_TIMESTAMP_EPOCH_MS: i64 = 946_684_800_000;

/// A point in time, microseconds since the unix epoch.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Debug,
    BorshSerialize,
    BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimePoint {
    elapsed_us: i64,
}

impl TimePoint {
    pub const fn from_micros(us: i64) -> Self {
        Self { elapsed_us: us }
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self {
            elapsed_us: ms * 1000,
        }
    }

    pub const fn as_micros(&self) -> i64 {
        self.elapsed_us
    }

    pub const fn as_millis(&self) -> i64 {
        self.elapsed_us / 1000
    }

    pub fn plus_millis(&self, ms: i64) -> Self {
        Self {
            elapsed_us: self.elapsed_us + ms * 1000,
        }
    }
}

impl Add<TimePoint> for TimePoint {
    type Output = TimePoint;

    fn add(self, rhs: TimePoint) -> TimePoint {
        TimePoint::from_micros(self.elapsed_us + rhs.elapsed_us)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.elapsed_us)
    }
}

/// A block timestamp: half-second slots since 2000-01-01T00:00:00Z.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Debug,
    BorshSerialize,
    BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockTimestamp {
    pub slot: u32,
}

impl BlockTimestamp {
    pub const fn from_slot(slot: u32) -> Self {
        Self { slot }
    }
}

impl From<TimePoint> for BlockTimestamp {
    fn from(tp: TimePoint) -> Self {
        let ms = tp.as_millis() - BLOCK_TIMESTAMP_EPOCH_MS;
        Self {
            slot: (ms / BLOCK_INTERVAL_MS) as u32,
        }
    }
}

impl From<BlockTimestamp> for TimePoint {
    fn from(ts: BlockTimestamp) -> Self {
        TimePoint::from_millis(ts.slot as i64 * BLOCK_INTERVAL_MS + BLOCK_TIMESTAMP_EPOCH_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_conversion_roundtrip() {
        let tp = TimePoint::from_millis(BLOCK_TIMESTAMP_EPOCH_MS + 12 * BLOCK_INTERVAL_MS);
        let ts = BlockTimestamp::from(tp);
        assert_eq!(ts.slot, 12);
        assert_eq!(TimePoint::from(ts), tp);
    }

    #[test]
    fn test_plus_millis() {
        let tp = TimePoint::from_micros(1_000);
        assert_eq!(tp.plus_millis(2).as_micros(), 2_001_000);
    }

    #[test]
    fn test_block_interval_advances_slot() {
        let tp = TimePoint::from_millis(BLOCK_TIMESTAMP_EPOCH_MS);
        let next = tp.plus_millis(BLOCK_INTERVAL_MS);
        assert_eq!(BlockTimestamp::from(next).slot, BlockTimestamp::from(tp).slot + 1);
    }
}
