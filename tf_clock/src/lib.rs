use bincode::de::BorrowDecoder;
use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::BorrowDecode;
use bincode::{Decode, Encode};
use core::ops::Sub;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Message and playback times are a u64 count of nanoseconds.
/// It is always positive to simplify the reasoning on the user side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct TfDuration(pub u64);

impl TfDuration {
    pub const MIN: TfDuration = TfDuration(0u64);
    pub const MAX: TfDuration = TfDuration(u64::MAX);

    pub const fn from_nanos(nanos: u64) -> Self {
        TfDuration(nanos)
    }

    pub const fn from_millis(millis: u64) -> Self {
        TfDuration(millis * 1_000_000)
    }

    pub const fn from_secs(secs: u64) -> Self {
        TfDuration(secs * NANOS_PER_SEC)
    }

    /// Negative or NaN inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        TfDuration((secs * NANOS_PER_SEC as f64).round().max(0.0) as u64)
    }

    pub fn as_nanos(&self) -> u64 {
        let Self(nanos) = self;
        *nanos
    }

    pub fn saturating_sub(self, rhs: TfDuration) -> TfDuration {
        TfDuration(self.0.saturating_sub(rhs.0))
    }

    pub fn saturating_add(self, rhs: TfDuration) -> TfDuration {
        TfDuration(self.0.saturating_add(rhs.0))
    }
}

impl Sub for TfDuration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        let TfDuration(lhs) = self;
        let TfDuration(rhs) = rhs;
        TfDuration(lhs - rhs)
    }
}

impl Encode for TfDuration {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        let TfDuration(nanos) = self;
        nanos.encode(encoder)
    }
}

impl Decode for TfDuration {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(TfDuration(u64::decode(decoder)?))
    }
}

impl<'de> BorrowDecode<'de> for TfDuration {
    fn borrow_decode<D: BorrowDecoder<'de>>(decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(TfDuration(u64::decode(decoder)?))
    }
}

impl Display for TfDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let TfDuration(nanos) = *self;
        if nanos >= 86_400_000_000_000 {
            write!(f, "{:.3} d", nanos as f64 / 86_400_000_000_000.0)
        } else if nanos >= 3_600_000_000_000 {
            write!(f, "{:.3} h", nanos as f64 / 3_600_000_000_000.0)
        } else if nanos >= 60_000_000_000 {
            write!(f, "{:.3} m", nanos as f64 / 60_000_000_000.0)
        } else if nanos >= 1_000_000_000 {
            write!(f, "{:.3} s", nanos as f64 / 1_000_000_000.0)
        } else if nanos >= 1_000_000 {
            write!(f, "{:.3} ms", nanos as f64 / 1_000_000.0)
        } else if nanos >= 1_000 {
            write!(f, "{:.3} µs", nanos as f64 / 1_000.0)
        } else {
            write!(f, "{nanos} ns")
        }
    }
}

/// A stamp on the playback timeline is a duration from the start of the recording epoch.
pub type TfTime = TfDuration;

/// Represents a closed time range.
#[derive(Copy, Clone, Debug, Encode, Decode, Serialize, Deserialize, PartialEq, Eq)]
pub struct TfTimeRange {
    pub start: TfTime,
    pub end: TfTime,
}

impl TfTimeRange {
    pub fn contains(&self, time: TfTime) -> bool {
        self.start <= time && time <= self.end
    }

    /// Same as `contains` with both bounds widened by `tolerance`.
    pub fn contains_with_tolerance(&self, time: TfTime, tolerance: TfDuration) -> bool {
        self.start.saturating_sub(tolerance) <= time && time <= self.end.saturating_add(tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_arithmetics() {
        let a = TfDuration::from_nanos(10);
        let b = TfDuration::from_nanos(20);
        assert_eq!(b - a, TfDuration::from_nanos(10));
        assert_eq!(a.saturating_sub(b), TfDuration::MIN);
        assert_eq!(TfDuration::MAX.saturating_add(a), TfDuration::MAX);
    }

    #[test]
    fn test_seconds_conversions() {
        assert_eq!(TfDuration::from_secs(2).as_nanos(), 2_000_000_000);
        assert_eq!(TfDuration::from_millis(500).as_nanos(), 500_000_000);
        assert_eq!(TfDuration::from_secs_f64(0.5), TfDuration::from_millis(500));
        assert_eq!(TfDuration::from_secs_f64(-1.0), TfDuration::MIN);
    }

    #[test]
    fn test_range_tolerance() {
        let range = TfTimeRange {
            start: TfTime::from_nanos(100),
            end: TfTime::from_nanos(200),
        };
        let at = TfTime::from_nanos;
        let tolerance = TfDuration::from_nanos(5);
        assert!(range.contains(at(100)));
        assert!(range.contains(at(200)));
        assert!(!range.contains(at(201)));
        assert!(range.contains_with_tolerance(at(205), tolerance));
        assert!(!range.contains_with_tolerance(at(206), tolerance));
        assert!(range.contains_with_tolerance(at(95), tolerance));
        assert!(!range.contains_with_tolerance(at(94), tolerance));
    }

    #[test]
    fn test_range_tolerance_saturates_at_the_epoch() {
        let range = TfTimeRange {
            start: TfTime::from_nanos(3),
            end: TfTime::from_nanos(3),
        };
        assert!(range.contains_with_tolerance(TfTime::MIN, TfDuration::from_nanos(10)));
        assert!(range.contains_with_tolerance(TfTime::MAX, TfDuration::MAX));
    }

    #[test]
    fn test_tfduration_display() {
        assert_eq!(TfDuration(42).to_string(), "42 ns");
        assert_eq!(TfDuration(1_500).to_string(), "1.500 µs");
        assert_eq!(TfDuration::from_millis(2).to_string(), "2.000 ms");
        assert_eq!(TfDuration::from_secs(3).to_string(), "3.000 s");
    }

    #[test]
    fn test_bincode_roundtrip() {
        let config = bincode::config::standard();
        let original = TfDuration::from_secs(7);
        let bytes = bincode::encode_to_vec(original, config).unwrap();
        let (decoded, _): (TfDuration, usize) = bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(decoded, original);
    }
}
