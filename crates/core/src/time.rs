// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media timestamps and display time codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MILLI: u64 = 1_000_000;

/// A media timestamp (seconds plus nanoseconds).
///
/// `nanoseconds` is always normalized to `< 1_000_000_000`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeStamp {
    pub seconds: u64,
    pub nanoseconds: u32,
}

impl TimeStamp {
    pub const ZERO: Self = Self { seconds: 0, nanoseconds: 0 };

    pub const fn new(seconds: u64, nanoseconds: u32) -> Self {
        let extra = nanoseconds as u64 / NANOS_PER_SECOND;
        #[allow(clippy::cast_possible_truncation)]
        let nanoseconds = (nanoseconds as u64 % NANOS_PER_SECOND) as u32;
        Self { seconds: seconds + extra, nanoseconds }
    }

    pub const fn from_millis(millis: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let nanoseconds = ((millis % 1000) * NANOS_PER_MILLI) as u32;
        Self { seconds: millis / 1000, nanoseconds }
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let nanoseconds = (nanos % NANOS_PER_SECOND) as u32;
        Self { seconds: nanos / NANOS_PER_SECOND, nanoseconds }
    }

    /// Timestamp of sample number `samples` at `sample_rate` Hz.
    ///
    /// A zero sample rate yields [`TimeStamp::ZERO`].
    pub const fn from_samples(samples: u64, sample_rate: u32) -> Self {
        if sample_rate == 0 {
            return Self::ZERO;
        }
        let rate = sample_rate as u64;
        let seconds = samples / rate;
        let remainder = samples % rate;
        #[allow(clippy::cast_possible_truncation)]
        let nanoseconds = ((remainder as u128 * NANOS_PER_SECOND as u128) / rate as u128) as u32;
        Self { seconds, nanoseconds }
    }

    pub const fn to_millis(self) -> u64 {
        self.seconds * 1000 + self.nanoseconds as u64 / NANOS_PER_MILLI
    }

    pub const fn to_nanos(self) -> u64 {
        self.seconds * NANOS_PER_SECOND + self.nanoseconds as u64
    }

    pub const fn is_zero(self) -> bool {
        self.seconds == 0 && self.nanoseconds == 0
    }
}

impl Add for TimeStamp {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_nanos(self.to_nanos().saturating_add(rhs.to_nanos()))
    }
}

impl Sub for TimeStamp {
    type Output = Self;

    /// Saturates at zero.
    fn sub(self, rhs: Self) -> Self {
        Self::from_nanos(self.to_nanos().saturating_sub(rhs.to_nanos()))
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}

/// Hours:minutes:seconds:hundredths, as shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeCode {
    pub h: u8,
    pub m: u8,
    pub s: u8,
    /// Hundredths of a second.
    pub f: u8,
}

impl From<TimeStamp> for TimeCode {
    #[allow(clippy::cast_possible_truncation)]
    fn from(ts: TimeStamp) -> Self {
        let mut seconds = ts.seconds;
        let h = seconds / 3600;
        seconds -= h * 3600;
        let m = seconds / 60;
        seconds -= m * 60;
        Self {
            h: h.min(u64::from(u8::MAX)) as u8,
            m: m as u8,
            s: seconds as u8,
            f: (ts.nanoseconds / 10_000_000) as u8,
        }
    }
}

impl TimeCode {
    /// Milliseconds represented by this time code.
    pub fn to_millis(self) -> u64 {
        1000 * (u64::from(self.h) * 3600 + u64::from(self.m) * 60 + u64::from(self.s))
            + 10 * u64::from(self.f)
    }
}

impl fmt::Display for TimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}:{:02}", self.h, self.m, self.s, self.f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_samples() {
        let ts = TimeStamp::from_samples(44_100 + 22_050, 44_100);
        assert_eq!(ts.seconds, 1);
        assert_eq!(ts.nanoseconds, 500_000_000);
        assert_eq!(TimeStamp::from_samples(1000, 0), TimeStamp::ZERO);
    }

    #[test]
    fn test_millis_round_trip_and_ordering() {
        let ts = TimeStamp::from_millis(61_250);
        assert_eq!(ts.to_millis(), 61_250);
        assert!(TimeStamp::from_millis(999) < TimeStamp::from_millis(1000));
        assert_eq!(TimeStamp::new(1, 1_500_000_000), TimeStamp::new(2, 500_000_000));
    }

    #[test]
    fn test_arithmetic_saturates() {
        let a = TimeStamp::from_millis(1500);
        let b = TimeStamp::from_millis(700);
        assert_eq!((a - b).to_millis(), 800);
        assert_eq!((b - a), TimeStamp::ZERO);
        assert_eq!((a + b).to_millis(), 2200);
    }

    #[test]
    fn test_time_code_conversion() {
        let tc = TimeCode::from(TimeStamp::new(3 * 3600 + 25 * 60 + 7, 340_000_000));
        assert_eq!(tc, TimeCode { h: 3, m: 25, s: 7, f: 34 });
        assert_eq!(tc.to_string(), "03:25:07:34");
        assert_eq!(tc.to_millis(), 1000 * (3 * 3600 + 25 * 60 + 7) + 340);
    }
}
