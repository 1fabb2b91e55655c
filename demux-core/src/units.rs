//! Common units: timestamps, durations, and the timebase that relates them to wall-clock time.
//!
//! Unlike the upstream timebase math this is modelled on, packets in this workspace can carry
//! negative presentation timestamps (encoder delay) and an explicit "undefined" sentinel, so
//! [`Timestamp`] is a signed newtype rather than a bare `u64` alias.

use std::fmt;
use std::ops::{Add, Sub};

/// A signed instant in time, in `TimeBase` units, relative to the start of a stream.
///
/// `i64::MIN` is reserved as the `UNDEFINED` sentinel (mirrors the `INT64_MIN` convention for an
/// unknown PTS/DTS).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
    pub const UNDEFINED: Timestamp = Timestamp(i64::MIN);

    #[inline]
    pub const fn new(ticks: i64) -> Self {
        Timestamp(ticks)
    }

    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0 == i64::MIN
    }

    #[inline]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Add a duration, saturating at `i64::MAX`. Returns `None` if `self` is `UNDEFINED`.
    pub fn checked_add(self, dur: Duration) -> Option<Timestamp> {
        if self.is_undefined() || dur.is_undefined() {
            return None;
        }
        Some(Timestamp(self.0.saturating_add(dur.ticks() as i64)))
    }

    /// The duration by which `self` is earlier than `to` (i.e. `to - self`), or `None` if `to` is
    /// not later than `self` or either endpoint is `UNDEFINED`.
    pub fn duration_to(self, to: Timestamp) -> Option<Duration> {
        if self.is_undefined() || to.is_undefined() || to.0 < self.0 {
            return None;
        }
        Some(Duration::new((to.0 - self.0) as u64))
    }

    /// The duration by which `self` is later than `from` (i.e. `self - from`), or `None` if
    /// `self` is earlier than `from` or either endpoint is `UNDEFINED`.
    pub fn duration_from(self, from: Timestamp) -> Option<Duration> {
        from.duration_to(self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            write!(f, "undefined")
        }
        else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<i64> for Timestamp {
    fn from(ticks: i64) -> Self {
        Timestamp(ticks)
    }
}

/// A positive span of time in `TimeBase` units. `u64::MAX` is the `UNDEFINED` sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    pub const ZERO: Duration = Duration(0);
    pub const UNDEFINED: Duration = Duration(u64::MAX);

    #[inline]
    pub const fn new(ticks: u64) -> Self {
        Duration(ticks)
    }

    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0 == u64::MAX
    }

    #[inline]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn saturating_add(self, rhs: Duration) -> Duration {
        if self.is_undefined() || rhs.is_undefined() {
            return Duration::UNDEFINED;
        }
        Duration(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub const fn saturating_sub(self, rhs: Duration) -> Duration {
        if self.is_undefined() {
            return Duration::UNDEFINED;
        }
        if rhs.is_undefined() {
            return Duration::ZERO;
        }
        Duration(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub const fn min(self, rhs: Duration) -> Duration {
        if self.0 < rhs.0 {
            self
        }
        else {
            rhs
        }
    }
}

impl From<u64> for Duration {
    fn from(ticks: u64) -> Self {
        Duration(ticks)
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        self.saturating_add(rhs)
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        self.saturating_sub(rhs)
    }
}

/// A duration of time in seconds, stored as whole seconds plus a fractional remainder.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct Time {
    pub seconds: u64,
    pub frac: f64,
}

impl Time {
    const SECONDS_PER_MINUTE: u64 = 60;
    const SECONDS_PER_HOUR: u64 = 60 * 60;
    const NANOSECONDS_PER_SECOND: u32 = 1_000_000_000;
    const NANOSECONDS_PER_SECOND_INV: f64 = 1.0 / 1_000_000_000.0;

    pub fn new(seconds: u64, frac: f64) -> Self {
        Time { seconds, frac }
    }

    pub fn from_ss(s: u8, ns: u32) -> Option<Time> {
        if s > 59 || ns >= Time::NANOSECONDS_PER_SECOND {
            return None;
        }
        Some(Time { seconds: u64::from(s), frac: Time::NANOSECONDS_PER_SECOND_INV * f64::from(ns) })
    }

    pub fn from_mmss(m: u8, s: u8, ns: u32) -> Option<Time> {
        if m > 59 || s > 59 || ns >= Time::NANOSECONDS_PER_SECOND {
            return None;
        }
        let seconds = (Time::SECONDS_PER_MINUTE * u64::from(m)) + u64::from(s);
        Some(Time { seconds, frac: Time::NANOSECONDS_PER_SECOND_INV * f64::from(ns) })
    }

    pub fn from_hhmmss(h: u32, m: u8, s: u8, ns: u32) -> Option<Time> {
        if m > 59 || s > 59 || ns >= Time::NANOSECONDS_PER_SECOND {
            return None;
        }
        let seconds = (Time::SECONDS_PER_HOUR * u64::from(h))
            + (Time::SECONDS_PER_MINUTE * u64::from(m))
            + u64::from(s);
        Some(Time { seconds, frac: Time::NANOSECONDS_PER_SECOND_INV * f64::from(ns) })
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.seconds as f64 + self.frac
    }
}

impl From<f64> for Time {
    fn from(seconds: f64) -> Self {
        if seconds >= 0.0 {
            Time::new(seconds.trunc() as u64, seconds.fract())
        }
        else {
            Time::new(0, 0.0)
        }
    }
}

/// The conversion factor between `Timestamp`/`Duration` ticks and seconds: `numer / denom`
/// seconds per tick.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeBase {
    pub numer: u32,
    pub denom: u32,
}

impl TimeBase {
    /// Create a new `TimeBase`. Panics if either the numerator or denominator is 0.
    pub fn new(numer: u32, denom: u32) -> Self {
        assert!(numer > 0 && denom > 0, "TimeBase cannot have a 0 numerator or denominator");
        TimeBase { numer, denom }
    }

    /// Accurately compute the `Time` equivalent to `ts` ticks in this timebase.
    pub fn calc_time(&self, ts: Duration) -> Time {
        let ticks = ts.ticks();
        let dividend = u128::from(ticks) * u128::from(self.numer);

        // A 64-bit float has a 52-bit mantissa; below that threshold plain division is exact
        // enough, above it split the calculation to avoid losing precision in the integer part.
        if dividend < (1 << 52) {
            let seconds = (dividend as f64) / f64::from(self.denom);
            Time::new(seconds.trunc() as u64, seconds.fract())
        }
        else {
            let quotient = dividend / u128::from(self.denom);
            let rem = (dividend - (quotient * u128::from(self.denom))) as u32;
            let frac = f64::from(rem) / f64::from(self.denom);
            Time::new(quotient as u64, frac)
        }
    }

    /// Accurately compute the number of ticks in this timebase equivalent to `time` seconds.
    pub fn calc_ticks(&self, time: Time) -> Duration {
        let k = 1.0 / f64::from(self.numer);
        let product = u128::from(time.seconds) * u128::from(self.denom);

        let a = if product > (1 << 52) {
            let u = ((product & !0xffff_ffff_ffff) >> 48) as u64;
            let l = (product & 0xffff_ffff_ffff) as u64;
            ((((u as f64) * k) as u64) << 48).wrapping_add((l as f64 * k) as u64)
        }
        else {
            ((product as f64) * k) as u64
        };

        let b = (k * f64::from(self.denom) * time.frac) as u64;

        Duration::new(a.wrapping_add(b))
    }
}

impl From<TimeBase> for f64 {
    fn from(timebase: TimeBase) -> Self {
        f64::from(timebase.numer) / f64::from(timebase.denom)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer, self.denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_timebase_roundtrip() {
        let tb = TimeBase::new(1, 320);

        assert_eq!(tb.calc_time(Duration::new(0)), Time::new(0, 0.0));
        assert_eq!(tb.calc_time(Duration::new(12_345)), Time::new(38, 0.578125));
        assert_eq!(tb.calc_ticks(Time::new(38, 0.578125)), Duration::new(12_345));
    }

    #[test]
    fn verify_timestamp_undefined() {
        assert!(Timestamp::UNDEFINED.is_undefined());
        assert!(!Timestamp::ZERO.is_undefined());
        assert_eq!(Timestamp::new(-5).duration_to(Timestamp::new(5)), Some(Duration::new(10)));
        assert_eq!(Timestamp::new(5).duration_to(Timestamp::new(-5)), None);
    }

    #[test]
    fn verify_duration_saturates_on_undefined() {
        assert_eq!(Duration::UNDEFINED.saturating_add(Duration::new(5)), Duration::UNDEFINED);
        assert_eq!(Duration::new(5).saturating_sub(Duration::UNDEFINED), Duration::ZERO);
    }
}
