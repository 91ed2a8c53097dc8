//! Time APIs for obtaining the current time and calculating with points in time and durations.
//!
//! These APIs are made for the proximity engine and are not meant to be general-purpose. Device
//! expiry, read intervals and retry backoff all work at second granularity, while the radio
//! quiesce and scanner restart delays need milliseconds, so the APIs here use millisecond
//! resolution with second-level convenience constructors.

use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// A duration with millisecond resolution.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u32);

impl Duration {
    /// A zero-length duration.
    pub const ZERO: Self = Duration(0);

    /// Creates a `Duration` from a number of milliseconds.
    pub const fn from_millis(millis: u32) -> Self {
        Duration(millis)
    }

    /// Creates a `Duration` representing the given number of seconds.
    pub const fn from_secs(secs: u32) -> Self {
        Duration(secs * 1_000)
    }

    /// Returns the number of whole seconds that fit in `self`.
    pub fn whole_secs(&self) -> u32 {
        self.0 / 1_000
    }

    /// Returns the number of milliseconds represented by `self`.
    pub fn as_millis(&self) -> u32 {
        self.0
    }
}

impl Add for Duration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Duration(self.0.checked_add(rhs.0).expect("duration overflow"))
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Duration(self.0.checked_sub(rhs.0).expect("duration underflow"))
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000 {
            let (secs, submilli) = (self.0 / 1_000, self.0 % 1_000);
            if submilli == 0 {
                write!(f, "{}s", secs)
            } else {
                write!(f, "{}.{:03}s", secs, submilli)
            }
        } else {
            write!(f, "{}ms", self.0)
        }
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

/// A point in time, relative to an unspecified epoch (boot, or an agreed payload epoch).
///
/// This has millisecond resolution. `Timestamp`s are obtained from an implementation of
/// [`Clock`]. Timestamps created from different [`Clock`] instances are not compatible, and
/// mixing them in operations causes unspecified results.
///
/// [`Clock`]: trait.Clock.html
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The timestamp at the epoch itself.
    pub const ZERO: Self = Timestamp(0);

    /// Creates a `Timestamp` from raw milliseconds since the epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Creates a `Timestamp` from whole seconds since the epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs * 1_000)
    }

    /// Returns the raw number of milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns the number of whole seconds since the epoch.
    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000
    }

    /// Calculates the duration of time that has passed between `earlier` and `self`.
    ///
    /// Returns `Duration::ZERO` when `earlier` lies in the future of `self` instead of
    /// panicking, since callers compute expiry arithmetic with timestamps taken at different
    /// points of a sweep.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        let millis_passed = self.0.saturating_sub(earlier.0);
        debug_assert!(millis_passed <= u64::from(u32::max_value()));
        Duration::from_millis(millis_passed as u32)
    }

    /// Adds a whole number of seconds, saturating instead of wrapping.
    ///
    /// Backoff computations can produce very large second counts when the reset cap is
    /// misconfigured; saturating keeps the resulting deadline ordered after `self`.
    pub fn saturating_add_secs(&self, secs: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(secs.saturating_mul(1_000)))
    }
}

/// [`Timestamp`]s can be subtracted, which computes the [`Duration`] between the rhs and lhs.
impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.duration_since(rhs)
    }
}

/// A [`Duration`] can be added to a [`Timestamp`], moving it forwards in time.
impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, d: Duration) -> Self {
        Timestamp(self.0 + u64::from(d.as_millis()))
    }
}

impl AddAssign<Duration> for Timestamp {
    fn add_assign(&mut self, d: Duration) {
        *self = *self + d;
    }
}

/// A [`Duration`] can be subtracted from a [`Timestamp`], moving it backwards in time.
impl Sub<Duration> for Timestamp {
    type Output = Self;

    fn sub(self, d: Duration) -> Self {
        Timestamp(self.0 - u64::from(d.as_millis()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (secs, submilli) = (self.0 / 1_000, self.0 % 1_000);
        if submilli == 0 {
            write!(f, "{}s", secs)
        } else {
            write!(f, "{}.{:03}s", secs, submilli)
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

/// Trait for time providers.
///
/// The hardware interface has to provide an implementation of `Clock` to the stack. Millisecond
/// accuracy is sufficient.
///
/// This trait can also be implemented by a mock clock for testing.
pub trait Clock {
    /// Obtain the current time as a [`Timestamp`].
    ///
    /// The [`Timestamp`]s returned by this function must never move backwards in time.
    fn now(&self) -> Timestamp;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let t = Timestamp::from_secs(10);
        assert_eq!(t + Duration::from_secs(5), Timestamp::from_secs(15));
        assert_eq!(t - Duration::from_millis(500), Timestamp::from_millis(9_500));
        assert_eq!(
            Timestamp::from_secs(15) - Timestamp::from_secs(10),
            Duration::from_secs(5)
        );
        // Reversed operands saturate to zero rather than panicking.
        assert_eq!(t.duration_since(Timestamp::from_secs(20)), Duration::ZERO);
    }

    #[test]
    fn saturating_deadline() {
        let t = Timestamp::from_secs(1);
        let far = t.saturating_add_secs(u64::max_value());
        assert!(far > t);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Duration::from_millis(200)), "200ms");
        assert_eq!(format!("{}", Duration::from_secs(8)), "8s");
        assert_eq!(format!("{}", Timestamp::from_millis(1_500)), "1.500s");
    }
}
