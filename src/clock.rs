//! Virtual time base for sandboxed runs.
//!
//! Programs are built with the Go `faketime` runtime, which never sleeps in
//! real time and stamps every stdout/stderr write with a virtual Unix
//! timestamp. A [`VirtualClock`] carries the epoch those timestamps start
//! from so that delays can be computed per run without shared state.

use std::time::Duration;

/// Unix time of the playground epoch, 2009-11-10T23:00:00Z, in nanoseconds.
pub const PLAYGROUND_EPOCH_NANOS: i64 = 1_257_894_000_000_000_000;

/// Smallest distinguishable step between two causally ordered writes.
pub const TICK: Duration = Duration::from_nanos(1);

/// A point on the virtual time line, in Unix nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualInstant(i64);

impl VirtualInstant {
    /// Create an instant from Unix nanoseconds.
    #[must_use]
    pub const fn from_unix_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Return the instant as Unix nanoseconds.
    #[must_use]
    pub const fn unix_nanos(self) -> i64 {
        self.0
    }

    /// Return the non-negative distance from `earlier` to `self`.
    ///
    /// Instants before `earlier` yield a zero duration.
    #[must_use]
    pub fn saturating_since(self, earlier: Self) -> Duration {
        u64::try_from(self.0.saturating_sub(earlier.0)).map_or(Duration::ZERO, Duration::from_nanos)
    }

    /// Return the instant `delta` after `self`, saturating at the end of time.
    #[must_use]
    pub fn advanced_by(self, delta: Duration) -> Self {
        let nanos = i64::try_from(delta.as_nanos()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

/// Per-run virtual clock configuration.
///
/// The clock is a plain value handed to each run; two concurrent requests
/// each own their own copy and cannot perturb each other's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualClock {
    epoch: VirtualInstant,
}

impl VirtualClock {
    /// Create a clock starting at `epoch`.
    #[must_use]
    pub const fn starting_at(epoch: VirtualInstant) -> Self {
        Self { epoch }
    }

    /// Create a clock starting at the playground epoch.
    #[must_use]
    pub const fn playground() -> Self {
        Self::starting_at(VirtualInstant::from_unix_nanos(PLAYGROUND_EPOCH_NANOS))
    }

    /// Return the instant at which virtual time starts.
    #[must_use]
    pub const fn epoch(&self) -> VirtualInstant {
        self.epoch
    }

    /// Return how far `instant` lies after the epoch.
    #[must_use]
    pub fn elapsed_at(&self, instant: VirtualInstant) -> Duration {
        instant.saturating_since(self.epoch)
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::playground()
    }
}
