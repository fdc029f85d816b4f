//! Simulation time.
//!
//! Kairos time is logical, not wall-clock: a finite, non-decreasing `f64`
//! driven forward exclusively by the plan scheduler. "Asynchrony" exists
//! only as future-timestamped plans.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// A point in simulation time.
///
/// `Time` wraps a finite `f64` and carries a total order, which lets plans
/// live in ordered collections without `NaN` edge cases.
///
/// # Examples
///
/// ```
/// use kairos::Time;
///
/// let t = Time::new(1.5).unwrap();
/// assert!(t > Time::START);
/// assert!(Time::new(f64::NAN).is_err());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(f64);

impl Time {
    /// The start of every simulation: `t = 0.0`.
    pub const START: Self = Self(0.0);

    /// Creates a time point from a finite `f64`.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::InvalidTime` if `value` is NaN or infinite.
    pub fn new(value: f64) -> Result<Self, ContractError> {
        if value.is_finite() {
            Ok(Self(value))
        } else {
            Err(ContractError::InvalidTime { value })
        }
    }

    /// Returns the raw `f64` value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Returns the later of two time points.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }

    /// Offsets the time point by `delta`, validating the result.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::InvalidTime` if `delta` is non-finite or
    /// the sum overflows to infinity.
    pub fn checked_add(self, delta: f64) -> Result<Self, ContractError> {
        Self::new(self.0 + delta)
    }
}

// Finite-only invariant makes the order total; equality follows the same
// bitwise comparison so `Eq` and `Ord` agree on signed zero.
impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add<f64> for Time {
    type Output = Self;

    /// # Panics
    ///
    /// Panics if the result is not finite (`rhs` is NaN or the sum
    /// overflows). Use [`Time::checked_add`] for a fallible offset. A
    /// non-finite time must never reach the scheduler: under a total
    /// order it would sort after every finite time, and once the clock
    /// advanced to it every later finite schedule would be rejected.
    fn add(self, rhs: f64) -> Self {
        match self.checked_add(rhs) {
            Ok(time) => time,
            Err(err) => panic!("{err}"),
        }
    }
}

impl Sub for Time {
    type Output = f64;

    fn sub(self, rhs: Self) -> f64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
