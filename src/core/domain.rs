use std::fmt;

use serde::{Deserialize, Serialize};

// --- Search Types ---

/// The bracket `[low, high]` and the starting point of a 1-D search.
///
/// Fields are public so callers can build any interval they like; the
/// minimizer checks `low < high` and `low <= guess <= high` before it
/// evaluates anything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchInterval {
    pub low: f64,
    pub high: f64,
    pub guess: f64,
}

impl SearchInterval {
    pub fn new(low: f64, high: f64, guess: f64) -> Self {
        Self { low, high, guess }
    }

    /// Interval with the guess placed at the midpoint.
    pub fn centered(low: f64, high: f64) -> Self {
        Self::new(low, high, 0.5 * (low + high))
    }

    /// True when the bounds are finite, ordered, and contain the guess.
    pub fn is_valid(&self) -> bool {
        self.low.is_finite()
            && self.high.is_finite()
            && self.guess.is_finite()
            && self.low < self.high
            && (self.low..=self.high).contains(&self.guess)
    }
}

/// Convergence width of the search: `relative_scale * |x| + absolute`.
///
/// `relative_scale` is pinned to the square root of `f64::EPSILON` so the
/// minimum step scales with the magnitude of `x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    absolute: f64,
    relative_scale: f64,
}

impl Tolerance {
    pub fn new(absolute: f64) -> Self {
        Self {
            absolute,
            relative_scale: f64::EPSILON.sqrt(),
        }
    }

    pub fn absolute(&self) -> f64 {
        self.absolute
    }

    /// Effective tolerance width at `x`.
    #[inline]
    pub fn width_at(&self, x: f64) -> f64 {
        self.relative_scale * x.abs() + self.absolute
    }

    pub fn is_valid(&self) -> bool {
        self.absolute.is_finite() && self.absolute >= 0.0
    }
}

// --- Objective Types ---

/// The three electron counts evaluated per trial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeState {
    /// N: the reference system.
    Reference,
    /// N+1: one extra electron (anion relative to the reference).
    PlusOne,
    /// N-1: one electron removed (cation relative to the reference).
    MinusOne,
}

impl ChargeState {
    /// Order in which the sub-evaluations are run.
    pub const ALL: [ChargeState; 3] = [Self::Reference, Self::PlusOne, Self::MinusOne];

}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Reference => "N",
            Self::PlusOne => "N+1",
            Self::MinusOne => "N-1",
        };
        f.write_str(label)
    }
}

/// Gaussian route keyword that fixes the range-separation parameter to `w`.
///
/// `w` is written in units of 1e-4, truncated, as a five-digit field
/// followed by five zeros. Negative values saturate to zero.
pub fn iop_keyword(w: f64) -> String {
    let scaled = (w * 1e4) as u32;
    format!("IOp(3/107={scaled:05}00000,3/108={scaled:05}00000)")
}
