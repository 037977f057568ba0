use serde::{Deserialize, Serialize};

/// Closed numeric interval `[min, max]`. Ordering is not enforced here so a
/// target range may run "backwards" (`min > max`) and the mapping inverts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_degenerate(&self) -> bool {
        self.span() == 0.0
    }
}

/// Linear map from a source range onto a target range, one per axis.
///
/// Values outside the source range extrapolate; nothing is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rescaler {
    pub source: Range,
    pub target: Range,
}

impl Rescaler {
    pub fn new(source: Range, target: Range) -> Self {
        Self { source, target }
    }

    /// `target.min + (value - source.min) * target.span() / source.span()`.
    ///
    /// A zero-width source range maps every value to `target.min`.
    pub fn rescale(&self, value: f64) -> f64 {
        interpolate(value, self.source, self.target)
    }

    /// Maps a target-space value back into source space.
    ///
    /// A zero-width target range maps every value to `source.min`.
    pub fn inverse(&self, value: f64) -> f64 {
        interpolate(value, self.target, self.source)
    }
}

fn interpolate(value: f64, from: Range, to: Range) -> f64 {
    if from.is_degenerate() {
        return to.min;
    }
    to.min + (value - from.min) * to.span() / from.span()
}
