//! Numeric-to-musical mapping helpers shared by both sonification modes.

use crate::error::{Error, Result};

/// Highest value a MIDI data byte (pitch, velocity, program) can carry.
pub const MIDI_MAX: u8 = 127;

/// Truncate toward zero and clamp into the MIDI data range. NaN maps to 0.
pub fn midi_clamp(value: f64) -> u8 {
    (value as i64).clamp(0, MIDI_MAX as i64) as u8
}

/// Closed min/max span of a signal, ignoring non-finite samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// Span of the finite values, or `None` if there are none.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some(ValueRange { min: v, max: v }),
                Some(r) => Some(ValueRange {
                    min: r.min.min(v),
                    max: r.max.max(v),
                }),
            })
    }

    pub fn is_flat(&self) -> bool {
        self.min == self.max
    }

    /// Linearly map `value` from this span into `[lo, hi]`.
    ///
    /// A flat span yields `lo` instead of dividing by zero.
    pub fn rescale(&self, value: f64, lo: u8, hi: u8) -> u8 {
        if self.is_flat() {
            return lo;
        }
        let t = (value - self.min) / (self.max - self.min);
        midi_clamp(lo as f64 + t * (hi as f64 - lo as f64))
    }
}

/// Rescale a whole array into `[lo, hi]` against its own min/max.
pub fn rescale(values: &[f64], lo: u8, hi: u8) -> Vec<u8> {
    match ValueRange::of(values.iter().copied()) {
        Some(range) => values.iter().map(|&v| range.rescale(v, lo, hi)).collect(),
        None => vec![lo; values.len()],
    }
}

/// Divide every sample by the curve's maximum so the peak lands on 1.0.
/// Non-finite samples become 0.0.
pub fn normalize_to_max(values: &[f64]) -> Result<Vec<f64>> {
    let max = ValueRange::of(values.iter().copied()).map(|r| r.max);
    match max {
        Some(max) if max > 0.0 => Ok(values
            .iter()
            .map(|&v| if v.is_finite() { v / max } else { 0.0 })
            .collect()),
        Some(max) => Err(Error::invalid(format!(
            "cannot normalize intensities: maximum is {max}, expected a positive value"
        ))),
        None => Err(Error::invalid(
            "cannot normalize intensities: no finite samples",
        )),
    }
}

/// Piecewise-linear interpolation of `x` from `from` onto `to`, clamped to
/// the end points. A zero-width `from` span yields `to.0`.
pub fn interpolate(x: f64, from: (f64, f64), to: (f64, f64)) -> f64 {
    let (x0, x1) = from;
    let (y0, y1) = to;
    if x1 == x0 {
        return y0;
    }
    let t = ((x - x0) / (x1 - x0)).clamp(0.0, 1.0);
    y0 + t * (y1 - y0)
}
