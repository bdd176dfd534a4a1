//! Path-following unwraps built from the one-dimensional primitive.

use crate::math_tools::unwrap_in_place;
use ndarray::{Array2, ArrayView2, Axis};

/// Unwraps each row independently, left to right.
pub fn unwrap_rows(phase: ArrayView2<f64>) -> Array2<f64> {
    let mut out = phase.to_owned();
    for row in out.axis_iter_mut(Axis(0)) {
        unwrap_in_place(row);
    }
    out
}

/// Unwraps each column independently, top to bottom.
pub fn unwrap_columns(phase: ArrayView2<f64>) -> Array2<f64> {
    let mut out = phase.to_owned();
    for col in out.axis_iter_mut(Axis(1)) {
        unwrap_in_place(col);
    }
    out
}

/// Row unwrap followed by a column unwrap of the row-unwrapped result.
///
/// Fast, but not guaranteed to be globally consistent in the presence of residues.
pub fn unwrap_combined(phase: ArrayView2<f64>) -> Array2<f64> {
    unwrap_columns(unwrap_rows(phase).view())
}
