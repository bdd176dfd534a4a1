//! Suppression of the zero-order (DC) term.

use crate::math_tools::mean;
use ndarray::Array2;

/// Subtracts the mean intensity of the hologram and of each present beam image.
///
/// `I_dc = I - mean(I) [- mean(R)] [- mean(O)]`
pub fn remove_dc(
    hologram: &Array2<f64>,
    reference: Option<&Array2<f64>>,
    object: Option<&Array2<f64>>,
) -> Array2<f64> {
    let offset = [Some(hologram), reference, object]
        .into_iter()
        .flatten()
        .filter_map(|image| mean(image.iter()))
        .sum::<f64>();
    hologram.mapv(|v| v - offset)
}
