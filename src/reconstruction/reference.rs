//! Synthesis of the complex reference wave.

use ndarray::Array2;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Builds the complex reference field from the reference intensity.
///
/// `Er[y, x] = sqrt(R[y, x]) * exp(i 2 pi dx x sin(angle) / wavelength)` for a tilted reference,
/// and `sqrt(R[y, x])` with zero phase when `angle` is `None`. Without a reference intensity a
/// unit amplitude over `shape` is used.
///
/// # Arguments
/// - `reference`: Reference beam intensity, or `None`.
/// - `shape`: Shape `(ny, nx)` of the hologram.
/// - `angle`: Horizontal tilt of the reference beam in radians.
/// - `wavelength`: Wavelength in meters.
/// - `dx`: Horizontal pixel pitch in meters.
pub fn reference_wave(
    reference: Option<&Array2<f64>>,
    shape: (usize, usize),
    angle: Option<f64>,
    wavelength: f64,
    dx: f64,
) -> Array2<Complex64> {
    let amplitude = |y: usize, x: usize| reference.map_or(1.0, |r| r[[y, x]].max(0.0).sqrt());
    match angle {
        Some(theta) => {
            let slope = 2.0 * PI * dx * theta.sin() / wavelength;
            Array2::from_shape_fn(shape, |(y, x)| {
                Complex64::from_polar(amplitude(y, x), slope * x as f64)
            })
        }
        None => Array2::from_shape_fn(shape, |(y, x)| Complex64::new(amplitude(y, x), 0.0)),
    }
}
