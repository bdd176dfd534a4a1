//! Fresnel back-propagation of a hologram to the object plane.
//!
//! The hologram multiplied by the reference wave is apodized with a separable Hann window,
//! modulated by a quadratic-phase carrier and propagated with a single centered inverse 2D
//! transform. An optional circular low-pass in the Fourier domain can be applied afterwards.

use crate::data_container::{ImageRole, PixelPitch};
use crate::error::HoloError;
use crate::fft::{centered_ifft2, fft2, fftshift, ifft2};
use crate::math_tools::hann_window_2d;
use ndarray::{Array2, Zip};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Quadratic-phase carrier `exp(-i pi / (lambda d) (kx^2 dx^2 + ky^2 dy^2))` over 0-based indices.
pub fn carrier(shape: (usize, usize), wavelength: f64, distance: f64, pitch: &PixelPitch) -> Array2<Complex64> {
    let scale = -PI / (wavelength * distance);
    Array2::from_shape_fn(shape, |(ky, kx)| {
        let kx = kx as f64 * pitch.dx;
        let ky = ky as f64 * pitch.dy;
        Complex64::from_polar(1.0, scale * (kx * kx + ky * ky))
    })
}

/// Propagation constant `(i / (lambda d)) exp(-i pi lambda d (kx^2 / (nx dx)^2 + ky^2 / (ny dy)^2))`.
pub fn propagation_constant(
    shape: (usize, usize),
    wavelength: f64,
    distance: f64,
    pitch: &PixelPitch,
) -> Array2<Complex64> {
    let (ny, nx) = shape;
    let ld = wavelength * distance;
    let prefactor = Complex64::new(0.0, 1.0 / ld);
    let fx_step = 1.0 / (nx as f64 * pitch.dx);
    let fy_step = 1.0 / (ny as f64 * pitch.dy);
    Array2::from_shape_fn(shape, |(ky, kx)| {
        let fx = kx as f64 * fx_step;
        let fy = ky as f64 * fy_step;
        prefactor * Complex64::from_polar(1.0, -PI * ld * (fx * fx + fy * fy))
    })
}

/// Back-propagates `hologram_dc * reference` over `distance`.
///
/// # Arguments
/// - `hologram_dc`: DC-suppressed hologram intensity.
/// - `reference`: Complex reference wave of the same shape.
/// - `distance`: Signed propagation distance in meters.
/// - `wavelength`: Wavelength in meters.
/// - `pitch`: Pixel pitch in meters.
///
/// # Returns
/// The reconstructed complex field, `InvalidParameter` if `wavelength * distance` is zero, or
/// `ShapeMismatch` if the reference does not match the hologram.
pub fn propagate(
    hologram_dc: &Array2<f64>,
    reference: &Array2<Complex64>,
    distance: f64,
    wavelength: f64,
    pitch: &PixelPitch,
) -> Result<Array2<Complex64>, HoloError> {
    let ld = wavelength * distance;
    if !ld.is_finite() || ld == 0.0 {
        return Err(HoloError::InvalidParameter {
            name: "wavelength * distance",
            value: ld,
        });
    }
    if hologram_dc.dim() != reference.dim() {
        return Err(HoloError::ShapeMismatch {
            role: ImageRole::Reference,
            expected: hologram_dc.dim(),
            found: reference.dim(),
        });
    }
    let shape = hologram_dc.dim();
    let window = hann_window_2d(shape.0, shape.1);

    let mut recon = carrier(shape, wavelength, distance, pitch);
    Zip::from(&mut recon)
        .and(hologram_dc)
        .and(reference)
        .and(&window)
        .for_each(|c, &i, &er, &w| {
            *c *= er * (i * w);
        });

    let mut field = centered_ifft2(&recon);
    let constant = propagation_constant(shape, wavelength, distance, pitch);
    Zip::from(&mut field).and(&constant).for_each(|f, &k| *f *= k);
    Ok(field)
}

/// Circular low-pass in the centered spectrum of `field`.
///
/// Samples farther than `radius * min(ny, nx)` pixels from the spectrum center are zeroed.
/// The inverse transform is applied to the still-centered spectrum without undoing the shift.
pub fn fourier_filter(field: &Array2<Complex64>, radius: f64) -> Array2<Complex64> {
    let (ny, nx) = field.dim();
    let mut spectrum = fftshift(&fft2(field));
    let limit = radius * ny.min(nx) as f64;
    let (cy, cx) = ((ny / 2) as f64, (nx / 2) as f64);
    Zip::indexed(&mut spectrum).for_each(|(y, x), v| {
        let dist = ((y as f64 - cy).powi(2) + (x as f64 - cx).powi(2)).sqrt();
        if dist > limit {
            *v = Complex64::new(0.0, 0.0);
        }
    });
    ifft2(&spectrum)
}
