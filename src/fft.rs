//! Two-dimensional Fourier helpers on top of `rustfft`.
//!
//! Arrays are row-major `(ny, nx)`. The forward transform is unnormalized and the inverse
//! transform is scaled by `1 / (ny * nx)`, matching the numpy convention. The shift helpers
//! implement the usual centered-spectrum convention.

use ndarray::parallel::prelude::*;
use ndarray::{Array2, Axis, Zip};
use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};
use std::f64::consts::PI;

/// Transforms every row, then every column, of `data` in place. Lanes run in parallel.
fn transform_2d(data: &mut Array2<Complex64>, direction: FftDirection) {
    let (ny, nx) = data.dim();
    if ny == 0 || nx == 0 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();
    let row_fft = planner.plan_fft(nx, direction);
    let col_fft = planner.plan_fft(ny, direction);

    for (axis, fft) in [(Axis(0), &row_fft), (Axis(1), &col_fft)] {
        data.axis_iter_mut(axis)
            .into_par_iter()
            .for_each(|mut lane| {
                let mut buffer = lane.to_vec();
                fft.process(&mut buffer);
                lane.iter_mut().zip(buffer).for_each(|(v, b)| *v = b);
            });
    }
}

/// Unnormalized forward 2D DFT.
pub fn fft2(input: &Array2<Complex64>) -> Array2<Complex64> {
    let mut out = input.to_owned();
    transform_2d(&mut out, FftDirection::Forward);
    out
}

/// Inverse 2D DFT, scaled by `1 / (ny * nx)`.
pub fn ifft2(input: &Array2<Complex64>) -> Array2<Complex64> {
    let mut out = input.to_owned();
    transform_2d(&mut out, FftDirection::Inverse);
    let n = out.len().max(1) as f64;
    out.mapv_inplace(|v| v / n);
    out
}

/// Circularly rolls a 2D array by `(shift_y, shift_x)`.
fn roll<T: Clone>(input: &Array2<T>, shift_y: usize, shift_x: usize) -> Array2<T> {
    let (ny, nx) = input.dim();
    if ny == 0 || nx == 0 {
        return input.clone();
    }
    Array2::from_shape_fn((ny, nx), |(y, x)| {
        input[[(y + ny - shift_y % ny) % ny, (x + nx - shift_x % nx) % nx]].clone()
    })
}

/// Moves the zero-frequency sample to the array center.
pub fn fftshift<T: Clone>(input: &Array2<T>) -> Array2<T> {
    let (ny, nx) = input.dim();
    roll(input, ny / 2, nx / 2)
}

/// Inverse of [`fftshift`], also for odd dimensions.
pub fn ifftshift<T: Clone>(input: &Array2<T>) -> Array2<T> {
    let (ny, nx) = input.dim();
    roll(input, ny - ny / 2, nx - nx / 2)
}

/// Centered inverse transform: `fftshift(ifft2(ifftshift(x)))`.
pub fn centered_ifft2(input: &Array2<Complex64>) -> Array2<Complex64> {
    fftshift(&ifft2(&ifftshift(input)))
}

/// Mirrors `a` into an even-symmetric array of twice the size in both directions.
///
/// With this extension a periodic transform of the result behaves like a cosine transform of
/// the original, i.e. it imposes Neumann boundaries.
fn mirror_extend(a: &Array2<f64>) -> Array2<f64> {
    let (ny, nx) = a.dim();
    Array2::from_shape_fn((2 * ny, 2 * nx), |(y, x)| {
        let sy = if y < ny { y } else { 2 * ny - 1 - y };
        let sx = if x < nx { x } else { 2 * nx - 1 - x };
        a[[sy, sx]]
    })
}

/// Solves the discrete Poisson equation `L z = rhs` with Neumann boundaries, where `L` is the
/// five-point Laplacian with unit spacing.
///
/// The solution is defined up to a constant; the returned solution has the constant component
/// removed. `rhs` must have zero sum for the equation to be consistent, any mean is discarded.
pub fn solve_neumann_poisson(rhs: &Array2<f64>) -> Array2<f64> {
    let (ny, nx) = rhs.dim();
    if ny == 0 || nx == 0 {
        return rhs.clone();
    }
    let extended = mirror_extend(rhs);
    let (my, mx) = extended.dim();
    let mut spectrum = fft2(&extended.mapv(|v| Complex64::new(v, 0.0)));

    Zip::indexed(&mut spectrum).for_each(|(ky, kx), value| {
        let eig = 2.0 * ((2.0 * PI * ky as f64 / my as f64).cos() - 1.0)
            + 2.0 * ((2.0 * PI * kx as f64 / mx as f64).cos() - 1.0);
        if eig.abs() > 1e-20 {
            *value /= eig;
        } else {
            // DC component, the solution is unique up to a constant
            *value = Complex64::new(0.0, 0.0);
        }
    });

    let solved = ifft2(&spectrum);
    Array2::from_shape_fn((ny, nx), |(y, x)| solved[[y, x]].re)
}
