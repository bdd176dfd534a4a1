//! This module provides the scalar and array helpers shared by the reconstruction pipeline:
//! the Hann apodization window, phase wrapping, the one-dimensional unwrap primitive, and a few
//! statistics (mean, sample standard deviation, percentile).

use ndarray::{Array1, Array2, ArrayViewMut1, Zip};
use std::f64::consts::PI;

/// Builds a Hann window of length `m`.
///
/// Follows the numpy definition `0.5 * (1 - cos(2 pi n / (m - 1)))`, so the first and last
/// samples are zero. A window of length one is `[1.0]`.
pub fn hann_window(m: usize) -> Array1<f64> {
    if m == 1 {
        return Array1::ones(1);
    }
    let mut window = Array1::ones(m);
    apply_hanning(&mut window.view_mut());
    window
}

/// Applies the Hann window to the given signal in place.
///
/// The window is evaluated on a normalized coordinate in [0, 1] spanning the whole signal.
pub fn apply_hanning(signal: &mut ArrayViewMut1<f64>) {
    let n = signal.len();
    if n < 2 {
        return;
    }
    let normalized = Array1::linspace(0.0, 1.0, n);
    Zip::from(signal).and(&normalized).for_each(|s, t| {
        *s *= 0.5 * (1.0 - (2.0 * PI * t).cos());
    });
}

/// Separable 2D Hann window of shape `(ny, nx)`: the outer product of two 1D windows.
pub fn hann_window_2d(ny: usize, nx: usize) -> Array2<f64> {
    let rows = hann_window(ny);
    let cols = hann_window(nx);
    Array2::from_shape_fn((ny, nx), |(y, x)| rows[y] * cols[x])
}

/// Wraps a phase value into (-pi, pi].
#[inline]
pub fn wrap_phase(x: f64) -> f64 {
    x - 2.0 * PI * ((x - PI) / (2.0 * PI)).ceil()
}

/// Unwraps a phase sequence in place.
///
/// Integer multiples of 2 pi are added to each sample so that successive differences lie in
/// (-pi, pi]. The first sample is left unchanged. The correction is derived from the wrapped
/// difference, so inputs that are already partially unwrapped are handled as well.
pub fn unwrap_in_place(mut lane: ArrayViewMut1<f64>) {
    if lane.len() < 2 {
        return;
    }
    let mut prev_val = lane[0];
    let mut prev_unwrapped = lane[0];
    for i in 1..lane.len() {
        let val = lane[i];
        let unwrapped_val = prev_unwrapped + wrap_phase(val - prev_val);
        prev_val = val;
        prev_unwrapped = unwrapped_val;
        lane[i] = unwrapped_val;
    }
}

/// Arithmetic mean. Returns `None` for an empty input.
pub fn mean<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Sample standard deviation (n - 1 in the denominator).
///
/// Returns `None` for an empty input and `0.0` for a single sample.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if values.len() == 1 {
        return Some(0.0);
    }
    let ss = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Computes the `p`-th percentile (0..=100) with linear interpolation between order statistics.
///
/// Non-finite samples are ignored. Returns `None` if no finite sample remains.
pub fn percentile<'a>(values: impl IntoIterator<Item = &'a f64>, p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unwrap(x: &[f64]) -> Vec<f64> {
        let mut out = Array1::from(x.to_vec());
        unwrap_in_place(out.view_mut());
        out.to_vec()
    }

    #[test]
    fn test_hann_window_matches_numpy() {
        let w = hann_window(5);
        let expected = [0.0, 0.5, 1.0, 0.5, 0.0];
        for (a, b) in w.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
        assert_eq!(hann_window(1), Array1::from(vec![1.0]));
    }

    #[test]
    fn test_hann_window_2d_is_outer_product() {
        let w = hann_window_2d(4, 6);
        let rows = hann_window(4);
        let cols = hann_window(6);
        assert_eq!(w.dim(), (4, 6));
        assert_abs_diff_eq!(w[[2, 3]], rows[2] * cols[3], epsilon = 1e-12);
        assert_abs_diff_eq!(w[[0, 3]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_phase_range() {
        assert_abs_diff_eq!(wrap_phase(0.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phase(PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phase(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phase(2.0 * PI + 0.25), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phase(-2.0 * PI - 0.25), -0.25, epsilon = 1e-12);
        for i in -100..100 {
            let w = wrap_phase(i as f64 * 0.37);
            assert!(w > -PI && w <= PI);
        }
    }

    #[test]
    fn test_unwrap_keeps_first_sample_and_bounds_differences() {
        let truth: Vec<f64> = (0..50).map(|i| 0.1 * (i * i) as f64 * 0.05 - 1.0).collect();
        let wrapped: Vec<f64> = truth.iter().map(|&v| wrap_phase(v)).collect();
        let unwrapped = unwrap(&wrapped);
        assert_eq!(unwrapped[0], wrapped[0]);
        for w in unwrapped.windows(2) {
            assert!((w[1] - w[0]).abs() <= PI + 1e-12);
        }
        for (u, t) in unwrapped.iter().zip(truth.iter()) {
            assert_abs_diff_eq!(*u, *t, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unwrap_arbitrary_wrapped_sequence() {
        let wrapped = [3.0, -3.0, 2.9, -2.8, 0.1, 3.1, -3.1];
        let unwrapped = unwrap(&wrapped);
        assert_eq!(unwrapped[0], 3.0);
        for w in unwrapped.windows(2) {
            assert!((w[1] - w[0]).abs() <= PI);
        }
        for (u, w) in unwrapped.iter().zip(wrapped.iter()) {
            let k = (u - w) / (2.0 * PI);
            assert_abs_diff_eq!(k, k.round(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_statistics() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(mean(&v).unwrap(), 2.5);
        assert_abs_diff_eq!(sample_std(&v).unwrap(), (5.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!(sample_std(&[7.0]), Some(0.0));
        assert_eq!(sample_std(&[]), None);
        assert_abs_diff_eq!(percentile(&v, 50.0).unwrap(), 2.5);
        assert_abs_diff_eq!(percentile(&v, 100.0).unwrap(), 4.0);
        assert_abs_diff_eq!(percentile(&[0.0, 10.0], 99.5).unwrap(), 9.95, epsilon = 1e-12);
        assert_eq!(percentile(&[f64::NAN], 50.0), None);
    }
}
