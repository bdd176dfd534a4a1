//! This module provides the `AmplitudeFilter` trait and the spatial smoothing filters applied to
//! the reconstructed amplitude, together with the gamma mapping used for display.
//!
//! Filters run in a fixed order: the Fourier filter (on the complex field, see
//! [`super::fresnel::fourier_filter`]) happens before the amplitude is extracted, then Gaussian,
//! then median smoothing.

use crate::math_tools::percentile;
use ndarray::{Array1, Array2, Axis, Zip};
use std::fmt::Debug;

/// Name and description of a filter.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub name: String,
    pub description: String,
}

/// A smoothing filter acting on the reconstructed amplitude.
pub trait AmplitudeFilter: Debug + Send + Sync {
    /// Returns the filter configuration, including name and description.
    fn config(&self) -> FilterConfig;

    /// Applies the filter and returns a new image of the same shape.
    fn filter(&self, input: &Array2<f64>) -> Array2<f64>;
}

/// Maps any index onto `[0, n)` with half-sample symmetric reflection (`d c b a | a b c d`).
fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    (if m < n { m } else { period - 1 - m }) as usize
}

/// Isotropic Gaussian blur with standard deviation `sigma` (pixels).
///
/// The kernel is truncated at `4 sigma` and applied separably along both axes with reflecting
/// boundaries.
#[derive(Debug, Clone)]
pub struct GaussianBlur {
    pub sigma: f64,
}

impl GaussianBlur {
    fn kernel(&self) -> Array1<f64> {
        let radius = (4.0 * self.sigma).ceil() as isize;
        let mut kernel = Array1::from_shape_fn((2 * radius + 1) as usize, |i| {
            let x = i as f64 - radius as f64;
            (-0.5 * x * x / (self.sigma * self.sigma)).exp()
        });
        let sum = kernel.sum();
        kernel.mapv_inplace(|k| k / sum);
        kernel
    }

    fn convolve_axis(input: &Array2<f64>, kernel: &Array1<f64>, axis: Axis) -> Array2<f64> {
        let radius = (kernel.len() / 2) as isize;
        let mut output = Array2::zeros(input.dim());
        for (lane_in, mut lane_out) in input.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
            let n = lane_in.len();
            for (i, out) in lane_out.iter_mut().enumerate() {
                *out = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * lane_in[reflect_index(i as isize + k as isize - radius, n)])
                    .sum();
            }
        }
        output
    }
}

impl AmplitudeFilter for GaussianBlur {
    fn config(&self) -> FilterConfig {
        FilterConfig {
            name: "Gaussian".to_string(),
            description: format!("Isotropic Gaussian smoothing, sigma = {} px", self.sigma),
        }
    }

    fn filter(&self, input: &Array2<f64>) -> Array2<f64> {
        if input.is_empty() {
            return input.clone();
        }
        let kernel = self.kernel();
        let rows = Self::convolve_axis(input, &kernel, Axis(1));
        Self::convolve_axis(&rows, &kernel, Axis(0))
    }
}

/// Square median filter of side `size`, with reflecting boundaries.
#[derive(Debug, Clone)]
pub struct MedianFilter {
    pub size: usize,
}

impl AmplitudeFilter for MedianFilter {
    fn config(&self) -> FilterConfig {
        FilterConfig {
            name: "Median".to_string(),
            description: format!("Median smoothing over a {0}x{0} window", self.size),
        }
    }

    fn filter(&self, input: &Array2<f64>) -> Array2<f64> {
        let size = self.size.max(1);
        if size == 1 || input.is_empty() {
            return input.clone();
        }
        let (ny, nx) = input.dim();
        let before = (size / 2) as isize;
        Zip::indexed(input).par_map_collect(|(y, x), _| {
            let mut window = Vec::with_capacity(size * size);
            for dy in 0..size as isize {
                let sy = reflect_index(y as isize + dy - before, ny);
                for dx in 0..size as isize {
                    let sx = reflect_index(x as isize + dx - before, nx);
                    window.push(input[[sy, sx]]);
                }
            }
            let mid = window.len() / 2;
            let (_, median, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            *median
        })
    }
}

/// Builds the enabled smoothing chain in pipeline order: Gaussian, then median.
pub fn amplitude_filters(
    gaussian_sigma: Option<f64>,
    median_window: Option<usize>,
) -> Vec<Box<dyn AmplitudeFilter>> {
    let mut filters: Vec<Box<dyn AmplitudeFilter>> = Vec::new();
    if let Some(sigma) = gaussian_sigma {
        filters.push(Box::new(GaussianBlur { sigma }));
    }
    if let Some(size) = median_window {
        filters.push(Box::new(MedianFilter { size }));
    }
    filters
}

/// Gamma-maps the amplitude for display.
///
/// `amp^gamma` is divided by its 99.5th percentile and clipped to [0, 1], so that a few
/// outliers do not saturate the display. A zero ceiling gives an all-zero image.
pub fn display_map(amplitude: &Array2<f64>, gamma: f64) -> Array2<f64> {
    let mapped = amplitude.mapv(|a| a.max(0.0).powf(gamma));
    match percentile(mapped.iter(), 99.5) {
        Some(ceiling) if ceiling > 0.0 => mapped.mapv(|v| (v / ceiling).clamp(0.0, 1.0)),
        _ => Array2::zeros(amplitude.dim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        assert_eq!(reflect_index(9, 4), 1);
        assert_eq!(reflect_index(2, 4), 2);
    }

    #[test]
    fn test_gaussian_preserves_constant_and_mass() {
        let constant = Array2::from_elem((6, 7), 3.0);
        let out = GaussianBlur { sigma: 1.3 }.filter(&constant);
        for v in out.iter() {
            assert_abs_diff_eq!(*v, 3.0, epsilon = 1e-12);
        }

        let mut impulse = Array2::zeros((21, 21));
        impulse[[10, 10]] = 1.0;
        let out = GaussianBlur { sigma: 1.0 }.filter(&impulse);
        assert_abs_diff_eq!(out.sum(), 1.0, epsilon = 1e-12);
        assert!(out[[10, 10]] > out[[10, 11]]);
        assert_abs_diff_eq!(out[[10, 11]], out[[11, 10]], epsilon = 1e-15);
    }

    #[test]
    fn test_gaussian_kernel_is_truncated_at_four_sigma() {
        assert_eq!(GaussianBlur { sigma: 1.0 }.kernel().len(), 9);
        assert_eq!(GaussianBlur { sigma: 0.6 }.kernel().len(), 7);
        assert_eq!(GaussianBlur { sigma: 1.3 }.kernel().len(), 13);
        let kernel = GaussianBlur { sigma: 0.6 }.kernel();
        assert_abs_diff_eq!(kernel.sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kernel[0], kernel[6], epsilon = 1e-15);
    }

    #[test]
    fn test_median_removes_salt_noise() {
        let mut img = Array2::from_elem((5, 5), 1.0);
        img[[2, 2]] = 100.0;
        let out = MedianFilter { size: 3 }.filter(&img);
        assert_eq!(out[[2, 2]], 1.0);
        assert_eq!(MedianFilter { size: 1 }.filter(&img), img);
    }

    #[test]
    fn test_filter_chain_order() {
        let chain = amplitude_filters(Some(1.0), Some(3));
        let names: Vec<String> = chain.iter().map(|f| f.config().name).collect();
        assert_eq!(names, vec!["Gaussian", "Median"]);
        assert!(amplitude_filters(None, None).is_empty());
    }

    #[test]
    fn test_display_map_clips_outliers() {
        let mut amp = Array2::from_shape_fn((20, 20), |(y, x)| ((y * 20 + x) as f64) / 400.0);
        amp[[0, 0]] = 1e6;
        let display = display_map(&amp, 0.5);
        assert!(display.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(display[[0, 0]], 1.0);
        assert!(display[[19, 18]] < 1.0);
        assert_eq!(display_map(&Array2::zeros((3, 3)), 0.5), Array2::<f64>::zeros((3, 3)));
    }
}
