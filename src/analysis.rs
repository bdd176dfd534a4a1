//! Quantitative measurements on the unwrapped phase: neighborhood-averaged phase samples,
//! point-to-point and path-integrated depth, and RMS roughness over a rectangular region.
//!
//! Depths and roughness are returned in meters.

use crate::data_container::PixelRoi;
use crate::error::HoloError;
use crate::math_tools::{mean, sample_std};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{Display, Formatter};

/// Assumed vertical tilt of the reference beam.
pub const VERTICAL_TILT_DEG: f64 = 3.0;

/// Number of samples along the path of a path-integrated depth measurement.
pub const PATH_SAMPLES: usize = 200;

/// A pixel position in (row, column) coordinates. Fractional positions are rounded when sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub row: f64,
    pub col: f64,
}

impl PixelPoint {
    pub fn new(row: f64, col: f64) -> Self {
        PixelPoint { row, col }
    }

    fn distance(&self, other: &PixelPoint) -> f64 {
        ((self.row - other.row).powi(2) + (self.col - other.col).powi(2)).sqrt()
    }
}

/// A completed measurement with its inputs. Lengths are in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    PointDepth {
        p1: PixelPoint,
        p2: PixelPoint,
        depth: f64,
    },
    PathDepth {
        p1: PixelPoint,
        p2: PixelPoint,
        depth: f64,
    },
    Roughness {
        roi: PixelRoi,
        roughness: f64,
    },
}

impl Measurement {
    /// The measured length in meters.
    pub fn value(&self) -> f64 {
        match self {
            Measurement::PointDepth { depth, .. } | Measurement::PathDepth { depth, .. } => *depth,
            Measurement::Roughness { roughness, .. } => *roughness,
        }
    }
}

impl Display for Measurement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let um = self.value() * 1e6;
        match self {
            Measurement::PointDepth { p1, p2, .. } => write!(
                f,
                "depth ({:.1}, {:.1}) -> ({:.1}, {:.1}): {um:.4} um",
                p1.col, p1.row, p2.col, p2.row
            ),
            Measurement::PathDepth { p1, p2, .. } => write!(
                f,
                "path depth ({:.1}, {:.1}) -> ({:.1}, {:.1}): {um:.4} um",
                p1.col, p1.row, p2.col, p2.row
            ),
            Measurement::Roughness { roi, .. } => write!(
                f,
                "RMS roughness over {}x{} px: {um:.4} um",
                roi.width(),
                roi.height()
            ),
        }
    }
}

/// Mean of `phase` over the square `[y - r, y + r] x [x - r, x + r]`, clamped to the array.
///
/// Returns `None` if the array is empty or the point does not lie within it.
pub fn neighborhood_phase(phase: &Array2<f64>, point: PixelPoint, radius: usize) -> Option<f64> {
    let (ny, nx) = phase.dim();
    if ny == 0 || nx == 0 || !point.row.is_finite() || !point.col.is_finite() {
        return None;
    }
    let y = point.row.round();
    let x = point.col.round();
    if y < 0.0 || x < 0.0 || y >= ny as f64 || x >= nx as f64 {
        return None;
    }
    let (y, x) = (y as usize, x as usize);
    let window = phase.slice(s![
        y.saturating_sub(radius)..(y + radius + 1).min(ny),
        x.saturating_sub(radius)..(x + radius + 1).min(nx)
    ]);
    mean(window.iter())
}

fn sample(phase: &Array2<f64>, point: PixelPoint, radius: usize) -> Result<f64, HoloError> {
    neighborhood_phase(phase, point, radius).ok_or(HoloError::PointOutside {
        row: point.row,
        col: point.col,
    })
}

/// Depth difference between two points from their phase difference.
///
/// `dz = wavelength * dphi / (2 pi sin(theta_eff))` with
/// `theta_eff = sqrt(angle^2 + VERTICAL_TILT^2)`.
///
/// # Arguments
/// - `phase`: Unwrapped phase.
/// - `p1`, `p2`: The two picked points; the result is positive when `p2` has the larger phase.
/// - `radius`: Half-width of the averaging window in pixels.
/// - `wavelength`: Wavelength in meters.
/// - `angle`: Horizontal reference angle in radians; required.
pub fn point_depth(
    phase: &Array2<f64>,
    p1: PixelPoint,
    p2: PixelPoint,
    radius: usize,
    wavelength: f64,
    angle: Option<f64>,
) -> Result<f64, HoloError> {
    let theta = angle.ok_or(HoloError::MissingAngle)?;
    let delta_phi = sample(phase, p2, radius)? - sample(phase, p1, radius)?;
    point_depth_from_phase(delta_phi, wavelength, theta)
}

/// Closed form of [`point_depth`] for a known phase difference.
pub fn point_depth_from_phase(delta_phi: f64, wavelength: f64, angle: f64) -> Result<f64, HoloError> {
    let theta_y = VERTICAL_TILT_DEG.to_radians();
    let theta_eff = (angle * angle + theta_y * theta_y).sqrt();
    let sin = theta_eff.sin();
    if sin.abs() < 1e-12 {
        return Err(HoloError::DegenerateGeometry {
            what: "effective angle has zero sine",
        });
    }
    Ok(wavelength * delta_phi / (2.0 * PI * sin))
}

/// Depth from the path-averaged phase between two points.
///
/// The neighborhood phase is sampled at [`PATH_SAMPLES`] equally spaced points along the
/// segment, integrated over path length with the trapezoidal rule and normalized by the path
/// length. `dz = wavelength * <phi> / (2 pi cos(angle))`; an absent angle counts as zero.
pub fn path_depth(
    phase: &Array2<f64>,
    p1: PixelPoint,
    p2: PixelPoint,
    radius: usize,
    wavelength: f64,
    angle: Option<f64>,
) -> Result<f64, HoloError> {
    let cos = angle.unwrap_or(0.0).cos();
    if cos.abs() < 1e-12 {
        return Err(HoloError::DegenerateGeometry {
            what: "reference angle of 90 degrees",
        });
    }
    let length = p1.distance(&p2);
    let mean_phase = if length > 0.0 {
        let t = Array1::linspace(0.0, 1.0, PATH_SAMPLES);
        let samples = t
            .iter()
            .map(|&t| {
                let p = PixelPoint::new(
                    p1.row + t * (p2.row - p1.row),
                    p1.col + t * (p2.col - p1.col),
                );
                sample(phase, p, radius)
            })
            .collect::<Result<Vec<f64>, HoloError>>()?;
        let ds = length / (PATH_SAMPLES - 1) as f64;
        let integral = samples.windows(2).map(|w| 0.5 * (w[0] + w[1]) * ds).sum::<f64>();
        integral / length
    } else {
        sample(phase, p1, radius)?
    };
    Ok(wavelength * mean_phase / (2.0 * PI * cos))
}

/// Removes the least-squares plane `a + b x + c y` from a rectangular patch.
fn detrend_plane(patch: &Array2<f64>) -> Array2<f64> {
    let (ny, nx) = patch.dim();
    let y_mean = (ny as f64 - 1.0) / 2.0;
    let x_mean = (nx as f64 - 1.0) / 2.0;
    let offset = patch.mean().unwrap_or(0.0);
    // centered coordinates on a full grid are orthogonal, so the slopes decouple
    let (mut sxx, mut syy, mut sxz, mut syz) = (0.0, 0.0, 0.0, 0.0);
    for ((y, x), &z) in patch.indexed_iter() {
        let dx = x as f64 - x_mean;
        let dy = y as f64 - y_mean;
        sxx += dx * dx;
        syy += dy * dy;
        sxz += dx * z;
        syz += dy * z;
    }
    let bx = if sxx > 0.0 { sxz / sxx } else { 0.0 };
    let by = if syy > 0.0 { syz / syy } else { 0.0 };
    Array2::from_shape_fn((ny, nx), |(y, x)| {
        patch[[y, x]] - offset - bx * (x as f64 - x_mean) - by * (y as f64 - y_mean)
    })
}

/// RMS roughness of the phase within `roi`.
///
/// `roughness = std(phi) * wavelength / (2 pi sin(VERTICAL_TILT))`, using the sample standard
/// deviation. With `detrend` the best-fit plane is removed first.
pub fn rms_roughness(
    phase: &Array2<f64>,
    roi: &PixelRoi,
    wavelength: f64,
    detrend: bool,
) -> Result<f64, HoloError> {
    let (ny, nx) = phase.dim();
    let clipped = PixelRoi {
        row_start: roi.row_start.min(ny),
        row_end: roi.row_end.min(ny),
        col_start: roi.col_start.min(nx),
        col_end: roi.col_end.min(nx),
    };
    if clipped.is_empty() {
        return Err(HoloError::DegenerateRoi);
    }
    let patch = clipped.view(phase).to_owned();
    let patch = if detrend { detrend_plane(&patch) } else { patch };
    let values: Vec<f64> = patch.iter().copied().collect();
    let sigma = sample_std(&values).ok_or(HoloError::DegenerateRoi)?;
    Ok(sigma * wavelength / (2.0 * PI * VERTICAL_TILT_DEG.to_radians().sin()))
}
