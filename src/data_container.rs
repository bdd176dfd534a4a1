//! This module defines the data structures flowing through the reconstruction pipeline: the
//! three intensity images identified by role, the pixel geometry, regions of interest, and the
//! reconstruction output handed back to the caller for display.

use crate::config::ReconstructionConfig;
use crate::error::HoloError;
use crate::unwrap::UnwrapMethod;
use ndarray::{s, Array2, ArrayView2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Logical role of an intensity image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageRole {
    /// Object beam intensity (optional).
    Object,
    /// Reference beam intensity.
    Reference,
    /// Recorded hologram.
    Hologram,
}

impl Display for ImageRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRole::Object => write!(f, "object"),
            ImageRole::Reference => write!(f, "reference"),
            ImageRole::Hologram => write!(f, "hologram"),
        }
    }
}

/// Physical pixel pitch of the camera in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPitch {
    pub dx: f64,
    pub dy: f64,
}

impl PixelPitch {
    /// Nearest column to a horizontal position in mm, clamped to `[0, nx - 1]`.
    pub fn nearest_col(&self, x_mm: f64, nx: usize) -> usize {
        nearest_index(x_mm / (self.dx * 1e3), nx)
    }

    /// Nearest row to a vertical position in mm, clamped to `[0, ny - 1]`.
    pub fn nearest_row(&self, y_mm: f64, ny: usize) -> usize {
        nearest_index(y_mm / (self.dy * 1e3), ny)
    }
}

fn nearest_index(position: f64, n: usize) -> usize {
    if n == 0 || !position.is_finite() {
        return 0;
    }
    position.round().clamp(0.0, (n - 1) as f64) as usize
}

/// Axis-aligned rectangle in physical coordinates (mm), as drawn on the displayed axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalRoi {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PhysicalRoi {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        PhysicalRoi { x0, y0, x1, y1 }
    }

    /// Converts the rectangle into a half-open pixel range by nearest-coordinate matching.
    ///
    /// The corners may be given in any order. A rectangle without strictly positive width
    /// and height, or one that collapses onto less than one pixel, is rejected.
    pub fn to_pixels(&self, pitch: &PixelPitch, shape: (usize, usize)) -> Result<PixelRoi, HoloError> {
        let (ny, nx) = shape;
        let (x_min, x_max) = (self.x0.min(self.x1), self.x0.max(self.x1));
        let (y_min, y_max) = (self.y0.min(self.y1), self.y0.max(self.y1));
        let width = x_max - x_min;
        let height = y_max - y_min;
        if !(width > 0.0 && height > 0.0) {
            return Err(HoloError::DegenerateRoi);
        }
        let roi = PixelRoi {
            row_start: pitch.nearest_row(y_min, ny),
            row_end: pitch.nearest_row(y_max, ny),
            col_start: pitch.nearest_col(x_min, nx),
            col_end: pitch.nearest_col(x_max, nx),
        };
        if roi.is_empty() {
            return Err(HoloError::DegenerateRoi);
        }
        Ok(roi)
    }
}

/// Half-open pixel range `[row_start, row_end) x [col_start, col_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRoi {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl PixelRoi {
    /// The full frame of an array with the given shape.
    pub fn full(shape: (usize, usize)) -> Self {
        PixelRoi {
            row_start: 0,
            row_end: shape.0,
            col_start: 0,
            col_end: shape.1,
        }
    }

    pub fn height(&self) -> usize {
        self.row_end.saturating_sub(self.row_start)
    }

    pub fn width(&self) -> usize {
        self.col_end.saturating_sub(self.col_start)
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    pub fn view<'a, T>(&self, data: &'a Array2<T>) -> ArrayView2<'a, T> {
        data.slice(s![self.row_start..self.row_end, self.col_start..self.col_end])
    }
}

/// The three intensity images of one reconstruction, each normalized to [0, 1].
#[derive(Debug, Clone, Default)]
pub struct HologramSet {
    pub object: Option<Array2<f64>>,
    pub reference: Option<Array2<f64>>,
    pub hologram: Option<Array2<f64>>,
}

/// Borrowed, shape-checked view on a [`HologramSet`] ready for reconstruction.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedInputs<'a> {
    pub object: Option<&'a Array2<f64>>,
    pub reference: &'a Array2<f64>,
    pub hologram: &'a Array2<f64>,
}

impl ValidatedInputs<'_> {
    pub fn shape(&self) -> (usize, usize) {
        self.hologram.dim()
    }
}

impl HologramSet {
    pub fn set(&mut self, role: ImageRole, image: Array2<f64>) {
        match role {
            ImageRole::Object => self.object = Some(image),
            ImageRole::Reference => self.reference = Some(image),
            ImageRole::Hologram => self.hologram = Some(image),
        }
    }

    pub fn clear(&mut self, role: ImageRole) {
        match role {
            ImageRole::Object => self.object = None,
            ImageRole::Reference => self.reference = None,
            ImageRole::Hologram => self.hologram = None,
        }
    }

    pub fn get(&self, role: ImageRole) -> Option<&Array2<f64>> {
        match role {
            ImageRole::Object => self.object.as_ref(),
            ImageRole::Reference => self.reference.as_ref(),
            ImageRole::Hologram => self.hologram.as_ref(),
        }
    }

    /// Checks that reference and hologram are present and that all present images share the
    /// hologram's shape.
    pub fn validated(&self) -> Result<ValidatedInputs<'_>, HoloError> {
        let required = move |role| self.get(role).ok_or(HoloError::MissingInput { role });
        let hologram = required(ImageRole::Hologram)?;
        let reference = required(ImageRole::Reference)?;
        let expected = hologram.dim();
        if expected.0 == 0 || expected.1 == 0 {
            return Err(HoloError::ShapeMismatch {
                role: ImageRole::Hologram,
                expected: (1, 1),
                found: expected,
            });
        }
        for (role, image) in [
            (ImageRole::Reference, Some(reference)),
            (ImageRole::Object, self.get(ImageRole::Object)),
        ] {
            if let Some(image) = image {
                if image.dim() != expected {
                    return Err(HoloError::ShapeMismatch {
                        role,
                        expected,
                        found: image.dim(),
                    });
                }
            }
        }
        Ok(ValidatedInputs {
            object: self.get(ImageRole::Object),
            reference,
            hologram,
        })
    }
}

/// Unwrapped phase over the region of interest.
#[derive(Debug, Clone)]
pub struct UnwrappedRoi {
    pub roi: PixelRoi,
    pub phase: Array2<f64>,
    /// The strategy that actually produced `phase` (after any fallback).
    pub method_used: UnwrapMethod,
}

/// Everything one reconstruction hands back to the caller.
///
/// All arrays share the hologram's shape, except the unwrapped phase which covers the ROI.
#[derive(Debug, Clone)]
pub struct ReconstructionOutput {
    pub field: Array2<Complex64>,
    /// `|field|` after the optional spatial smoothing filters.
    pub amplitude: Array2<f64>,
    /// Gamma-mapped amplitude, clipped at the 99.5th percentile and scaled to [0, 1].
    pub amplitude_display: Array2<f64>,
    pub phase_wrapped: Array2<f64>,
    /// `Err` when phase analysis was skipped, e.g. for a degenerate ROI. The amplitude
    /// results stay valid in that case.
    pub phase_unwrapped: Result<UnwrappedRoi, String>,
    /// Non-fatal, user-visible notices collected during the run.
    pub notices: Vec<String>,
    /// The parameters this output was computed with.
    pub config: ReconstructionConfig,
}
