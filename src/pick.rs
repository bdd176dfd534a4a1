//! Two-point picking for depth and roughness measurements.
//!
//! The interactive layer forwards "point selected" events; the session walks through
//! `Idle -> AwaitingFirst -> AwaitingSecond -> Computed` and hands back either a pending marker
//! or the finished measurement. Cancelling returns to `Idle` from any state.

use crate::analysis::{path_depth, point_depth, rms_roughness, Measurement, PixelPoint};
use crate::config::ReconstructionConfig;
use crate::data_container::{PixelPitch, PixelRoi, UnwrappedRoi};
use crate::error::HoloError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The measurement a pick sequence produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickKind {
    PointDepth,
    PathDepth,
    /// The two points are opposite corners of the sub-region.
    Roughness,
}

impl Display for PickKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PickKind::PointDepth => write!(f, "point depth"),
            PickKind::PathDepth => write!(f, "path depth"),
            PickKind::Roughness => write!(f, "roughness"),
        }
    }
}

/// A picked location in full-frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PickPoint {
    /// Position on the displayed axes in mm.
    Millimeters { x: f64, y: f64 },
    Pixel(PixelPoint),
}

impl PickPoint {
    pub fn to_pixel(self, pitch: &PixelPitch) -> PixelPoint {
        match self {
            PickPoint::Millimeters { x, y } => {
                PixelPoint::new(y / (pitch.dy * 1e3), x / (pitch.dx * 1e3))
            }
            PickPoint::Pixel(p) => p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PickState {
    #[default]
    Idle,
    AwaitingFirst(PickKind),
    AwaitingSecond(PickKind, PixelPoint),
    Computed(Measurement),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickOutcome {
    /// The first point was recorded, the second is awaited.
    Pending,
    Complete(Measurement),
    /// No pick sequence is active.
    Ignored,
}

/// The data a measurement is taken on.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementContext<'a> {
    pub unwrapped: &'a UnwrappedRoi,
    pub config: &'a ReconstructionConfig,
}

impl MeasurementContext<'_> {
    /// Shifts a full-frame pixel position into the coordinates of the unwrapped region.
    fn local(&self, p: PixelPoint) -> PixelPoint {
        PixelPoint::new(
            p.row - self.unwrapped.roi.row_start as f64,
            p.col - self.unwrapped.roi.col_start as f64,
        )
    }

    /// Computes the measurement of `kind` between two full-frame points.
    pub fn measure(&self, kind: PickKind, p1: PixelPoint, p2: PixelPoint) -> Result<Measurement, HoloError> {
        let phase = &self.unwrapped.phase;
        let radius = self.config.neighborhood_radius;
        let wavelength = self.config.wavelength;
        match kind {
            PickKind::PointDepth => Ok(Measurement::PointDepth {
                p1,
                p2,
                depth: point_depth(
                    phase,
                    self.local(p1),
                    self.local(p2),
                    radius,
                    wavelength,
                    self.config.angle,
                )?,
            }),
            PickKind::PathDepth => Ok(Measurement::PathDepth {
                p1,
                p2,
                depth: path_depth(
                    phase,
                    self.local(p1),
                    self.local(p2),
                    radius,
                    wavelength,
                    self.config.angle,
                )?,
            }),
            PickKind::Roughness => {
                let roi = corners_to_roi(p1, p2);
                let region = &self.unwrapped.roi;
                let local = PixelRoi {
                    row_start: roi.row_start.max(region.row_start) - region.row_start,
                    row_end: roi.row_end.min(region.row_end).saturating_sub(region.row_start),
                    col_start: roi.col_start.max(region.col_start) - region.col_start,
                    col_end: roi.col_end.min(region.col_end).saturating_sub(region.col_start),
                };
                Ok(Measurement::Roughness {
                    roi,
                    roughness: rms_roughness(
                        phase,
                        &local,
                        wavelength,
                        self.config.detrend_roughness,
                    )?,
                })
            }
        }
    }
}

/// Half-open pixel range spanned by two corners, by nearest pixel.
fn corners_to_roi(p1: PixelPoint, p2: PixelPoint) -> PixelRoi {
    let index = |v: f64| if v.is_finite() { v.round().max(0.0) as usize } else { 0 };
    PixelRoi {
        row_start: index(p1.row.min(p2.row)),
        row_end: index(p1.row.max(p2.row)),
        col_start: index(p1.col.min(p2.col)),
        col_end: index(p1.col.max(p2.col)),
    }
}

/// Drives one pick sequence at a time.
#[derive(Debug, Default)]
pub struct PickSession {
    state: PickState,
}

impl PickSession {
    pub fn state(&self) -> &PickState {
        &self.state
    }

    /// Starts a new sequence, discarding any unfinished one.
    pub fn begin(&mut self, kind: PickKind) {
        if matches!(self.state, PickState::AwaitingFirst(_) | PickState::AwaitingSecond(..)) {
            log::debug!("restarting unfinished pick sequence");
        }
        self.state = PickState::AwaitingFirst(kind);
    }

    /// Feeds the next picked point.
    ///
    /// A failed computation ends the sequence and returns the error.
    pub fn submit_point(
        &mut self,
        point: PickPoint,
        context: &MeasurementContext<'_>,
    ) -> Result<PickOutcome, HoloError> {
        let point = point.to_pixel(&context.config.pitch);
        match std::mem::take(&mut self.state) {
            PickState::AwaitingFirst(kind) => {
                self.state = PickState::AwaitingSecond(kind, point);
                Ok(PickOutcome::Pending)
            }
            PickState::AwaitingSecond(kind, first) => {
                let measurement = context.measure(kind, first, point)?;
                log::info!("{measurement}");
                self.state = PickState::Computed(measurement.clone());
                Ok(PickOutcome::Complete(measurement))
            }
            idle_or_done => {
                self.state = idle_or_done;
                Ok(PickOutcome::Ignored)
            }
        }
    }

    /// Provisional measurement with `point` as the second point, while awaiting it.
    pub fn preview(&self, point: PickPoint, context: &MeasurementContext<'_>) -> Option<Measurement> {
        match &self.state {
            PickState::AwaitingSecond(kind, first) => context
                .measure(*kind, *first, point.to_pixel(&context.config.pitch))
                .ok(),
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.state = PickState::Idle;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PickState::AwaitingFirst(_) | PickState::AwaitingSecond(..))
    }
}
