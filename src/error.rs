//! Error taxonomy of the reconstruction and measurement pipeline.

use crate::data_container::ImageRole;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HoloError {
    /// A mandatory image (reference or hologram) has not been loaded.
    #[error("missing {role} image, load it before reconstructing")]
    MissingInput { role: ImageRole },

    #[error("{role} image has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        role: ImageRole,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// The selected region of interest has zero or negative area.
    #[error("region of interest is empty")]
    DegenerateRoi,

    /// No phase data is available for a measurement.
    #[error("no unwrapped phase available, reconstruct with a valid region of interest first")]
    NoPhase,

    /// A picked point does not fall on the unwrapped phase map.
    #[error("point (row {row}, col {col}) lies outside of the unwrapped region")]
    PointOutside { row: f64, col: f64 },

    #[error("the reference angle must be set for this measurement")]
    MissingAngle,

    #[error("degenerate geometry: {what}")]
    DegenerateGeometry { what: &'static str },

    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error for {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write {path:?}: {source}")]
    Npy {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpyError,
    },

    #[error("failed to write {path:?}: {source}")]
    Npz {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpzError,
    },
}
