//! Loading of intensity images and export of the reconstructed maps as rasters and NumPy
//! arrays.

use crate::data_container::ReconstructionOutput;
use crate::error::HoloError;
use chrono::Utc;
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::Array2;
use ndarray_npy::{write_npy, NpzWriter};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Decodes a raster image into intensities normalized to [0, 1].
///
/// Color images are converted to luma first.
pub fn load_intensity(path: &Path) -> Result<Array2<f64>, HoloError> {
    let img = image::open(path).map_err(|source| HoloError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let luma = img.to_luma32f();
    let (width, height) = luma.dimensions();
    Ok(Array2::from_shape_fn(
        (height as usize, width as usize),
        |(y, x)| luma.get_pixel(x as u32, y as u32)[0].clamp(0.0, 1.0) as f64,
    ))
}

/// Writes the display amplitude (values in [0, 1]) tinted with `tint` as an RGB8 raster.
///
/// A black tint (wavelength outside the visible range) writes a gray image instead.
pub fn save_amplitude(path: &Path, display: &Array2<f64>, tint: [f32; 3]) -> Result<(), HoloError> {
    let tint = if tint.iter().any(|c| *c > 0.0) {
        tint
    } else {
        [1.0; 3]
    };
    let (height, width) = display.dim();
    let img = RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let v = display[[y as usize, x as usize]].clamp(0.0, 1.0) as f32;
        Rgb(tint.map(|c| (v * c * 255.0).round() as u8))
    });
    img.save(path).map_err(|source| HoloError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a phase map as a 16-bit gray raster, min-max normalized.
pub fn save_phase(path: &Path, phase: &Array2<f64>) -> Result<(), HoloError> {
    let (min, max) = phase
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = if max > min { max - min } else { 1.0 };
    let (height, width) = phase.dim();
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
            let v = phase[[y as usize, x as usize]];
            let scaled = if v.is_finite() { (v - min) / span } else { 0.0 };
            Luma([(scaled.clamp(0.0, 1.0) * u16::MAX as f64).round() as u16])
        });
    img.save(path).map_err(|source| HoloError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the raw phase values to a `.npy` file.
pub fn save_phase_npy(path: &Path, phase: &Array2<f64>) -> Result<(), HoloError> {
    write_npy(path, phase).map_err(|source| HoloError::Npy {
        path: path.to_path_buf(),
        source,
    })
}

/// Bundles amplitude, wrapped and (if available) unwrapped phase into one `.npz` archive.
pub fn save_arrays_npz(path: &Path, output: &ReconstructionOutput) -> Result<(), HoloError> {
    let file = File::create(path).map_err(|source| HoloError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let to_err = |source| HoloError::Npz {
        path: path.to_path_buf(),
        source,
    };
    let mut npz = NpzWriter::new(file);
    npz.add_array("amplitude", &output.amplitude).map_err(to_err)?;
    npz.add_array("phase_wrapped", &output.phase_wrapped)
        .map_err(to_err)?;
    if let Ok(unwrapped) = &output.phase_unwrapped {
        npz.add_array("phase_unwrapped", &unwrapped.phase)
            .map_err(to_err)?;
    }
    npz.finish().map_err(to_err)?;
    Ok(())
}

/// File name tag unique within `dir`: a UTC timestamp with milliseconds, followed by a counter
/// if an export with the same timestamp already exists.
fn export_tag(dir: &Path) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
    let mut tag = stamp.clone();
    let mut n = 0;
    while dir.join(format!("reconstruction_{tag}.npz")).exists() {
        n += 1;
        tag = format!("{stamp}_{n}");
    }
    tag
}

/// Exports all maps of `output` into `dir`, file names carrying a UTC timestamp.
///
/// # Returns
/// The paths of the written files.
pub fn export_reconstruction(
    dir: &Path,
    output: &ReconstructionOutput,
    tint: [f32; 3],
) -> Result<Vec<PathBuf>, HoloError> {
    std::fs::create_dir_all(dir).map_err(|source| HoloError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let stamp = export_tag(dir);
    let mut written = Vec::new();

    let amplitude = dir.join(format!("amplitude_{stamp}.png"));
    save_amplitude(&amplitude, &output.amplitude_display, tint)?;
    written.push(amplitude);

    let wrapped = dir.join(format!("phase_wrapped_{stamp}.png"));
    save_phase(&wrapped, &output.phase_wrapped)?;
    written.push(wrapped);

    if let Ok(unwrapped) = &output.phase_unwrapped {
        let raster = dir.join(format!("phase_unwrapped_{stamp}.tiff"));
        save_phase(&raster, &unwrapped.phase)?;
        written.push(raster);
        let raw = dir.join(format!("phase_unwrapped_{stamp}.npy"));
        save_phase_npy(&raw, &unwrapped.phase)?;
        written.push(raw);
    }

    let arrays = dir.join(format!("reconstruction_{stamp}.npz"));
    save_arrays_npz(&arrays, output)?;
    written.push(arrays);

    for path in &written {
        log::info!("exported {path:?}");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconstructionConfig;
    use crate::data_container::{PixelPitch, PixelRoi, UnwrappedRoi};
    use crate::unwrap::UnwrapMethod;
    use num_complex::Complex64;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("holo_explorer_{name}_{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_amplitude_round_trip_through_png() {
        let dir = scratch_dir("amplitude");
        let path = dir.join("amp.png");
        let display = Array2::from_shape_fn((6, 9), |(y, x)| (y * 9 + x) as f64 / 53.0);
        save_amplitude(&path, &display, [0.0, 0.0, 0.0]).unwrap();
        let loaded = load_intensity(&path).unwrap();
        assert_eq!(loaded.dim(), (6, 9));
        for (a, b) in loaded.iter().zip(display.iter()) {
            assert!((a - b).abs() < 0.01);
        }
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_phase_is_normalized_to_full_range() {
        let dir = scratch_dir("phase");
        let path = dir.join("phase.png");
        let phase = Array2::from_shape_fn((4, 4), |(_, x)| x as f64 - 1.5);
        save_phase(&path, &phase).unwrap();
        let loaded = load_intensity(&path).unwrap();
        assert_eq!(loaded[[0, 0]], 0.0);
        assert_eq!(loaded[[0, 3]], 1.0);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_file_is_reported() {
        let path = Path::new("/nonexistent/hologram.png");
        assert!(matches!(load_intensity(path), Err(HoloError::Image { .. })));
    }

    #[test]
    fn test_export_writes_all_maps() {
        let dir = scratch_dir("export");
        let output = ReconstructionOutput {
            field: Array2::from_elem((5, 5), Complex64::new(1.0, 0.0)),
            amplitude: Array2::ones((5, 5)),
            amplitude_display: Array2::ones((5, 5)),
            phase_wrapped: Array2::zeros((5, 5)),
            phase_unwrapped: Ok(UnwrappedRoi {
                roi: PixelRoi::full((5, 5)),
                phase: Array2::zeros((5, 5)),
                method_used: UnwrapMethod::Combined2D,
            }),
            notices: vec![],
            config: ReconstructionConfig::new(
                -0.14,
                632.8e-9,
                None,
                PixelPitch { dx: 3.45e-6, dy: 3.45e-6 },
            )
            .unwrap(),
        };
        let written = export_reconstruction(&dir, &output, [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(written.len(), 5);
        assert!(written.iter().all(|p| p.exists()));

        let again = export_reconstruction(&dir, &output, [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(again.len(), 5);
        assert!(again.iter().all(|p| !written.contains(p)));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 10);
        std::fs::remove_dir_all(dir).ok();
    }
}
