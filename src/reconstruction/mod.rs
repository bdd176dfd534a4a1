//! The reconstruction pipeline: DC suppression, reference synthesis, Fresnel propagation,
//! amplitude post-processing and phase unwrapping over the region of interest.

/// Suppression of the zero-order term.
pub mod dc;

/// Fresnel back-propagation and the Fourier-domain low-pass.
pub mod fresnel;

/// Smoothing filters on the amplitude and the display mapping.
pub mod post_filters;

/// Complex reference wave synthesis.
pub mod reference;

use crate::config::ReconstructionConfig;
use crate::data_container::{
    HologramSet, PhysicalRoi, PixelRoi, ReconstructionOutput, UnwrappedRoi, ValidatedInputs,
};
use crate::error::HoloError;
use crate::math_tools::wrap_phase;
use crate::unwrap::unwrap_phase;
use ndarray::Array2;
use num_complex::Complex64;
use post_filters::{amplitude_filters, display_map};
use std::time::Instant;

/// Computes the complex object field from validated inputs.
///
/// The optional Fourier low-pass is applied to the field before returning.
pub fn reconstruct_field(
    inputs: &ValidatedInputs<'_>,
    config: &ReconstructionConfig,
) -> Result<Array2<Complex64>, HoloError> {
    let hologram_dc = dc::remove_dc(inputs.hologram, Some(inputs.reference), inputs.object);
    let reference = reference::reference_wave(
        Some(inputs.reference),
        inputs.shape(),
        config.angle,
        config.wavelength,
        config.pitch.dx,
    );
    let field = fresnel::propagate(
        &hologram_dc,
        &reference,
        config.distance,
        config.wavelength,
        &config.pitch,
    )?;
    Ok(match config.fourier_radius {
        Some(radius) => fresnel::fourier_filter(&field, radius),
        None => field,
    })
}

/// Unwraps the wrapped phase inside `roi`.
///
/// With `weighted_unwrap` the field amplitude, normalized to its maximum inside the region,
/// weights the least-squares solve. Fallback warnings are appended to `notices`.
pub fn unwrap_roi(
    phase_wrapped: &Array2<f64>,
    amplitude: &Array2<f64>,
    config: &ReconstructionConfig,
    roi: PixelRoi,
    notices: &mut Vec<String>,
) -> UnwrappedRoi {
    let weights = config.weighted_unwrap.then(|| {
        let patch = roi.view(amplitude);
        let peak = patch.iter().cloned().fold(0.0, f64::max);
        if peak > 0.0 {
            patch.mapv(|a| a / peak)
        } else {
            Array2::ones(patch.dim())
        }
    });
    let outcome = unwrap_phase(roi.view(phase_wrapped), config.unwrap_method, weights.as_ref());
    notices.extend(outcome.warnings);
    UnwrappedRoi {
        roi,
        phase: outcome.phase,
        method_used: outcome.method_used,
    }
}

/// Runs one full reconstruction.
///
/// # Arguments
/// - `images`: The loaded intensity images; reference and hologram are mandatory.
/// - `config`: Parameter snapshot in SI units.
/// - `roi`: Region for phase unwrapping in mm, `None` for the whole frame.
///
/// # Returns
/// The reconstruction output. Input validation and propagation errors abort the call; a
/// degenerate region only disables the unwrapped phase and adds a notice.
pub fn reconstruct(
    images: &HologramSet,
    config: &ReconstructionConfig,
    roi: Option<&PhysicalRoi>,
) -> Result<ReconstructionOutput, HoloError> {
    let start = Instant::now();
    let inputs = images.validated()?;
    let shape = inputs.shape();

    let field = reconstruct_field(&inputs, config)?;
    let raw_amplitude = field.mapv(|c| c.norm());
    let amplitude = amplitude_filters(config.gaussian_sigma, config.median_window)
        .iter()
        .fold(raw_amplitude.clone(), |amp, filter| {
            log::debug!("applying {}", filter.config().description);
            filter.filter(&amp)
        });
    let amplitude_display = display_map(&amplitude, config.gamma);
    let phase_wrapped = field.mapv(|c| wrap_phase(c.arg()));

    let mut notices = Vec::new();
    let pixel_roi = match roi {
        Some(roi) => roi.to_pixels(&config.pitch, shape),
        None => Ok(PixelRoi::full(shape)),
    };
    let phase_unwrapped = match pixel_roi {
        Ok(pixel_roi) => Ok(unwrap_roi(
            &phase_wrapped,
            &raw_amplitude,
            config,
            pixel_roi,
            &mut notices,
        )),
        Err(err) => {
            let notice = format!("{err}, phase analysis skipped");
            log::warn!("{notice}");
            notices.push(notice.clone());
            Err(notice)
        }
    };

    log::info!(
        "reconstructed {}x{} hologram in {:?}",
        shape.1,
        shape.0,
        start.elapsed()
    );
    Ok(ReconstructionOutput {
        field,
        amplitude,
        amplitude_display,
        phase_wrapped,
        phase_unwrapped,
        notices,
        config: config.clone(),
    })
}
