//! Reconstruction settings in user units, the commands that edit them, and the immutable SI
//! snapshot passed into each reconstruction.

use crate::data_container::{ImageRole, PhysicalRoi, PixelPitch};
use crate::error::HoloError;
use crate::pick::{PickKind, PickPoint};
use crate::unwrap::UnwrapMethod;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Messages sent from the interactive layer to the session.
#[derive(Debug, Clone)]
pub enum ConfigCommand {
    OpenFile(ImageRole, PathBuf),
    CloseFile(ImageRole),
    SetDistance(f64),
    SetWavelength(f64),
    SetAngle(Option<f64>),
    SetPixelPitch([f64; 2]),
    SetGamma(f64),
    /// Unwrap method tag as entered by the user, e.g. `"least-squares"`.
    SetUnwrapMethod(String),
    SetWeightedUnwrap(bool),
    SetGaussian(Option<f64>),
    SetMedian(Option<usize>),
    SetFourierRadius(Option<f64>),
    SetNeighborhoodRadius(usize),
    SetDetrendRoughness(bool),
    SetRoi(Option<PhysicalRoi>),
    Reconstruct,
    BeginPick(PickKind),
    PreviewPoint(PickPoint),
    SubmitPoint(PickPoint),
    CancelPick,
    Export(PathBuf),
    Quit,
}

/// User-facing reconstruction parameters.
///
/// Distances are entered in centimeters, wavelengths in nanometers, angles in degrees and the
/// pixel pitch in micrometers. Setters reject invalid values, log a warning and keep the prior
/// value.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct ReconstructionSettings {
    pub distance_cm: f64,
    pub wavelength_nm: f64,
    pub angle_deg: Option<f64>,
    pub pixel_pitch_um: [f64; 2],
    pub gamma: f64,
    pub unwrap_method: UnwrapMethod,
    pub weighted_unwrap: bool,
    pub gaussian_sigma: Option<f64>,
    pub median_window: Option<usize>,
    pub fourier_radius: Option<f64>,
    pub neighborhood_radius: usize,
    pub detrend_roughness: bool,
    pub export_path: PathBuf,
}

impl Default for ReconstructionSettings {
    fn default() -> Self {
        ReconstructionSettings {
            distance_cm: -14.0,
            wavelength_nm: 632.8,
            angle_deg: None,
            pixel_pitch_um: [3.45, 3.45],
            gamma: 0.5,
            unwrap_method: UnwrapMethod::Combined2D,
            weighted_unwrap: false,
            gaussian_sigma: None,
            median_window: None,
            fourier_radius: None,
            neighborhood_radius: 3,
            detrend_roughness: false,
            export_path: home::home_dir().unwrap_or_else(|| PathBuf::from("/")),
        }
    }
}

fn reject(name: &'static str, value: f64) -> bool {
    log::warn!("ignoring invalid {name}: {value}, keeping previous value");
    false
}

impl ReconstructionSettings {
    /// Sets the propagation distance in cm. Zero and non-finite values are rejected.
    pub fn set_distance(&mut self, distance_cm: f64) -> bool {
        if !distance_cm.is_finite() || distance_cm == 0.0 {
            return reject("distance", distance_cm);
        }
        self.distance_cm = distance_cm;
        true
    }

    pub fn set_wavelength(&mut self, wavelength_nm: f64) -> bool {
        if !wavelength_nm.is_finite() || wavelength_nm <= 0.0 {
            return reject("wavelength", wavelength_nm);
        }
        self.wavelength_nm = wavelength_nm;
        true
    }

    /// Sets the reference tilt angle in degrees, `None` for a flat reference.
    pub fn set_angle(&mut self, angle_deg: Option<f64>) -> bool {
        if let Some(angle) = angle_deg {
            if !angle.is_finite() || angle.abs() >= 90.0 {
                return reject("angle", angle);
            }
        }
        self.angle_deg = angle_deg;
        true
    }

    pub fn set_pixel_pitch(&mut self, pitch_um: [f64; 2]) -> bool {
        for p in pitch_um {
            if !p.is_finite() || p <= 0.0 {
                return reject("pixel pitch", p);
            }
        }
        self.pixel_pitch_um = pitch_um;
        true
    }

    /// Sets the display gamma, which must lie in (0, 1].
    pub fn set_gamma(&mut self, gamma: f64) -> bool {
        if !(gamma > 0.0 && gamma <= 1.0) {
            return reject("gamma", gamma);
        }
        self.gamma = gamma;
        true
    }

    pub fn set_gaussian(&mut self, sigma: Option<f64>) -> bool {
        if let Some(s) = sigma {
            if !s.is_finite() || s <= 0.0 {
                return reject("gaussian sigma", s);
            }
        }
        self.gaussian_sigma = sigma;
        true
    }

    pub fn set_median(&mut self, window: Option<usize>) -> bool {
        if window == Some(0) {
            return reject("median window", 0.0);
        }
        self.median_window = window;
        true
    }

    /// Sets the Fourier mask radius as a fraction of the smaller image side, in (0, 1].
    pub fn set_fourier_radius(&mut self, radius: Option<f64>) -> bool {
        if let Some(r) = radius {
            if !(r > 0.0 && r <= 1.0) {
                return reject("fourier radius", r);
            }
        }
        self.fourier_radius = radius;
        true
    }

    pub fn set_neighborhood_radius(&mut self, radius: usize) -> bool {
        if radius == 0 {
            return reject("neighborhood radius", 0.0);
        }
        self.neighborhood_radius = radius;
        true
    }

    /// Runs every stored value through its setter. Values that fail validation, e.g. from an
    /// edited preferences file, are replaced by the defaults.
    pub fn sanitized(self) -> Self {
        let mut clean = ReconstructionSettings {
            unwrap_method: self.unwrap_method,
            weighted_unwrap: self.weighted_unwrap,
            detrend_roughness: self.detrend_roughness,
            export_path: self.export_path,
            ..Default::default()
        };
        clean.set_distance(self.distance_cm);
        clean.set_wavelength(self.wavelength_nm);
        clean.set_angle(self.angle_deg);
        clean.set_pixel_pitch(self.pixel_pitch_um);
        clean.set_gamma(self.gamma);
        clean.set_gaussian(self.gaussian_sigma);
        clean.set_median(self.median_window);
        clean.set_fourier_radius(self.fourier_radius);
        clean.set_neighborhood_radius(self.neighborhood_radius);
        clean
    }

    /// Converts the settings into SI units.
    ///
    /// Fails with `InvalidParameter` if any value is out of range.
    pub fn snapshot(&self) -> Result<ReconstructionConfig, HoloError> {
        ReconstructionConfig::new(
            self.distance_cm * 1e-2,
            self.wavelength_nm * 1e-9,
            self.angle_deg.map(f64::to_radians),
            PixelPitch {
                dx: self.pixel_pitch_um[0] * 1e-6,
                dy: self.pixel_pitch_um[1] * 1e-6,
            },
        )
        .map(|config| ReconstructionConfig {
            gamma: self.gamma,
            unwrap_method: self.unwrap_method,
            weighted_unwrap: self.weighted_unwrap,
            gaussian_sigma: self.gaussian_sigma,
            median_window: self.median_window,
            fourier_radius: self.fourier_radius,
            neighborhood_radius: self.neighborhood_radius,
            detrend_roughness: self.detrend_roughness,
            ..config
        })
        .and_then(ReconstructionConfig::checked)
    }
}

/// Immutable reconstruction parameters in SI units (meters, radians).
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionConfig {
    /// Signed propagation distance, the sign selects the propagation side.
    pub distance: f64,
    pub wavelength: f64,
    /// Horizontal reference tilt, `None` for a flat reference.
    pub angle: Option<f64>,
    pub pitch: PixelPitch,
    pub gamma: f64,
    pub unwrap_method: UnwrapMethod,
    pub weighted_unwrap: bool,
    pub gaussian_sigma: Option<f64>,
    pub median_window: Option<usize>,
    pub fourier_radius: Option<f64>,
    pub neighborhood_radius: usize,
    pub detrend_roughness: bool,
}

impl ReconstructionConfig {
    /// Creates a configuration with default display and filter options.
    ///
    /// Rejects a zero or non-finite `wavelength * distance` product and non-positive pixel
    /// pitches, which would otherwise divide by zero in the propagation kernel.
    pub fn new(
        distance: f64,
        wavelength: f64,
        angle: Option<f64>,
        pitch: PixelPitch,
    ) -> Result<Self, HoloError> {
        if !distance.is_finite() || distance == 0.0 {
            return Err(HoloError::InvalidParameter {
                name: "distance",
                value: distance,
            });
        }
        if !wavelength.is_finite() || wavelength <= 0.0 {
            return Err(HoloError::InvalidParameter {
                name: "wavelength",
                value: wavelength,
            });
        }
        let product = wavelength * distance;
        if !product.is_finite() || product == 0.0 {
            return Err(HoloError::InvalidParameter {
                name: "wavelength * distance",
                value: product,
            });
        }
        for (name, value) in [("pixel pitch x", pitch.dx), ("pixel pitch y", pitch.dy)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(HoloError::InvalidParameter { name, value });
            }
        }
        if let Some(angle) = angle {
            if !angle.is_finite() {
                return Err(HoloError::InvalidParameter {
                    name: "angle",
                    value: angle,
                });
            }
        }
        Ok(ReconstructionConfig {
            distance,
            wavelength,
            angle,
            pitch,
            gamma: 0.5,
            unwrap_method: UnwrapMethod::Combined2D,
            weighted_unwrap: false,
            gaussian_sigma: None,
            median_window: None,
            fourier_radius: None,
            neighborhood_radius: 3,
            detrend_roughness: false,
        })
    }
}

impl ReconstructionConfig {
    /// Checks the display, filter and measurement options.
    fn checked(self) -> Result<Self, HoloError> {
        let invalid = |name, value| Err(HoloError::InvalidParameter { name, value });
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return invalid("gamma", self.gamma);
        }
        if let Some(sigma) = self.gaussian_sigma {
            if !sigma.is_finite() || sigma <= 0.0 {
                return invalid("gaussian sigma", sigma);
            }
        }
        if self.median_window == Some(0) {
            return invalid("median window", 0.0);
        }
        if let Some(radius) = self.fourier_radius {
            if !(radius > 0.0 && radius <= 1.0) {
                return invalid("fourier radius", radius);
            }
        }
        if self.neighborhood_radius == 0 {
            return invalid("neighborhood radius", 0.0);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use preferences::Preferences;

    #[test]
    fn test_invalid_edits_keep_previous_values() {
        let mut settings = ReconstructionSettings::default();
        assert!(!settings.set_distance(0.0));
        assert!(!settings.set_distance(f64::NAN));
        assert_eq!(settings.distance_cm, -14.0);
        assert!(!settings.set_wavelength(-1.0));
        assert_eq!(settings.wavelength_nm, 632.8);
        assert!(!settings.set_gamma(1.5));
        assert!(!settings.set_gamma(0.0));
        assert_eq!(settings.gamma, 0.5);
        assert!(!settings.set_gaussian(Some(0.0)));
        assert!(!settings.set_median(Some(0)));
        assert!(!settings.set_fourier_radius(Some(1.2)));
        assert!(!settings.set_angle(Some(90.0)));
        assert_eq!(settings, ReconstructionSettings::default());

        assert!(settings.set_distance(20.0));
        assert!(settings.set_angle(Some(5.0)));
        assert!(settings.set_median(Some(4)));
        assert_eq!(settings.distance_cm, 20.0);
        assert_eq!(settings.angle_deg, Some(5.0));
        assert_eq!(settings.median_window, Some(4));
    }

    #[test]
    fn test_snapshot_converts_to_si_units() {
        let mut settings = ReconstructionSettings::default();
        settings.set_angle(Some(5.0));
        settings.set_gaussian(Some(1.5));
        let config = settings.snapshot().unwrap();
        assert_abs_diff_eq!(config.distance, -0.14, epsilon = 1e-15);
        assert_abs_diff_eq!(config.wavelength, 632.8e-9, epsilon = 1e-20);
        assert_abs_diff_eq!(config.angle.unwrap(), 5.0f64.to_radians(), epsilon = 1e-15);
        assert_abs_diff_eq!(config.pitch.dx, 3.45e-6, epsilon = 1e-18);
        assert_eq!(config.gaussian_sigma, Some(1.5));
    }

    fn stored(defaults_edit: (&str, &str)) -> ReconstructionSettings {
        let mut json = Vec::new();
        ReconstructionSettings::default().save_to(&mut json).unwrap();
        let json = String::from_utf8(json).unwrap();
        assert!(json.contains(defaults_edit.0));
        let json = json.replace(defaults_edit.0, defaults_edit.1);
        ReconstructionSettings::load_from(&mut json.as_bytes()).unwrap()
    }

    #[test]
    fn test_out_of_range_stored_values_are_not_propagated() {
        for edit in [
            (r#""gamma":0.5"#, r#""gamma":5.0"#),
            (r#""neighborhood_radius":3"#, r#""neighborhood_radius":0"#),
            (r#""median_window":null"#, r#""median_window":0"#),
            (r#""fourier_radius":null"#, r#""fourier_radius":3.0"#),
            (r#""gaussian_sigma":null"#, r#""gaussian_sigma":-1.0"#),
        ] {
            let settings = stored(edit);
            assert!(
                matches!(settings.snapshot(), Err(HoloError::InvalidParameter { .. })),
                "{edit:?}"
            );
            let clean = settings.sanitized();
            assert_eq!(clean, ReconstructionSettings::default(), "{edit:?}");
            assert!(clean.snapshot().is_ok());
        }
    }

    #[test]
    fn test_sanitized_keeps_valid_values() {
        let mut settings = stored((r#""gamma":0.5"#, r#""gamma":0.8"#));
        settings.set_angle(Some(5.0));
        settings.set_median(Some(3));
        let clean = settings.clone().sanitized();
        assert_eq!(clean, settings);
    }

    #[test]
    fn test_zero_distance_or_wavelength_is_rejected() {
        let pitch = PixelPitch { dx: 1e-6, dy: 1e-6 };
        assert!(matches!(
            ReconstructionConfig::new(0.0, 632.8e-9, None, pitch),
            Err(HoloError::InvalidParameter { name: "distance", .. })
        ));
        assert!(matches!(
            ReconstructionConfig::new(-0.14, 0.0, None, pitch),
            Err(HoloError::InvalidParameter { name: "wavelength", .. })
        ));
        assert!(ReconstructionConfig::new(-0.14, 632.8e-9, None, pitch).is_ok());
    }
}
