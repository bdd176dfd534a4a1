//! Fresnel reconstruction of off-axis digital holograms and quantitative analysis of the
//! reconstructed phase.
//!
//! A [`data_thread::Session`] owns the loaded images and the current settings and answers
//! [`config::ConfigCommand`]s. The numerical pipeline lives in [`reconstruction`], the unwrapping
//! strategies in [`unwrap`] and the depth and roughness measurements in [`analysis`].

use preferences::AppInfo;

pub mod analysis;
pub mod color;
pub mod config;
pub mod data_container;
pub mod data_thread;
pub mod error;
pub mod fft;
pub mod io;
pub mod math_tools;
pub mod pick;
pub mod reconstruction;
pub mod unwrap;

pub const APP_INFO: AppInfo = AppInfo {
    name: "Holo Explorer",
    author: "Linus Leo Stöckli",
};

/// Preferences key of the persisted [`config::ReconstructionSettings`].
pub const SETTINGS_KEY: &str = "config/reconstruction";
