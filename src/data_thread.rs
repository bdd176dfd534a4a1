//! The session owning all mutable state and the command loop serving the interactive layer.

use crate::analysis::Measurement;
use crate::color::wavelength_to_rgb;
use crate::config::{ConfigCommand, ReconstructionSettings};
use crate::data_container::{HologramSet, PhysicalRoi, ReconstructionOutput};
use crate::error::HoloError;
use crate::io::{export_reconstruction, load_intensity};
use crate::pick::{MeasurementContext, PickOutcome, PickSession};
use crate::reconstruction::reconstruct;
use crate::unwrap::{resolve_method, UnwrapMethod};
use crossbeam_channel::{Receiver, Sender};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Short description of a finished reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionSummary {
    pub shape: (usize, usize),
    /// `None` when phase analysis was skipped.
    pub unwrap_method: Option<UnwrapMethod>,
    pub elapsed: Duration,
}

/// Messages sent back from the session to the interactive layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Reconstructed(ReconstructionSummary),
    /// Non-fatal, user-visible information.
    Notice(String),
    /// A request failed and had no effect.
    Error(String),
    PickPending,
    /// Provisional result while the second point is being chosen.
    Preview(Measurement),
    Measured(Measurement),
    Exported(Vec<PathBuf>),
}

/// Loaded images, current settings, the last reconstruction and the pick state.
#[derive(Debug, Default)]
pub struct Session {
    pub images: HologramSet,
    pub settings: ReconstructionSettings,
    pub roi: Option<PhysicalRoi>,
    pub output: Option<ReconstructionOutput>,
    picking: PickSession,
}

/// The unwrapped phase together with the parameters it was reconstructed with.
fn measurement_context(output: &Option<ReconstructionOutput>) -> Option<MeasurementContext<'_>> {
    let output = output.as_ref()?;
    let unwrapped = output.phase_unwrapped.as_ref().ok()?;
    Some(MeasurementContext {
        unwrapped,
        config: &output.config,
    })
}

impl Session {
    pub fn new(settings: ReconstructionSettings) -> Self {
        Session {
            settings,
            ..Default::default()
        }
    }

    pub fn picking(&self) -> &PickSession {
        &self.picking
    }

    /// Processes one command and returns the resulting events.
    pub fn handle(&mut self, command: ConfigCommand) -> Vec<SessionEvent> {
        match command {
            ConfigCommand::OpenFile(role, path) => match load_intensity(&path) {
                Ok(image) => {
                    log::info!("opened {role} image {path:?} with shape {:?}", image.dim());
                    self.images.set(role, image);
                    vec![]
                }
                Err(err) => {
                    log::error!("{err}");
                    vec![SessionEvent::Error(err.to_string())]
                }
            },
            ConfigCommand::Reconstruct => self.reconstruct(),
            ConfigCommand::BeginPick(kind) => {
                if !matches!(&self.output, Some(output) if output.phase_unwrapped.is_ok()) {
                    return vec![SessionEvent::Error(HoloError::NoPhase.to_string())];
                }
                log::debug!("picking two points for {kind}");
                self.picking.begin(kind);
                vec![SessionEvent::PickPending]
            }
            ConfigCommand::PreviewPoint(point) => {
                let Some(context) = measurement_context(&self.output) else {
                    return vec![];
                };
                self.picking
                    .preview(point, &context)
                    .map(SessionEvent::Preview)
                    .into_iter()
                    .collect()
            }
            ConfigCommand::SubmitPoint(point) => {
                let Some(context) = measurement_context(&self.output) else {
                    self.picking.cancel();
                    return vec![SessionEvent::Error(HoloError::NoPhase.to_string())];
                };
                match self.picking.submit_point(point, &context) {
                    Ok(PickOutcome::Pending) => vec![SessionEvent::PickPending],
                    Ok(PickOutcome::Complete(measurement)) => {
                        vec![SessionEvent::Measured(measurement)]
                    }
                    Ok(PickOutcome::Ignored) => vec![],
                    Err(err) => {
                        log::error!("measurement failed: {err}");
                        vec![SessionEvent::Error(err.to_string())]
                    }
                }
            }
            ConfigCommand::CancelPick => {
                self.picking.cancel();
                vec![]
            }
            ConfigCommand::Export(dir) => self.export(dir),
            ConfigCommand::Quit => vec![],
            edit => self.edit(edit),
        }
    }

    /// Applies a parameter or image edit. Rejected values keep the previous setting.
    ///
    /// An accepted edit recomputes an existing reconstruction, so derived data never lags
    /// behind the parameters.
    fn edit(&mut self, command: ConfigCommand) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let settings = &mut self.settings;
        let (accepted, what) = match command {
            ConfigCommand::CloseFile(role) => {
                self.images.clear(role);
                (true, "image")
            }
            ConfigCommand::SetDistance(v) => (settings.set_distance(v), "distance"),
            ConfigCommand::SetWavelength(v) => (settings.set_wavelength(v), "wavelength"),
            ConfigCommand::SetAngle(v) => (settings.set_angle(v), "angle"),
            ConfigCommand::SetPixelPitch(v) => (settings.set_pixel_pitch(v), "pixel pitch"),
            ConfigCommand::SetGamma(v) => (settings.set_gamma(v), "gamma"),
            ConfigCommand::SetUnwrapMethod(tag) => {
                let (method, warning) = resolve_method(&tag);
                settings.unwrap_method = method;
                events.extend(warning.map(SessionEvent::Notice));
                (true, "unwrap method")
            }
            ConfigCommand::SetWeightedUnwrap(v) => {
                settings.weighted_unwrap = v;
                (true, "weighting")
            }
            ConfigCommand::SetGaussian(v) => (settings.set_gaussian(v), "gaussian sigma"),
            ConfigCommand::SetMedian(v) => (settings.set_median(v), "median window"),
            ConfigCommand::SetFourierRadius(v) => (settings.set_fourier_radius(v), "fourier radius"),
            ConfigCommand::SetNeighborhoodRadius(v) => {
                (settings.set_neighborhood_radius(v), "neighborhood radius")
            }
            ConfigCommand::SetDetrendRoughness(v) => {
                settings.detrend_roughness = v;
                (true, "detrending")
            }
            ConfigCommand::SetRoi(roi) => {
                self.roi = roi;
                (true, "region of interest")
            }
            other => {
                log::debug!("not an edit: {other:?}");
                return events;
            }
        };
        if accepted {
            // pending picks refer to the phase map of the old parameters
            self.picking.cancel();
            if self.output.is_some() {
                events.extend(self.reconstruct());
            }
        } else {
            events.push(SessionEvent::Notice(format!("invalid {what} ignored")));
        }
        events
    }

    fn reconstruct(&mut self) -> Vec<SessionEvent> {
        let start = Instant::now();
        self.picking.cancel();
        let result = self
            .settings
            .snapshot()
            .and_then(|config| reconstruct(&self.images, &config, self.roi.as_ref()));
        match result {
            Ok(output) => {
                let mut events: Vec<SessionEvent> =
                    output.notices.iter().cloned().map(SessionEvent::Notice).collect();
                events.push(SessionEvent::Reconstructed(ReconstructionSummary {
                    shape: output.field.dim(),
                    unwrap_method: output.phase_unwrapped.as_ref().ok().map(|u| u.method_used),
                    elapsed: start.elapsed(),
                }));
                self.output = Some(output);
                events
            }
            Err(err) => {
                log::error!("reconstruction failed: {err}");
                self.output = None;
                vec![SessionEvent::Error(err.to_string())]
            }
        }
    }

    fn export(&self, dir: PathBuf) -> Vec<SessionEvent> {
        let Some(output) = &self.output else {
            return vec![SessionEvent::Error(
                "nothing to export, reconstruct first".to_string(),
            )];
        };
        let tint = wavelength_to_rgb(self.settings.wavelength_nm);
        match export_reconstruction(&dir, output, tint) {
            Ok(paths) => vec![SessionEvent::Exported(paths)],
            Err(err) => {
                log::error!("export failed: {err}");
                vec![SessionEvent::Error(err.to_string())]
            }
        }
    }
}

/// Serves commands from `config_rx` until `Quit` arrives or all senders are dropped.
///
/// Every command is answered with its events on `event_tx`; the loop also ends when the
/// receiving side of `event_tx` has gone away.
pub fn main_thread(
    settings: ReconstructionSettings,
    config_rx: Receiver<ConfigCommand>,
    event_tx: Sender<SessionEvent>,
) -> ReconstructionSettings {
    let mut session = Session::new(settings);
    while let Ok(command) = config_rx.recv() {
        let quit = matches!(command, ConfigCommand::Quit);
        for event in session.handle(command) {
            if event_tx.send(event).is_err() {
                log::debug!("event receiver dropped, stopping session");
                return session.settings;
            }
        }
        if quit {
            break;
        }
    }
    session.settings
}
