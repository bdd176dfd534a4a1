use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, Sender};
use holo_explorer::config::{ConfigCommand, ReconstructionSettings};
use holo_explorer::data_container::{ImageRole, PhysicalRoi};
use holo_explorer::data_thread::{main_thread, SessionEvent};
use holo_explorer::pick::{PickKind, PickPoint};
use holo_explorer::{APP_INFO, SETTINGS_KEY};
use preferences::Preferences;
use std::path::PathBuf;
use std::thread;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Reconstruct an off-axis hologram and measure depth and roughness on its phase"
)]
struct Args {
    /// Reference beam intensity image
    #[arg(short, long)]
    reference: PathBuf,

    /// Recorded hologram image
    #[arg(short = 'H', long)]
    hologram: PathBuf,

    /// Object beam intensity image
    #[arg(short, long)]
    object: Option<PathBuf>,

    /// Propagation distance in cm (signed)
    #[arg(short, long, allow_hyphen_values = true)]
    distance_cm: Option<f64>,

    /// Wavelength in nm
    #[arg(short, long)]
    wavelength_nm: Option<f64>,

    /// Horizontal reference tilt in degrees
    #[arg(short, long, allow_hyphen_values = true)]
    angle_deg: Option<f64>,

    /// Pixel pitch in um, either one value or "dx,dy"
    #[arg(long, value_parser = parse_pitch)]
    pitch_um: Option<[f64; 2]>,

    /// Display gamma in (0, 1]
    #[arg(short, long)]
    gamma: Option<f64>,

    /// Unwrap method: row-only, column-only, combined-2d or least-squares
    #[arg(short, long)]
    unwrap: Option<String>,

    /// Weight the least-squares unwrap with the amplitude
    #[arg(long)]
    weighted: bool,

    /// Gaussian smoothing sigma of the amplitude in pixels
    #[arg(long)]
    gaussian: Option<f64>,

    /// Median smoothing window of the amplitude in pixels
    #[arg(long)]
    median: Option<usize>,

    /// Fourier low-pass radius as a fraction of the smaller image side
    #[arg(long)]
    fourier_radius: Option<f64>,

    /// Region of interest for unwrapping in mm: "x0,y0,x1,y1"
    #[arg(long, value_parser = parse_corners, allow_hyphen_values = true)]
    roi: Option<[f64; 4]>,

    /// Point-to-point depth between two points in mm: "x1,y1,x2,y2"
    #[arg(long, value_parser = parse_corners, allow_hyphen_values = true)]
    depth: Option<[f64; 4]>,

    /// Path-averaged depth between two points in mm: "x1,y1,x2,y2"
    #[arg(long, value_parser = parse_corners, allow_hyphen_values = true)]
    path_depth: Option<[f64; 4]>,

    /// RMS roughness over a rectangle in mm: "x0,y0,x1,y1"
    #[arg(long, value_parser = parse_corners, allow_hyphen_values = true)]
    roughness: Option<[f64; 4]>,

    /// Remove the best-fit plane before computing the roughness
    #[arg(long)]
    detrend: bool,

    /// Output directory for the exported maps
    #[arg(long)]
    out: Option<PathBuf>,

    /// Export the maps to the stored export directory when no --out is given
    #[arg(long)]
    export: bool,

    /// Store the resulting settings as defaults for the next run
    #[arg(long)]
    save_settings: bool,
}

fn parse_values(s: &str) -> Result<Vec<f64>, String> {
    s.split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|err| format!("invalid number {v:?}: {err}"))
        })
        .collect()
}

/// Parses "a,b,c,d".
fn parse_corners(s: &str) -> Result<[f64; 4], String> {
    parse_values(s)?
        .try_into()
        .map_err(|v: Vec<f64>| format!("expected 4 comma-separated values, got {}", v.len()))
}

/// Parses "dx" or "dx,dy".
fn parse_pitch(s: &str) -> Result<[f64; 2], String> {
    let values = parse_values(s)?;
    match values[..] {
        [d] => Ok([d, d]),
        [dx, dy] => Ok([dx, dy]),
        _ => Err(format!(
            "expected 1 or 2 comma-separated values, got {}",
            values.len()
        )),
    }
}

fn load_settings() -> ReconstructionSettings {
    match ReconstructionSettings::load(&APP_INFO, SETTINGS_KEY) {
        Ok(settings) => settings.sanitized(),
        Err(_) => {
            let settings = ReconstructionSettings::default();
            // save default settings
            if let Err(err) = settings.save(&APP_INFO, SETTINGS_KEY) {
                log::error!("error in saving default settings: {err:?}");
            }
            settings
        }
    }
}

fn pick(kind: PickKind, [x1, y1, x2, y2]: [f64; 4]) -> Vec<ConfigCommand> {
    vec![
        ConfigCommand::BeginPick(kind),
        ConfigCommand::SubmitPoint(PickPoint::Millimeters { x: x1, y: y1 }),
        ConfigCommand::SubmitPoint(PickPoint::Millimeters { x: x2, y: y2 }),
    ]
}

/// Translates the command line into the session commands of one run.
fn commands(args: &Args, settings: &ReconstructionSettings) -> Vec<ConfigCommand> {
    let mut commands = vec![
        ConfigCommand::OpenFile(ImageRole::Reference, args.reference.clone()),
        ConfigCommand::OpenFile(ImageRole::Hologram, args.hologram.clone()),
    ];
    if let Some(object) = &args.object {
        commands.push(ConfigCommand::OpenFile(ImageRole::Object, object.clone()));
    }
    if let Some(d) = args.distance_cm {
        commands.push(ConfigCommand::SetDistance(d));
    }
    if let Some(w) = args.wavelength_nm {
        commands.push(ConfigCommand::SetWavelength(w));
    }
    if args.angle_deg.is_some() {
        commands.push(ConfigCommand::SetAngle(args.angle_deg));
    }
    if let Some(pitch) = args.pitch_um {
        commands.push(ConfigCommand::SetPixelPitch(pitch));
    }
    if let Some(g) = args.gamma {
        commands.push(ConfigCommand::SetGamma(g));
    }
    if let Some(method) = &args.unwrap {
        commands.push(ConfigCommand::SetUnwrapMethod(method.clone()));
    }
    if args.weighted {
        commands.push(ConfigCommand::SetWeightedUnwrap(true));
    }
    if args.gaussian.is_some() {
        commands.push(ConfigCommand::SetGaussian(args.gaussian));
    }
    if args.median.is_some() {
        commands.push(ConfigCommand::SetMedian(args.median));
    }
    if args.fourier_radius.is_some() {
        commands.push(ConfigCommand::SetFourierRadius(args.fourier_radius));
    }
    if args.detrend {
        commands.push(ConfigCommand::SetDetrendRoughness(true));
    }
    if let Some([x0, y0, x1, y1]) = args.roi {
        commands.push(ConfigCommand::SetRoi(Some(PhysicalRoi::new(x0, y0, x1, y1))));
    }
    commands.push(ConfigCommand::Reconstruct);
    if let Some(coords) = args.depth {
        commands.extend(pick(PickKind::PointDepth, coords));
    }
    if let Some(coords) = args.path_depth {
        commands.extend(pick(PickKind::PathDepth, coords));
    }
    if let Some(coords) = args.roughness {
        commands.extend(pick(PickKind::Roughness, coords));
    }
    if let Some(out) = &args.out {
        commands.push(ConfigCommand::Export(out.clone()));
    } else if args.export {
        commands.push(ConfigCommand::Export(settings.export_path.clone()));
    }
    commands.push(ConfigCommand::Quit);
    commands
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    log::info!(
        "holo-explorer {} ({}@{})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_BRANCH"),
        env!("GIT_HASH")
    );

    let settings = load_settings();
    let commands = commands(&args, &settings);

    let (config_tx, config_rx): (Sender<ConfigCommand>, Receiver<ConfigCommand>) =
        crossbeam_channel::unbounded();
    let (event_tx, event_rx): (Sender<SessionEvent>, Receiver<SessionEvent>) =
        crossbeam_channel::unbounded();
    let session = thread::spawn(move || main_thread(settings, config_rx, event_tx));

    for command in commands {
        config_tx
            .send(command)
            .context("session thread stopped unexpectedly")?;
    }
    drop(config_tx);

    let mut failures = 0;
    for event in event_rx.iter() {
        match event {
            SessionEvent::Reconstructed(summary) => {
                let method = summary
                    .unwrap_method
                    .map_or("skipped".to_string(), |m| m.to_string());
                println!(
                    "reconstructed {}x{} px in {:?}, unwrap: {method}",
                    summary.shape.1, summary.shape.0, summary.elapsed
                );
            }
            SessionEvent::Notice(notice) => println!("note: {notice}"),
            SessionEvent::Error(err) => {
                eprintln!("error: {err}");
                failures += 1;
            }
            SessionEvent::Measured(measurement) => println!("{measurement}"),
            SessionEvent::Exported(paths) => {
                for path in paths {
                    println!("wrote {}", path.display());
                }
            }
            SessionEvent::PickPending | SessionEvent::Preview(_) => {}
        }
    }

    let settings = match session.join() {
        Ok(settings) => settings,
        Err(_) => bail!("session thread panicked"),
    };
    if args.save_settings {
        settings
            .save(&APP_INFO, SETTINGS_KEY)
            .context("saving settings")?;
        log::info!("saved settings as defaults");
    }
    if failures > 0 {
        bail!("{failures} request(s) failed");
    }
    Ok(())
}
