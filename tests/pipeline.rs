use approx::{assert_abs_diff_eq, assert_relative_eq};
use holo_explorer::analysis::{point_depth_from_phase, PixelPoint};
use holo_explorer::config::{ConfigCommand, ReconstructionConfig, ReconstructionSettings};
use holo_explorer::data_container::{HologramSet, ImageRole, PixelPitch};
use holo_explorer::data_thread::{main_thread, SessionEvent};
use holo_explorer::io::save_amplitude;
use holo_explorer::math_tools::wrap_phase;
use holo_explorer::pick::{PickKind, PickPoint};
use holo_explorer::reconstruction::reconstruct;
use holo_explorer::reconstruction::fresnel::propagation_constant;
use holo_explorer::reconstruction::reference::reference_wave;
use holo_explorer::unwrap::{path::unwrap_combined, unwrap_tagged, UnwrapMethod};
use ndarray::Array2;
use num_complex::Complex64;
use std::f64::consts::PI;

const WAVELENGTH: f64 = 632.8e-9;
const PITCH: f64 = 3.45e-6;

fn fringes(shape: (usize, usize)) -> Array2<f64> {
    Array2::from_shape_fn(shape, |(y, x)| {
        0.5 + 0.35 * (1.1 * x as f64 + 0.4 * y as f64).cos()
    })
}

fn peak(field: &Array2<Complex64>) -> f64 {
    field.iter().map(|c| c.norm()).fold(0.0, f64::max)
}

fn assert_congruent(unwrapped: &Array2<f64>, wrapped: &Array2<f64>) {
    for (u, w) in unwrapped.iter().zip(wrapped.iter()) {
        assert!(wrap_phase(u - w).abs() < 1e-6, "{u} is not congruent to {w}");
    }
}

#[test]
fn flat_reference_leaves_no_carrier_in_phase() {
    // hologram = reference intensity alone on a square frame
    let reference = Array2::from_elem((32, 32), 0.4);
    let wave = reference_wave(Some(&reference), (32, 32), None, WAVELENGTH, PITCH);
    assert!(wave.iter().all(|c| c.im == 0.0 && c.re > 0.0));

    let mut images = HologramSet::default();
    images.set(ImageRole::Reference, reference.clone());
    images.set(ImageRole::Hologram, reference);
    let config =
        ReconstructionConfig::new(-0.14, WAVELENGTH, None, PixelPitch { dx: PITCH, dy: PITCH })
            .unwrap();
    let output = reconstruct(&images, &config, None).unwrap();
    let peak = peak(&output.field);
    assert!(peak > 0.0);

    // any carrier fringe would break the symmetry between rows and columns
    for ((y, x), c) in output.field.indexed_iter() {
        assert!((c - output.field[[x, y]]).norm() <= 1e-9 * peak);
        if c.norm() > 1e-3 * peak {
            let phase = output.phase_wrapped[[y, x]];
            assert!(wrap_phase(phase - output.phase_wrapped[[x, y]]).abs() < 1e-6);
        }
    }
    let unwrapped = output.phase_unwrapped.unwrap();
    assert_eq!(unwrapped.phase.dim(), (32, 32));
    assert_congruent(&unwrapped.phase, &output.phase_wrapped);
}

#[test]
fn tilted_reference_carries_column_ramp() {
    let shape = (16, 48);
    let theta = 5.0f64.to_radians();
    let wave = reference_wave(None, shape, Some(theta), WAVELENGTH, PITCH);
    let wrapped = wave.mapv(|c| wrap_phase(c.arg()));
    let unwrapped = unwrap_combined(wrapped.view());
    let slope = 2.0 * PI * PITCH * theta.sin() / WAVELENGTH;
    for y in 0..shape.0 {
        for x in 1..shape.1 {
            assert_abs_diff_eq!(
                unwrapped[[y, x]] - unwrapped[[y, x - 1]],
                slope,
                epsilon = 1e-9
            );
        }
    }
}

#[test]
fn tilted_reference_shifts_reconstruction_along_columns() {
    const NX: usize = 32;
    const SHIFT: usize = 8;
    let shape = (16, NX);
    let theta = 5.0f64.to_radians();
    // pitch at which the tilt advances the phase by 2 pi SHIFT / NX per column
    let dx = SHIFT as f64 * WAVELENGTH / (NX as f64 * theta.sin());
    let pitch = PixelPitch { dx, dy: dx };

    let mut images = HologramSet::default();
    images.set(ImageRole::Reference, Array2::from_elem(shape, 0.5));
    images.set(ImageRole::Hologram, fringes(shape));
    let flat_config = ReconstructionConfig::new(-0.14, WAVELENGTH, None, pitch).unwrap();
    let tilted_config = ReconstructionConfig::new(-0.14, WAVELENGTH, Some(theta), pitch).unwrap();
    let flat = reconstruct(&images, &flat_config, None).unwrap();
    let tilted = reconstruct(&images, &tilted_config, None).unwrap();

    let k = propagation_constant(shape, WAVELENGTH, -0.14, &pitch);
    let peak = peak(&flat.field);
    assert!(peak > 0.0);
    for ((y, x), c) in tilted.field.indexed_iter() {
        let xs = (x + SHIFT) % NX;
        let expected = flat.field[[y, xs]] / k[[y, xs]] * k[[y, x]];
        assert!((c - expected).norm() <= 1e-9 * peak);
        assert_abs_diff_eq!(tilted.amplitude[[y, x]], flat.amplitude[[y, xs]], epsilon = 1e-9 * peak);
        if c.norm() > 1e-3 * peak {
            let phase_shift = tilted.phase_wrapped[[y, x]] - flat.phase_wrapped[[y, xs]];
            let carrier = k[[y, x]].arg() - k[[y, xs]].arg();
            assert!(wrap_phase(phase_shift - carrier).abs() < 1e-6);
        }
    }
    assert_congruent(&tilted.phase_unwrapped.unwrap().phase, &tilted.phase_wrapped);
}

#[test]
fn depth_of_half_wave_step() {
    let dz = point_depth_from_phase(PI, WAVELENGTH, 5.0f64.to_radians()).unwrap();
    let theta_eff = (5.0f64.powi(2) + 3.0f64.powi(2)).sqrt().to_radians();
    assert_relative_eq!(dz, WAVELENGTH * PI / (2.0 * PI * theta_eff.sin()), max_relative = 1e-12);
}

#[test]
fn unknown_unwrap_method_falls_back() {
    let wrapped = fringes((12, 12)).mapv(|v| wrap_phase(8.0 * v));
    let outcome = unwrap_tagged(wrapped.view(), "branch-cut", None);
    assert_eq!(outcome.method_used, UnwrapMethod::Combined2D);
    assert_eq!(outcome.warnings.len(), 1);
}

#[test]
fn session_runs_from_files_to_measurement() {
    let dir = std::env::temp_dir().join(format!("holo_explorer_pipeline_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let reference = dir.join("reference.png");
    let hologram = dir.join("hologram.png");
    save_amplitude(&reference, &Array2::from_elem((40, 40), 0.5), [0.0; 3]).unwrap();
    save_amplitude(&hologram, &fringes((40, 40)), [0.0; 3]).unwrap();

    let (config_tx, config_rx) = crossbeam_channel::unbounded();
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    for command in [
        ConfigCommand::OpenFile(ImageRole::Reference, reference),
        ConfigCommand::OpenFile(ImageRole::Hologram, hologram),
        ConfigCommand::SetAngle(Some(5.0)),
        ConfigCommand::SetUnwrapMethod("least-squares".to_string()),
        ConfigCommand::Reconstruct,
        ConfigCommand::BeginPick(PickKind::PointDepth),
        ConfigCommand::SubmitPoint(PickPoint::Pixel(PixelPoint::new(10.0, 10.0))),
        ConfigCommand::SubmitPoint(PickPoint::Pixel(PixelPoint::new(30.0, 30.0))),
        ConfigCommand::Export(dir.join("export")),
        ConfigCommand::Quit,
    ] {
        config_tx.send(command).unwrap();
    }
    let settings = main_thread(ReconstructionSettings::default(), config_rx, event_tx);
    assert_eq!(settings.unwrap_method, UnwrapMethod::LeastSquares);

    let events: Vec<SessionEvent> = event_rx.try_iter().collect();
    assert!(
        !events.iter().any(|e| matches!(e, SessionEvent::Error(_))),
        "{events:?}"
    );
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Reconstructed(summary) if summary.shape == (40, 40)
    )));
    let depth = events.iter().find_map(|e| match e {
        SessionEvent::Measured(m) => Some(m.value()),
        _ => None,
    });
    assert!(depth.is_some_and(f64::is_finite));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Exported(paths) if !paths.is_empty())));
    std::fs::remove_dir_all(dir).ok();
}
