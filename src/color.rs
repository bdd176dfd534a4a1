//! Maps a laser wavelength to an approximate display color.

const DISPLAY_GAMMA: f32 = 0.8;

/// Returns the RGB color (components in [0, 1]) of monochromatic light of the given wavelength
/// in nanometers. Wavelengths outside 380..=780 nm map to black.
pub fn wavelength_to_rgb(wavelength_nm: f64) -> [f32; 3] {
    let w = wavelength_nm as f32;
    let (r, g, b) = match w {
        w if (380.0..440.0).contains(&w) => (-(w - 440.0) / (440.0 - 380.0), 0.0, 1.0),
        w if (440.0..490.0).contains(&w) => (0.0, (w - 440.0) / (490.0 - 440.0), 1.0),
        w if (490.0..510.0).contains(&w) => (0.0, 1.0, -(w - 510.0) / (510.0 - 490.0)),
        w if (510.0..580.0).contains(&w) => ((w - 510.0) / (580.0 - 510.0), 1.0, 0.0),
        w if (580.0..645.0).contains(&w) => (1.0, -(w - 645.0) / (645.0 - 580.0), 0.0),
        w if (645.0..=780.0).contains(&w) => (1.0, 0.0, 0.0),
        _ => return [0.0, 0.0, 0.0],
    };

    // intensity falls off towards the limits of vision
    let factor = if w < 420.0 {
        0.3 + 0.7 * (w - 380.0) / (420.0 - 380.0)
    } else if w > 700.0 {
        0.3 + 0.7 * (780.0 - w) / (780.0 - 700.0)
    } else {
        1.0
    };

    [r, g, b].map(|c: f32| {
        if c <= 0.0 {
            0.0
        } else {
            (c * factor).powf(DISPLAY_GAMMA)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_helium_neon_is_red_orange() {
        let [r, g, b] = wavelength_to_rgb(632.8);
        assert_abs_diff_eq!(r, 1.0);
        assert!(g > 0.0 && g < 0.4);
        assert_eq!(b, 0.0);
    }

    #[test]
    fn test_primary_regions() {
        assert_eq!(wavelength_to_rgb(532.0)[1], 1.0);
        assert_eq!(wavelength_to_rgb(450.0)[2], 1.0);
        assert_eq!(wavelength_to_rgb(300.0), [0.0, 0.0, 0.0]);
        assert_eq!(wavelength_to_rgb(1064.0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_edges_are_dimmed() {
        let [r, _, _] = wavelength_to_rgb(770.0);
        assert!(r < 0.5 && r > 0.0);
        let [_, _, b] = wavelength_to_rgb(385.0);
        assert!(b < 0.5 && b > 0.0);
    }
}
