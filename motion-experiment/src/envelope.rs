use serde::{Deserialize, Serialize};

/// Contrast profile over the presentation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContrastModulation {
    /// Half contrast for one frame at each end, full contrast in between.
    #[default]
    FixedTrapezoidal,
    /// Linear rise to full contrast at mid-duration, then linear fall.
    VariableTriangular,
    None,
}

/// Contrast of the grating `elapsed_s` into a presentation of
/// `stim_duration_s`. Always within [0, 1].
pub fn intensity(
    elapsed_s: f64,
    stim_duration_s: f64,
    max_contrast: f64,
    mode: ContrastModulation,
    frame_duration_s: f64,
) -> f64 {
    let max = finite_or_zero(max_contrast);
    let duration = finite_or_zero(stim_duration_s);
    if duration <= 0.0 {
        return unit(max);
    }
    let t = finite_or_zero(elapsed_s).clamp(0.0, duration);

    let contrast = match mode {
        ContrastModulation::FixedTrapezoidal => {
            let ramp = finite_or_zero(frame_duration_s);
            if ramp > 0.0 && duration >= 3.0 * ramp && (t < ramp || t > duration - ramp) {
                0.5 * max
            } else {
                max
            }
        }
        ContrastModulation::VariableTriangular => {
            let half = 0.5 * duration;
            if t <= half {
                max * t / half
            } else {
                max * (duration - t) / half
            }
        }
        ContrastModulation::None => max,
    };
    unit(contrast)
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

fn unit(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn triangular_peaks_at_midpoint() {
        let at = |t| intensity(t, 1.0, 0.8, ContrastModulation::VariableTriangular, 0.01);
        assert!(close(0.4, at(0.25)));
        assert!(close(0.8, at(0.5)));
        assert!(close(0.4, at(0.75)));
        assert!(close(0.0, at(0.0)));
        assert!(close(0.0, at(1.0)));
    }

    #[test]
    fn trapezoid_halves_first_and_last_frame() {
        let at = |t| intensity(t, 0.05, 0.9, ContrastModulation::FixedTrapezoidal, 0.01);
        assert!(close(0.45, at(0.0)));
        assert!(close(0.45, at(0.005)));
        assert!(close(0.9, at(0.01)));
        assert!(close(0.9, at(0.025)));
        assert!(close(0.45, at(0.045)));
        assert!(close(0.45, at(0.05)));
    }

    #[test]
    fn trapezoid_needs_three_frames() {
        for t in [0.0, 0.005, 0.01, 0.015, 0.02] {
            let c = intensity(t, 0.02, 0.9, ContrastModulation::FixedTrapezoidal, 0.01);
            assert!(close(0.9, c), "t = {t}: {c}");
        }
    }

    #[test]
    fn unmodulated_is_constant() {
        for t in [0.0, 0.1, 0.3] {
            assert!(close(0.98, intensity(t, 0.3, 0.98, ContrastModulation::None, 0.0)));
        }
    }

    #[test]
    fn elapsed_outside_window_is_clamped() {
        let mode = ContrastModulation::VariableTriangular;
        assert!(close(0.0, intensity(-3.0, 1.0, 0.8, mode, 0.01)));
        assert!(close(0.0, intensity(7.0, 1.0, 0.8, mode, 0.01)));
        assert!(close(0.0, intensity(f64::NAN, 1.0, 0.8, mode, 0.01)));
    }

    #[test]
    fn output_stays_in_unit_interval() {
        let modes = [
            ContrastModulation::FixedTrapezoidal,
            ContrastModulation::VariableTriangular,
            ContrastModulation::None,
        ];
        let odd = [
            -1.0,
            0.0,
            0.3,
            1.0,
            4.0,
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ];
        for mode in modes {
            for &t in &odd {
                for &d in &odd {
                    for &c in &odd {
                        for &f in &odd {
                            let v = intensity(t, d, c, mode, f);
                            assert!((0.0..=1.0).contains(&v), "{mode:?} {t} {d} {c} {f} -> {v}");
                        }
                    }
                }
            }
        }
    }
}
