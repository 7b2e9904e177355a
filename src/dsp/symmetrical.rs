//! Symmetrical component decomposition
//!
//! Fortescue transform of three per-phase fundamental phasors into zero-,
//! positive-, and negative-sequence components. A balanced system is pure
//! positive sequence; unbalance and ground faults show up in the other two.

use std::f64::consts::TAU;

use num_complex::Complex;

use crate::domain::{HarmonicComponent, SequenceComponent, SymmetricalComponents};

/// Decompose three per-phase fundamental phasors.
///
/// Uses the rotation operator `a = e^{j·2π/3}`:
/// zero = (A+B+C)/3, positive = (A+aB+a²C)/3, negative = (A+a²B+aC)/3.
pub fn symmetrical_components(
    a: &HarmonicComponent,
    b: &HarmonicComponent,
    c: &HarmonicComponent,
) -> SymmetricalComponents {
    let pa = Complex::from_polar(a.rms, a.phase);
    let pb = Complex::from_polar(b.rms, b.phase);
    let pc = Complex::from_polar(c.rms, c.phase);

    let rot = Complex::from_polar(1.0, TAU / 3.0);
    let rot2 = rot * rot;

    SymmetricalComponents {
        zero: sequence((pa + pb + pc) / 3.0),
        positive: sequence((pa + rot * pb + rot2 * pc) / 3.0),
        negative: sequence((pa + rot2 * pb + rot * pc) / 3.0),
    }
}

fn sequence(phasor: Complex<f64>) -> SequenceComponent {
    SequenceComponent {
        magnitude: phasor.norm(),
        phase_deg: phasor.arg().to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fundamental(rms: f64, phase_deg: f64) -> HarmonicComponent {
        let phase = phase_deg.to_radians();
        HarmonicComponent {
            order: 1,
            rms,
            phase,
            phasor: Complex::from_polar(rms, phase),
        }
    }

    #[test]
    fn balanced_system_is_pure_positive_sequence() {
        let a = fundamental(100.0, 0.0);
        let b = fundamental(100.0, -120.0);
        let c = fundamental(100.0, 120.0);

        let seq = symmetrical_components(&a, &b, &c);

        assert!((seq.positive.magnitude - 100.0).abs() < 0.001);
        assert!(seq.zero.magnitude < 0.001);
        assert!(seq.negative.magnitude < 0.001);
    }

    #[test]
    fn common_mode_shows_as_zero_sequence() {
        let a = fundamental(10.0, 0.0);
        let b = fundamental(10.0, 0.0);
        let c = fundamental(10.0, 0.0);

        let seq = symmetrical_components(&a, &b, &c);

        assert!((seq.zero.magnitude - 10.0).abs() < 0.001);
        assert!(seq.positive.magnitude < 0.001);
        assert!(seq.negative.magnitude < 0.001);
    }

    #[test]
    fn reversed_rotation_shows_as_negative_sequence() {
        // Swap phases B and C: rotation reverses
        let a = fundamental(100.0, 0.0);
        let b = fundamental(100.0, 120.0);
        let c = fundamental(100.0, -120.0);

        let seq = symmetrical_components(&a, &b, &c);

        assert!((seq.negative.magnitude - 100.0).abs() < 0.001);
        assert!(seq.positive.magnitude < 0.001);
        assert!(seq.zero.magnitude < 0.001);
    }
}
