//! Per-cycle and per-second measurement builders
//!
//! Pure aggregation: every call recomputes from the window it is given and
//! nothing is retained between calls. The per-cycle builder works on raw
//! samples spanning one electrical cycle; the one-second builder rolls
//! completed cycles up for slower consumers.

use crate::domain::{
    AnalysisError, AnalysisResult, Channel, OneSecondSummary, PerCycleMeasurement, PhaseCycle,
    PhaseMetrics, Sample,
};
use crate::dsp::spectrum::SpectralAnalyzer;

/// Magnitudes below this are treated as zero when dividing
const EPSILON: f64 = 1e-9;

/// Build the measurement for one completed cycle of samples.
///
/// The buffer must span one cycle at the currently assumed frequency; its
/// fundamental phasor therefore lands in bin 1 of the transform.
pub fn build_per_cycle(
    samples: &[Sample],
    analyzer: &mut SpectralAnalyzer,
) -> AnalysisResult<PerCycleMeasurement> {
    if samples.is_empty() {
        return Err(AnalysisError::InvalidInput("empty cycle buffer".into()));
    }

    let phases = [
        phase_cycle(samples, 0, analyzer)?,
        phase_cycle(samples, 1, analyzer)?,
        phase_cycle(samples, 2, analyzer)?,
    ];

    Ok(PerCycleMeasurement {
        phases,
        residual_current_rms: rms(samples.iter().map(|s| s.current.iter().sum::<f64>())),
        frequency_hz: cycle_frequency(samples, 1.0),
        timestamp_s: samples[samples.len() - 1].timestamp_s,
    })
}

fn phase_cycle(
    samples: &[Sample],
    phase: usize,
    analyzer: &mut SpectralAnalyzer,
) -> AnalysisResult<PhaseCycle> {
    let voltage_rms = rms(samples.iter().map(|s| s.voltage[phase]));
    let current_rms = rms(samples.iter().map(|s| s.current[phase]));
    let active_power = samples
        .iter()
        .map(|s| s.voltage[phase] * s.current[phase])
        .sum::<f64>()
        / samples.len() as f64;

    let spectrum = analyzer.transform(samples, Channel::voltage(phase), false)?;
    let significant = analyzer.find_significant_harmonics(&spectrum)?;
    let voltage_fundamental = significant[0];
    let dominant_harmonic = significant.get(1).copied();

    Ok(PhaseCycle {
        voltage_rms,
        current_rms,
        active_power,
        voltage_fundamental,
        dominant_harmonic,
        thd_pct: thd_percent(voltage_rms, voltage_fundamental.rms),
    })
}

/// Aggregate one second's worth of per-cycle measurements.
///
/// Returns `None` for an empty window.
pub fn build_one_second(cycles: &[PerCycleMeasurement]) -> Option<OneSecondSummary> {
    if cycles.is_empty() {
        return None;
    }

    let mut phases = [PhaseMetrics {
        voltage_rms: 0.0,
        current_rms: 0.0,
        active_power: 0.0,
        apparent_power: 0.0,
        reactive_power: 0.0,
        power_factor: 0.0,
        thd_pct: 0.0,
    }; 3];

    for (phase, metrics) in phases.iter_mut().enumerate() {
        let voltage_rms = rms(cycles.iter().map(|c| c.phases[phase].voltage_rms));
        let current_rms = rms(cycles.iter().map(|c| c.phases[phase].current_rms));
        let active_power = cycles
            .iter()
            .map(|c| c.phases[phase].active_power)
            .sum::<f64>()
            / cycles.len() as f64;
        let fundamental_rms = rms(
            cycles
                .iter()
                .map(|c| c.phases[phase].voltage_fundamental.rms),
        );

        let apparent_power = voltage_rms * current_rms;
        let reactive_power =
            (apparent_power * apparent_power - active_power * active_power).max(0.0).sqrt();
        let power_factor = if apparent_power < EPSILON {
            0.0
        } else {
            active_power.abs() / apparent_power
        };

        *metrics = PhaseMetrics {
            voltage_rms,
            current_rms,
            active_power,
            apparent_power,
            reactive_power,
            power_factor,
            thd_pct: thd_percent(voltage_rms, fundamental_rms),
        };
    }

    let voltage_unbalance_pct = nema_unbalance(&[
        phases[0].voltage_rms,
        phases[1].voltage_rms,
        phases[2].voltage_rms,
    ]);
    let current_unbalance_pct = nema_unbalance(&[
        phases[0].current_rms,
        phases[1].current_rms,
        phases[2].current_rms,
    ]);

    Some(OneSecondSummary {
        phases,
        residual_current_rms: rms(cycles.iter().map(|c| c.residual_current_rms)),
        voltage_unbalance_pct,
        current_unbalance_pct,
        frequency_hz: cycles.iter().map(|c| c.frequency_hz).sum::<f64>() / cycles.len() as f64,
        timestamp_s: cycles[cycles.len() - 1].timestamp_s,
    })
}

/// Total harmonic distortion in percent.
///
/// Defined as infinite when there is signal energy but no fundamental, and
/// zero when there is no energy at all.
pub fn thd_percent(rms: f64, fundamental_rms: f64) -> f64 {
    if fundamental_rms.abs() < EPSILON {
        return if rms > EPSILON { f64::INFINITY } else { 0.0 };
    }
    let distortion_sq = (rms * rms - fundamental_rms * fundamental_rms).max(0.0);
    distortion_sq.sqrt() / fundamental_rms * 100.0
}

/// Worst-phase deviation from the three-phase average, in percent.
pub fn nema_unbalance(values: &[f64; 3]) -> f64 {
    let avg = (values[0] + values[1] + values[2]) / 3.0;
    if avg.abs() < EPSILON {
        return 0.0;
    }
    let max_deviation = values
        .iter()
        .map(|v| (v - avg).abs())
        .fold(0.0, f64::max);
    max_deviation / avg * 100.0
}

/// Frequency implied by the spacing of the last two samples: the window
/// spans `len` samples of `cycles` fundamental cycles at that spacing.
fn cycle_frequency(samples: &[Sample], cycles: f64) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let dt = samples[samples.len() - 1].timestamp_s - samples[samples.len() - 2].timestamp_s;
    if dt <= 0.0 {
        return 0.0;
    }
    cycles / (dt * samples.len() as f64)
}

fn rms(values: impl Iterator<Item = f64>) -> f64 {
    let (sum_sq, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v * v, n + 1));
    if count == 0 {
        0.0
    } else {
        (sum_sq / count as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_3, SQRT_2, TAU};

    /// One 16-sample cycle of a three-phase system with a lagging current
    fn cycle(
        voltage_amplitude: f64,
        current_amplitude: f64,
        current_lag_rad: f64,
        start_s: f64,
    ) -> Vec<Sample> {
        let n = 16;
        let dt = 1.0 / (60.0 * n as f64);
        (0..n)
            .map(|i| {
                let theta = TAU * i as f64 / n as f64;
                let mut voltage = [0.0; 3];
                let mut current = [0.0; 3];
                for phase in 0..3 {
                    let shift = TAU / 3.0 * phase as f64;
                    voltage[phase] = voltage_amplitude * (theta - shift).sin();
                    current[phase] =
                        current_amplitude * (theta - shift - current_lag_rad).sin();
                }
                Sample {
                    timestamp_s: start_s + i as f64 * dt,
                    voltage,
                    current,
                }
            })
            .collect()
    }

    #[test]
    fn per_cycle_rms_and_power() {
        let mut analyzer = SpectralAnalyzer::new();
        // 60° lag: P = Vrms·Irms·cos(60°) = 0.5·Vrms·Irms
        let samples = cycle(100.0, 10.0, FRAC_PI_3, 0.0);

        let m = build_per_cycle(&samples, &mut analyzer).unwrap();

        let vrms = 100.0 / SQRT_2;
        let irms = 10.0 / SQRT_2;
        for phase in &m.phases {
            assert!((phase.voltage_rms - vrms).abs() < 0.01);
            assert!((phase.current_rms - irms).abs() < 0.01);
            assert!((phase.active_power - 0.5 * vrms * irms).abs() < 0.5);
            assert!(phase.thd_pct < 0.1, "clean sine has no distortion");
            assert!(phase.dominant_harmonic.is_none());
        }
        // Balanced currents sum to zero in the neutral
        assert!(m.residual_current_rms < 1e-9);
        assert!((m.frequency_hz - 60.0).abs() < 0.01);
    }

    #[test]
    fn per_cycle_rejects_empty_buffer() {
        let mut analyzer = SpectralAnalyzer::new();
        let result = build_per_cycle(&[], &mut analyzer);
        assert!(matches!(result, Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn one_second_summary_aggregates_cycles() {
        let mut analyzer = SpectralAnalyzer::new();
        let cycles: Vec<PerCycleMeasurement> = (0..60)
            .map(|i| {
                let samples = cycle(100.0, 10.0, FRAC_PI_3, i as f64 / 60.0);
                build_per_cycle(&samples, &mut analyzer).unwrap()
            })
            .collect();

        let summary = build_one_second(&cycles).unwrap();

        let vrms = 100.0 / SQRT_2;
        let irms = 10.0 / SQRT_2;
        for phase in &summary.phases {
            assert!((phase.voltage_rms - vrms).abs() < 0.01);
            assert!((phase.apparent_power - vrms * irms).abs() < 0.1);
            assert!((phase.power_factor - 0.5).abs() < 0.01);
            // S² = P² + Q²
            let s_sq = phase.active_power * phase.active_power
                + phase.reactive_power * phase.reactive_power;
            assert!((s_sq.sqrt() - phase.apparent_power).abs() < 0.1);
        }
        assert!(summary.voltage_unbalance_pct < 0.01);
        assert!((summary.frequency_hz - 60.0).abs() < 0.01);
        assert_eq!(summary.timestamp_s, cycles[59].timestamp_s);
    }

    #[test]
    fn one_second_summary_of_nothing_is_none() {
        assert!(build_one_second(&[]).is_none());
    }

    #[test]
    fn thd_of_clean_signal_is_zero() {
        assert_eq!(thd_percent(10.0, 10.0), 0.0);
    }

    #[test]
    fn thd_without_fundamental_is_infinite() {
        assert_eq!(thd_percent(10.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn thd_of_silence_is_zero() {
        assert_eq!(thd_percent(0.0, 0.0), 0.0);
    }

    #[test]
    fn thd_of_distorted_signal() {
        // Vrms = 5, Vfund = 4 → THD = 3/4 = 75%
        assert!((thd_percent(5.0, 4.0) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn unbalance_of_balanced_set_is_zero() {
        assert_eq!(nema_unbalance(&[100.0, 100.0, 100.0]), 0.0);
    }

    #[test]
    fn unbalance_of_degenerate_set_is_zero() {
        assert_eq!(nema_unbalance(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn unbalance_follows_worst_phase() {
        // avg = 100, worst deviation 6 → 6%
        let pct = nema_unbalance(&[94.0, 103.0, 103.0]);
        assert!((pct - 6.0).abs() < 1e-9);
    }
}
