//! Harmonic spectrum computation
//!
//! Wraps rustfft with per-length plan caching and converts raw transform
//! bins into RMS-scaled harmonic phasors. Bin k of a one-cycle buffer is
//! harmonic order k: bin 0 is the DC mean, bin 1 the fundamental.

use std::collections::HashMap;
use std::f64::consts::{SQRT_2, TAU};
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::domain::{AnalysisError, AnalysisResult, Channel, HarmonicComponent, Sample};
use crate::dsp::wrap_phase;

/// A candidate harmonic must exceed this multiple of the average noise floor
const NOISE_FLOOR_RATIO: f64 = 5.0;
/// ... or this fraction of the fundamental power, whichever is larger
const FUNDAMENTAL_RATIO: f64 = 0.001;

/// Spectral analyzer with a private transform-plan cache
///
/// Plans are cached per transform length, so repeat calls at the same cycle
/// length pay no setup cost. The cache is owned by the instance — there is
/// no process-global state. It is never evicted; the set of distinct cycle
/// lengths in a session is small and stable.
pub struct SpectralAnalyzer {
    planner: FftPlanner<f64>,
    plans: HashMap<usize, Arc<dyn Fft<f64>>>,
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            plans: HashMap::new(),
        }
    }

    /// Compute the single-sided RMS spectrum of one channel of a cycle buffer.
    ///
    /// - Empty input is an `InvalidInput` error
    /// - Odd-length input is zero-padded by one sample rather than truncated
    /// - `use_window` applies a Hann window before transforming
    ///
    /// The result holds one phasor per bin 0..=N/2. Bin 0 is normalized by
    /// 1/N (the mean); all other bins by √2/N, which scales a real
    /// sinusoid's bin to its RMS value.
    pub fn transform(
        &mut self,
        samples: &[Sample],
        channel: Channel,
        use_window: bool,
    ) -> AnalysisResult<Vec<Complex<f64>>> {
        if samples.is_empty() {
            return Err(AnalysisError::InvalidInput("empty sample buffer".into()));
        }

        let mut values: Vec<f64> = samples.iter().map(|s| channel.value(s)).collect();
        if values.len() % 2 != 0 {
            values.push(0.0);
        }
        let n = values.len();

        if use_window {
            let denom = (n - 1) as f64;
            for (i, v) in values.iter_mut().enumerate() {
                *v *= 0.5 * (1.0 - (TAU * i as f64 / denom).cos());
            }
        }

        let fft = self.plan(n)?;
        let mut buffer: Vec<Complex<f64>> =
            values.iter().map(|&v| Complex::new(v, 0.0)).collect();
        fft.process(&mut buffer);

        let dc_scale = 1.0 / n as f64;
        let ac_scale = SQRT_2 / n as f64;
        Ok(buffer[..=n / 2]
            .iter()
            .enumerate()
            .map(|(k, &c)| if k == 0 { c * dc_scale } else { c * ac_scale })
            .collect())
    }

    /// Extract the fundamental plus the single dominant harmonic that clears
    /// the significance threshold.
    ///
    /// The fundamental is always included. Among bins ≥ 2, only the largest
    /// is a candidate, and it must exceed
    /// `max(5 × average noise power, 0.001 × fundamental power)` — the first
    /// arm handles quiet signals where the noise floor dominates, the second
    /// strong fundamentals with small relative harmonics.
    pub fn find_significant_harmonics(
        &self,
        spectrum: &[Complex<f64>],
    ) -> AnalysisResult<Vec<HarmonicComponent>> {
        if spectrum.len() < 2 {
            return Err(AnalysisError::NoSignificantFound);
        }

        let fundamental_mag_sq = spectrum[1].norm_sqr();
        let mut harmonics = vec![harmonic_from_bin(1, spectrum[1])];

        if spectrum.len() < 3 {
            return Ok(harmonics);
        }

        let upper = &spectrum[2..];
        let noise_floor =
            upper.iter().map(|c| c.norm_sqr()).sum::<f64>() / upper.len() as f64;

        let mut candidate_order = 2;
        let mut candidate_mag_sq = 0.0;
        for (k, c) in spectrum.iter().enumerate().skip(2) {
            let mag_sq = c.norm_sqr();
            if mag_sq > candidate_mag_sq {
                candidate_mag_sq = mag_sq;
                candidate_order = k;
            }
        }

        let threshold =
            (NOISE_FLOOR_RATIO * noise_floor).max(FUNDAMENTAL_RATIO * fundamental_mag_sq);
        if candidate_mag_sq > threshold {
            harmonics.push(harmonic_from_bin(candidate_order, spectrum[candidate_order]));
        }

        Ok(harmonics)
    }

    /// Map every spectrum bin to a harmonic component, DC included.
    ///
    /// Used where the full harmonic table is wanted rather than just the
    /// significant entries.
    pub fn spectrum_to_harmonics(&self, spectrum: &[Complex<f64>]) -> Vec<HarmonicComponent> {
        spectrum
            .iter()
            .enumerate()
            .map(|(k, &c)| harmonic_from_bin(k, c))
            .collect()
    }

    /// Rebuild a clean fundamental-only waveform for one cycle of a channel.
    ///
    /// Returns one value per input sample. A cycle whose spectrum cannot be
    /// computed, or whose fundamental carries no energy, is reported as an
    /// error so the caller can skip reconstruction for that cycle.
    pub fn reconstruct_fundamental(
        &mut self,
        samples: &[Sample],
        channel: Channel,
    ) -> AnalysisResult<Vec<f64>> {
        let spectrum = self
            .transform(samples, channel, false)
            .map_err(|e| AnalysisError::SpectrumCalculationFailed(e.to_string()))?;
        let harmonics = self.find_significant_harmonics(&spectrum)?;

        let fundamental = harmonics[0];
        if fundamental.rms <= f64::EPSILON {
            return Err(AnalysisError::NoSignificantFound);
        }

        let n = values_len_even(samples.len());
        let amplitude = SQRT_2 * fundamental.rms;
        Ok((0..samples.len())
            .map(|i| amplitude * (TAU * i as f64 / n as f64 + fundamental.phase).cos())
            .collect())
    }

    fn plan(&mut self, n: usize) -> AnalysisResult<Arc<dyn Fft<f64>>> {
        if n == 0 {
            return Err(AnalysisError::AllocationFailed(0));
        }
        let plan = self
            .plans
            .entry(n)
            .or_insert_with(|| self.planner.plan_fft_forward(n))
            .clone();
        Ok(plan)
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Transform length after the even-length padding rule
fn values_len_even(len: usize) -> usize {
    len + len % 2
}

/// Build a harmonic component from a normalized spectrum bin.
///
/// The DC component carries no phase by convention.
fn harmonic_from_bin(order: usize, phasor: Complex<f64>) -> HarmonicComponent {
    let rms = phasor.norm();
    let phase = if order == 0 { 0.0 } else { wrap_phase(phasor.arg()) };
    HarmonicComponent {
        order,
        rms,
        phase,
        phasor,
    }
}
