//! Core domain types

use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// One captured instant of the three-phase system
///
/// Immutable once captured; owned by the caller's capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Capture time in seconds (monotonic, assigned by the sampling layer)
    pub timestamp_s: f64,
    /// Instantaneous phase voltages [A, B, C] in volts
    pub voltage: [f64; 3],
    /// Instantaneous phase currents [A, B, C] in amperes
    pub current: [f64; 3],
}

/// Selects one of the six measurement channels of a [`Sample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    VoltageA,
    VoltageB,
    VoltageC,
    CurrentA,
    CurrentB,
    CurrentC,
}

impl Channel {
    /// Voltage channel for phase index 0..=2
    pub fn voltage(phase: usize) -> Self {
        match phase {
            0 => Channel::VoltageA,
            1 => Channel::VoltageB,
            _ => Channel::VoltageC,
        }
    }

    /// Current channel for phase index 0..=2
    pub fn current(phase: usize) -> Self {
        match phase {
            0 => Channel::CurrentA,
            1 => Channel::CurrentB,
            _ => Channel::CurrentC,
        }
    }

    /// Extract this channel's value from a sample
    pub fn value(&self, sample: &Sample) -> f64 {
        match self {
            Channel::VoltageA => sample.voltage[0],
            Channel::VoltageB => sample.voltage[1],
            Channel::VoltageC => sample.voltage[2],
            Channel::CurrentA => sample.current[0],
            Channel::CurrentB => sample.current[1],
            Channel::CurrentC => sample.current[2],
        }
    }
}

/// One frequency bin's contribution to an analyzed waveform
///
/// Invariants: `rms >= 0`, `phase` in (−π, π], and the DC component
/// (`order == 0`) always carries `phase == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicComponent {
    /// Harmonic order: 0 = DC, 1 = fundamental
    pub order: usize,
    /// RMS magnitude of this component
    pub rms: f64,
    /// Phase in radians
    pub phase: f64,
    /// Complex phasor (RMS-scaled)
    pub phasor: Complex<f64>,
}

/// Per-phase figures computed over a single electrical cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseCycle {
    pub voltage_rms: f64,
    pub current_rms: f64,
    /// Time-average of v·i over the cycle, in watts
    pub active_power: f64,
    /// Fundamental voltage phasor for this cycle
    pub voltage_fundamental: HarmonicComponent,
    /// Largest non-fundamental voltage harmonic, when it clears the
    /// significance threshold
    pub dominant_harmonic: Option<HarmonicComponent>,
    /// Voltage THD in percent; infinite when the fundamental is absent
    pub thd_pct: f64,
}

/// Snapshot of one completed electrical cycle
///
/// Built once per cycle and superseded by the next cycle's measurement;
/// the tracker keeps exactly one previous value for its phase-delta
/// computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerCycleMeasurement {
    pub phases: [PhaseCycle; 3],
    /// RMS of the per-sample sum of the three phase currents (neutral)
    pub residual_current_rms: f64,
    /// Frequency implied by the cycle's sample spacing, in Hz
    pub frequency_hz: f64,
    /// Timestamp of the last sample in the cycle, in seconds
    pub timestamp_s: f64,
}

/// Per-phase figures aggregated over a one-second window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub voltage_rms: f64,
    pub current_rms: f64,
    /// Active power in watts
    pub active_power: f64,
    /// Apparent power Vrms·Irms, in volt-amperes
    pub apparent_power: f64,
    /// Reactive power in volt-amperes reactive, never negative
    pub reactive_power: f64,
    /// |P|/S, or 0 when apparent power vanishes
    pub power_factor: f64,
    /// Voltage THD in percent
    pub thd_pct: f64,
}

/// One-second aggregate of per-cycle measurements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OneSecondSummary {
    pub phases: [PhaseMetrics; 3],
    pub residual_current_rms: f64,
    /// NEMA unbalance of the per-phase voltage RMS values, in percent
    pub voltage_unbalance_pct: f64,
    /// NEMA unbalance of the per-phase current RMS values, in percent
    pub current_unbalance_pct: f64,
    /// Mean of the per-cycle frequency estimates, in Hz
    pub frequency_hz: f64,
    /// Timestamp of the last contributing cycle, in seconds
    pub timestamp_s: f64,
}

/// Magnitude and phase of one sequence component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceComponent {
    pub magnitude: f64,
    pub phase_deg: f64,
}

/// Fortescue decomposition of three per-phase fundamental phasors
///
/// Recomputed from scratch each cycle or second; carries no state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymmetricalComponents {
    pub zero: SequenceComponent,
    pub positive: SequenceComponent,
    pub negative: SequenceComponent,
}
