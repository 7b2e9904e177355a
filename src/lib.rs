//! Three-phase frequency synchronization and spectral analysis
//!
//! The engine that keeps cycle-aligned sampling locked to a real, possibly
//! drifting AC waveform, and turns captured cycles into harmonic, power,
//! and symmetrical-component metrics.
//!
//! ## Architecture
//!
//! - `domain/` - Pure domain types, errors, configuration; no I/O
//! - `dsp/` - Signal processing: spectrum, PID, symmetrical components,
//!   metric builders, zero-crossing estimation (pure, no I/O)
//! - `tracker/` - Staged frequency-tracking state machine
//!   (coarse search → FLL acquisition → PLL fine tuning)
//! - `feed` - Lock-free sample transport from the capture thread
//!
//! The crate exposes no network, file, or CLI surface. The enclosing
//! sampling/display layer drives it with raw samples and completed-cycle
//! measurements, and consumes frequency-update events and metric
//! structures in return.

pub mod domain;
pub mod dsp;
pub mod feed;
pub mod tracker;

pub use domain::{
    AnalysisError, AnalysisResult, Channel, HarmonicComponent, OneSecondSummary,
    PerCycleMeasurement, PidCoefficients, Sample, SymmetricalComponents, TrackerConfig,
};
pub use dsp::{PidController, SpectralAnalyzer};
pub use tracker::{FrequencyTracker, TrackerEvent, TrackingStage};
