//! Tracker configuration
//!
//! Every tuning constant of the two tracking loops lives here so tests and
//! tuning UIs can override them; the defaults are the values the engine
//! ships with.

use serde::{Deserialize, Serialize};

/// Gain set for one PID loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidCoefficients {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Full tuning for one PID loop: gains plus limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidTuning {
    pub coefficients: PidCoefficients,
    /// Symmetric clamp on the integral accumulator
    pub integral_limit: f64,
    /// Symmetric clamp on the controller output
    pub output_limit: f64,
    /// When > 0, an error larger than this zeroes the integral for the step
    pub integral_activation_threshold: f64,
}

/// Tuning constants for the frequency tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Assumed fundamental frequency before acquisition, in Hz
    pub nominal_hz: f64,
    /// Minimum raw samples before a coarse estimate is attempted
    pub coarse_min_samples: usize,
    /// Coarse collection window in seconds
    pub coarse_duration_s: f64,
    /// Lowest trackable frequency in Hz
    pub min_tracking_hz: f64,
    /// Coarse estimates above `assumed × this` are rejected as aliases
    pub coarse_max_ratio: f64,
    /// Frequency-locked acquisition loop tuning
    pub fll_pid: PidTuning,
    /// Frequency error counting as an acquisition failure, in Hz
    pub fll_failure_hz: f64,
    /// Consecutive acquisition failures before restarting the coarse search
    pub fll_max_fail_count: u32,
    /// Consecutive output sign reversals tolerated before restarting
    pub fll_max_oscillations: u32,
    /// Frequency error counting toward lock, in Hz
    pub fll_lock_hz: f64,
    /// Consecutive in-tolerance cycles required to enter fine tracking
    pub fll_min_lock_count: u32,
    /// Phase-locked fine-tracking loop tuning
    pub zc_pid: PidTuning,
    /// Phase error counting as a fine-tracking failure, in radians
    pub fine_failure_rad: f64,
    /// Single-cycle phase error treated as immediate loss of lock, in radians
    pub fine_severe_rad: f64,
    /// Consecutive fine-tracking failures before falling back to acquisition
    pub fine_max_fail_count: u32,
    /// Cycles between background verification passes
    pub verification_interval_cycles: u32,
    /// Raw-sample window collected per verification pass, in seconds
    pub verification_duration_s: f64,
    /// Lowest accepted ratio of verification estimate to tracked frequency
    pub verification_min_ratio: f64,
    /// Highest accepted ratio of verification estimate to tracked frequency
    pub verification_max_ratio: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            nominal_hz: 50.0,
            coarse_min_samples: 10,
            coarse_duration_s: 0.5,
            min_tracking_hz: 1.0,
            coarse_max_ratio: 1.8,
            fll_pid: PidTuning {
                coefficients: PidCoefficients {
                    kp: 0.45,
                    ki: 0.0001,
                    kd: 0.65,
                },
                integral_limit: 10.0,
                output_limit: 1.0,
                integral_activation_threshold: 0.0,
            },
            fll_failure_hz: 10.0,
            fll_max_fail_count: 10,
            fll_max_oscillations: 10,
            fll_lock_hz: 0.05,
            fll_min_lock_count: 10,
            zc_pid: PidTuning {
                coefficients: PidCoefficients {
                    kp: 0.015,
                    ki: 0.000008,
                    kd: 0.265,
                },
                integral_limit: 10.0,
                output_limit: 1.0,
                integral_activation_threshold: 0.01,
            },
            fine_failure_rad: 0.3,
            fine_severe_rad: 0.6,
            fine_max_fail_count: 5,
            verification_interval_cycles: 200,
            verification_duration_s: 0.2,
            verification_min_ratio: 0.8,
            verification_max_ratio: 1.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let config = TrackerConfig::default();
        assert_eq!(config.nominal_hz, 50.0);
        assert_eq!(config.coarse_min_samples, 10);
        assert_eq!(config.fll_min_lock_count, 10);
        assert!(config.fll_lock_hz < config.fll_failure_hz);
        assert!(config.fine_failure_rad < config.fine_severe_rad);
        assert!(config.verification_min_ratio < config.verification_max_ratio);
    }

    #[test]
    fn config_serializes_to_json() {
        let config = TrackerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TrackerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
