//! Frequency-tracking state machine
//!
//! Keeps cycle-aligned sampling synchronized with a live, possibly drifting
//! AC waveform in three stages: a coarse zero-crossing search over a raw
//! sample window, a frequency-locked acquisition loop driven by
//! cycle-to-cycle phase slip, and a phase-locked fine-tuning loop once
//! acquisition holds. Threshold breaches are counted, not immediately
//! fatal; exceeding a counter cap demotes the state and the session heals
//! itself. Nothing in here reports an error to the caller.
//!
//! The tracker is driven synchronously: one `process_sample` call per
//! captured sample and one `process_cycle` call per completed cycle, both
//! from the single thread that owns the instance.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::domain::{PerCycleMeasurement, PidCoefficients, Sample, TrackerConfig};
use crate::dsp::{wrap_phase, zero_crossing, PidController};

/// Notifications emitted as the tracker re-times the sampling loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TrackerEvent {
    /// The assumed fundamental frequency changed; future captures should
    /// re-time to this estimate
    SamplingCyclesUpdated(f64),
}

/// Observable tracking stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingStage {
    Idle,
    Coarse,
    FllAcquisition,
    FineTune,
}

/// Internal state, with stage-local counters and buffers carried in the
/// variants so no invalid combination can exist
enum TrackingState {
    Idle,
    Coarse(CoarseState),
    FllAcquisition(FllState),
    FineTune(FineState),
}

#[derive(Default)]
struct CoarseState {
    timestamps: Vec<f64>,
    values: Vec<f64>,
}

impl CoarseState {
    fn duration_s(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Sample rate implied by the buffered timestamps
    fn sample_rate(&self) -> Option<f64> {
        if self.timestamps.len() < 2 {
            return None;
        }
        let span = self.duration_s();
        if span <= 0.0 {
            return None;
        }
        Some((self.timestamps.len() - 1) as f64 / span)
    }

    fn target_reached(&self, min_samples: usize, duration_s: f64) -> bool {
        let Some(rate) = self.sample_rate() else {
            return false;
        };
        let target = min_samples.max((duration_s * rate).ceil() as usize);
        self.values.len() >= target
    }

    fn clear(&mut self) {
        self.timestamps.clear();
        self.values.clear();
    }
}

#[derive(Default)]
struct FllState {
    previous_phase: Option<f64>,
    fail_count: u32,
    oscillation_count: u32,
    lock_count: u32,
    last_output: f64,
}

impl FllState {
    fn with_phase(phase: f64) -> Self {
        Self {
            previous_phase: Some(phase),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct FineState {
    previous_phase: Option<f64>,
    fail_count: u32,
    cycles_since_verification: u32,
    verification: Option<VerificationBuffer>,
}

impl FineState {
    fn with_phase(phase: f64) -> Self {
        Self {
            previous_phase: Some(phase),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct VerificationBuffer {
    timestamps: Vec<f64>,
    values: Vec<f64>,
}

impl VerificationBuffer {
    fn duration_s(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

/// Staged frequency tracker: coarse search → FLL acquisition → PLL fine tune
pub struct FrequencyTracker {
    config: TrackerConfig,
    state: TrackingState,
    assumed_hz: f64,
    fll_pid: PidController,
    zc_pid: PidController,
    events: Option<Sender<TrackerEvent>>,
}

impl FrequencyTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            assumed_hz: config.nominal_hz,
            fll_pid: PidController::new(config.fll_pid),
            zc_pid: PidController::new(config.zc_pid),
            state: TrackingState::Idle,
            events: None,
            config,
        }
    }

    /// Currently assumed fundamental frequency in Hz
    pub fn frequency(&self) -> f64 {
        self.assumed_hz
    }

    /// Current stage of the acquisition state machine
    pub fn stage(&self) -> TrackingStage {
        match self.state {
            TrackingState::Idle => TrackingStage::Idle,
            TrackingState::Coarse(_) => TrackingStage::Coarse,
            TrackingState::FllAcquisition(_) => TrackingStage::FllAcquisition,
            TrackingState::FineTune(_) => TrackingStage::FineTune,
        }
    }

    /// Open an event stream. Each call replaces the previous subscription.
    pub fn subscribe(&mut self) -> Receiver<TrackerEvent> {
        let (tx, rx) = unbounded();
        self.events = Some(tx);
        rx
    }

    /// Begin a tracking session from scratch
    pub fn start_tracking(&mut self) {
        self.assumed_hz = self.config.nominal_hz;
        self.fll_pid.reset();
        self.zc_pid.reset();
        self.state = TrackingState::Coarse(CoarseState::default());
        log::info!(
            "tracking started, coarse search around {:.1} Hz",
            self.assumed_hz
        );
    }

    /// End the session and drop all state. Safe to call from any stage,
    /// repeatedly, including mid-collection.
    pub fn stop_tracking(&mut self) {
        self.assumed_hz = self.config.nominal_hz;
        self.fll_pid.reset();
        self.zc_pid.reset();
        self.state = TrackingState::Idle;
    }

    pub fn fll_coefficients(&self) -> PidCoefficients {
        self.fll_pid.coefficients()
    }

    pub fn set_fll_coefficients(&mut self, coefficients: PidCoefficients) {
        self.fll_pid.set_coefficients(coefficients);
    }

    pub fn zc_coefficients(&self) -> PidCoefficients {
        self.zc_pid.coefficients()
    }

    pub fn set_zc_coefficients(&mut self, coefficients: PidCoefficients) {
        self.zc_pid.set_coefficients(coefficients);
    }

    /// Feed one captured sample.
    ///
    /// Only the coarse search and the background verification pass consume
    /// raw samples; the other stages ignore them.
    pub fn process_sample(&mut self, sample: &Sample) {
        match &self.state {
            TrackingState::Coarse(_) => self.coarse_sample(sample),
            TrackingState::FineTune(_) => self.verification_sample(sample),
            _ => {}
        }
    }

    /// Feed one completed cycle's measurement.
    ///
    /// Measurements must arrive in strictly increasing timestamp order; the
    /// phase-delta computation keeps exactly one previous value and
    /// out-of-order delivery silently corrupts it. Returns the new
    /// frequency estimate when the assumed frequency was adjusted.
    pub fn process_cycle(&mut self, measurement: &PerCycleMeasurement) -> Option<f64> {
        match std::mem::replace(&mut self.state, TrackingState::Idle) {
            TrackingState::FllAcquisition(fll) => self.acquisition_cycle(fll, measurement),
            TrackingState::FineTune(fine) => self.fine_cycle(fine, measurement),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn coarse_sample(&mut self, sample: &Sample) {
        let ready = {
            let TrackingState::Coarse(coarse) = &mut self.state else {
                return;
            };
            coarse.timestamps.push(sample.timestamp_s);
            coarse.values.push(sample.voltage[0]);
            coarse.target_reached(self.config.coarse_min_samples, self.config.coarse_duration_s)
        };
        if ready {
            self.finish_coarse();
        }
    }

    fn finish_coarse(&mut self) {
        let estimate = {
            let TrackingState::Coarse(coarse) = &self.state else {
                return;
            };
            zero_crossing::estimate_frequency(&coarse.values, coarse.duration_s())
        };

        // The upper bound guards against aliasing when the assumed sample
        // rate is too low for the true frequency
        let max_hz = self.assumed_hz * self.config.coarse_max_ratio;
        match estimate.filter(|f| (self.config.min_tracking_hz..=max_hz).contains(f)) {
            Some(freq) => {
                self.assumed_hz = freq;
                self.emit(TrackerEvent::SamplingCyclesUpdated(freq));
                self.state = TrackingState::FllAcquisition(FllState::default());
                log::info!("coarse search accepted {freq:.2} Hz, entering acquisition");
            }
            None => {
                log::warn!(
                    "coarse estimate {estimate:?} outside [{:.1}, {max_hz:.1}] Hz, recollecting",
                    self.config.min_tracking_hz
                );
                if let TrackingState::Coarse(coarse) = &mut self.state {
                    coarse.clear();
                }
            }
        }
    }

    fn acquisition_cycle(
        &mut self,
        mut fll: FllState,
        measurement: &PerCycleMeasurement,
    ) -> Option<f64> {
        let phase = measurement.phases[0].voltage_fundamental.phase;
        let Some(previous) = fll.previous_phase.replace(phase) else {
            self.state = TrackingState::FllAcquisition(fll);
            return None;
        };

        // Zero error means the assumed cycle length matches the true period.
        // A full-turn slip per cycle equals one unit of relative frequency
        // error, hence the scaling to Hz.
        let phase_error = wrap_phase(phase - previous);
        let frequency_error = phase_error * self.assumed_hz / TAU;

        if frequency_error.abs() > self.config.fll_failure_hz {
            fll.fail_count += 1;
            if fll.fail_count >= self.config.fll_max_fail_count {
                log::warn!(
                    "acquisition diverged after {} failed cycles, restarting coarse search",
                    fll.fail_count
                );
                self.restart_coarse();
                return None;
            }
        } else {
            fll.fail_count = 0;
        }

        let output = self.fll_pid.process(frequency_error);

        // Limit-cycle protection: sustained sign-alternating output at
        // non-decaying amplitude. A damped transient alternates too, but
        // its amplitude shrinks and does not count.
        if output * fll.last_output < 0.0 {
            if output.abs() >= fll.last_output.abs() {
                fll.oscillation_count += 1;
            }
        } else {
            fll.oscillation_count = 0;
        }
        fll.last_output = output;
        if fll.oscillation_count > self.config.fll_max_oscillations {
            log::warn!("acquisition limit-cycling, restarting coarse search");
            self.restart_coarse();
            return None;
        }

        if frequency_error.abs() < self.config.fll_lock_hz {
            fll.lock_count += 1;
        } else {
            fll.lock_count = 0;
        }

        let new_hz = (self.assumed_hz + output).max(self.config.min_tracking_hz);
        self.assumed_hz = new_hz;
        self.emit(TrackerEvent::SamplingCyclesUpdated(new_hz));

        if fll.lock_count >= self.config.fll_min_lock_count {
            log::info!("acquisition locked at {new_hz:.3} Hz, entering fine tracking");
            self.zc_pid.reset();
            self.state = TrackingState::FineTune(FineState::with_phase(phase));
        } else {
            self.state = TrackingState::FllAcquisition(fll);
        }
        Some(new_hz)
    }

    fn fine_cycle(
        &mut self,
        mut fine: FineState,
        measurement: &PerCycleMeasurement,
    ) -> Option<f64> {
        let phase = measurement.phases[0].voltage_fundamental.phase;
        let Some(previous) = fine.previous_phase.replace(phase) else {
            self.state = TrackingState::FineTune(fine);
            return None;
        };

        let phase_error = wrap_phase(phase - previous);

        // The coarse estimate is still approximately valid when fine
        // tracking slips, so demotion stops at acquisition
        if phase_error.abs() > self.config.fine_severe_rad {
            log::warn!(
                "fine tracking lost lock (phase error {phase_error:.3} rad), falling back to acquisition"
            );
            self.fll_pid.reset();
            self.state = TrackingState::FllAcquisition(FllState::with_phase(phase));
            return None;
        }

        if phase_error.abs() > self.config.fine_failure_rad {
            fine.fail_count += 1;
            if fine.fail_count >= self.config.fine_max_fail_count {
                log::warn!(
                    "fine tracking failed {} cycles, falling back to acquisition",
                    fine.fail_count
                );
                self.fll_pid.reset();
                self.state = TrackingState::FllAcquisition(FllState::with_phase(phase));
                return None;
            }
        } else {
            fine.fail_count = 0;
        }

        let correction = self.zc_pid.process(phase_error);
        let new_hz = (self.assumed_hz + correction).max(self.config.min_tracking_hz);
        self.assumed_hz = new_hz;
        self.emit(TrackerEvent::SamplingCyclesUpdated(new_hz));

        fine.cycles_since_verification += 1;
        if fine.cycles_since_verification >= self.config.verification_interval_cycles
            && fine.verification.is_none()
        {
            log::debug!("starting background frequency verification");
            fine.verification = Some(VerificationBuffer::default());
        }

        self.state = TrackingState::FineTune(fine);
        Some(new_hz)
    }

    fn verification_sample(&mut self, sample: &Sample) {
        let done = {
            let TrackingState::FineTune(fine) = &mut self.state else {
                return;
            };
            let Some(buffer) = &mut fine.verification else {
                return;
            };
            buffer.timestamps.push(sample.timestamp_s);
            buffer.values.push(sample.voltage[0]);
            buffer.duration_s() >= self.config.verification_duration_s
        };
        if done {
            self.finish_verification();
        }
    }

    fn finish_verification(&mut self) {
        let estimate = {
            let TrackingState::FineTune(fine) = &mut self.state else {
                return;
            };
            let Some(buffer) = fine.verification.take() else {
                return;
            };
            fine.cycles_since_verification = 0;
            zero_crossing::estimate_frequency(&buffer.values, buffer.duration_s())
        };

        let Some(freq) = estimate else {
            log::debug!("verification window inconclusive, keeping lock");
            return;
        };
        let ratio = freq / self.assumed_hz;
        if ratio < self.config.verification_min_ratio
            || ratio > self.config.verification_max_ratio
        {
            log::warn!(
                "verification estimate {freq:.2} Hz disagrees with tracked {:.2} Hz, restarting coarse search",
                self.assumed_hz
            );
            self.restart_coarse();
        } else {
            log::debug!(
                "verification passed ({freq:.2} Hz vs {:.2} Hz)",
                self.assumed_hz
            );
        }
    }

    fn restart_coarse(&mut self) {
        self.fll_pid.reset();
        self.zc_pid.reset();
        self.state = TrackingState::Coarse(CoarseState::default());
    }

    fn emit(&mut self, event: TrackerEvent) {
        let receiver_gone = self
            .events
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_err());
        if receiver_gone {
            self.events = None;
        }
    }
}
