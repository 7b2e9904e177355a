//! Discrete PID controller
//!
//! Shared by both tracking loops. Anti-windup comes from two places: the
//! integral accumulator is clamped symmetrically, and an optional activation
//! threshold zeroes it outright while the error is large (a loop that has
//! lost lock should not charge its integrator on garbage).

use crate::domain::{PidCoefficients, PidTuning};

/// Discrete PID with clamped integral and bounded output
pub struct PidController {
    tuning: PidTuning,
    integral: f64,
    previous_error: f64,
}

impl PidController {
    pub fn new(tuning: PidTuning) -> Self {
        Self {
            tuning,
            integral: 0.0,
            previous_error: 0.0,
        }
    }

    /// Advance the controller by one step.
    ///
    /// All inputs are accepted; the output is clamped to
    /// `[-output_limit, +output_limit]`. Zero gains simply yield zero.
    pub fn process(&mut self, error: f64) -> f64 {
        if self.tuning.integral_activation_threshold > 0.0
            && error.abs() > self.tuning.integral_activation_threshold
        {
            self.integral = 0.0;
        } else {
            self.integral = (self.integral + error)
                .clamp(-self.tuning.integral_limit, self.tuning.integral_limit);
        }

        let derivative = error - self.previous_error;
        self.previous_error = error;

        let c = self.tuning.coefficients;
        let output = c.kp * error + c.ki * self.integral + c.kd * derivative;
        output.clamp(-self.tuning.output_limit, self.tuning.output_limit)
    }

    /// Zero the integral accumulator and the remembered error
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
    }

    /// Replace the gain set; takes effect on the next `process` call
    pub fn set_coefficients(&mut self, coefficients: PidCoefficients) {
        self.tuning.coefficients = coefficients;
    }

    pub fn coefficients(&self) -> PidCoefficients {
        self.tuning.coefficients
    }

    /// Replace the limits; takes effect on the next `process` call
    pub fn set_limits(
        &mut self,
        integral_limit: f64,
        output_limit: f64,
        integral_activation_threshold: f64,
    ) {
        self.tuning.integral_limit = integral_limit;
        self.tuning.output_limit = output_limit;
        self.tuning.integral_activation_threshold = integral_activation_threshold;
    }

    pub fn tuning(&self) -> PidTuning {
        self.tuning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning(kp: f64, ki: f64, kd: f64) -> PidTuning {
        PidTuning {
            coefficients: PidCoefficients { kp, ki, kd },
            integral_limit: 10.0,
            output_limit: 1.0,
            integral_activation_threshold: 0.0,
        }
    }

    #[test]
    fn reset_matches_fresh_controller() {
        let t = tuning(0.45, 0.0001, 0.65);
        let mut used = PidController::new(t);
        for i in 0..50 {
            used.process(0.3 * (i as f64 * 0.7).sin());
        }
        used.reset();

        let mut fresh = PidController::new(t);
        assert_eq!(used.process(0.42), fresh.process(0.42));
    }

    #[test]
    fn output_is_clamped() {
        let mut pid = PidController::new(tuning(100.0, 0.0, 0.0));
        assert_eq!(pid.process(5.0), 1.0);
        assert_eq!(pid.process(-5.0), -1.0);
    }

    #[test]
    fn integral_is_clamped() {
        let mut t = tuning(0.0, 1.0, 0.0);
        t.output_limit = 1000.0;
        let mut pid = PidController::new(t);
        for _ in 0..100 {
            pid.process(1.0);
        }
        // Accumulator saturates at the integral limit, not at 100
        assert_eq!(pid.process(0.0), 10.0);
    }

    #[test]
    fn large_error_freezes_integral() {
        let mut t = tuning(0.0, 1.0, 0.0);
        t.integral_activation_threshold = 0.01;
        t.output_limit = 1000.0;
        let mut pid = PidController::new(t);

        pid.process(0.005);
        pid.process(0.005);
        // A transient above the threshold wipes the accumulator
        assert_eq!(pid.process(0.5), 0.0);
        // The next small error starts accumulating from zero again
        assert!((pid.process(0.005) - 0.005).abs() < 1e-12);
    }

    #[test]
    fn zero_gains_yield_zero_output() {
        let mut pid = PidController::new(tuning(0.0, 0.0, 0.0));
        assert_eq!(pid.process(123.0), 0.0);
        assert_eq!(pid.process(-7.0), 0.0);
    }

    #[test]
    fn derivative_acts_on_error_change() {
        let mut pid = PidController::new(tuning(0.0, 0.0, 1.0));
        assert_eq!(pid.process(0.2), 0.2);
        // Same error twice: derivative term vanishes
        assert_eq!(pid.process(0.2), 0.0);
    }
}
