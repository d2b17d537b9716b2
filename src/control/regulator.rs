//! regulator.rs
//! Discrete PID against a movable setpoint.
//!
//! One step per call: no dt weighting, no output limits, no anti-windup. The
//! integral survives setpoint changes; only `reset` clears it.

use crate::config::PidGains;

#[derive(Debug, Clone)]
pub struct PidRegulator {
    gains: PidGains,
    set_point: f64,
    integrator: f64,
    previous_error: f64,
}

impl PidRegulator {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            set_point: 0.0,
            integrator: 0.0,
            previous_error: 0.0,
        }
    }

    /// Change the target; integral and previous error are kept.
    pub fn set_point(&mut self, target: f64) {
        self.set_point = target;
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.set_point
    }

    #[inline]
    pub fn integral(&self) -> f64 {
        self.integrator
    }

    #[inline]
    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Correction for `measured`: P·e + I·Σe + D·(e − e_prev), e = setpoint − measured.
    pub fn update(&mut self, measured: f64) -> f64 {
        let error = self.set_point - measured;
        self.integrator += error;
        let derivative = error - self.previous_error;
        self.previous_error = error;

        self.gains.p * error + self.gains.i * self.integrator + self.gains.d * derivative
    }

    pub fn reset(&mut self) {
        self.integrator = 0.0;
        self.previous_error = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_proportional_returns_error() {
        let mut pid = PidRegulator::new(PidGains::new(1.0, 0.0, 0.0));
        pid.set_point(42.0);
        for measured in [0.0, 10.5, 42.0, 100.0, -3.25] {
            assert_eq!(pid.update(measured), 42.0 - measured);
        }
    }

    #[test]
    fn pure_integral_accumulates() {
        let mut pid = PidRegulator::new(PidGains::new(0.0, 1.0, 0.0));
        pid.set_point(10.0);
        let e = 10.0 - 4.0;
        assert_eq!(pid.update(4.0), e);
        assert_eq!(pid.update(4.0), 2.0 * e);
        assert_eq!(pid.integral(), 2.0 * e);
    }

    #[test]
    fn derivative_uses_previous_error() {
        let mut pid = PidRegulator::new(PidGains::new(0.0, 0.0, 1.0));
        pid.set_point(5.0);
        // first step compares against an initial previous error of zero
        assert_eq!(pid.update(0.0), 5.0);
        assert_eq!(pid.update(2.0), -2.0);
        assert_eq!(pid.update(2.0), 0.0);
    }

    #[test]
    fn setpoint_change_keeps_integral() {
        let mut pid = PidRegulator::new(PidGains::new(0.0, 1.0, 0.0));
        pid.set_point(3.0);
        pid.update(0.0);
        pid.set_point(-1.0);
        assert_eq!(pid.integral(), 3.0);
        assert_eq!(pid.update(0.0), 2.0);

        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.target(), -1.0);
    }

    #[test]
    fn default_gains_combine_terms() {
        let mut pid = PidRegulator::new(PidGains::default());
        pid.set_point(90.0);
        // 0.7·90 + 0.2·90 + 0.2·90
        assert!((pid.update(0.0) - 99.0).abs() < 1e-12);
        // 0.7·45 + 0.2·135 + 0.2·(45 − 90)
        assert!((pid.update(45.0) - 49.5).abs() < 1e-12);
    }
}
