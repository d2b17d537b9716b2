//! controller.rs
//! Closed-loop arm positioning: camera angle in, servo angle and stiffness out.
//!
//! Each iteration reads the arm angle (blocking until the camera has a fresh
//! one), stops once within threshold of the target, otherwise steps the PID,
//! sends the servo command and sleeps for the iteration interval.
//!
//! Neither `control` nor `wait_for_interception` has a timeout: a stuck camera
//! or servo keeps them waiting, bounding them is up to the caller.

use log::{debug, info};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::sync::Arc;

use crate::config::ControllerConfig;
use crate::control::regulator::PidRegulator;
use crate::error::ControlError;
use crate::perception::detector::AngleSource;
use crate::telemetry::{Event, EventRecorder};

/// Stiffness at the start of every motion.
const STARTING_STIFFNESS: f64 = 0.0;

/// Servo interface. Fire-and-forget: no acknowledgement is modelled.
pub trait Actuator {
    fn send(&mut self, angle: i32, stiffness: f64);
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn send(&mut self, angle: i32, stiffness: f64) {
        (**self).send(angle, stiffness)
    }
}

impl<A: Actuator + ?Sized> Actuator for &mut A {
    fn send(&mut self, angle: i32, stiffness: f64) {
        (**self).send(angle, stiffness)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutcome {
    /// Angle reads performed, including the final one.
    pub iterations: u64,
    pub commands_sent: u64,
    pub final_angle: f64,
    pub final_servo_angle: f64,
}

pub struct PidController<D, A, S> {
    regulator: PidRegulator,
    detector: D,
    actuator: A,
    stiffness_function: S,
    config: ControllerConfig,
    sleeper: SpinSleeper,
    recorder: Option<Arc<EventRecorder>>,
}

impl<D, A, S> PidController<D, A, S>
where
    D: AngleSource,
    A: Actuator,
    S: Fn(f64) -> f64,
{
    pub fn new(detector: D, actuator: A, stiffness_function: S, config: ControllerConfig) -> Self {
        Self {
            regulator: PidRegulator::new(config.gains),
            detector,
            actuator,
            stiffness_function,
            config,
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn regulator(&self) -> &PidRegulator {
        &self.regulator
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Drive the arm to `target_angle`.
    ///
    /// Stiffness is interpolated from 0 to `target_stiffness` by the stiffness
    /// function of the movement completion
    /// `(current + starting_position) / |target − starting_position|`, which is
    /// not clamped to [0, 1].
    pub fn control(
        &mut self,
        target_angle: f64,
        starting_servo_angle: f64,
        target_stiffness: f64,
        starting_position: f64,
    ) -> Result<ControlOutcome, ControlError> {
        self.regulator.set_point(target_angle);
        let travel = (target_angle - starting_position).abs();
        let mut servo_angle = starting_servo_angle;
        let mut iterations = 0u64;
        let mut commands_sent = 0u64;

        info!(
            "moving arm to {:.2} (servo at {:.2}, stiffness -> {:.2})",
            target_angle, servo_angle, target_stiffness
        );

        loop {
            let current_angle = self.detector.get_angle()?;
            iterations += 1;

            if (current_angle - target_angle).abs() <= self.config.threshold {
                info!(
                    "target {:.2} reached at {:.2} after {} commands",
                    target_angle, current_angle, commands_sent
                );
                if let Some(recorder) = &self.recorder {
                    recorder.record(Event::TargetReached {
                        ts_ns: recorder.now_ns(),
                        iteration: iterations,
                        angle: current_angle,
                    });
                }
                return Ok(ControlOutcome {
                    iterations,
                    commands_sent,
                    final_angle: current_angle,
                    final_servo_angle: servo_angle,
                });
            }

            if travel == 0.0 {
                return Err(ControlError::ZeroTravel {
                    start: starting_position,
                    target: target_angle,
                });
            }
            let completion = (current_angle + starting_position) / travel;
            let stiffness = (self.stiffness_function)(completion)
                * (target_stiffness - STARTING_STIFFNESS)
                + STARTING_STIFFNESS;

            let delta = self.regulator.update(current_angle);
            servo_angle -= delta;
            let command = servo_angle.round() as i32;
            self.actuator.send(command, stiffness);
            commands_sent += 1;

            debug!(
                "iteration {}: angle {:.2}, delta {:.3}, servo {}, stiffness {:.3}",
                iterations, current_angle, delta, command, stiffness
            );
            if let Some(recorder) = &self.recorder {
                recorder.record(Event::CommandSent {
                    ts_ns: recorder.now_ns(),
                    iteration: iterations,
                    servo_angle: command,
                    stiffness,
                    completion,
                });
            }

            if !self.config.iteration_interval.is_zero() {
                self.sleeper.sleep(self.config.iteration_interval);
            }
        }
    }

    /// Block until the arm has covered more than the configured interception
    /// moment of the way from `starting_angle` to `target_angle`; returns the
    /// angle that crossed it.
    pub fn wait_for_interception(
        &self,
        starting_angle: f64,
        target_angle: f64,
    ) -> Result<f64, ControlError> {
        let moment = self
            .config
            .interception_moment
            .ok_or(ControlError::NoInterceptionMoment)?;
        let distance = (target_angle - starting_angle).abs();
        if distance == 0.0 {
            return Err(ControlError::ZeroTravel {
                start: starting_angle,
                target: target_angle,
            });
        }

        loop {
            let current_angle = self.detector.get_angle()?;
            let completion = 1.0 - (current_angle - target_angle).abs() / distance;
            if completion > moment {
                debug!(
                    "intercepted at {:.2} ({:.1}% of travel)",
                    current_angle,
                    completion * 100.0
                );
                if let Some(recorder) = &self.recorder {
                    recorder.record(Event::Intercepted {
                        ts_ns: recorder.now_ns(),
                        angle: current_angle,
                        completion,
                    });
                }
                return Ok(current_angle);
            }
            if !self.config.interception_poll.is_zero() {
                self.sleeper.sleep(self.config.interception_poll);
            }
        }
    }
}
