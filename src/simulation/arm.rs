//! arm.rs
//! Simulated servo and arm dynamics.
//!
//! The servo is mounted inverted: lowering the servo angle raises the arm angle.
//! Commands travel over a bounded channel and are applied on the next plant
//! step; the arm then moves first-order toward the commanded position, faster
//! when stiffer.

use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::debug;
use parking_lot::Mutex;

use crate::control::controller::Actuator;

const COMMAND_CAPACITY: usize = 16;
/// Share of the response rate available at zero stiffness.
const SLACK_RESPONSE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoCommand {
    pub angle: i32,
    pub stiffness: f64,
}

/// Actuator end of the simulated servo. Never blocks; a full queue drops the command.
pub struct SimulatedServo {
    tx: Sender<ServoCommand>,
    sent: u64,
    dropped: u64,
}

impl SimulatedServo {
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Actuator for SimulatedServo {
    fn send(&mut self, angle: i32, stiffness: f64) {
        match self.tx.try_send(ServoCommand { angle, stiffness }) {
            Ok(()) => self.sent += 1,
            Err(TrySendError::Full(cmd)) => {
                self.dropped += 1;
                debug!("[servo] queue full, dropped {:?}", cmd);
            }
            Err(TrySendError::Disconnected(cmd)) => {
                self.dropped += 1;
                debug!("[servo] arm gone, dropped {:?}", cmd);
            }
        }
    }
}

/// Read-only view of the true arm angle, for comparison with the camera estimate.
#[derive(Clone)]
pub struct ArmReadout(Arc<Mutex<f64>>);

impl ArmReadout {
    pub fn angle(&self) -> f64 {
        *self.0.lock()
    }
}

pub struct ArmPlant {
    angle: f64,
    servo_angle: f64,
    stiffness: f64,
    response: f64,
    rx: Receiver<ServoCommand>,
    readout: Arc<Mutex<f64>>,
}

impl ArmPlant {
    /// Arm resting at `initial_angle`; `response` is the fraction of the
    /// remaining distance covered per step at full stiffness.
    pub fn new(initial_angle: f64, response: f64) -> (Self, SimulatedServo) {
        let (tx, rx) = bounded(COMMAND_CAPACITY);
        let plant = Self {
            angle: initial_angle,
            servo_angle: -initial_angle,
            stiffness: 0.0,
            response: response.clamp(0.0, 1.0),
            rx,
            readout: Arc::new(Mutex::new(initial_angle)),
        };
        let servo = SimulatedServo {
            tx,
            sent: 0,
            dropped: 0,
        };
        (plant, servo)
    }

    pub fn readout(&self) -> ArmReadout {
        ArmReadout(self.readout.clone())
    }

    #[inline]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Apply pending commands (latest wins) and advance one step.
    pub fn step(&mut self) -> f64 {
        while let Ok(cmd) = self.rx.try_recv() {
            self.servo_angle = cmd.angle as f64;
            self.stiffness = cmd.stiffness;
        }
        let rate = self.response
            * (SLACK_RESPONSE + (1.0 - SLACK_RESPONSE) * self.stiffness.clamp(0.0, 1.0));
        let target = -self.servo_angle;
        self.angle += (target - self.angle) * rate;
        *self.readout.lock() = self.angle;
        self.angle
    }
}
