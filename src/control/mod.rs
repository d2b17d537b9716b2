// Control: actuation half of the system.
// Reads the arm angle from perception, runs the PID and drives the servo.
pub mod regulator;
pub mod controller;
