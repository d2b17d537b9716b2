// Simulation: stand-ins for the camera, vision stages and servo.
// Lets the full sensing/control loop run without hardware.
pub mod arm;
pub mod camera;
