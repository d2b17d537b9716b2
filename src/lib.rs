//! # glyph_arm
//! Camera-tracked arm positioning.
//!
//! A background detector recognises four square glyph markers in camera
//! frames and keeps their latest corners, each valid for a bounded time. A
//! PID controller reads the arm angle from the marker geometry and drives a
//! servo toward a target angle while ramping the servo stiffness.
//!
//! - [`perception`]: glyph recognition, time-bounded storage, angle estimation, the detector thread.
//! - [`control`]: PID regulator and the positioning loop.
//! - [`simulation`]: simulated arm, servo and camera standing in for hardware.
//! - [`telemetry`]: event recording with CSV export.

pub mod config;
pub mod control;
pub mod error;
pub mod perception;
pub mod simulation;
pub mod telemetry;
