// Perception: camera-side half of the system.
// Turns marker candidates into time-stamped glyph positions and
// exposes the arm angle to the control side through shared, expiring slots.

pub mod timed_value;
pub mod glyph;
pub mod recognizer;
pub mod angle;
pub mod camera;
pub mod detector;
