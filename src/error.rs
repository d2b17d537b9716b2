//! Error types shared by the perception and control sides.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::perception::glyph::GlyphIdentity;

/// A time-bounded reading was requested after it expired (or before it was ever set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{}", describe_stale(.age, .timeout))]
pub struct StaleError {
    /// Age of the stored reading; `None` when nothing was ever stored.
    pub age: Option<Duration>,
    pub timeout: Duration,
}

fn describe_stale(age: &Option<Duration>, timeout: &Duration) -> String {
    match age {
        Some(age) => format!("reading is {:?} old, timeout is {:?}", age, timeout),
        None => "no reading stored yet".to_string(),
    }
}

/// Marker layout from which no angle can be derived.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("markers {from} and {to} are {separation:.3} px apart, below minimum {min_separation:.3} px")]
    CoincidentMarkers {
        from: GlyphIdentity,
        to: GlyphIdentity,
        separation: f64,
        min_separation: f64,
    },

    #[error("non-finite corner coordinate on marker {0}")]
    NonFinite(GlyphIdentity),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitmapError {
    #[error("bitmap size mismatch: expected {expected} pixels, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("patterns for {first} and {second} are identical under rotation")]
    AmbiguousPatterns {
        first: GlyphIdentity,
        second: GlyphIdentity,
    },

    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: f64 },
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no camera found under {0}")]
    NoCamera(PathBuf),

    #[error("invalid camera address '{0}'")]
    InvalidAddress(String),

    #[error("failed to scan for cameras: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("glyph {glyph} unavailable: {source}")]
    Stale {
        glyph: GlyphIdentity,
        #[source]
        source: StaleError,
    },

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("camera connection lost: {0}")]
    ConnectionLost(String),

    #[error("failed to spawn detector thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("angle read interrupted")]
    Interrupted,
}

impl DetectorError {
    pub fn is_stale(&self) -> bool {
        matches!(self, DetectorError::Stale { .. })
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error("start {start} and target {target} are equal, travel is zero")]
    ZeroTravel { start: f64, target: f64 },

    #[error("interception moment not configured")]
    NoInterceptionMoment,
}
