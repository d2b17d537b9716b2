//! config.rs
//! Tunables for recognition, sensing and control, passed into constructors.

use std::time::Duration;

use crate::error::ConfigError;
use crate::perception::glyph::{
    ALPHA_PATTERN, BETA_PATTERN, DELTA_PATTERN, GAMMA_PATTERN, GLYPH_COUNT, GlyphIdentity,
    GlyphPattern,
};

const DEFAULT_BRIGHT_THRESHOLD: u8 = 128;

const DEFAULT_GLYPH_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_MAX_CANDIDATES: usize = 100;
const DEFAULT_MIN_MARKER_SEPARATION_PX: f64 = 1.0;

const DEFAULT_KP: f64 = 0.7;
const DEFAULT_KI: f64 = 0.2;
const DEFAULT_KD: f64 = 0.2;
const DEFAULT_THRESHOLD: f64 = 0.2;
const DEFAULT_ITERATION_INTERVAL_MS: u64 = 500;
const DEFAULT_INTERCEPTION_POLL_MS: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerConfig {
    /// Pixels at or above this level count as bright.
    pub bright_threshold: u8,
    /// One pattern per identity, indexed by `GlyphIdentity::index`.
    pub patterns: [GlyphPattern; GLYPH_COUNT],
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            bright_threshold: DEFAULT_BRIGHT_THRESHOLD,
            patterns: [ALPHA_PATTERN, BETA_PATTERN, GAMMA_PATTERN, DELTA_PATTERN],
        }
    }
}

impl RecognizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bright_threshold(mut self, threshold: u8) -> Self {
        self.bright_threshold = threshold;
        self
    }

    pub fn with_pattern(mut self, identity: GlyphIdentity, pattern: GlyphPattern) -> Self {
        self.patterns[identity.index()] = pattern;
        self
    }

    pub fn pattern(&self, identity: GlyphIdentity) -> &GlyphPattern {
        &self.patterns[identity.index()]
    }

    /// Rejects pattern sets in which two identities coincide under some rotation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, first) in GlyphIdentity::ALL.iter().enumerate() {
            for second in &GlyphIdentity::ALL[i + 1..] {
                let a = self.pattern(*first);
                let b = self.pattern(*second);
                if b.orientations().iter().any(|rotated| rotated == a) {
                    return Err(ConfigError::AmbiguousPatterns {
                        first: *first,
                        second: *second,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Age after which a recorded glyph position is no longer trusted.
    pub glyph_timeout: Duration,
    /// Upper bound on the wait between freshness checks in `get_angle`.
    pub poll_interval: Duration,
    /// Candidates considered per frame.
    pub max_candidates: usize,
    /// Marker centroids closer than this (pixels) give no usable direction.
    pub min_marker_separation: f64,
    /// Pin the sensing thread to this core.
    pub sensing_core: Option<usize>,
    /// Run the sensing thread at maximum OS priority.
    pub realtime_priority: bool,
    pub recognizer: RecognizerConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            glyph_timeout: Duration::from_millis(DEFAULT_GLYPH_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            min_marker_separation: DEFAULT_MIN_MARKER_SEPARATION_PX,
            sensing_core: None,
            realtime_priority: false,
            recognizer: RecognizerConfig::default(),
        }
    }
}

impl DetectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_glyph_timeout(mut self, timeout: Duration) -> Self {
        self.glyph_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    pub fn with_min_marker_separation(mut self, px: f64) -> Self {
        self.min_marker_separation = px;
        self
    }

    pub fn with_sensing_core(mut self, core: usize) -> Self {
        self.sensing_core = Some(core);
        self
    }

    pub fn with_realtime_priority(mut self, enabled: bool) -> Self {
        self.realtime_priority = enabled;
        self
    }

    pub fn with_recognizer(mut self, recognizer: RecognizerConfig) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.glyph_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("glyph_timeout"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("poll_interval"));
        }
        if !(self.min_marker_separation >= 0.0 && self.min_marker_separation.is_finite()) {
            return Err(ConfigError::InvalidValue {
                name: "min_marker_separation",
                value: self.min_marker_separation,
            });
        }
        self.recognizer.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl PidGains {
    pub const fn new(p: f64, i: f64, d: f64) -> Self {
        Self { p, i, d }
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self::new(DEFAULT_KP, DEFAULT_KI, DEFAULT_KD)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub gains: PidGains,
    /// Control stops once the arm is this close to the target angle.
    pub threshold: f64,
    /// Pause between actuator commands.
    pub iteration_interval: Duration,
    /// Pause between angle reads while waiting for interception.
    pub interception_poll: Duration,
    /// Fraction of total travel after which `wait_for_interception` returns.
    pub interception_moment: Option<f64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            threshold: DEFAULT_THRESHOLD,
            iteration_interval: Duration::from_millis(DEFAULT_ITERATION_INTERVAL_MS),
            interception_poll: Duration::from_millis(DEFAULT_INTERCEPTION_POLL_MS),
            interception_moment: None,
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kp(mut self, p: f64) -> Self {
        self.gains.p = p;
        self
    }

    pub fn with_ki(mut self, i: f64) -> Self {
        self.gains.i = i;
        self
    }

    pub fn with_kd(mut self, d: f64) -> Self {
        self.gains.d = d;
        self
    }

    pub fn with_gains(mut self, gains: PidGains) -> Self {
        self.gains = gains;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_iteration_interval(mut self, interval: Duration) -> Self {
        self.iteration_interval = interval;
        self
    }

    pub fn with_interception_poll(mut self, interval: Duration) -> Self {
        self.interception_poll = interval;
        self
    }

    pub fn with_interception_moment(mut self, moment: f64) -> Self {
        self.interception_moment = Some(moment);
        self
    }
}
