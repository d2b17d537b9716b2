//! camera.rs
//! Simulated overhead camera: renders the four glyph quads from the arm angle.
//!
//! Stands in for frame capture plus the excluded vision stages (contours,
//! polygon fit, rectification), handing over ready-made candidates.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::config::RecognizerConfig;
use crate::perception::{
    camera::{CameraAddress, ConnectionLost, FrameSource, QuadExtractor},
    glyph::{BITMAP_SIZE, Candidate, GlyphIdentity, NormalizedBitmap, Point},
};
use crate::simulation::arm::{ArmPlant, ArmReadout, SimulatedServo};

const BASE_ALPHA: Point = Point::new(120.0, 360.0);
const BASE_BETA: Point = Point::new(260.0, 360.0);
const PIVOT: Point = Point::new(400.0, 360.0);
const GAMMA_RADIUS: f64 = 60.0;
const DELTA_RADIUS: f64 = 180.0;
const MARKER_HALF_SIZE: f64 = 18.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub initial_angle: f64,
    /// Fraction of the remaining distance the arm covers per frame at full stiffness.
    pub response: f64,
    pub frame_period: Duration,
    /// Uniform corner noise, ± pixels.
    pub corner_jitter_px: f64,
    /// Random non-glyph quads added to every frame.
    pub noise_candidates: usize,
    /// Report connection loss after this many frames.
    pub max_frames: Option<u64>,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_angle: 0.0,
            response: 0.3,
            frame_period: Duration::from_millis(10),
            corner_jitter_px: 0.0,
            noise_candidates: 3,
            max_frames: None,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedFrame {
    pub arm_angle: f64,
    pub candidates: Vec<Candidate>,
}

pub struct SimulatedCamera {
    plant: ArmPlant,
    recognizer: RecognizerConfig,
    config: SimulationConfig,
    frames: u64,
    rng: StdRng,
    sleeper: SpinSleeper,
}

impl SimulatedCamera {
    pub fn new(plant: ArmPlant, recognizer: RecognizerConfig, config: SimulationConfig) -> Self {
        Self {
            plant,
            recognizer,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            frames: 0,
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
        }
    }

    /// Camera watching a fresh arm built from `config`, plus the servo driving it.
    pub fn with_arm(
        recognizer: RecognizerConfig,
        config: SimulationConfig,
    ) -> (Self, SimulatedServo, ArmReadout) {
        let (plant, servo) = ArmPlant::new(config.initial_angle, config.response);
        let readout = plant.readout();
        (Self::new(plant, recognizer, config), servo, readout)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn render(&mut self, arm_angle: f64) -> Vec<Candidate> {
        let (sin, cos) = arm_angle.to_radians().sin_cos();
        let along_arm = |r: f64| Point::new(PIVOT.x + r * cos, PIVOT.y - r * sin);

        let markers = [
            (GlyphIdentity::Alpha, BASE_ALPHA, 0.0),
            (GlyphIdentity::Beta, BASE_BETA, 90.0),
            (GlyphIdentity::Gamma, along_arm(GAMMA_RADIUS), arm_angle),
            (GlyphIdentity::Delta, along_arm(DELTA_RADIUS), arm_angle),
        ];

        let mut candidates = Vec::with_capacity(markers.len() + self.config.noise_candidates);
        for _ in 0..self.config.noise_candidates {
            candidates.push(self.noise_candidate());
        }
        for (identity, centre, rotation) in markers {
            let candidate = self.marker_candidate(identity, centre, rotation);
            // scan order is arbitrary in a real extractor
            let at = self.rng.random_range(0..=candidates.len());
            candidates.insert(at, candidate);
        }
        candidates
    }

    /// Quad for a marker rotated `rotation` degrees counter-clockwise on screen.
    fn marker_candidate(&mut self, identity: GlyphIdentity, centre: Point, rotation: f64) -> Candidate {
        let (sin, cos) = rotation.to_radians().sin_cos();
        let offsets = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        let mut corners = offsets.map(|(dx, dy)| {
            let (dx, dy) = (dx * MARKER_HALF_SIZE, dy * MARKER_HALF_SIZE);
            Point::new(centre.x + dx * cos + dy * sin, centre.y - dx * sin + dy * cos)
        });
        let jitter = self.config.corner_jitter_px;
        if jitter > 0.0 {
            for corner in corners.iter_mut() {
                corner.x += self.rng.random_range(-jitter..=jitter);
                corner.y += self.rng.random_range(-jitter..=jitter);
            }
        }
        corners.rotate_left(self.rng.random_range(0..4));

        // rectification snaps to the nearest quarter turn; a CCW turn is (4 - k) CW turns
        let ccw_turns = (rotation / 90.0).round().rem_euclid(4.0) as usize;
        let mut bitmap = NormalizedBitmap::from_pattern(self.recognizer.pattern(identity));
        for _ in 0..(4 - ccw_turns) % 4 {
            bitmap = bitmap.rotated();
        }
        Candidate { corners, bitmap }
    }

    fn noise_candidate(&mut self) -> Candidate {
        let centre = Point::new(
            self.rng.random_range(0.0..640.0),
            self.rng.random_range(0.0..480.0),
        );
        let size = self.rng.random_range(5.0..40.0);
        let corners = [
            Point::new(centre.x, centre.y),
            Point::new(centre.x + size, centre.y + 2.0),
            Point::new(centre.x + size, centre.y + size),
            Point::new(centre.x - 1.0, centre.y + size),
        ];
        let rng = &mut self.rng;
        // a lit corner keeps noise from ever passing the border check
        let bitmap = NormalizedBitmap::from_fn(BITMAP_SIZE, |row, col| {
            if row == 0 && col == 0 {
                u8::MAX
            } else {
                rng.random()
            }
        });
        Candidate { corners, bitmap }
    }
}

impl FrameSource for SimulatedCamera {
    type Frame = SimulatedFrame;

    fn address(&self) -> CameraAddress {
        CameraAddress::Simulated {
            name: format!("arm?seed={}", self.config.seed),
        }
    }

    fn next_frame(&mut self) -> Result<SimulatedFrame, ConnectionLost> {
        if let Some(max) = self.config.max_frames {
            if self.frames >= max {
                return Err(ConnectionLost(format!("simulated feed ended after {} frames", max)));
            }
        }
        if !self.config.frame_period.is_zero() {
            self.sleeper.sleep(self.config.frame_period);
        }
        let arm_angle = self.plant.step();
        self.frames += 1;
        Ok(SimulatedFrame {
            arm_angle,
            candidates: self.render(arm_angle),
        })
    }
}

/// The simulated frames already carry their candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderedQuads;

impl QuadExtractor<SimulatedFrame> for RenderedQuads {
    fn candidates(&self, frame: &SimulatedFrame) -> Vec<Candidate> {
        frame.candidates.clone()
    }
}
