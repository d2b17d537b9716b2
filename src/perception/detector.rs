//! detector.rs
//! Background sensing loop and blocking angle reads.
//!
//! - Sensing: frame → candidates → recognizer → one time-bounded slot per glyph (last write wins).
//! - Reading: `get_angle` retries until all four slots are fresh at the same instant.
//! - Shutdown: `kill` sets a flag checked once per frame; it never interrupts a frame in progress.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::config::DetectorConfig;
use crate::error::{ConfigError, DetectorError};
use crate::perception::{
    angle::AngleEstimator,
    camera::{FrameSource, QuadExtractor},
    glyph::{Candidate, CornerSet, GLYPH_COUNT, GlyphIdentity},
    recognizer::{GlyphRecognizer, Recognition},
    timed_value::TimeBoundedValue,
};
use crate::telemetry::{Event, EventRecorder};

/// Anything that can report the current arm angle, blocking until it can.
pub trait AngleSource {
    fn get_angle(&self) -> Result<f64, DetectorError>;
}

impl<T: AngleSource + ?Sized> AngleSource for Arc<T> {
    fn get_angle(&self) -> Result<f64, DetectorError> {
        (**self).get_angle()
    }
}

impl<T: AngleSource + ?Sized> AngleSource for &T {
    fn get_angle(&self) -> Result<f64, DetectorError> {
        (**self).get_angle()
    }
}

/// Angle reads from a detector that end with `Interrupted` once `stop` is set.
#[derive(Clone, Copy)]
pub struct InterruptibleAngle<'a> {
    detector: &'a PositionDetector,
    stop: &'a AtomicBool,
}

impl AngleSource for InterruptibleAngle<'_> {
    fn get_angle(&self) -> Result<f64, DetectorError> {
        self.detector.get_angle_until(self.stop)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub recognitions: u64,
}

pub struct PositionDetector {
    glyphs: [TimeBoundedValue<CornerSet>; GLYPH_COUNT],
    recognizer: GlyphRecognizer,
    estimator: AngleEstimator,
    config: DetectorConfig,
    stop_requested: AtomicBool,
    // bumped on every record; readers wait on it instead of sleeping blind
    generation: Mutex<u64>,
    recorded: Condvar,
    frames: AtomicU64,
    recorder: Option<Arc<EventRecorder>>,
}

impl PositionDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let recognizer = GlyphRecognizer::new(&config.recognizer)?;
        let timeout = config.glyph_timeout;
        Ok(Self {
            glyphs: GlyphIdentity::ALL.map(|_| TimeBoundedValue::new(timeout)),
            recognizer,
            estimator: AngleEstimator::new(config.min_marker_separation),
            config,
            stop_requested: AtomicBool::new(false),
            generation: Mutex::new(0),
            recorded: Condvar::new(),
            frames: AtomicU64::new(0),
            recorder: None,
        })
    }

    pub fn with_recorder(mut self, recorder: Arc<EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Store the latest corners seen for `identity`.
    pub fn record(&self, identity: GlyphIdentity, corners: CornerSet) {
        self.glyphs[identity.index()].set(corners);
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.recorded.notify_all();
    }

    /// Latest corners for `identity` if still fresh.
    pub fn glyph(&self, identity: GlyphIdentity) -> Option<CornerSet> {
        self.glyphs[identity.index()].get().ok()
    }

    /// One attempt at reading the angle; `Stale` if any glyph is missing or expired.
    pub fn try_angle(&self) -> Result<f64, DetectorError> {
        let now = Instant::now();
        let read = |glyph: GlyphIdentity| {
            self.glyphs[glyph.index()]
                .get_at(now)
                .map_err(|source| DetectorError::Stale { glyph, source })
        };
        let corners = [
            read(GlyphIdentity::Alpha)?,
            read(GlyphIdentity::Beta)?,
            read(GlyphIdentity::Gamma)?,
            read(GlyphIdentity::Delta)?,
        ];
        Ok(self.estimator.estimate(&corners)?)
    }

    /// Blocks until all four glyphs are fresh at once, then returns the angle.
    ///
    /// No timeout: with the camera gone this never returns. A degenerate marker
    /// layout is returned as an error rather than retried.
    pub fn get_angle(&self) -> Result<f64, DetectorError> {
        self.get_angle_until(&AtomicBool::new(false))
    }

    /// `get_angle` that gives up with `Interrupted` once `stop` is set.
    ///
    /// `stop` is checked before every attempt, so a waiting caller notices it
    /// within one poll interval.
    pub fn get_angle_until(&self, stop: &AtomicBool) -> Result<f64, DetectorError> {
        let mut notified = false;
        loop {
            if stop.load(Ordering::Acquire) {
                return Err(DetectorError::Interrupted);
            }
            let seen = *self.generation.lock();
            match self.try_angle() {
                Ok(angle) => {
                    if let Some(recorder) = &self.recorder {
                        recorder.record(Event::AngleMeasured {
                            ts_ns: recorder.now_ns(),
                            angle,
                        });
                    }
                    return Ok(angle);
                }
                Err(DetectorError::Stale { glyph, source }) => {
                    if !notified {
                        info!("Waiting for valid position from camera... ({}: {})", glyph, source);
                        notified = true;
                    }
                    self.wait_for_record(seen, self.config.poll_interval);
                }
                Err(e) => {
                    warn!("angle unavailable: {}", e);
                    return Err(e);
                }
            }
        }
    }

    // Returns early when a glyph was recorded after `seen`, else after `timeout`.
    fn wait_for_record(&self, seen: u64, timeout: Duration) {
        let mut generation = self.generation.lock();
        if *generation == seen {
            let _ = self.recorded.wait_for(&mut generation, timeout);
        }
    }

    /// Angle source for a second reader, such as an interception watch, that
    /// the owner must be able to call off.
    pub fn interruptible<'a>(&'a self, stop: &'a AtomicBool) -> InterruptibleAngle<'a> {
        InterruptibleAngle {
            detector: self,
            stop,
        }
    }

    /// Recognise and record every candidate of one frame, in order.
    pub fn process_candidates(&self, candidates: &[Candidate]) -> usize {
        let mut found = 0;
        for candidate in candidates.iter().take(self.config.max_candidates) {
            if let Some(recognition) = self.recognizer.recognize(candidate) {
                self.store(recognition);
                found += 1;
            }
        }
        found
    }

    fn store(&self, recognition: Recognition) {
        let Recognition {
            identity,
            corners,
            quarter_turns,
        } = recognition;
        if let Some(recorder) = &self.recorder {
            let centre = corners.centroid();
            recorder.record(Event::GlyphRecorded {
                ts_ns: recorder.now_ns(),
                glyph: identity,
                quarter_turns,
                x: centre.x,
                y: centre.y,
            });
        }
        self.record(identity, corners);
    }

    /// Sensing loop. Runs until `kill` or until the frame source fails.
    pub fn run<S, Q>(&self, source: &mut S, extractor: &Q) -> Result<RunStats, DetectorError>
    where
        S: FrameSource,
        Q: QuadExtractor<S::Frame>,
    {
        info!("connecting to camera {}...", source.address());
        let mut stats = RunStats::default();

        while !self.stop_requested.load(Ordering::Acquire) {
            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(lost) => {
                    error!("can't read from camera {}: {}", source.address(), lost.0);
                    return Err(DetectorError::ConnectionLost(lost.0));
                }
            };
            let candidates = extractor.candidates(&frame);
            let found = self.process_candidates(&candidates);

            stats.frames += 1;
            stats.recognitions += found as u64;
            self.frames.fetch_add(1, Ordering::Relaxed);
            debug!(
                "frame {}: {} candidates, {} glyphs",
                stats.frames,
                candidates.len(),
                found
            );
        }

        info!(
            "position detector stopped after {} frames ({} glyphs)",
            stats.frames, stats.recognitions
        );
        Ok(stats)
    }

    /// Ask the sensing loop to stop after the current frame.
    pub fn kill(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn is_killed(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Frames processed so far, across all runs.
    pub fn frames_processed(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Run the sensing loop on its own thread, pinned and prioritised as configured.
    pub fn spawn<S, Q>(
        self: &Arc<Self>,
        mut source: S,
        extractor: Q,
    ) -> Result<JoinHandle<Result<RunStats, DetectorError>>, DetectorError>
    where
        S: FrameSource + Send + 'static,
        Q: QuadExtractor<S::Frame> + Send + 'static,
    {
        let detector = Arc::clone(self);
        let core = self.config.sensing_core;
        let mut body = move || {
            if let Some(core) = core {
                pin_to_core(core);
            }
            detector.run(&mut source, &extractor)
        };

        let builder = thread::Builder::new().name("position-detector".to_string());
        let handle = if self.config.realtime_priority {
            builder.spawn_with_priority(ThreadPriority::Max, move |priority_result| {
                if let Err(e) = priority_result {
                    warn!("could not raise detector thread priority: {:?}", e);
                }
                body()
            })?
        } else {
            builder.spawn(body)?
        };
        Ok(handle)
    }
}

impl AngleSource for PositionDetector {
    fn get_angle(&self) -> Result<f64, DetectorError> {
        PositionDetector::get_angle(self)
    }
}

fn pin_to_core(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(core_id) if core_affinity::set_for_current(*core_id) => {
            info!("position detector pinned to core {}", core);
        }
        Some(_) => error!("failed to pin position detector to core {}", core),
        None => error!("core {} not found among available cores", core),
    }
}
