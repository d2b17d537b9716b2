//! Event recording for the sensing and control loops.
//!
//! - **EventRecorder:** lock-free bounded queue; producers never block, events are dropped when full.
//! - **Exporter:** background thread draining the queue into a CSV file.
//! - **Summary:** counts and angle statistics, over a drained batch or kept live by the exporter.

use std::{
    fs::File,
    io::BufWriter,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use average::{Estimate, Max, Variance};
use crossbeam_queue::ArrayQueue;
use csv::Writer;
use log::{debug, error};
use parking_lot::Mutex;
use serde::Serialize;

use crate::perception::glyph::GlyphIdentity;

const EVENT_QUEUE_CAPACITY: usize = 16_384;
const EXPORT_POLL_MS: u64 = 10;
const FLUSH_BATCHES: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A candidate was recognised and stored; `x`, `y` is the marker centroid.
    GlyphRecorded {
        ts_ns: u64,
        glyph: GlyphIdentity,
        quarter_turns: u8,
        x: f64,
        y: f64,
    },
    /// `get_angle` returned a fresh angle.
    AngleMeasured { ts_ns: u64, angle: f64 },
    /// A command went to the actuator.
    CommandSent {
        ts_ns: u64,
        iteration: u64,
        servo_angle: i32,
        stiffness: f64,
        completion: f64,
    },
    /// `control` finished within threshold.
    TargetReached { ts_ns: u64, iteration: u64, angle: f64 },
    /// `wait_for_interception` returned.
    Intercepted { ts_ns: u64, angle: f64, completion: f64 },
}

#[derive(Debug, Serialize)]
struct CsvRow {
    ts_ns: u64,
    event: &'static str,
    glyph: Option<&'static str>,
    quarter_turns: Option<u8>,
    iteration: Option<u64>,
    angle: Option<f64>,
    servo_angle: Option<i32>,
    stiffness: Option<f64>,
    completion: Option<f64>,
    x: Option<f64>,
    y: Option<f64>,
}

impl CsvRow {
    fn empty(ts_ns: u64, event: &'static str) -> Self {
        Self {
            ts_ns,
            event,
            glyph: None,
            quarter_turns: None,
            iteration: None,
            angle: None,
            servo_angle: None,
            stiffness: None,
            completion: None,
            x: None,
            y: None,
        }
    }
}

impl From<&Event> for CsvRow {
    fn from(event: &Event) -> Self {
        match *event {
            Event::GlyphRecorded {
                ts_ns, glyph, quarter_turns, x, y,
            } => CsvRow {
                glyph: Some(glyph.name()),
                quarter_turns: Some(quarter_turns),
                x: Some(x),
                y: Some(y),
                ..CsvRow::empty(ts_ns, "glyph_recorded")
            },
            Event::AngleMeasured { ts_ns, angle } => CsvRow {
                angle: Some(angle),
                ..CsvRow::empty(ts_ns, "angle_measured")
            },
            Event::CommandSent {
                ts_ns, iteration, servo_angle, stiffness, completion,
            } => CsvRow {
                iteration: Some(iteration),
                servo_angle: Some(servo_angle),
                stiffness: Some(stiffness),
                completion: Some(completion),
                ..CsvRow::empty(ts_ns, "command_sent")
            },
            Event::TargetReached { ts_ns, iteration, angle } => CsvRow {
                iteration: Some(iteration),
                angle: Some(angle),
                ..CsvRow::empty(ts_ns, "target_reached")
            },
            Event::Intercepted { ts_ns, angle, completion } => CsvRow {
                angle: Some(angle),
                completion: Some(completion),
                ..CsvRow::empty(ts_ns, "intercepted")
            },
        }
    }
}

/// Non-blocking event recorder, shared between threads by cloning.
///
/// Timestamps via `now_ns()` (elapsed nanos since the recorder was created).
#[derive(Clone)]
pub struct EventRecorder {
    queue: Arc<ArrayQueue<Event>>,
    dropped: Arc<AtomicU64>,
    run_start: Instant,
    exporter_running: Arc<AtomicBool>,
    exporter: Arc<Mutex<Option<JoinHandle<Summary>>>>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
            dropped: Arc::new(AtomicU64::new(0)),
            run_start: Instant::now(),
            exporter_running: Arc::new(AtomicBool::new(false)),
            exporter: Arc::new(Mutex::new(None)),
        }
    }

    /// Appends event to queue (lock-free). Drops and counts it if the queue is full.
    #[inline]
    pub fn record(&self, event: Event) {
        if self.queue.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Vec<Event> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.queue.pop() {
            out.push(event);
        }
        out
    }

    /// Spawns a thread draining the queue into `output_csv` until `stop_exporter`,
    /// which returns the summary of everything exported.
    pub fn start_exporter(&self, output_csv: PathBuf) -> Result<(), String> {
        let mut slot = self.exporter.lock();
        if slot.is_some() {
            return Err("exporter already running".into());
        }

        let queue = self.queue.clone();
        let running = self.exporter_running.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("telemetry-export".into())
            .spawn(move || {
                let mut tally = Tally::default();
                let file = match File::create(&output_csv) {
                    Ok(f) => f,
                    Err(e) => {
                        error!("failed to create telemetry csv {:?}: {}", output_csv, e);
                        return tally.finish();
                    }
                };
                let mut wtr = Writer::from_writer(BufWriter::new(file));
                let mut written = 0usize;
                let mut flush_counter = 0usize;

                while running.load(Ordering::SeqCst) {
                    let mut any = false;
                    while let Some(event) = queue.pop() {
                        any = true;
                        tally.add(&event);
                        if wtr.serialize(CsvRow::from(&event)).is_ok() {
                            written += 1;
                        }
                    }
                    if any {
                        flush_counter += 1;
                        if flush_counter >= FLUSH_BATCHES {
                            wtr.flush().ok();
                            flush_counter = 0;
                        }
                    } else {
                        thread::sleep(Duration::from_millis(EXPORT_POLL_MS));
                    }
                }

                // final drain
                while let Some(event) = queue.pop() {
                    tally.add(&event);
                    if wtr.serialize(CsvRow::from(&event)).is_ok() {
                        written += 1;
                    }
                }
                wtr.flush().ok();
                debug!("[telemetry] exporter exiting, {} events written", written);
                tally.finish()
            })
            .map_err(|e| format!("failed to spawn exporter: {}", e))?;

        *slot = Some(handle);
        Ok(())
    }

    /// Stop the exporter after a final drain. `None` if none was running.
    pub fn stop_exporter(&self) -> Option<Summary> {
        self.exporter_running.store(false, Ordering::SeqCst);
        let handle = self.exporter.lock().take()?;
        match handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                error!("[telemetry] exporter thread panicked");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub glyphs_recorded: usize,
    pub angle_reads: usize,
    pub commands_sent: usize,
    pub targets_reached: usize,
    pub interceptions: usize,
    pub angle_mean: Option<f64>,
    pub angle_std_dev: Option<f64>,
    pub max_stiffness: Option<f64>,
}

/// Running totals behind a `Summary`, fed one event at a time.
#[derive(Default)]
struct Tally {
    summary: Summary,
    angles: Variance,
    stiffness: Max,
}

impl Tally {
    fn add(&mut self, event: &Event) {
        match event {
            Event::GlyphRecorded { .. } => self.summary.glyphs_recorded += 1,
            Event::AngleMeasured { angle, .. } => {
                self.summary.angle_reads += 1;
                self.angles.add(*angle);
            }
            Event::CommandSent { stiffness, .. } => {
                self.summary.commands_sent += 1;
                self.stiffness.add(*stiffness);
            }
            Event::TargetReached { .. } => self.summary.targets_reached += 1,
            Event::Intercepted { .. } => self.summary.interceptions += 1,
        }
    }

    fn finish(self) -> Summary {
        let mut summary = self.summary;
        if summary.angle_reads > 0 {
            summary.angle_mean = Some(self.angles.mean());
        }
        if summary.angle_reads > 1 {
            summary.angle_std_dev = Some(self.angles.sample_variance().sqrt());
        }
        if summary.commands_sent > 0 {
            summary.max_stiffness = Some(self.stiffness.max());
        }
        summary
    }
}

pub fn summarize(events: &[Event]) -> Summary {
    let mut tally = Tally::default();
    for event in events {
        tally.add(event);
    }
    tally.finish()
}
