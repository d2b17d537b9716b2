//! # Glyph Arm Entry Point
//! Moves a camera-tracked arm to a requested angle, closed loop, against the
//! simulated camera and servo.
//!
//! ## Pipeline
//! - **Camera (simulated):** renders the four glyph quads from the true arm angle every frame.
//! - **Position detector:** own thread; recognises glyphs and keeps their corners for 1 s.
//! - **Controller:** reads the angle, steps the PID, sends servo angle and stiffness.
//! - **Interception watcher (optional):** reports when the arm has covered a given share of its travel.
//!
//! ## Outputs
//! - `data/logs/glyph_arm_events.csv`: glyph, angle, command and arrival events.

use std::{
    error::Error,
    fs::create_dir_all,
    io::{stdin, stdout, Write},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use glyph_arm::{
    config::{ControllerConfig, DetectorConfig, RecognizerConfig},
    control::controller::{Actuator, PidController},
    error::{ControlError, DetectorError},
    perception::detector::PositionDetector,
    simulation::camera::{RenderedQuads, SimulatedCamera, SimulationConfig},
    telemetry::{EventRecorder, Summary},
};
use log::{error, info, warn};

const DEFAULT_TARGET_ANGLE: f64 = 90.0;
const DEFAULT_TARGET_STIFFNESS: f64 = 1.0;
const DEFAULT_INTERCEPTION_MOMENT: f64 = 0.5;
const CONTROL_INTERVAL_MS: u64 = 100;
const CORNER_JITTER_PX: f64 = 0.3;
const INTERCEPTION_GRACE_MS: u64 = 500;
const LOG_DIR: &str = "data/logs";
const EVENTS_CSV: &str = "data/logs/glyph_arm_events.csv";

struct Motion {
    target_angle: f64,
    target_stiffness: f64,
    interception_moment: Option<f64>,
    sensing_core: Option<usize>,
}

/// The watcher only reads angles; it never commands the servo.
struct Unpowered;

impl Actuator for Unpowered {
    fn send(&mut self, _angle: i32, _stiffness: f64) {}
}

/// Stiffness ramp over movement completion, clamped to [0, 1].
fn smoothstep(completion: f64) -> f64 {
    let c = completion.clamp(0.0, 1.0);
    c * c * (3.0 - 2.0 * c)
}

fn main() {
    env_logger::init();
    info!("=== GLYPH ARM START ===");

    loop {
        let choice = prompt_menu();
        match choice.as_str() {
            "1" | "" => {
                let motion = prompt_motion(false);
                report(run_motion(&motion));
            }
            "2" => {
                let motion = prompt_motion(true);
                report(run_motion(&motion));
            }
            "3" => {
                println!("Exiting. Goodbye!");
                info!("=== GLYPH ARM FINISHED ===");
                return;
            }
            other => {
                println!("Unrecognized option '{}', please try again.", other);
            }
        }
    }
}

fn prompt_menu() -> String {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     SELECT ARM MOTION                       │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Move to angle                           │");
    println!("│  2) Move to angle, watch for interception   │");
    println!("│  3) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select [1/2/3] (default: 1): ");
    read_line()
}

fn prompt_motion(with_interception: bool) -> Motion {
    let target_angle = prompt_f64("Target arm angle in degrees", DEFAULT_TARGET_ANGLE);
    let target_stiffness = prompt_f64("Target stiffness", DEFAULT_TARGET_STIFFNESS);
    let interception_moment = with_interception
        .then(|| prompt_f64("Interception moment (0..1)", DEFAULT_INTERCEPTION_MOMENT));

    print!("Core ID to pin the detector thread [default: none]: ");
    let sensing_core = read_line().parse::<usize>().ok();

    Motion {
        target_angle,
        target_stiffness,
        interception_moment,
        sensing_core,
    }
}

fn prompt_f64(label: &str, default: f64) -> f64 {
    print!("{} [default: {}]: ", label, default);
    read_line().parse::<f64>().unwrap_or(default)
}

fn read_line() -> String {
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn report(result: Result<(), Box<dyn Error>>) {
    match result {
        Ok(()) => println!("\n Motion completed. Returning to menu...\n"),
        Err(e) => {
            error!("[Main] motion failed: {}", e);
            println!("\n Motion failed: {}\n", e);
        }
    }
}

fn run_motion(motion: &Motion) -> Result<(), Box<dyn Error>> {
    info!(
        "[Main] target {:.1}°, stiffness {:.2}, interception {:?}",
        motion.target_angle, motion.target_stiffness, motion.interception_moment
    );

    let recorder = Arc::new(EventRecorder::new());
    match create_dir_all(LOG_DIR) {
        Ok(()) => {
            if let Err(e) = recorder.start_exporter(PathBuf::from(EVENTS_CSV)) {
                error!("[Main] telemetry export disabled: {}", e);
            }
        }
        Err(e) => error!("[Main] failed to create log directory {}: {}", LOG_DIR, e),
    }

    let mut detector_config = DetectorConfig::new();
    if let Some(core) = motion.sensing_core {
        detector_config = detector_config.with_sensing_core(core);
    }
    let detector = Arc::new(PositionDetector::new(detector_config)?.with_recorder(recorder.clone()));

    let (camera, servo, readout) = SimulatedCamera::with_arm(
        RecognizerConfig::default(),
        SimulationConfig {
            corner_jitter_px: CORNER_JITTER_PX,
            ..SimulationConfig::default()
        },
    );
    let detector_handle = detector.spawn(camera, RenderedQuads)?;

    let result = drive(motion, &detector, servo, &recorder);

    info!("[Main] stopping position detector...");
    detector.kill();
    match detector_handle.join() {
        Ok(Ok(stats)) => info!(
            "[Main] detector processed {} frames, {} glyphs",
            stats.frames, stats.recognitions
        ),
        Ok(Err(e)) => warn!("[Main] detector ended with: {}", e),
        Err(_) => error!("[Main] detector thread panicked"),
    }

    if let Some(summary) = recorder.stop_exporter() {
        print_summary(&summary);
        println!("Events written to {}", EVENTS_CSV);
    }
    if recorder.dropped() > 0 {
        warn!("[Main] {} telemetry events dropped", recorder.dropped());
    }
    println!("True arm angle: {:.2}°", readout.angle());

    result
}

fn drive(
    motion: &Motion,
    detector: &PositionDetector,
    servo: impl Actuator,
    recorder: &Arc<EventRecorder>,
) -> Result<(), Box<dyn Error>> {
    let starting_angle = detector.get_angle()?;
    // inverted servo: servo angle is the negated arm angle
    let starting_servo = -starting_angle;
    let target = motion.target_angle;

    let mut config = ControllerConfig::new()
        .with_iteration_interval(Duration::from_millis(CONTROL_INTERVAL_MS));
    if let Some(moment) = motion.interception_moment {
        config = config.with_interception_moment(moment);
    }

    let stop_watch = AtomicBool::new(false);
    thread::scope(|scope| -> Result<(), Box<dyn Error>> {
        let watcher = match motion.interception_moment {
            Some(_) => {
                let watcher = PidController::new(
                    detector.interruptible(&stop_watch),
                    Unpowered,
                    smoothstep,
                    config.clone(),
                )
                .with_recorder(recorder.clone());
                Some(
                    thread::Builder::new()
                        .name("interception-watcher".into())
                        .spawn_scoped(scope, move || {
                            watcher.wait_for_interception(starting_angle, target)
                        })?,
                )
            }
            None => None,
        };

        let mut controller = PidController::new(detector, servo, smoothstep, config)
            .with_recorder(recorder.clone());
        let started = Instant::now();
        let outcome = controller.control(
            target,
            starting_servo,
            motion.target_stiffness,
            starting_angle,
        );

        if let Ok(outcome) = &outcome {
            println!("\n========== MOTION RESULT ==========");
            println!("Start angle:      {:.2}°", starting_angle);
            println!("Final angle:      {:.2}°", outcome.final_angle);
            println!("Final servo:      {:.0}", outcome.final_servo_angle);
            println!("Iterations:       {}", outcome.iterations);
            println!("Commands sent:    {}", outcome.commands_sent);
            println!("Elapsed:          {:.2?}", started.elapsed());
        }

        // the watcher is stopped and joined on every path out of the scope
        if let Some(handle) = watcher {
            if outcome.is_ok() {
                // the arm passes any moment below 1 well before settling
                let deadline = Instant::now() + Duration::from_millis(INTERCEPTION_GRACE_MS);
                while !handle.is_finished() && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(10));
                }
            }
            stop_watch.store(true, Ordering::Release);
            match handle.join() {
                Ok(Ok(angle)) => println!("Intercepted at:   {:.2}°", angle),
                Ok(Err(ControlError::Detector(DetectorError::Interrupted))) => {
                    warn!("[Main] arm never passed the interception moment")
                }
                Ok(Err(e)) => warn!("[Main] interception watch failed: {}", e),
                Err(_) => error!("[Main] interception watcher panicked"),
            }
        }

        outcome?;
        Ok(())
    })
}

fn print_summary(summary: &Summary) {
    println!("\n========== TELEMETRY ==========");
    println!("Glyphs recorded:  {}", summary.glyphs_recorded);
    println!("Angle reads:      {}", summary.angle_reads);
    println!("Commands sent:    {}", summary.commands_sent);
    println!("Targets reached:  {}", summary.targets_reached);
    println!("Interceptions:    {}", summary.interceptions);
    if let (Some(mean), Some(std_dev)) = (summary.angle_mean, summary.angle_std_dev) {
        println!("Angle mean/std:   {:.2}° / {:.2}°", mean, std_dev);
    }
    if let Some(max) = summary.max_stiffness {
        println!("Max stiffness:    {:.3}", max);
    }
}
