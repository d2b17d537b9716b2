//! End-to-end runs of the detector thread and controller against the simulated arm.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
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
    telemetry::{summarize, Event, EventRecorder},
};

struct NoServo;

impl Actuator for NoServo {
    fn send(&mut self, _angle: i32, _stiffness: f64) {}
}

fn ramp(completion: f64) -> f64 {
    completion.clamp(0.0, 1.0)
}

fn sim_config() -> SimulationConfig {
    SimulationConfig {
        frame_period: Duration::from_millis(1),
        ..SimulationConfig::default()
    }
}

fn controller_config() -> ControllerConfig {
    ControllerConfig::new().with_iteration_interval(Duration::from_millis(20))
}

#[test]
fn arm_reaches_target() {
    let recorder = Arc::new(EventRecorder::new());
    let detector = Arc::new(
        PositionDetector::new(DetectorConfig::new())
            .unwrap()
            .with_recorder(recorder.clone()),
    );
    let (camera, servo, readout) = SimulatedCamera::with_arm(RecognizerConfig::default(), sim_config());
    let handle = detector.spawn(camera, RenderedQuads).unwrap();

    let start = detector.get_angle().unwrap();
    assert!(start.abs() < 1e-6);

    let mut controller = PidController::new(detector.clone(), servo, ramp, controller_config())
        .with_recorder(recorder.clone());
    let outcome = controller.control(90.0, -start, 1.0, start).unwrap();

    assert!((outcome.final_angle - 90.0).abs() <= 0.2);
    assert_eq!(outcome.iterations, outcome.commands_sent + 1);
    assert!(outcome.commands_sent > 0);
    assert_eq!(controller.actuator().dropped(), 0);

    detector.kill();
    let stats = handle.join().unwrap().unwrap();
    assert!(stats.frames > 0);
    // three noise quads per frame never count
    assert_eq!(stats.recognitions, 4 * stats.frames);
    assert!((readout.angle() - 90.0).abs() < 2.0);

    let events = recorder.drain();
    let summary = summarize(&events);
    assert_eq!(summary.commands_sent as u64, outcome.commands_sent);
    assert_eq!(summary.targets_reached, 1);
    assert_eq!(summary.angle_reads as u64, outcome.iterations + 1);
    assert!(summary.max_stiffness.unwrap() <= 1.0);

    // every motion starts slack
    let stiffness: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            Event::CommandSent { stiffness, .. } => Some(*stiffness),
            _ => None,
        })
        .collect();
    assert_eq!(stiffness[0], 0.0);
}

#[test]
fn watcher_sees_interception_during_motion() {
    let detector = Arc::new(PositionDetector::new(DetectorConfig::new()).unwrap());
    let (camera, servo, _readout) = SimulatedCamera::with_arm(RecognizerConfig::default(), sim_config());
    let handle = detector.spawn(camera, RenderedQuads).unwrap();

    let config = controller_config().with_interception_moment(0.5);
    let watcher = PidController::new(detector.clone(), NoServo, ramp, config.clone());
    let watch = thread::spawn(move || watcher.wait_for_interception(0.0, 60.0));

    let mut controller = PidController::new(detector.clone(), servo, ramp, config);
    controller.control(60.0, 0.0, 1.0, 0.0).unwrap();

    let intercepted = watch.join().unwrap().unwrap();
    assert!(intercepted > 30.0);

    detector.kill();
    handle.join().unwrap().unwrap();
}

#[test]
fn watcher_is_called_off_when_the_arm_never_gets_there() {
    let detector = PositionDetector::new(DetectorConfig::new()).unwrap();
    let (camera, _servo, _readout) = SimulatedCamera::with_arm(RecognizerConfig::default(), sim_config());
    let stop = AtomicBool::new(false);

    let (result, waited, still_watching) = thread::scope(|scope| {
        let sensing = scope.spawn(|| {
            let mut camera = camera;
            detector.run(&mut camera, &RenderedQuads)
        });

        // the servo is never driven, so the arm stays at 0 and the moment is never passed
        let config = controller_config().with_interception_moment(0.5);
        let watcher = PidController::new(detector.interruptible(&stop), NoServo, ramp, config);
        let watch = scope.spawn(move || watcher.wait_for_interception(0.0, 60.0));

        thread::sleep(Duration::from_millis(100));
        let still_watching = !watch.is_finished();

        let called_off = Instant::now();
        stop.store(true, Ordering::Release);
        let result = watch.join().unwrap();
        let waited = called_off.elapsed();

        detector.kill();
        sensing.join().unwrap().unwrap();
        (result, waited, still_watching)
    });

    assert!(still_watching);
    assert!(matches!(
        result,
        Err(ControlError::Detector(DetectorError::Interrupted))
    ));
    assert!(waited < Duration::from_millis(500));
}

#[test]
fn lost_camera_ends_the_detector_and_glyphs_expire() {
    let detector = Arc::new(
        PositionDetector::new(DetectorConfig::new().with_glyph_timeout(Duration::from_millis(200)))
            .unwrap(),
    );
    let (camera, _servo, _readout) = SimulatedCamera::with_arm(
        RecognizerConfig::default(),
        SimulationConfig {
            initial_angle: 25.0,
            frame_period: Duration::ZERO,
            max_frames: Some(5),
            ..SimulationConfig::default()
        },
    );
    let handle = detector.spawn(camera, RenderedQuads).unwrap();

    let result = handle.join().unwrap();
    assert!(matches!(result, Err(DetectorError::ConnectionLost(_))));
    assert_eq!(detector.frames_processed(), 5);

    let angle = detector.try_angle().unwrap();
    assert!((angle - 25.0).abs() < 1e-9);

    let lost_at = Instant::now();
    while lost_at.elapsed() < Duration::from_millis(300) {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(detector.try_angle().unwrap_err().is_stale());
}
