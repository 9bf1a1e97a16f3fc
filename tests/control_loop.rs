use std::time::Duration;

use anyhow::{anyhow, Result};

use servo_kernel::control::{Actuator, ControlLoop, LoopExit, Perception, TrackedClass};
use servo_kernel::detect::{BlobParams, CircleParams};
use servo_kernel::frame::Frame;
use servo_kernel::ingest::synthetic::{BALL_BGR, GOAL_BGR};
use servo_kernel::ingest::{CameraConfig, CameraSource};
use servo_kernel::motor::hardware::PinPattern;
use servo_kernel::motor::{
    DriveMode, DutyCycles, MotorController, SpeedLevel, StubMotorHardware, StubProbe,
};
use servo_kernel::segment::{pink_ranges, red_ranges, ColorClassSpec};
use servo_kernel::steer::{SteeringCommand, SteeringPolicy};

const FLOOR: [u8; 3] = [40, 40, 40];

fn perception() -> Result<Perception> {
    Perception::new(vec![
        TrackedClass::circle(
            ColorClassSpec::new("ball", red_ranges())?,
            CircleParams::default(),
        ),
        TrackedClass::blob(
            ColorClassSpec::new("goal", pink_ranges())?,
            BlobParams::default(),
        ),
    ])
}

fn stub_motor() -> Result<(MotorController, StubProbe)> {
    let hw = StubMotorHardware::new();
    let probe = hw.probe();
    let motor = MotorController::new(Box::new(hw), DutyCycles::default(), SpeedLevel::Medium)?;
    Ok((motor, probe))
}

fn ball_at(x: i64) -> Frame {
    let mut frame = Frame::filled(320, 240, FLOOR);
    frame.fill_disk(x, 120, 30, BALL_BGR);
    frame
}

fn goal_only() -> Frame {
    let mut frame = Frame::filled(320, 240, FLOOR);
    frame.fill_rect(200, 30, 60, 60, GOAL_BGR);
    frame
}

fn ball_and_goal() -> Frame {
    let mut frame = goal_only();
    frame.fill_disk(80, 150, 30, BALL_BGR);
    frame
}

#[test]
fn replayed_frames_drive_expected_commands() -> Result<()> {
    let (motor, probe) = stub_motor()?;
    let mut control = ControlLoop::new(
        CameraSource::replay(Vec::new()),
        perception()?,
        SteeringPolicy::default(),
        Actuator::inline(motor),
    )?;

    let cases = [
        (ball_at(60), SteeringCommand::TurnLeft, Some("ball")),
        (ball_at(160), SteeringCommand::Forward, Some("ball")),
        (ball_at(270), SteeringCommand::TurnRight, Some("ball")),
        (goal_only(), SteeringCommand::TurnRight, Some("goal")),
        (ball_and_goal(), SteeringCommand::TurnLeft, Some("ball")),
        (Frame::filled(320, 240, FLOOR), SteeringCommand::TurnLeft, None),
    ];
    for (frame, expected, driver) in cases {
        let report = control.step(frame);
        assert_eq!(report.decision.command, expected);
        assert_eq!(report.driver().map(|o| o.name.as_str()), driver);
        assert!(report.applied);
        assert_eq!(probe.pins(), DriveMode::from(expected).pattern());
    }

    control.shutdown()?;
    assert_eq!(probe.pins(), PinPattern::STOP);
    assert_eq!(probe.releases(), 1);
    Ok(())
}

#[test]
fn ball_range_estimate_is_attached() -> Result<()> {
    let (motor, _probe) = stub_motor()?;
    let ball = TrackedClass::circle(
        ColorClassSpec::new("ball", red_ranges())?,
        CircleParams::default(),
    )
    .with_range(servo_kernel::range::RangeEstimator::new(4.0, 600.0)?);
    let mut control = ControlLoop::new(
        CameraSource::replay(Vec::new()),
        Perception::new(vec![ball])?,
        SteeringPolicy::default(),
        Actuator::inline(motor),
    )?;

    let report = control.step(ball_at(160));
    let observed = report.driver().expect("ball visible");
    let distance = observed.distance.expect("range estimate");
    // 4.0 units across ~60 px at f = 600 px
    assert!((distance - 40.0).abs() < 8.0, "distance {distance}");
    Ok(())
}

#[test]
fn synthetic_arena_runs_to_frame_limit_and_cleans_up() -> Result<()> {
    let (motor, probe) = stub_motor()?;
    let camera = CameraSource::new(CameraConfig {
        url: "stub://arena".to_string(),
        width: 160,
        height: 120,
        target_fps: 0,
        max_frames: Some(30),
    })?;
    let mut control = ControlLoop::new(
        camera,
        perception()?,
        SteeringPolicy::default(),
        Actuator::inline(motor),
    )?;

    let summary = control.run()?;
    assert_eq!(summary.exit, LoopExit::EndOfStream);
    assert_eq!(summary.frames, 30);
    assert_eq!(summary.write_failures, 0);

    let legal: Vec<PinPattern> = [
        DriveMode::Stopped,
        DriveMode::Forward,
        DriveMode::TurnLeft,
        DriveMode::TurnRight,
    ]
    .iter()
    .map(|mode| mode.pattern())
    .collect();
    assert!(probe.pin_history().iter().all(|p| legal.contains(p)));
    assert_eq!(probe.pins(), PinPattern::STOP);
    assert_eq!(probe.releases(), 1);

    drop(control);
    assert_eq!(probe.releases(), 1);
    Ok(())
}

#[test]
fn periodic_actuation_stops_and_releases_on_end_of_stream() -> Result<()> {
    let (motor, probe) = stub_motor()?;
    let frames = (0..5).map(|_| ball_at(270)).collect();
    let mut control = ControlLoop::new(
        CameraSource::replay(frames),
        perception()?,
        SteeringPolicy::default(),
        Actuator::periodic(motor, Duration::from_millis(5))?,
    )?;

    let summary = control.run()?;
    assert_eq!(summary.exit, LoopExit::EndOfStream);
    assert_eq!(summary.frames, 5);
    assert_eq!(probe.pins(), PinPattern::STOP);
    assert_eq!(probe.releases(), 1);
    Ok(())
}

#[test]
fn camera_read_failure_ends_loop_and_releases_motors_once() -> Result<()> {
    let (motor, probe) = stub_motor()?;
    let mut control = ControlLoop::new(
        CameraSource::replay_results(vec![
            Ok(ball_at(270)),
            Ok(ball_at(270)),
            Err(anyhow!("v4l2 dequeue timed out")),
            Ok(ball_at(60)),
        ]),
        perception()?,
        SteeringPolicy::default(),
        Actuator::inline(motor),
    )?;

    let summary = control.run()?;
    assert_eq!(summary.exit, LoopExit::ReadFailed);
    assert_eq!(summary.frames, 2);
    assert_eq!(probe.pins(), PinPattern::STOP);
    assert_eq!(probe.releases(), 1);

    drop(control);
    assert_eq!(probe.releases(), 1);
    Ok(())
}

#[test]
fn camera_connect_failure_releases_motors() -> Result<()> {
    let (motor, probe) = stub_motor()?;
    let result = ControlLoop::new(
        CameraSource::unreachable("camera unplugged"),
        perception()?,
        SteeringPolicy::default(),
        Actuator::inline(motor),
    );

    let err = match result {
        Ok(_) => panic!("connect should fail"),
        Err(err) => err,
    };
    assert!(format!("{:#}", err).contains("camera unplugged"));
    assert_eq!(probe.pins(), PinPattern::STOP);
    assert_eq!(probe.releases(), 1);
    Ok(())
}

#[test]
fn camera_connect_failure_joins_periodic_actuator() -> Result<()> {
    let (motor, probe) = stub_motor()?;
    let result = ControlLoop::new(
        CameraSource::unreachable("camera unplugged"),
        perception()?,
        SteeringPolicy::default(),
        Actuator::periodic(motor, Duration::from_millis(5))?,
    );
    assert!(result.is_err());
    assert_eq!(probe.releases(), 1);
    Ok(())
}

#[test]
fn unknown_camera_url_is_rejected() {
    let result = CameraSource::new(CameraConfig {
        url: "ftp://nowhere".to_string(),
        ..CameraConfig::default()
    });
    assert!(result.is_err());
}
