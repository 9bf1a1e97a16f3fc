//! Control loop: one frame in, one steering command out, until cancelled.
//!
//! Each cycle acquires a frame, observes every tracked class in priority order,
//! lets the highest-priority valid detection pick the command, and hands it to the
//! actuator. Cancellation is checked at the top of each cycle only.
//!
//! Every exit route (cancel, end of stream, read failure, an error out of `run`,
//! or dropping the loop) goes through `shutdown`, which stops the motors and
//! releases the motor hardware and the camera exactly once.

mod actuator;
mod perception;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::config::ServoConfig;
use crate::frame::Frame;
use crate::ingest::CameraSource;
use crate::overlay::{self, SnapshotSink};
use crate::steer::{Decision, SteeringPolicy};

pub use actuator::{Actuator, CommandSlot};
pub use perception::{ClassObservation, Perception, TrackedClass};

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub sequence: u64,
    pub frame_width: u32,
    /// One entry per tracked class, in priority order.
    pub observations: Vec<ClassObservation>,
    pub decision: Decision,
    /// False when the hardware rejected the command.
    pub applied: bool,
}

impl CycleReport {
    /// Observation that drove the command, if any.
    pub fn driver(&self) -> Option<&ClassObservation> {
        self.decision.driver.and_then(|i| self.observations.get(i))
    }
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    EndOfStream,
    ReadFailed,
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopExit::Cancelled => "cancelled",
            LoopExit::EndOfStream => "end of stream",
            LoopExit::ReadFailed => "frame read failed",
        })
    }
}

#[derive(Clone, Debug)]
pub struct LoopSummary {
    pub exit: LoopExit,
    pub frames: u64,
    pub write_failures: u64,
    pub elapsed: Duration,
}

pub struct ControlLoop {
    camera: CameraSource,
    perception: Perception,
    policy: SteeringPolicy,
    actuator: Actuator,
    snapshots: Option<SnapshotSink>,
    cancel: Arc<AtomicBool>,
    frames: u64,
    shut_down: bool,
}

impl ControlLoop {
    /// Connect the camera. Failure here is fatal and still releases the motors.
    pub fn new(
        mut camera: CameraSource,
        perception: Perception,
        policy: SteeringPolicy,
        mut actuator: Actuator,
    ) -> Result<Self> {
        if let Err(err) = camera.connect() {
            camera.release();
            if let Err(cleanup) = actuator.shutdown() {
                log::error!("control: motor cleanup after camera failure: {:#}", cleanup);
            }
            return Err(err.context("open camera"));
        }
        Ok(Self {
            camera,
            perception,
            policy,
            actuator,
            snapshots: None,
            cancel: Arc::new(AtomicBool::new(false)),
            frames: 0,
            shut_down: false,
        })
    }

    /// Build camera, perception, policy and motor backend from configuration.
    pub fn from_config(cfg: &ServoConfig) -> Result<Self> {
        let perception = cfg.perception()?;
        let policy = cfg.steering_policy()?;
        let snapshots = match &cfg.overlay.snapshot_dir {
            Some(dir) => Some(SnapshotSink::new(dir, cfg.overlay.snapshot_every)?),
            None => None,
        };
        let camera = CameraSource::new(cfg.camera.clone())?;
        let motor = cfg.motor_controller()?;
        let actuator = match cfg.actuation_period {
            Some(period) => Actuator::periodic(motor, period)?,
            None => Actuator::inline(motor),
        };
        let mut control = Self::new(camera, perception, policy, actuator)?;
        control.snapshots = snapshots;
        log::info!(
            "control: tracking [{}], tolerance {}px, absent -> {}, actuation {}",
            control
                .perception
                .classes()
                .iter()
                .map(|c| format!("{} ({})", c.name(), c.strategy()))
                .collect::<Vec<_>>()
                .join(", "),
            control.policy.tolerance_px(),
            control.policy.absent_command(),
            control.actuator.mode_name()
        );
        Ok(control)
    }

    pub fn with_snapshots(mut self, sink: SnapshotSink) -> Self {
        self.snapshots = Some(sink);
        self
    }

    /// Use an externally owned cancellation flag (e.g. set by a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn policy(&self) -> &SteeringPolicy {
        &self.policy
    }

    /// Run one cycle on `frame`.
    pub fn step(&mut self, mut frame: Frame) -> CycleReport {
        self.frames += 1;
        let observations = self.perception.observe(&frame);
        let decision = self
            .policy
            .arbitrate(frame.width, observations.iter().map(|o| &o.detection));

        let applied = match self.actuator.submit(decision.command) {
            Ok(()) => true,
            Err(err) => {
                log::error!("control: frame {}: {:#}", frame.sequence, err);
                false
            }
        };

        let report = CycleReport {
            sequence: frame.sequence,
            frame_width: frame.width,
            observations,
            decision,
            applied,
        };

        match report.driver() {
            Some(obs) => log::debug!(
                "frame {}: {} at ({}, {}){} -> {}",
                report.sequence,
                obs.name,
                obs.detection.x,
                obs.detection.y,
                obs.distance
                    .map(|d| format!(" ~{:.1}", d))
                    .unwrap_or_default(),
                decision.command
            ),
            None => log::debug!(
                "frame {}: no target -> {}",
                report.sequence,
                decision.command
            ),
        }

        if let Some(sink) = self.snapshots.as_mut() {
            overlay::annotate(&mut frame, &report, self.policy.tolerance_px());
            if let Err(err) = sink.offer(&frame) {
                log::warn!("control: snapshot failed: {:#}", err);
            }
        }
        report
    }

    /// Run until cancelled or the camera stops delivering, then clean up.
    pub fn run(&mut self) -> Result<LoopSummary> {
        let started = Instant::now();
        let mut last_health = started;
        let mut frames_at_health = self.frames;
        let first_frame = self.frames;

        let exit = loop {
            if self.cancel.load(Ordering::SeqCst) {
                break LoopExit::Cancelled;
            }
            match self.camera.next_frame() {
                Ok(Some(frame)) => {
                    self.step(frame);
                }
                Ok(None) => break LoopExit::EndOfStream,
                Err(err) => {
                    log::warn!("control: camera read failed: {:#}", err);
                    break LoopExit::ReadFailed;
                }
            }

            let since = last_health.elapsed();
            if since >= HEALTH_INTERVAL {
                let fps = (self.frames - frames_at_health) as f64 / since.as_secs_f64();
                log::info!(
                    "health: {} frames, {:.1} fps, drive {}, camera {}, {} write failure(s)",
                    self.frames,
                    fps,
                    self.actuator.state(),
                    if self.camera.is_healthy() { "ok" } else { "degraded" },
                    self.actuator.write_failures()
                );
                last_health = Instant::now();
                frames_at_health = self.frames;
            }
        };

        let summary = LoopSummary {
            exit,
            frames: self.frames - first_frame,
            write_failures: self.actuator.write_failures(),
            elapsed: started.elapsed(),
        };
        log::info!(
            "control: loop ended ({}) after {} frame(s) in {:.1}s",
            summary.exit,
            summary.frames,
            summary.elapsed.as_secs_f64()
        );
        self.shutdown().context("cleanup after control loop")?;
        Ok(summary)
    }

    /// Stop motors, release hardware and camera. Only the first call acts.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        let motors = self.actuator.shutdown();
        self.camera.release();
        motors
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("control: cleanup on drop failed: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BlobParams, CircleParams};
    use crate::motor::{DutyCycles, MotorController, SpeedLevel, StubMotorHardware, StubProbe};
    use crate::segment::{pink_ranges, red_ranges, ColorClassSpec};
    use crate::steer::SteeringCommand;

    fn perception() -> Result<Perception> {
        Perception::new(vec![
            TrackedClass::circle(ColorClassSpec::new("ball", red_ranges())?, CircleParams::default()),
            TrackedClass::blob(ColorClassSpec::new("goal", pink_ranges())?, BlobParams::default()),
        ])
    }

    fn control(frames: Vec<Frame>) -> Result<(ControlLoop, StubProbe)> {
        let hw = StubMotorHardware::new();
        let probe = hw.probe();
        let motor = MotorController::new(Box::new(hw), DutyCycles::default(), SpeedLevel::Medium)?;
        let control = ControlLoop::new(
            CameraSource::replay(frames),
            perception()?,
            SteeringPolicy::default(),
            Actuator::inline(motor),
        )?;
        Ok((control, probe))
    }

    fn ball_at(x: i64) -> Frame {
        let mut frame = Frame::filled(320, 240, [40, 40, 40]);
        frame.fill_disk(x, 120, 30, [30, 30, 220]);
        frame
    }

    #[test]
    fn ball_left_of_center_turns_left() -> Result<()> {
        let (mut control, probe) = control(Vec::new())?;
        let report = control.step(ball_at(80));
        assert_eq!(report.decision.command, SteeringCommand::TurnLeft);
        assert_eq!(report.driver().map(|o| o.name.as_str()), Some("ball"));
        assert!(report.applied);
        assert_eq!(probe.pins(), crate::motor::DriveMode::TurnLeft.pattern());
        Ok(())
    }

    #[test]
    fn empty_frame_uses_absent_command() -> Result<()> {
        let (mut control, _probe) = control(Vec::new())?;
        let report = control.step(Frame::filled(320, 240, [40, 40, 40]));
        assert_eq!(report.decision.command, SteeringCommand::TurnLeft);
        assert!(report.driver().is_none());
        assert!(report.observations.iter().all(|o| !o.detection.valid));
        Ok(())
    }

    #[test]
    fn write_failure_is_reported_not_fatal() -> Result<()> {
        let (mut control, probe) = control(vec![ball_at(160), ball_at(160)])?;
        probe.fail_writes(true);
        let report = control.step(ball_at(160));
        assert!(!report.applied);
        probe.fail_writes(false);
        let summary = control.run()?;
        assert_eq!(summary.exit, LoopExit::EndOfStream);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.write_failures, 1);
        assert_eq!(probe.releases(), 1);
        Ok(())
    }

    #[test]
    fn cancel_before_first_frame_still_cleans_up() -> Result<()> {
        let (mut control, probe) = control(vec![ball_at(160)])?;
        control.cancel_flag().store(true, Ordering::SeqCst);
        let summary = control.run()?;
        assert_eq!(summary.exit, LoopExit::Cancelled);
        assert_eq!(summary.frames, 0);
        assert_eq!(probe.releases(), 1);
        control.shutdown()?;
        drop(control);
        assert_eq!(probe.releases(), 1);
        Ok(())
    }
}
