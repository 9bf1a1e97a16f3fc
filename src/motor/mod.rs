//! Motor actuation state machine.
//!
//! Every drive mode maps to exactly one pin pattern regardless of the current
//! state. The only history kept is the last directed heading, used by `run` to
//! resume forward or backward travel. Speed changes touch the duty cycle only.
//!
//! `MotorController` is the single owner of the hardware handle. `shutdown`
//! stops the rig and releases the hardware once; later calls and `Drop` are
//! no-ops.

use std::fmt;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::steer::SteeringCommand;

pub mod hardware;
pub mod manual;
pub mod stub;
pub mod sysfs;

pub use hardware::{MotorDirection, MotorHardware, PinPattern};
pub use manual::ManualCommand;
pub use stub::{HardwareEvent, StubMotorHardware, StubProbe};
pub use sysfs::{MotorPins, SysfsMotorHardware, SysfsSettings};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl SpeedLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedLevel::Low => "low",
            SpeedLevel::Medium => "medium",
            SpeedLevel::High => "high",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(anyhow!("unknown speed level '{}'", other)),
        }
    }
}

impl fmt::Display for SpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duty cycle, in percent, for each speed level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DutyCycles {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl Default for DutyCycles {
    fn default() -> Self {
        Self {
            low: 25,
            medium: 50,
            high: 75,
        }
    }
}

impl DutyCycles {
    pub fn for_level(&self, level: SpeedLevel) -> u8 {
        match level {
            SpeedLevel::Low => self.low,
            SpeedLevel::Medium => self.medium,
            SpeedLevel::High => self.high,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, duty) in [("low", self.low), ("medium", self.medium), ("high", self.high)] {
            if duty > 100 {
                return Err(anyhow!("{} duty cycle {}% exceeds 100%", name, duty));
            }
        }
        Ok(())
    }
}

/// Direction state of the rig.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DriveMode {
    #[default]
    Stopped,
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    BackLeft,
    BackRight,
}

/// Straight-line direction that `run` resumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Heading {
    #[default]
    Forward,
    Backward,
}

impl Heading {
    fn mode(self) -> DriveMode {
        match self {
            Heading::Forward => DriveMode::Forward,
            Heading::Backward => DriveMode::Backward,
        }
    }
}

impl DriveMode {
    /// Direction-line levels; `in1`/`in2` right motor, `in3`/`in4` left motor.
    pub fn pattern(self) -> PinPattern {
        match self {
            DriveMode::Stopped => PinPattern::STOP,
            DriveMode::Forward => PinPattern::new(true, false, true, false),
            DriveMode::Backward => PinPattern::new(false, true, false, true),
            DriveMode::TurnLeft => PinPattern::new(true, false, false, false),
            DriveMode::TurnRight => PinPattern::new(false, false, true, false),
            DriveMode::BackLeft => PinPattern::new(false, false, false, true),
            DriveMode::BackRight => PinPattern::new(false, true, false, false),
        }
    }

    /// Heading recorded when this mode is entered; `None` for stop.
    pub fn heading(self) -> Option<Heading> {
        match self {
            DriveMode::Stopped => None,
            DriveMode::Forward | DriveMode::TurnLeft | DriveMode::TurnRight => {
                Some(Heading::Forward)
            }
            DriveMode::Backward | DriveMode::BackLeft | DriveMode::BackRight => {
                Some(Heading::Backward)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DriveMode::Stopped => "stopped",
            DriveMode::Forward => "forward",
            DriveMode::Backward => "backward",
            DriveMode::TurnLeft => "turn_left",
            DriveMode::TurnRight => "turn_right",
            DriveMode::BackLeft => "back_left",
            DriveMode::BackRight => "back_right",
        }
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SteeringCommand> for DriveMode {
    fn from(command: SteeringCommand) -> Self {
        match command {
            SteeringCommand::Forward => DriveMode::Forward,
            SteeringCommand::TurnLeft => DriveMode::TurnLeft,
            SteeringCommand::TurnRight => DriveMode::TurnRight,
            SteeringCommand::Backward => DriveMode::Backward,
            SteeringCommand::Stop => DriveMode::Stopped,
        }
    }
}

/// Logical state of the two-motor rig.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MotorDriveState {
    pub mode: DriveMode,
    pub speed: SpeedLevel,
}

impl MotorDriveState {
    pub fn right(&self) -> MotorDirection {
        self.mode.pattern().right()
    }

    pub fn left(&self) -> MotorDirection {
        self.mode.pattern().left()
    }
}

impl fmt::Display for MotorDriveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.mode, self.speed)
    }
}

pub struct MotorController {
    hardware: Box<dyn MotorHardware>,
    duty: DutyCycles,
    state: MotorDriveState,
    heading: Heading,
    released: bool,
}

impl MotorController {
    /// Take ownership of the hardware, drive it to Stopped at `initial_speed`.
    pub fn new(
        hardware: Box<dyn MotorHardware>,
        duty: DutyCycles,
        initial_speed: SpeedLevel,
    ) -> Result<Self> {
        duty.validate()?;
        let mut controller = Self {
            hardware,
            duty,
            state: MotorDriveState {
                mode: DriveMode::Stopped,
                speed: initial_speed,
            },
            heading: Heading::Forward,
            released: false,
        };
        let armed = controller
            .hardware
            .write_pins(PinPattern::STOP)
            .and_then(|_| controller.hardware.set_duty_cycle(duty.for_level(initial_speed)));
        if let Err(err) = armed {
            if let Err(release_err) = controller.shutdown() {
                log::error!("MotorController: release after failed arm: {:#}", release_err);
            }
            return Err(err.context("arm motor hardware"));
        }
        log::info!(
            "MotorController: armed {} backend at {} speed ({}%)",
            controller.hardware.name(),
            initial_speed,
            duty.for_level(initial_speed)
        );
        Ok(controller)
    }

    pub fn state(&self) -> MotorDriveState {
        self.state
    }

    pub fn heading(&self) -> Heading {
        self.heading
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn backend_name(&self) -> &'static str {
        self.hardware.name()
    }

    /// Apply a steering command.
    pub fn apply(&mut self, command: SteeringCommand) -> Result<()> {
        self.drive(DriveMode::from(command))
    }

    /// Write the pattern for `mode`. State only changes once the write lands.
    pub fn drive(&mut self, mode: DriveMode) -> Result<()> {
        if self.released {
            return Err(anyhow!("motor hardware already released"));
        }
        self.hardware
            .write_pins(mode.pattern())
            .with_context(|| format!("drive {}", mode))?;
        if mode != self.state.mode {
            log::debug!("MotorController: {} -> {}", self.state.mode, mode);
        }
        self.state.mode = mode;
        if let Some(heading) = mode.heading() {
            self.heading = heading;
        }
        Ok(())
    }

    /// Resume straight travel along the last heading.
    pub fn run(&mut self) -> Result<()> {
        self.drive(self.heading.mode())
    }

    pub fn set_speed(&mut self, level: SpeedLevel) -> Result<()> {
        if self.released {
            return Err(anyhow!("motor hardware already released"));
        }
        let duty = self.duty.for_level(level);
        self.hardware
            .set_duty_cycle(duty)
            .with_context(|| format!("set speed {} ({}%)", level, duty))?;
        self.state.speed = level;
        Ok(())
    }

    pub fn execute(&mut self, command: ManualCommand) -> Result<()> {
        match command {
            ManualCommand::Run => self.run(),
            ManualCommand::Stop => self.drive(DriveMode::Stopped),
            ManualCommand::Drive(mode) => self.drive(mode),
            ManualCommand::Speed(level) => self.set_speed(level),
            ManualCommand::Exit => self.shutdown(),
        }
    }

    /// Stop the motors and release the hardware. Only the first call acts.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let stopped = self.hardware.write_pins(PinPattern::STOP).context("stop motors");
        // release runs even when the stop write failed
        let released = self.hardware.release().context("release motor hardware");
        self.state.mode = DriveMode::Stopped;
        log::info!("MotorController: {} backend stopped and released", self.hardware.name());
        stopped.and(released)
    }
}

impl Drop for MotorController {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("MotorController: shutdown on drop failed: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> Result<(MotorController, StubProbe)> {
        let hw = StubMotorHardware::new();
        let probe = hw.probe();
        let controller = MotorController::new(Box::new(hw), DutyCycles::default(), SpeedLevel::Medium)?;
        Ok((controller, probe))
    }

    #[test]
    fn arms_stopped_at_medium() -> Result<()> {
        let (controller, probe) = controller()?;
        assert_eq!(controller.state().mode, DriveMode::Stopped);
        assert_eq!(probe.pins(), PinPattern::STOP);
        assert_eq!(probe.duty(), 50);
        Ok(())
    }

    #[test]
    fn left_stop_right_patterns() -> Result<()> {
        let (mut controller, probe) = controller()?;
        controller.apply(SteeringCommand::TurnLeft)?;
        controller.apply(SteeringCommand::Stop)?;
        controller.apply(SteeringCommand::TurnRight)?;

        let history = probe.pin_history();
        let tail = &history[history.len() - 3..];
        assert_eq!(tail[0], PinPattern::new(true, false, false, false));
        assert_eq!(tail[1], PinPattern::STOP);
        assert_eq!(tail[2], PinPattern::new(false, false, true, false));
        assert_ne!(tail[0], tail[2]);

        assert_eq!(tail[0].right(), MotorDirection::Forward);
        assert_eq!(tail[0].left(), MotorDirection::Off);
        assert_eq!(tail[2].right(), MotorDirection::Off);
        assert_eq!(tail[2].left(), MotorDirection::Forward);
        Ok(())
    }

    #[test]
    fn steering_commands_map_to_distinct_patterns() {
        let patterns: Vec<PinPattern> = [
            SteeringCommand::Forward,
            SteeringCommand::TurnLeft,
            SteeringCommand::TurnRight,
            SteeringCommand::Backward,
            SteeringCommand::Stop,
        ]
        .into_iter()
        .map(|command| DriveMode::from(command).pattern())
        .collect();
        for (i, a) in patterns.iter().enumerate() {
            for b in &patterns[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(DriveMode::from(SteeringCommand::Stop).pattern().is_stopped());
        assert_eq!(DriveMode::Forward.pattern().right(), MotorDirection::Forward);
        assert_eq!(DriveMode::Backward.pattern().left(), MotorDirection::Backward);
        assert_eq!(DriveMode::BackLeft.pattern(), PinPattern::new(false, false, false, true));
        assert_eq!(DriveMode::BackRight.pattern(), PinPattern::new(false, true, false, false));
    }

    #[test]
    fn shutdown_twice_releases_once() -> Result<()> {
        let (mut controller, probe) = controller()?;
        controller.apply(SteeringCommand::Forward)?;
        controller.shutdown()?;
        controller.shutdown()?;
        assert_eq!(probe.releases(), 1);
        assert_eq!(probe.pins(), PinPattern::STOP);
        assert!(controller.is_released());
        assert!(controller.apply(SteeringCommand::Forward).is_err());

        drop(controller);
        assert_eq!(probe.releases(), 1);
        Ok(())
    }

    #[test]
    fn drop_releases_hardware() -> Result<()> {
        let (controller, probe) = controller()?;
        drop(controller);
        assert_eq!(probe.releases(), 1);
        Ok(())
    }

    #[test]
    fn shutdown_releases_even_when_stop_write_fails() -> Result<()> {
        let (mut controller, probe) = controller()?;
        probe.fail_writes(true);
        assert!(controller.shutdown().is_err());
        assert_eq!(probe.releases(), 1);
        assert!(controller.shutdown().is_ok());
        assert_eq!(probe.releases(), 1);
        Ok(())
    }

    #[test]
    fn failed_write_keeps_previous_state() -> Result<()> {
        let (mut controller, probe) = controller()?;
        controller.apply(SteeringCommand::Forward)?;
        probe.fail_writes(true);
        assert!(controller.apply(SteeringCommand::TurnLeft).is_err());
        assert_eq!(controller.state().mode, DriveMode::Forward);
        Ok(())
    }

    #[test]
    fn run_resumes_last_heading() -> Result<()> {
        let (mut controller, probe) = controller()?;
        controller.run()?;
        assert_eq!(controller.state().mode, DriveMode::Forward);

        controller.drive(DriveMode::BackLeft)?;
        controller.drive(DriveMode::Stopped)?;
        controller.run()?;
        assert_eq!(controller.state().mode, DriveMode::Backward);
        assert_eq!(probe.pins(), DriveMode::Backward.pattern());

        controller.drive(DriveMode::TurnRight)?;
        controller.execute(ManualCommand::Stop)?;
        controller.execute(ManualCommand::Run)?;
        assert_eq!(controller.state().mode, DriveMode::Forward);
        Ok(())
    }

    #[test]
    fn speed_changes_leave_pins_alone() -> Result<()> {
        let (mut controller, probe) = controller()?;
        controller.apply(SteeringCommand::TurnRight)?;
        let before = probe.pin_history().len();
        controller.set_speed(SpeedLevel::High)?;
        assert_eq!(probe.duty(), 75);
        controller.execute(ManualCommand::Speed(SpeedLevel::Low))?;
        assert_eq!(probe.duty(), 25);
        assert_eq!(probe.pin_history().len(), before);
        assert_eq!(controller.state().mode, DriveMode::TurnRight);
        assert_eq!(controller.state().speed, SpeedLevel::Low);
        Ok(())
    }

    #[test]
    fn rejects_duty_above_full() {
        let duty = DutyCycles {
            high: 120,
            ..DutyCycles::default()
        };
        let hw = StubMotorHardware::new();
        assert!(MotorController::new(Box::new(hw), duty, SpeedLevel::Medium).is_err());
    }

    #[test]
    fn failed_arm_still_releases() {
        let hw = StubMotorHardware::new();
        let probe = hw.probe();
        probe.fail_writes(true);
        assert!(
            MotorController::new(Box::new(hw), DutyCycles::default(), SpeedLevel::Medium).is_err()
        );
        assert_eq!(probe.releases(), 1);
    }
}
