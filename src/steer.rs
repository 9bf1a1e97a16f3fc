//! Steering policy: detection position -> discrete command.
//!
//! The horizontal axis is split into three contiguous zones by a fixed pixel
//! tolerance `tau` around `center_x = width / 2`:
//!
//! ```text
//!   offset < -tau         -> TurnLeft
//!   -tau <= offset <= tau -> Forward
//!   offset > tau          -> TurnRight
//!   no valid detection    -> configured absent-target command (TurnLeft by default)
//! ```

use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::Detection;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringCommand {
    Forward,
    TurnLeft,
    TurnRight,
    Backward,
    #[default]
    Stop,
}

impl SteeringCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SteeringCommand::Forward => "forward",
            SteeringCommand::TurnLeft => "turn_left",
            SteeringCommand::TurnRight => "turn_right",
            SteeringCommand::Backward => "backward",
            SteeringCommand::Stop => "stop",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "turn_left" | "left" => Ok(Self::TurnLeft),
            "turn_right" | "right" => Ok(Self::TurnRight),
            "backward" => Ok(Self::Backward),
            "stop" => Ok(Self::Stop),
            other => Err(anyhow!("unknown steering command '{}'", other)),
        }
    }
}

impl fmt::Display for SteeringCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of arbitrating between several classes' detections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub command: SteeringCommand,
    /// Index (in priority order) of the detection that drove the command, if any.
    pub driver: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SteeringPolicy {
    tolerance_px: i32,
    absent: SteeringCommand,
}

impl Default for SteeringPolicy {
    fn default() -> Self {
        Self {
            tolerance_px: 15,
            absent: SteeringCommand::TurnLeft,
        }
    }
}

impl SteeringPolicy {
    pub fn new(tolerance_px: i32, absent: SteeringCommand) -> Result<Self> {
        if tolerance_px < 0 {
            return Err(anyhow!(
                "steering tolerance must be non-negative (got {})",
                tolerance_px
            ));
        }
        Ok(Self {
            tolerance_px,
            absent,
        })
    }

    pub fn tolerance_px(&self) -> i32 {
        self.tolerance_px
    }

    pub fn absent_command(&self) -> SteeringCommand {
        self.absent
    }

    /// Command for a single detection relative to an explicit frame centre.
    pub fn decide_about(&self, center_x: i32, detection: &Detection) -> SteeringCommand {
        if !detection.valid {
            return self.absent;
        }
        let offset = detection.x - center_x;
        if offset < -self.tolerance_px {
            SteeringCommand::TurnLeft
        } else if offset > self.tolerance_px {
            SteeringCommand::TurnRight
        } else {
            SteeringCommand::Forward
        }
    }

    /// Command for a single detection in a frame of `frame_width` pixels.
    pub fn decide(&self, frame_width: u32, detection: &Detection) -> SteeringCommand {
        self.decide_about(center_of(frame_width), detection)
    }

    /// Highest-priority valid detection drives the command; `prioritized` is
    /// ordered most important first. No valid detection -> absent command.
    pub fn arbitrate<'a, I>(&self, frame_width: u32, prioritized: I) -> Decision
    where
        I: IntoIterator<Item = &'a Detection>,
    {
        prioritized
            .into_iter()
            .enumerate()
            .find(|(_, detection)| detection.valid)
            .map(|(index, detection)| Decision {
                command: self.decide(frame_width, detection),
                driver: Some(index),
            })
            .unwrap_or(Decision {
                command: self.absent,
                driver: None,
            })
    }
}

/// Horizontal frame centre, `width / 2` rounded down.
pub fn center_of(frame_width: u32) -> i32 {
    (frame_width / 2) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: i32) -> Detection {
        Detection::circle(x, 240, 30.0)
    }

    #[test]
    fn three_zones_around_center() {
        let policy = SteeringPolicy::default();
        assert_eq!(policy.decide(640, &at(300)), SteeringCommand::TurnLeft);
        assert_eq!(policy.decide(640, &at(340)), SteeringCommand::TurnRight);
        assert_eq!(policy.decide(640, &at(320)), SteeringCommand::Forward);
        assert_eq!(policy.decide(640, &Detection::absent()), SteeringCommand::TurnLeft);
    }

    #[test]
    fn tolerance_edges_are_centered() {
        let policy = SteeringPolicy::default();
        assert_eq!(policy.decide(640, &at(305)), SteeringCommand::Forward);
        assert_eq!(policy.decide(640, &at(335)), SteeringCommand::Forward);
        assert_eq!(policy.decide(640, &at(304)), SteeringCommand::TurnLeft);
        assert_eq!(policy.decide(640, &at(336)), SteeringCommand::TurnRight);
    }

    #[test]
    fn absent_command_is_configurable() -> Result<()> {
        let policy = SteeringPolicy::new(15, SteeringCommand::Stop)?;
        assert_eq!(policy.decide(640, &Detection::absent()), SteeringCommand::Stop);
        Ok(())
    }

    #[test]
    fn priority_picks_first_valid_detection() {
        let policy = SteeringPolicy::default();
        let ball = Detection::absent();
        let goal = at(600);
        let decision = policy.arbitrate(640, [&ball, &goal]);
        assert_eq!(decision.command, SteeringCommand::TurnRight);
        assert_eq!(decision.driver, Some(1));

        let ball = at(10);
        let decision = policy.arbitrate(640, [&ball, &goal]);
        assert_eq!(decision.command, SteeringCommand::TurnLeft);
        assert_eq!(decision.driver, Some(0));

        let none = Detection::absent();
        let decision = policy.arbitrate(640, [&none, &none]);
        assert_eq!(decision, Decision { command: SteeringCommand::TurnLeft, driver: None });
    }

    #[test]
    fn parses_config_names() -> Result<()> {
        assert_eq!(SteeringCommand::parse("turn_left")?, SteeringCommand::TurnLeft);
        assert_eq!(SteeringCommand::parse(" Stop ")?, SteeringCommand::Stop);
        assert!(SteeringCommand::parse("sideways").is_err());
        assert!(SteeringPolicy::new(-1, SteeringCommand::Stop).is_err());
        Ok(())
    }
}
