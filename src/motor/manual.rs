use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error, Result};

use super::{DriveMode, SpeedLevel};

/// Operator command from the motor console.
///
/// `fl` is `TurnLeft` (right motor forward only, HLLL) and `fr` is `TurnRight`
/// (left motor forward only, LLHL), the same patterns the control loop uses
/// when it steers. Older rigs wired these two keys the other way round, so
/// `fl`/`fr` there are swapped relative to this console.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManualCommand {
    /// Resume the last heading.
    Run,
    Stop,
    Drive(DriveMode),
    Speed(SpeedLevel),
    Exit,
}

impl FromStr for ManualCommand {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let cmd = match input.trim().to_ascii_lowercase().as_str() {
            "r" => ManualCommand::Run,
            "s" => ManualCommand::Stop,
            "f" => ManualCommand::Drive(DriveMode::Forward),
            "b" => ManualCommand::Drive(DriveMode::Backward),
            "fl" => ManualCommand::Drive(DriveMode::TurnLeft),
            "fr" => ManualCommand::Drive(DriveMode::TurnRight),
            "bl" => ManualCommand::Drive(DriveMode::BackLeft),
            "br" => ManualCommand::Drive(DriveMode::BackRight),
            "l" => ManualCommand::Speed(SpeedLevel::Low),
            "m" => ManualCommand::Speed(SpeedLevel::Medium),
            "h" => ManualCommand::Speed(SpeedLevel::High),
            "e" => ManualCommand::Exit,
            "" => return Err(anyhow!("empty command")),
            other => return Err(anyhow!("unknown command '{}'", other)),
        };
        Ok(cmd)
    }
}

impl fmt::Display for ManualCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualCommand::Run => f.write_str("run"),
            ManualCommand::Stop => f.write_str("stop"),
            ManualCommand::Drive(mode) => write!(f, "drive {}", mode),
            ManualCommand::Speed(level) => write!(f, "speed {}", level),
            ManualCommand::Exit => f.write_str("exit"),
        }
    }
}

/// Console help text, one command per line.
pub const USAGE: &str = "\
r  run (resume last heading)
s  stop
f  forward        b  backward
fl forward-left   fr forward-right
bl backward-left  br backward-right
l  low speed      m  medium speed     h  high speed
e  exit";
