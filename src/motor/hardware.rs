use anyhow::Result;

/// Levels of the four direction lines of a dual H-bridge.
///
/// `in1`/`in2` drive the right motor forward/backward, `in3`/`in4` the left motor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PinPattern {
    pub in1: bool,
    pub in2: bool,
    pub in3: bool,
    pub in4: bool,
}

/// Direction of one motor as implied by its two direction lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotorDirection {
    Forward,
    Backward,
    Off,
}

impl PinPattern {
    /// All lines deasserted.
    pub const STOP: PinPattern = PinPattern::new(false, false, false, false);

    pub const fn new(in1: bool, in2: bool, in3: bool, in4: bool) -> Self {
        Self { in1, in2, in3, in4 }
    }

    pub fn levels(&self) -> [bool; 4] {
        [self.in1, self.in2, self.in3, self.in4]
    }

    pub fn is_stopped(&self) -> bool {
        *self == Self::STOP
    }

    pub fn right(&self) -> MotorDirection {
        direction(self.in1, self.in2)
    }

    pub fn left(&self) -> MotorDirection {
        direction(self.in3, self.in4)
    }
}

fn direction(forward: bool, backward: bool) -> MotorDirection {
    match (forward, backward) {
        (true, false) => MotorDirection::Forward,
        (false, true) => MotorDirection::Backward,
        // both low coasts, both high brakes; neither drives the wheel
        _ => MotorDirection::Off,
    }
}

/// Physical motor interface: four direction lines and one PWM duty channel.
///
/// Only the actuation state machine talks to this trait. Implementations must
/// make `release` safe to call more than once.
pub trait MotorHardware: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Drive all four direction lines to `pattern`.
    fn write_pins(&mut self, pattern: PinPattern) -> Result<()>;

    /// Set the shared enable/PWM duty cycle, in percent (0..=100).
    fn set_duty_cycle(&mut self, percent: u8) -> Result<()>;

    /// Deassert every line and hand the hardware back to the system.
    fn release(&mut self) -> Result<()>;
}
