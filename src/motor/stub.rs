use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::hardware::{MotorHardware, PinPattern};

/// One recorded write to the stub hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HardwareEvent {
    Pins(PinPattern),
    Duty(u8),
    Released,
}

#[derive(Debug, Default)]
struct ProbeState {
    events: Vec<HardwareEvent>,
    pins: PinPattern,
    duty: u8,
    releases: u32,
    fail_writes: bool,
}

/// Read side of a `StubMotorHardware`, kept by tests and dry runs after the
/// hardware itself has been moved into a controller.
#[derive(Clone, Debug, Default)]
pub struct StubProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl StubProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every write in order.
    pub fn events(&self) -> Vec<HardwareEvent> {
        self.lock().events.clone()
    }

    /// Pin writes only, in order.
    pub fn pin_history(&self) -> Vec<PinPattern> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                HardwareEvent::Pins(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    /// Current line levels.
    pub fn pins(&self) -> PinPattern {
        self.lock().pins
    }

    /// Current duty cycle in percent.
    pub fn duty(&self) -> u8 {
        self.lock().duty
    }

    /// How many times `release` reached the hardware.
    pub fn releases(&self) -> u32 {
        self.lock().releases
    }

    /// Make subsequent pin writes fail, to exercise fault paths.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

/// In-memory motor backend. Records writes instead of touching GPIO.
#[derive(Debug, Default)]
pub struct StubMotorHardware {
    probe: StubProbe,
}

impl StubMotorHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> StubProbe {
        self.probe.clone()
    }
}

impl MotorHardware for StubMotorHardware {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn write_pins(&mut self, pattern: PinPattern) -> Result<()> {
        let mut state = self.probe.lock();
        if state.fail_writes {
            return Err(anyhow!("stub motor: injected pin write failure"));
        }
        state.pins = pattern;
        state.events.push(HardwareEvent::Pins(pattern));
        Ok(())
    }

    fn set_duty_cycle(&mut self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(anyhow!("duty cycle {}% out of range", percent));
        }
        let mut state = self.probe.lock();
        state.duty = percent;
        state.events.push(HardwareEvent::Duty(percent));
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut state = self.probe.lock();
        state.pins = PinPattern::STOP;
        state.duty = 0;
        state.releases += 1;
        state.events.push(HardwareEvent::Released);
        Ok(())
    }
}
