//! Command dispatch to the motor state machine.
//!
//! `Inline` applies each frame's command on the perception thread. `Periodic`
//! moves the `MotorController` onto its own thread, which re-applies whatever is
//! in the `CommandSlot` once per period, so a stalled camera no longer stalls
//! actuation. Either way exactly one actor owns the controller.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::motor::{MotorController, MotorDriveState};
use crate::steer::SteeringCommand;

/// Single always-readable "last command" register.
#[derive(Debug)]
pub struct CommandSlot {
    value: AtomicU8,
}

impl CommandSlot {
    pub fn new(initial: SteeringCommand) -> Self {
        Self {
            value: AtomicU8::new(encode(initial)),
        }
    }

    pub fn publish(&self, command: SteeringCommand) {
        self.value.store(encode(command), Ordering::Release);
    }

    pub fn latest(&self) -> SteeringCommand {
        decode(self.value.load(Ordering::Acquire))
    }
}

fn encode(command: SteeringCommand) -> u8 {
    match command {
        SteeringCommand::Stop => 0,
        SteeringCommand::Forward => 1,
        SteeringCommand::TurnLeft => 2,
        SteeringCommand::TurnRight => 3,
        SteeringCommand::Backward => 4,
    }
}

fn decode(value: u8) -> SteeringCommand {
    match value {
        1 => SteeringCommand::Forward,
        2 => SteeringCommand::TurnLeft,
        3 => SteeringCommand::TurnRight,
        4 => SteeringCommand::Backward,
        _ => SteeringCommand::Stop,
    }
}

pub enum Actuator {
    Inline(InlineActuator),
    Periodic(PeriodicActuator),
}

pub struct InlineActuator {
    controller: MotorController,
    write_failures: u64,
}

pub struct PeriodicActuator {
    slot: Arc<CommandSlot>,
    state: Arc<Mutex<MotorDriveState>>,
    write_failures: Arc<AtomicU64>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<Result<()>>>,
    period: Duration,
}

impl Actuator {
    pub fn inline(controller: MotorController) -> Self {
        Actuator::Inline(InlineActuator {
            controller,
            write_failures: 0,
        })
    }

    /// Hand the controller to a thread that applies the slot every `period`.
    pub fn periodic(controller: MotorController, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(anyhow!("actuation period must be non-zero"));
        }
        let slot = Arc::new(CommandSlot::new(SteeringCommand::Stop));
        let state = Arc::new(Mutex::new(controller.state()));
        let write_failures = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = {
            let slot = Arc::clone(&slot);
            let state = Arc::clone(&state);
            let write_failures = Arc::clone(&write_failures);
            thread::Builder::new()
                .name("actuation".to_string())
                .spawn(move || {
                    let mut controller = controller;
                    let mut failing = false;
                    loop {
                        let command = slot.latest();
                        match controller.apply(command) {
                            Ok(()) => {
                                failing = false;
                                if let Ok(mut shared) = state.lock() {
                                    *shared = controller.state();
                                }
                            }
                            Err(err) => {
                                write_failures.fetch_add(1, Ordering::Relaxed);
                                if !failing {
                                    log::error!("actuation: {:#}", err);
                                }
                                failing = true;
                            }
                        }
                        match stop_rx.recv_timeout(period) {
                            Err(RecvTimeoutError::Timeout) => continue,
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    controller.shutdown()
                })
                .context("spawn actuation thread")?
        };

        log::info!("actuation: periodic every {:?}", period);
        Ok(Actuator::Periodic(PeriodicActuator {
            slot,
            state,
            write_failures,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            period,
        }))
    }

    /// Hand over this cycle's command.
    ///
    /// Inline: applied now, and a hardware fault is returned. Periodic: only
    /// published; faults surface in `write_failures`.
    pub fn submit(&mut self, command: SteeringCommand) -> Result<()> {
        match self {
            Actuator::Inline(inline) => inline.controller.apply(command).map_err(|err| {
                inline.write_failures += 1;
                err
            }),
            Actuator::Periodic(periodic) => {
                periodic.slot.publish(command);
                Ok(())
            }
        }
    }

    pub fn write_failures(&self) -> u64 {
        match self {
            Actuator::Inline(inline) => inline.write_failures,
            Actuator::Periodic(periodic) => periodic.write_failures.load(Ordering::Relaxed),
        }
    }

    pub fn state(&self) -> MotorDriveState {
        match self {
            Actuator::Inline(inline) => inline.controller.state(),
            Actuator::Periodic(periodic) => periodic
                .state
                .lock()
                .map(|state| *state)
                .unwrap_or_default(),
        }
    }

    pub fn mode_name(&self) -> String {
        match self {
            Actuator::Inline(_) => "inline".to_string(),
            Actuator::Periodic(periodic) => format!("periodic {:?}", periodic.period),
        }
    }

    /// Stop the motors and release the hardware once; the periodic thread is
    /// joined first.
    pub fn shutdown(&mut self) -> Result<()> {
        match self {
            Actuator::Inline(inline) => inline.controller.shutdown(),
            Actuator::Periodic(periodic) => {
                let Some(handle) = periodic.handle.take() else {
                    return Ok(());
                };
                if let Some(tx) = periodic.stop_tx.take() {
                    let _ = tx.send(());
                }
                match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("actuation thread panicked")),
                }
            }
        }
    }
}

impl Drop for PeriodicActuator {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Err(err)) => log::error!("actuation: shutdown on drop failed: {:#}", err),
                Err(_) => log::error!("actuation: thread panicked"),
                Ok(Ok(())) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{DriveMode, DutyCycles, SpeedLevel, StubMotorHardware, StubProbe};

    fn controller() -> Result<(MotorController, StubProbe)> {
        let hw = StubMotorHardware::new();
        let probe = hw.probe();
        Ok((
            MotorController::new(Box::new(hw), DutyCycles::default(), SpeedLevel::Medium)?,
            probe,
        ))
    }

    #[test]
    fn slot_holds_latest_command() {
        let slot = CommandSlot::new(SteeringCommand::Stop);
        assert_eq!(slot.latest(), SteeringCommand::Stop);
        slot.publish(SteeringCommand::TurnRight);
        slot.publish(SteeringCommand::Forward);
        assert_eq!(slot.latest(), SteeringCommand::Forward);
    }

    #[test]
    fn inline_counts_write_failures() -> Result<()> {
        let (controller, probe) = controller()?;
        let mut actuator = Actuator::inline(controller);
        actuator.submit(SteeringCommand::Forward)?;
        probe.fail_writes(true);
        assert!(actuator.submit(SteeringCommand::TurnLeft).is_err());
        assert_eq!(actuator.write_failures(), 1);
        assert_eq!(actuator.state().mode, DriveMode::Forward);
        probe.fail_writes(false);
        actuator.shutdown()?;
        actuator.shutdown()?;
        assert_eq!(probe.releases(), 1);
        Ok(())
    }

    #[test]
    fn periodic_applies_slot_and_cleans_up_once() -> Result<()> {
        let (controller, probe) = controller()?;
        let mut actuator = Actuator::periodic(controller, Duration::from_millis(5))?;
        actuator.submit(SteeringCommand::TurnLeft)?;

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while probe.pins() != DriveMode::TurnLeft.pattern() {
            assert!(std::time::Instant::now() < deadline, "slot never applied");
            thread::sleep(Duration::from_millis(2));
        }

        actuator.shutdown()?;
        actuator.shutdown()?;
        drop(actuator);
        assert_eq!(probe.releases(), 1);
        assert!(probe.pins().is_stopped());
        Ok(())
    }

    #[test]
    fn zero_period_is_rejected() -> Result<()> {
        let (controller, probe) = controller()?;
        assert!(Actuator::periodic(controller, Duration::ZERO).is_err());
        // the controller was dropped with the error and released itself
        assert_eq!(probe.releases(), 1);
        Ok(())
    }
}
