//! Linux sysfs motor backend.
//!
//! Direction lines are exported through `/sys/class/gpio`; speed goes through a
//! `/sys/class/pwm` channel wired to the driver's enable input. Without a PWM
//! channel the enable pin is driven as a plain GPIO (always full speed).
//!
//! GPIO numbers are BCM numbers plus `gpio_base`, since recent kernels place the
//! SoC gpiochip at a non-zero base.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::hardware::{MotorHardware, PinPattern};

/// BCM pin assignment for the rig.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorPins {
    pub right_forward: u32,
    pub right_backward: u32,
    pub left_forward: u32,
    pub left_backward: u32,
    pub enable: u32,
}

impl Default for MotorPins {
    fn default() -> Self {
        Self {
            right_forward: 24,
            right_backward: 23,
            left_forward: 21,
            left_backward: 22,
            enable: 25,
        }
    }
}

impl MotorPins {
    /// Direction lines in `in1..in4` order.
    pub fn direction_lines(&self) -> [u32; 4] {
        [
            self.right_forward,
            self.right_backward,
            self.left_forward,
            self.left_backward,
        ]
    }
}

/// Where the sysfs trees live and which PWM channel drives the enable line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SysfsSettings {
    pub gpio_root: PathBuf,
    /// `None` drives the enable pin as a GPIO instead of PWM.
    pub pwm_chip: Option<PathBuf>,
    pub pwm_channel: u32,
    pub gpio_base: u32,
    pub pwm_frequency_hz: u32,
    pub pins: MotorPins,
}

impl Default for SysfsSettings {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from("/sys/class/gpio"),
            pwm_chip: Some(PathBuf::from("/sys/class/pwm/pwmchip0")),
            pwm_channel: 0,
            gpio_base: 0,
            pwm_frequency_hz: 1000,
            pins: MotorPins::default(),
        }
    }
}

struct PwmChannel {
    chip: PathBuf,
    dir: PathBuf,
    channel: u32,
    period_ns: u64,
}

pub struct SysfsMotorHardware {
    gpio_root: PathBuf,
    lines: [u32; 4],
    /// Every GPIO this instance has exported, in export order.
    exported: Vec<u32>,
    pwm: Option<PwmChannel>,
    released: bool,
}

impl SysfsMotorHardware {
    /// Export and configure every line. Failure here is fatal for startup, and
    /// whatever was armed before the failing step is released again.
    pub fn open(settings: &SysfsSettings) -> Result<Self> {
        if settings.pwm_frequency_hz == 0 {
            return Err(anyhow!("pwm frequency must be greater than zero"));
        }
        let lines = settings
            .pins
            .direction_lines()
            .map(|pin| pin + settings.gpio_base);

        let mut hw = Self {
            gpio_root: settings.gpio_root.clone(),
            lines,
            exported: Vec::with_capacity(5),
            pwm: None,
            released: false,
        };

        if let Err(err) = hw.arm(settings) {
            if let Err(cleanup) = hw.release() {
                log::error!(
                    "SysfsMotorHardware: cleanup after failed open: {:#}",
                    cleanup
                );
            }
            return Err(err);
        }

        log::info!(
            "SysfsMotorHardware: armed lines {:?} under {}",
            hw.lines,
            hw.gpio_root.display()
        );
        Ok(hw)
    }

    fn arm(&mut self, settings: &SysfsSettings) -> Result<()> {
        for line in self.lines {
            self.export_output(line)?;
        }

        match &settings.pwm_chip {
            Some(chip) => {
                let dir = chip.join(format!("pwm{}", settings.pwm_channel));
                if !dir.exists() {
                    write_attr(&chip.join("export"), &settings.pwm_channel.to_string())?;
                    wait_for(&dir)?;
                }
                let period_ns = 1_000_000_000u64 / settings.pwm_frequency_hz as u64;
                self.pwm = Some(PwmChannel {
                    chip: chip.clone(),
                    dir: dir.clone(),
                    channel: settings.pwm_channel,
                    period_ns,
                });
                // duty must never exceed period, so zero it before changing the period
                let _ = write_attr(&dir.join("duty_cycle"), "0");
                write_attr(&dir.join("period"), &period_ns.to_string())?;
                write_attr(&dir.join("duty_cycle"), "0")?;
                write_attr(&dir.join("enable"), "1")?;
            }
            None => {
                let enable = settings.pins.enable + settings.gpio_base;
                self.export_output(enable)?;
                write_attr(&self.value_path(enable), "1")?;
                log::warn!(
                    "SysfsMotorHardware: no PWM channel configured, enable gpio{} held high (duty changes ignored)",
                    enable
                );
            }
        }
        Ok(())
    }

    fn gpio_dir(&self, line: u32) -> PathBuf {
        self.gpio_root.join(format!("gpio{}", line))
    }

    fn value_path(&self, line: u32) -> PathBuf {
        self.gpio_dir(line).join("value")
    }

    fn export_output(&mut self, line: u32) -> Result<()> {
        let dir = self.gpio_dir(line);
        if !dir.exists() {
            write_attr(&self.gpio_root.join("export"), &line.to_string())?;
            wait_for(&dir)?;
        }
        self.exported.push(line);
        write_attr(&dir.join("direction"), "out")?;
        write_attr(&dir.join("value"), "0")
    }
}

impl MotorHardware for SysfsMotorHardware {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn write_pins(&mut self, pattern: PinPattern) -> Result<()> {
        if self.released {
            return Err(anyhow!("sysfs motor lines already released"));
        }
        for (line, level) in self.lines.iter().zip(pattern.levels()) {
            write_attr(&self.value_path(*line), if level { "1" } else { "0" })?;
        }
        Ok(())
    }

    fn set_duty_cycle(&mut self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(anyhow!("duty cycle {}% out of range", percent));
        }
        match &self.pwm {
            Some(pwm) => {
                let duty_ns = pwm.period_ns * percent as u64 / 100;
                write_attr(&pwm.dir.join("duty_cycle"), &duty_ns.to_string())
            }
            None => {
                log::debug!("SysfsMotorHardware: duty {}% ignored without PWM", percent);
                Ok(())
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // Keep going after a failure so every line gets a chance to drop.
        let mut first_err: Option<anyhow::Error> = None;
        let mut note = |result: Result<()>| {
            if let Err(err) = result {
                log::error!("SysfsMotorHardware: release step failed: {:#}", err);
                first_err.get_or_insert(err);
            }
        };

        for &line in &self.exported {
            note(write_attr(&self.value_path(line), "0"));
        }
        if let Some(pwm) = &self.pwm {
            note(write_attr(&pwm.dir.join("duty_cycle"), "0"));
            note(write_attr(&pwm.dir.join("enable"), "0"));
            note(write_attr(&pwm.chip.join("unexport"), &pwm.channel.to_string()));
        }
        for &line in &self.exported {
            note(write_attr(&self.gpio_root.join("unexport"), &line.to_string()));
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn write_attr(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).with_context(|| format!("write '{}' to {}", value, path.display()))
}

/// udev may take a moment to create the node after an export.
fn wait_for(path: &Path) -> Result<()> {
    for _ in 0..20 {
        if path.exists() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }
    Err(anyhow!("{} did not appear after export", path.display()))
}
