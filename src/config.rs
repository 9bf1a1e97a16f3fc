use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::{Perception, TrackedClass};
use crate::detect::{BlobParams, CircleParams};
use crate::ingest::CameraConfig;
use crate::motor::{
    DutyCycles, MotorController, MotorHardware, MotorPins, SpeedLevel, StubMotorHardware,
    SysfsMotorHardware, SysfsSettings,
};
use crate::range::RangeEstimator;
use crate::segment::{pink_ranges, preset_ranges, red_ranges, ColorClassSpec, HsvRange, MAX_HUE};
use crate::steer::{SteeringCommand, SteeringPolicy};

const DEFAULT_TOLERANCE_PX: i32 = 15;
const DEFAULT_FOCAL_LENGTH_PX: f64 = 1080.0;
const DEFAULT_PWM_FREQUENCY_HZ: u32 = 1000;
const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";
const DEFAULT_PWM_CHIP: &str = "/sys/class/pwm/pwmchip0";
const DEFAULT_SNAPSHOT_EVERY: u64 = 30;
const DEFAULT_BALL_DIAMETER: f64 = 4.0;

#[derive(Debug, Deserialize, Default)]
struct ServoConfigFile {
    camera: Option<CameraConfigFile>,
    steering: Option<SteeringConfigFile>,
    motor: Option<MotorConfigFile>,
    range: Option<RangeConfigFile>,
    classes: Option<Vec<ClassConfigFile>>,
    actuation: Option<ActuationConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SteeringConfigFile {
    tolerance_px: Option<i32>,
    absent_command: Option<SteeringCommand>,
}

#[derive(Debug, Deserialize, Default)]
struct MotorConfigFile {
    backend: Option<String>,
    pins: Option<MotorPins>,
    pwm_frequency_hz: Option<u32>,
    duty: Option<DutyCycles>,
    initial_speed: Option<SpeedLevel>,
    gpio_root: Option<PathBuf>,
    /// `"none"` drives the enable pin as a plain GPIO.
    pwm_chip: Option<String>,
    pwm_channel: Option<u32>,
    gpio_base: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RangeConfigFile {
    focal_length_px: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassConfigFile {
    name: Option<String>,
    /// `"circle"` or `"blob"`.
    strategy: Option<String>,
    /// Stock color name, used when `ranges` is absent.
    color: Option<String>,
    ranges: Option<Vec<HsvRange>>,
    circle: Option<CircleParams>,
    blob: Option<BlobParams>,
    min_area: Option<f64>,
    real_diameter: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ActuationConfigFile {
    period_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    snapshot_dir: Option<PathBuf>,
    snapshot_every: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServoConfig {
    pub camera: CameraConfig,
    pub steering: SteeringSettings,
    pub motor: MotorSettings,
    pub focal_length_px: f64,
    /// Priority order, most important first.
    pub classes: Vec<ClassSettings>,
    /// `None` applies one command per frame on the loop thread.
    pub actuation_period: Option<Duration>,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct SteeringSettings {
    pub tolerance_px: i32,
    pub absent_command: SteeringCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorBackend {
    Stub,
    Sysfs,
}

impl MotorBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "sysfs" => Ok(Self::Sysfs),
            other => Err(anyhow!("unknown motor backend '{}' (expected stub or sysfs)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MotorSettings {
    pub backend: MotorBackend,
    pub pins: MotorPins,
    pub pwm_frequency_hz: u32,
    pub duty: DutyCycles,
    pub initial_speed: SpeedLevel,
    pub gpio_root: PathBuf,
    pub pwm_chip: Option<PathBuf>,
    pub pwm_channel: u32,
    pub gpio_base: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ShapeStrategy {
    Circle(CircleParams),
    Blob(BlobParams),
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSettings {
    pub name: String,
    pub ranges: Vec<HsvRange>,
    pub strategy: ShapeStrategy,
    /// Enables range estimates for this class.
    pub real_diameter: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlaySettings {
    pub snapshot_dir: Option<PathBuf>,
    pub snapshot_every: u64,
}

impl ServoConfig {
    /// Defaults, then the file named by `SERVO_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like `load`, but an explicit path wins over `SERVO_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("SERVO_CONFIG").ok().map(PathBuf::from));
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServoConfigFile) -> Result<Self> {
        let defaults = CameraConfig::default();
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            url: camera_file.url.unwrap_or(defaults.url),
            width: camera_file.width.unwrap_or(defaults.width),
            height: camera_file.height.unwrap_or(defaults.height),
            target_fps: camera_file.target_fps.unwrap_or(defaults.target_fps),
            max_frames: camera_file.max_frames.filter(|n| *n > 0),
        };

        let steering_file = file.steering.unwrap_or_default();
        let steering = SteeringSettings {
            tolerance_px: steering_file.tolerance_px.unwrap_or(DEFAULT_TOLERANCE_PX),
            absent_command: steering_file
                .absent_command
                .unwrap_or(SteeringCommand::TurnLeft),
        };

        let motor_file = file.motor.unwrap_or_default();
        let pwm_chip = match motor_file.pwm_chip {
            Some(chip) if chip.trim().eq_ignore_ascii_case("none") => None,
            Some(chip) => Some(PathBuf::from(chip)),
            None => Some(PathBuf::from(DEFAULT_PWM_CHIP)),
        };
        let motor = MotorSettings {
            backend: match motor_file.backend.as_deref() {
                Some(name) => MotorBackend::parse(name)?,
                None => MotorBackend::Stub,
            },
            pins: motor_file.pins.unwrap_or_default(),
            pwm_frequency_hz: motor_file
                .pwm_frequency_hz
                .unwrap_or(DEFAULT_PWM_FREQUENCY_HZ),
            duty: motor_file.duty.unwrap_or_default(),
            initial_speed: motor_file.initial_speed.unwrap_or_default(),
            gpio_root: motor_file
                .gpio_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GPIO_ROOT)),
            pwm_chip,
            pwm_channel: motor_file.pwm_channel.unwrap_or(0),
            gpio_base: motor_file.gpio_base.unwrap_or(0),
        };

        let focal_length_px = file
            .range
            .and_then(|range| range.focal_length_px)
            .unwrap_or(DEFAULT_FOCAL_LENGTH_PX);

        let classes = match file.classes {
            Some(classes) => classes
                .into_iter()
                .enumerate()
                .map(|(index, class)| class_from_file(index, class))
                .collect::<Result<Vec<_>>>()?,
            None => default_classes(),
        };

        let actuation_period = file
            .actuation
            .and_then(|actuation| actuation.period_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let overlay_file = file.overlay.unwrap_or_default();
        let overlay = OverlaySettings {
            snapshot_dir: overlay_file.snapshot_dir,
            snapshot_every: overlay_file
                .snapshot_every
                .unwrap_or(DEFAULT_SNAPSHOT_EVERY),
        };

        Ok(Self {
            camera,
            steering,
            motor,
            focal_length_px,
            classes,
            actuation_period,
            overlay,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SERVO_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(max) = std::env::var("SERVO_MAX_FRAMES") {
            let frames: u64 = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("SERVO_MAX_FRAMES must be a non-negative integer"))?;
            self.camera.max_frames = (frames > 0).then_some(frames);
        }
        if let Ok(tolerance) = std::env::var("SERVO_TOLERANCE_PX") {
            self.steering.tolerance_px = tolerance
                .trim()
                .parse()
                .map_err(|_| anyhow!("SERVO_TOLERANCE_PX must be an integer number of pixels"))?;
        }
        if let Ok(backend) = std::env::var("SERVO_MOTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.motor.backend = MotorBackend::parse(&backend)?;
            }
        }
        if let Ok(period) = std::env::var("SERVO_ACTUATION_PERIOD_MS") {
            let ms: u64 = period.trim().parse().map_err(|_| {
                anyhow!("SERVO_ACTUATION_PERIOD_MS must be an integer number of milliseconds")
            })?;
            self.actuation_period = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.url.trim().is_empty() {
            return Err(anyhow!("camera url must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera frame size must be non-zero (got {}x{})",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.steering.tolerance_px < 0 {
            return Err(anyhow!(
                "steering tolerance must be non-negative (got {})",
                self.steering.tolerance_px
            ));
        }
        if !(self.focal_length_px > 0.0) || !self.focal_length_px.is_finite() {
            return Err(anyhow!(
                "focal length must be positive (got {})",
                self.focal_length_px
            ));
        }
        if self.motor.pwm_frequency_hz == 0 {
            return Err(anyhow!("pwm frequency must be greater than zero"));
        }
        self.motor.duty.validate()?;
        if self.overlay.snapshot_every == 0 {
            return Err(anyhow!("overlay snapshot_every must be at least 1"));
        }

        if self.classes.is_empty() {
            return Err(anyhow!("at least one tracked class is required"));
        }
        let mut names = HashSet::new();
        for class in &self.classes {
            if class.name.trim().is_empty() {
                return Err(anyhow!("class names must not be empty"));
            }
            if !names.insert(class.name.as_str()) {
                return Err(anyhow!("duplicate class name '{}'", class.name));
            }
            if class.ranges.is_empty() {
                return Err(anyhow!("class {}: at least one HSV range is required", class.name));
            }
            for range in &class.ranges {
                if range.lower[0] > MAX_HUE || range.upper[0] > MAX_HUE {
                    return Err(anyhow!(
                        "class {}: hue bounds must be within 0..={}",
                        class.name,
                        MAX_HUE
                    ));
                }
                if (0..3).any(|c| range.lower[c] > range.upper[c]) {
                    return Err(anyhow!(
                        "class {}: range lower {:?} exceeds upper {:?}",
                        class.name,
                        range.lower,
                        range.upper
                    ));
                }
            }
            match &class.strategy {
                ShapeStrategy::Circle(params) => params
                    .validate()
                    .with_context(|| format!("class {}", class.name))?,
                ShapeStrategy::Blob(params) => params
                    .validate()
                    .with_context(|| format!("class {}", class.name))?,
            }
            if let Some(diameter) = class.real_diameter {
                if !(diameter > 0.0) || !diameter.is_finite() {
                    return Err(anyhow!(
                        "class {}: real diameter must be positive (got {})",
                        class.name,
                        diameter
                    ));
                }
            }
        }
        Ok(())
    }

    /// SHA-256 over the effective settings, for matching runs to configs.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self).context("serialize effective config")?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    pub fn steering_policy(&self) -> Result<SteeringPolicy> {
        SteeringPolicy::new(self.steering.tolerance_px, self.steering.absent_command)
    }

    /// Tracked classes in configured priority order.
    pub fn perception(&self) -> Result<Perception> {
        let mut tracked = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            let spec = ColorClassSpec::new(class.name.clone(), class.ranges.clone())?;
            let mut entry = match &class.strategy {
                ShapeStrategy::Circle(params) => TrackedClass::circle(spec, *params),
                ShapeStrategy::Blob(params) => TrackedClass::blob(spec, *params),
            };
            if let Some(diameter) = class.real_diameter {
                entry = entry.with_range(RangeEstimator::new(diameter, self.focal_length_px)?);
            }
            tracked.push(entry);
        }
        Perception::new(tracked)
    }

    pub fn sysfs_settings(&self) -> SysfsSettings {
        SysfsSettings {
            gpio_root: self.motor.gpio_root.clone(),
            pwm_chip: self.motor.pwm_chip.clone(),
            pwm_channel: self.motor.pwm_channel,
            gpio_base: self.motor.gpio_base,
            pwm_frequency_hz: self.motor.pwm_frequency_hz,
            pins: self.motor.pins,
        }
    }

    /// Acquire the configured motor backend. Failure is fatal for startup.
    pub fn motor_controller(&self) -> Result<MotorController> {
        let hardware: Box<dyn MotorHardware> = match self.motor.backend {
            MotorBackend::Stub => {
                log::info!("motor: stub backend, no pins will be driven");
                Box::new(StubMotorHardware::new())
            }
            MotorBackend::Sysfs => Box::new(
                SysfsMotorHardware::open(&self.sysfs_settings()).context("open sysfs motor lines")?,
            ),
        };
        MotorController::new(hardware, self.motor.duty, self.motor.initial_speed)
    }
}

fn default_classes() -> Vec<ClassSettings> {
    vec![
        ClassSettings {
            name: "ball".to_string(),
            ranges: red_ranges(),
            strategy: ShapeStrategy::Circle(CircleParams::default()),
            real_diameter: Some(DEFAULT_BALL_DIAMETER),
        },
        ClassSettings {
            name: "goal".to_string(),
            ranges: pink_ranges(),
            strategy: ShapeStrategy::Blob(BlobParams::default()),
            real_diameter: None,
        },
    ]
}

fn class_from_file(index: usize, file: ClassConfigFile) -> Result<ClassSettings> {
    let name = file
        .name
        .ok_or_else(|| anyhow!("classes[{}]: name is required", index))?;
    let ranges = match (file.ranges, file.color.as_deref()) {
        (Some(ranges), _) => ranges,
        (None, Some(color)) => preset_ranges(color)
            .ok_or_else(|| anyhow!("class {}: unknown color preset '{}'", name, color))?,
        (None, None) => {
            return Err(anyhow!("class {}: either ranges or color is required", name))
        }
    };
    let strategy_name = match file.strategy.as_deref() {
        Some(name) => name.trim().to_ascii_lowercase(),
        None if file.blob.is_some() || file.min_area.is_some() => "blob".to_string(),
        None => "circle".to_string(),
    };
    let strategy = match strategy_name.as_str() {
        "circle" => ShapeStrategy::Circle(file.circle.unwrap_or_default()),
        "blob" => {
            let mut params = file.blob.unwrap_or_default();
            if let Some(min_area) = file.min_area {
                params.min_area = min_area;
            }
            ShapeStrategy::Blob(params)
        }
        other => {
            return Err(anyhow!(
                "class {}: unknown strategy '{}' (expected circle or blob)",
                name,
                other
            ))
        }
    };
    Ok(ClassSettings {
        name,
        ranges,
        strategy,
        real_diameter: file.real_diameter,
    })
}

fn read_config_file(path: &Path) -> Result<ServoConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
