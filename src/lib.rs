//! Servo Kernel
//!
//! Closed-loop visual servo control for a small two-motor robot: find colored
//! targets in camera frames, turn the most important one into a discrete
//! steering command, and drive the motors toward it.
//!
//! # Pipeline
//!
//! Each frame flows strictly downward, and nothing but the motor drive state
//! survives from one frame to the next:
//!
//! 1. **Segmentation** (`segment`): HSV frame + color class -> binary mask.
//! 2. **Extraction** (`detect`): mask -> best circle or largest blob, or "absent".
//! 3. **Range** (`range`): apparent size -> advisory distance.
//! 4. **Steering** (`steer`): detection position -> Forward / TurnLeft / TurnRight.
//! 5. **Actuation** (`motor`): command -> direction pins and PWM duty.
//!
//! `control` runs the cycle, arbitrates between tracked classes by priority and
//! owns cleanup. `ingest` supplies frames, `overlay` draws what was seen, and
//! `config` loads everything from TOML/JSON plus environment overrides.
//!
//! # Module Structure
//!
//! - `frame`: Frame, HsvFrame, Mask
//! - `imgproc`: blur, circle transform, contour tracing and moments
//! - `ingest`: camera sources (synthetic, replay, image directory, V4L2)
//! - `motor`: actuation state machine and hardware backends (stub, sysfs)

pub mod config;
pub mod control;
pub mod detect;
pub mod frame;
pub mod imgproc;
pub mod ingest;
pub mod motor;
pub mod overlay;
pub mod range;
pub mod segment;
pub mod steer;

pub use config::ServoConfig;
pub use control::{
    Actuator, ClassObservation, ControlLoop, CycleReport, LoopExit, LoopSummary, Perception,
    TrackedClass,
};
pub use detect::{Detection, ShapeExtractor};
pub use frame::{ColorEncoding, Frame, HsvFrame, Mask};
pub use ingest::{CameraConfig, CameraSource};
pub use motor::{DriveMode, MotorController, MotorDriveState, SpeedLevel};
pub use range::RangeEstimator;
pub use segment::{ColorClassSpec, HsvRange};
pub use steer::{Decision, SteeringCommand, SteeringPolicy};
