use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use servo_kernel::config::{MotorBackend, ServoConfig, ShapeStrategy};
use servo_kernel::detect::BlobParams;
use servo_kernel::motor::SpeedLevel;
use servo_kernel::steer::SteeringCommand;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SERVO_CONFIG",
        "SERVO_CAMERA_URL",
        "SERVO_MAX_FRAMES",
        "SERVO_TOLERANCE_PX",
        "SERVO_MOTOR_BACKEND",
        "SERVO_ACTUATION_PERIOD_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_json_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "camera": { "url": "stub://pitch", "width": 320, "height": 240, "target_fps": 0 },
            "steering": { "tolerance_px": 20, "absent_command": "stop" },
            "motor": { "backend": "stub", "initial_speed": "high", "duty": { "low": 30, "medium": 55, "high": 90 } },
            "range": { "focal_length_px": 600.0 },
            "classes": [
                { "name": "ball", "color": "red", "real_diameter": 6.5 },
                { "name": "goal", "strategy": "blob", "color": "pink", "min_area": 300.0 }
            ],
            "actuation": { "period_ms": 100 }
        }"#,
    );

    std::env::set_var("SERVO_CONFIG", file.path());
    std::env::set_var("SERVO_TOLERANCE_PX", "25");
    std::env::set_var("SERVO_MAX_FRAMES", "40");

    let cfg = ServoConfig::load().expect("load config");

    assert_eq!(cfg.camera.url, "stub://pitch");
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.camera.target_fps, 0);
    assert_eq!(cfg.camera.max_frames, Some(40));
    assert_eq!(cfg.steering.tolerance_px, 25);
    assert_eq!(cfg.steering.absent_command, SteeringCommand::Stop);
    assert_eq!(cfg.motor.backend, MotorBackend::Stub);
    assert_eq!(cfg.motor.initial_speed, SpeedLevel::High);
    assert_eq!(cfg.motor.duty.for_level(SpeedLevel::High), 90);
    assert_eq!(cfg.focal_length_px, 600.0);
    assert_eq!(cfg.classes.len(), 2);
    assert_eq!(cfg.classes[0].real_diameter, Some(6.5));
    assert!(matches!(cfg.classes[0].strategy, ShapeStrategy::Circle(_)));
    assert_eq!(
        cfg.classes[1].strategy,
        ShapeStrategy::Blob(BlobParams { min_area: 300.0 })
    );
    assert_eq!(cfg.actuation_period, Some(Duration::from_millis(100)));

    clear_env();
}

#[test]
fn explicit_path_wins_over_env_and_reads_toml() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let ignored = config_file(".toml", "[camera]\nurl = \"stub://ignored\"\n");
    let file = config_file(
        ".toml",
        r#"
        [camera]
        url = "stub://bench"

        [motor]
        pwm_chip = "none"

        [[classes]]
        name = "puck"
        ranges = [{ lower = [100, 120, 70], upper = [130, 255, 255] }]
        "#,
    );
    std::env::set_var("SERVO_CONFIG", ignored.path());
    std::env::set_var("SERVO_ACTUATION_PERIOD_MS", "0");

    let cfg = ServoConfig::load_from(Some(file.path())).expect("load config");

    assert_eq!(cfg.camera.url, "stub://bench");
    assert_eq!(cfg.motor.pwm_chip, None);
    assert_eq!(cfg.classes.len(), 1);
    assert_eq!(cfg.classes[0].name, "puck");
    assert_eq!(cfg.actuation_period, None);
    let perception = cfg.perception().expect("perception");
    assert_eq!(perception.classes().len(), 1);

    clear_env();
}

#[test]
fn env_overrides_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SERVO_CAMERA_URL", "stub://hallway");
    std::env::set_var("SERVO_MOTOR_BACKEND", "STUB");

    let cfg = ServoConfig::load().expect("load config");
    assert_eq!(cfg.camera.url, "stub://hallway");
    assert_eq!(cfg.motor.backend, MotorBackend::Stub);
    let names: Vec<&str> = cfg.classes.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["ball", "goal"]);

    clear_env();
}

#[test]
fn rejects_bad_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SERVO_TOLERANCE_PX", "wide");
    assert!(ServoConfig::load().is_err());
    clear_env();

    std::env::set_var("SERVO_MOTOR_BACKEND", "pigpio");
    assert!(ServoConfig::load().is_err());
    clear_env();

    let negative = config_file(".toml", "[steering]\ntolerance_px = -3\n");
    assert!(ServoConfig::load_from(Some(negative.path())).is_err());

    let duplicate = config_file(
        ".json",
        r#"{ "classes": [ { "name": "ball", "color": "red" }, { "name": "ball", "color": "yellow" } ] }"#,
    );
    assert!(ServoConfig::load_from(Some(duplicate.path())).is_err());

    let missing = std::env::temp_dir().join("servo-kernel-no-such-config.toml");
    assert!(ServoConfig::load_from(Some(&missing)).is_err());

    clear_env();
}
