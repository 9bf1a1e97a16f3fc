//! servod - visual servo daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by --config / SERVO_CONFIG, then env overrides)
//! 2. Acquires the motor backend and opens the camera (either failing aborts startup)
//! 3. Steers toward the highest-priority visible target, one command per frame
//! 4. Stops the motors and releases every handle on Ctrl-C, end of stream or error

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use servo_kernel::config::ServoConfig;
use servo_kernel::control::ControlLoop;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(long, env = "SERVO_CONFIG")]
    config: Option<PathBuf>,

    /// Camera URL override (stub://name, dir://path, /dev/videoN).
    #[arg(long)]
    camera: Option<String>,

    /// Stop after this many frames (0 = run until interrupted).
    #[arg(long)]
    max_frames: Option<u64>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE", value_parser = ui::UiMode::parse)]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());

    let cfg = {
        let stage = ui.stage("Load configuration");
        let mut cfg = ServoConfig::load_from(args.config.as_deref())?;
        if let Some(url) = &args.camera {
            cfg.camera.url = url.clone();
        }
        if let Some(max) = args.max_frames {
            cfg.camera.max_frames = (max > 0).then_some(max);
        }
        let fingerprint = cfg.fingerprint()?;
        log::info!("config fingerprint {}", fingerprint);
        stage.done(format!("fingerprint {}", &fingerprint[..12]));
        cfg
    };

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let mut control = {
        let stage = ui.stage("Arm motors and open camera");
        let control = ControlLoop::from_config(&cfg)?;
        stage.done(format!("{} ({:?} motor backend)", cfg.camera.url, cfg.motor.backend));
        control
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        })
        .expect("error setting Ctrl-C handler");
    }
    control = control.with_cancel_flag(cancel);

    ui.note("servod running, Ctrl-C to stop");
    let summary = control.run()?;
    log::info!(
        "servod stopped: {} after {} frame(s), {} motor write failure(s)",
        summary.exit,
        summary.frames,
        summary.write_failures
    );
    Ok(())
}
