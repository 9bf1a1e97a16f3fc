//! motor_console - drive the motor rig by hand
//!
//! Reads one command per line from stdin (r, s, f, b, fl, fr, bl, br, l, m, h, e)
//! and applies it through the same state machine the control loop uses. Useful
//! for checking wiring before closing the loop. Ctrl-C, `e` or end of input stop
//! the motors and release the pins.

use anyhow::Result;
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use servo_kernel::config::{MotorBackend, ServoConfig};
use servo_kernel::motor::{manual::USAGE, ManualCommand};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file; only the [motor] section is used.
    #[arg(long, env = "SERVO_CONFIG")]
    config: Option<PathBuf>,

    /// Motor backend override (stub|sysfs).
    #[arg(long)]
    backend: Option<String>,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE", value_parser = ui::UiMode::parse)]
    ui: ui::UiMode,
}

enum Input {
    Line(String),
    Closed,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());

    let mut cfg = ServoConfig::load_from(args.config.as_deref())?;
    if let Some(backend) = &args.backend {
        cfg.motor.backend = MotorBackend::parse(backend)?;
    }

    let mut motor = {
        let stage = ui.stage("Arm motors");
        let motor = cfg.motor_controller()?;
        stage.done(format!(
            "{} backend, speed {}",
            motor.backend_name(),
            motor.state().speed
        ));
        motor
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        })
        .expect("error setting Ctrl-C handler");
    }

    // stdin blocks, so it is read on its own thread and polled with a timeout
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Input::Line(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    log::warn!("stdin read failed: {}", err);
                    break;
                }
            }
        }
        let _ = tx.send(Input::Closed);
    });

    ui.note(USAGE);
    loop {
        if cancel.load(Ordering::SeqCst) {
            log::info!("interrupt received");
            break;
        }
        let line = match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(Input::Line(line)) => line,
            Ok(Input::Closed) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("input closed");
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
        };
        if line.trim().is_empty() {
            continue;
        }
        let command: ManualCommand = match line.parse() {
            Ok(command) => command,
            Err(err) => {
                log::warn!("{:#}", err);
                continue;
            }
        };
        if command == ManualCommand::Exit {
            break;
        }
        match motor.execute(command) {
            Ok(()) => log::info!("{} -> {}", command, motor.state()),
            Err(err) => log::error!("{}: {:#}", command, err),
        }
    }

    motor.shutdown()?;
    Ok(())
}
