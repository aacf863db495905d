//! guestvm: boot and manage a single guest VM from a JSON profile.

use clap::{Parser, Subcommand};
use guestvm::{
    ConfigurationBuilder, GuestVmError, GuestVmOptions, GuestVmResult, LifecycleController,
    LifecycleStatus, ProfileLoader, VfkitDisplay, VfkitOptions, VfkitPlatform, init_logging,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Profile-driven guest VM runner
#[derive(Parser, Debug)]
#[command(name = "guestvm", version, about)]
struct Cli {
    /// vfkit binary (looked up on PATH and in Homebrew locations by default).
    #[arg(long, global = true, env = "GUESTVM_VFKIT")]
    vfkit: Option<PathBuf>,

    /// Also write logs to guestvm.log in this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Keep the working directory instead of entering the profile's directory.
    #[arg(long, global = true)]
    no_chdir: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Load a profile and run the guest until it halts or Ctrl-C.
    ///
    /// vfkit shares at most one directory, so a profile sharing several is
    /// rejected. It has no SPICE agent port, so clipboard sharing is off.
    Run {
        /// Profile document.
        profile: PathBuf,
        /// Run without a display window.
        #[arg(long)]
        headless: bool,
    },

    /// Build and validate the configuration, then print it as JSON.
    ///
    /// UEFI profiles reset ./efistore next to the profile, as a start would.
    Check {
        /// Profile document.
        profile: PathBuf,
    },

    /// Decode a profile and print it normalized.
    Show {
        /// Profile document.
        profile: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut options = GuestVmOptions::from_env();
    if cli.log_dir.is_some() {
        options.logging.log_dir = cli.log_dir.clone();
    }
    if cli.no_chdir {
        options.follow_profile_directory = false;
    }

    let _log_guard = match init_logging(&options.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("guestvm: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let vfkit = VfkitOptions {
        binary: cli.vfkit,
        ..Default::default()
    };

    let result = match cli.command {
        Cmd::Run { profile, headless } => run(profile, headless, vfkit, options).await,
        Cmd::Check { profile } => check(profile, vfkit, options),
        Cmd::Show { profile } => show(profile),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("guestvm: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    profile: PathBuf,
    headless: bool,
    vfkit: VfkitOptions,
    options: GuestVmOptions,
) -> GuestVmResult<ExitCode> {
    let platform = Arc::new(VfkitPlatform::new(vfkit)?);
    let controller = LifecycleController::new(platform, options)?;

    controller.load_profile(&profile)?;

    let display = if headless {
        VfkitDisplay::Headless
    } else {
        VfkitDisplay::Window
    };
    controller.start(Some(Arc::new(display)))?;

    let mut status = controller.reporter().subscribe_status();
    let mut log = controller.reporter().subscribe_log();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut interrupted = false;
    let mut stop_sent = false;
    let mut last_reported = None;

    loop {
        let current = *status.borrow_and_update();
        if last_reported != Some(current) {
            eprintln!("guestvm: {}\r", current);
            last_reported = Some(current);
        }

        match current {
            LifecycleStatus::Error => return Ok(ExitCode::FAILURE),
            // Reached again only after a stop or a guest shutdown.
            LifecycleStatus::Loaded => return Ok(ExitCode::SUCCESS),
            status if interrupted && !stop_sent && status.can_stop() => {
                controller.stop()?;
                stop_sent = true;
            }
            _ => {}
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return Err(GuestVmError::Internal("status channel closed".into()));
                }
            }
            changed = log.changed() => {
                if changed.is_ok() {
                    eprintln!("{}\r", *log.borrow_and_update());
                }
            }
            signal = &mut ctrl_c, if !interrupted => {
                signal?;
                tracing::info!("Interrupted, stopping guest");
                interrupted = true;
            }
        }
    }
}

fn check(
    profile: PathBuf,
    vfkit: VfkitOptions,
    options: GuestVmOptions,
) -> GuestVmResult<ExitCode> {
    let platform = Arc::new(VfkitPlatform::new(vfkit)?);
    let controller = LifecycleController::new(Arc::clone(&platform) as _, options)?;
    controller.load_profile(&profile)?;

    let loaded = controller
        .profile()
        .ok_or_else(|| GuestVmError::Internal("profile missing after load".into()))?;
    let config = ConfigurationBuilder::new(platform.as_ref()).build(&loaded)?;

    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| GuestVmError::Internal(format!("encode configuration: {}", e)))?;
    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}

fn show(profile: PathBuf) -> GuestVmResult<ExitCode> {
    let profile = ProfileLoader::load(&profile)?;
    println!("{}", profile.to_json_pretty()?);
    Ok(ExitCode::SUCCESS)
}
