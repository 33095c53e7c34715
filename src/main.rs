use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use readycheck_lib::app::adb::locator::{resolve_adb_program, validate_adb_program};
use readycheck_lib::app::adb::runner::AdbShell;
use readycheck_lib::app::clock::{Clock, SystemClock};
use readycheck_lib::app::config::{
    dedupe_apps, load_config, load_config_from_path, AppConfig, SETTINGS_PACKAGE,
};
use readycheck_lib::app::coordinator::RunCoordinator;
use readycheck_lib::app::error::AppError;
use readycheck_lib::app::launcher::{force_stop, launch_app};
use readycheck_lib::app::logging::init_logging;
use readycheck_lib::app::session::appium::AppiumFactory;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "readycheck",
    version,
    about = "Verify that Android apps launch into a usable UI and crawl the settings pane"
)]
struct Cli {
    /// Config file (default: ~/.readycheck_config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Device serial passed to adb as `-s`.
    #[arg(long, global = true, env = "ANDROID_SERIAL")]
    serial: Option<String>,
    /// Folder for screenshots and the results workbook.
    #[arg(long, global = true)]
    output: Option<PathBuf>,
    /// Print a JSON summary on stdout.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check every configured app and write the results workbook.
    Run {
        /// Replace the configured app list; repeatable.
        #[arg(long = "app")]
        apps: Vec<String>,
    },
    /// Launch, verify and capture a single app.
    Verify { package: String },
    /// Crawl the settings list that is already on screen.
    Crawl {
        /// Open the settings app first.
        #[arg(long)]
        open: bool,
    },
}

fn load(cli: &Cli) -> Result<AppConfig, AppError> {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path)?,
        None => load_config()?,
    };
    if let Some(serial) = cli.serial.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        config.device.serial = Some(serial.to_string());
    }
    if let Some(output) = &cli.output {
        config.run.output_dir = output.to_string_lossy().to_string();
    }
    if let Command::Run { apps } = &cli.command {
        if !apps.is_empty() {
            config.run.apps = dedupe_apps(apps);
        }
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn main() {
    let cli = Cli::parse();
    let trace_id = Uuid::new_v4().to_string();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(err) => {
            init_logging("info");
            error!(trace_id = %trace_id, error = %err, "failed to load config");
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    init_logging(&config.logging.log_level);

    let adb_program = resolve_adb_program(&config.device.adb_command_path);
    if let Err(message) = validate_adb_program(&adb_program) {
        error!(trace_id = %trace_id, adb = %adb_program, error = %message, "adb unavailable");
        eprintln!("{message}");
        std::process::exit(2);
    }
    info!(trace_id = %trace_id, adb = %adb_program, serial = ?config.device.serial, "starting");

    let shell = AdbShell::new(adb_program, config.device.serial.clone(), trace_id.clone());
    let clock = SystemClock::new();
    let sessions = AppiumFactory::new(
        config.appium.server_url.clone(),
        Duration::from_secs(config.appium.request_timeout_secs),
        trace_id.clone(),
    );
    let coordinator = RunCoordinator::new(&shell, &clock, &sessions, &config);

    let code = match &cli.command {
        Command::Run { .. } => {
            let report = coordinator.run(&config.run.apps);
            match report.ledger.write_to_dir(coordinator.output_dir(), &trace_id) {
                Ok(path) => println!("Results saved: {}", path.display()),
                Err(err) => warn!(trace_id = %trace_id, error = %err, "failed to write results"),
            }
            if cli.json {
                print_json(&report);
            }
            println!("All apps processed.");
            i32::from(!report.ledger.all_passed())
        }
        Command::Verify { package } => {
            let report = coordinator.check_app(package);
            force_stop(&shell, &report.package, config.readiness.query_timeout());
            if cli.json {
                print_json(&report);
            }
            i32::from(!report.outcome.is_ready())
        }
        Command::Crawl { open } => {
            if *open {
                println!("Opening settings...");
                launch_app(&shell, SETTINGS_PACKAGE, config.readiness.launch_timeout());
                clock.sleep(Duration::from_millis(config.run.open_settle_ms));
            }
            match coordinator.crawl() {
                Some(report) => {
                    if cli.json {
                        print_json(&report);
                    }
                    0
                }
                None => 1,
            }
        }
    };
    std::process::exit(code);
}
