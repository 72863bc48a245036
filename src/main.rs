mod config;
mod daemon;
mod hook;
mod ip;
mod scripts;
mod service;
mod util;

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use daemon::Daemon;
use scripts::ScriptDir;
use service::{DynHost, DYNHOST_SERVER};

/// Dynamic DNS client for DynHost.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Run a syntax check and exit.
    #[arg(short = 's', long)]
    syntax: bool,

    /// Disable the syntax check before the update loop starts.
    #[arg(short = 'n', long)]
    no_syntax_check: bool,

    /// Path to the configuration file.
    #[arg(short = 'c', long, default_value = "dynhost.json")]
    config: PathBuf,

    /// Path to the scripts folder.
    #[arg(long, default_value = "scripts")]
    scripts: PathBuf,

    /// Seconds an invoked script may run before it is killed.
    #[arg(long, default_value_t = 60)]
    script_timeout: u64,

    /// Logging level: critical, error, warning, info or debug (default: info).
    #[arg(long)]
    loglevel: Option<String>,

    /// Save log output to this file.
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Perform a log rotation on startup.
    #[arg(long)]
    rotate_log: bool,

    /// How many old log files to keep (0: keep all).
    #[arg(long, default_value_t = 5)]
    max_rotations: u32,
}

fn level_directive(loglevel: &str) -> Option<&'static str> {
    match loglevel.trim().to_lowercase().as_str() {
        "critical" | "error" => Some("error"),
        "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        _ => None,
    }
}

fn tracing_init(directive: Option<String>, logfile: Option<File>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(concat!(env!("CARGO_PKG_NAME"), "=info"))),
    };

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter);

    match logfile {
        Some(file) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false),
            )
            .init(),
        None => registry.init(),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Rotation {
    /// The numbered backups shifted down a slot to make room.
    shifted: bool,
    /// Where the previous log file went.
    moved_to: Option<PathBuf>,
}

/// Startup log rotation. Keeps numbered backups next to `logfile`, shifting
/// them down one slot once all `max_rotations` slots are taken, then parks
/// the current file on the first free number.
fn rotate_log(logfile: &Path, max_rotations: u32) -> io::Result<Rotation> {
    if !logfile.exists() {
        return Ok(Rotation::default());
    }

    let numbered = |n: u32| PathBuf::from(format!("{}.{}", logfile.display(), n));

    let mut shifted = false;

    if max_rotations == 1 {
        shifted = fs::remove_file(numbered(1)).is_ok();
    } else if max_rotations > 1 && numbered(max_rotations).exists() {
        for n in 2..=max_rotations {
            fs::rename(numbered(n), numbered(n - 1))?;
        }
        shifted = true;
    }

    let mut free = 1;
    while numbered(free).exists() {
        free += 1;
    }

    let target = numbered(free);
    fs::rename(logfile, &target)?;

    Ok(Rotation {
        shifted,
        moved_to: Some(target),
    })
}

fn main() {
    let args = Args::parse();

    let directive = match args.loglevel.as_deref() {
        None => None,
        Some(level) => match level_directive(level) {
            Some(level) => Some(format!("{}={}", env!("CARGO_PKG_NAME"), level)),
            None => {
                eprintln!("Incorrect logging level: \"{level}\"");
                exit(1);
            }
        },
    };

    let mut rotation = Rotation::default();

    let logfile = match &args.logfile {
        None => None,
        Some(path) => {
            if args.rotate_log {
                rotation = match rotate_log(path, args.max_rotations) {
                    Ok(rotation) => rotation,
                    Err(e) => {
                        eprintln!("Could not setup logging: {e}");
                        exit(1);
                    }
                };
            }

            match File::options().append(true).create(true).open(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    eprintln!("Could not setup logging: {e}");
                    exit(1);
                }
            }
        }
    };

    tracing_init(directive, logfile);

    if rotation.shifted {
        info!("old log files have rotated");
    }

    if let Some(moved_to) = &rotation.moved_to {
        info!("last log file moved to {}", moved_to.display());
    }

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("could not load configuration: {e}");
            exit(1);
        }
    };

    let scripts =
        ScriptDir::new(&args.scripts).with_timeout(Duration::from_secs(args.script_timeout));

    if args.syntax {
        match config.validate(&scripts) {
            Ok(()) => {
                println!("Syntax check: OK");
                return;
            }
            Err(e) => {
                error!("{e}");
                exit(2);
            }
        }
    } else if !args.no_syntax_check {
        if let Err(e) = config.validate(&scripts) {
            error!("{e}");
            exit(2);
        }
    }

    info!(
        "dynhostd v{} started, updating every {} second(s)",
        env!("CARGO_PKG_VERSION"),
        config.settings.update_delay_seconds
    );

    let service = DynHost::new(DYNHOST_SERVER);
    let mut daemon = Daemon::new(config, args.config, scripts, Box::new(service));

    daemon.run();
}
