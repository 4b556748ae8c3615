//! autorestart daemon - daily restart scheduler
//!
//! Standalone front end for the restart engine. It has no game sessions of
//! its own: at the configured time it sends a signal to the process whose PID
//! is stored in `host.pid_file`, and re-arms for the next day.
//!
//! # Usage
//!
//! ```bash
//! # Run in the foreground with the default configuration file
//! autorestartd run
//!
//! # Run in the background with an explicit configuration
//! autorestartd run -d -c /etc/autorestart.toml
//!
//! # When is the next restart?
//! autorestartd next --json
//!
//! # Validate a configuration file
//! autorestartd check -c /etc/autorestart.toml
//!
//! # Stop the running daemon
//! autorestartd stop
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use autorestart_core::RestartConfig;
use autorestartd::clock::{Clock, SystemClock};
use autorestartd::engine::{spawn_engine, EngineEvent, EngineHandle};
use autorestartd::host::SignalHost;

/// autorestart daemon - restarts a server process at a fixed time every day
#[derive(Parser, Debug)]
#[command(name = "autorestartd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler
    Run {
        /// Configuration file (defaults to $XDG_CONFIG_HOME/autorestart/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// Print the next restart time
    Next {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("autorestart")
        .join("config.toml")
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("autorestart")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("autorestartd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("autorestartd.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

/// Loads the configuration.
///
/// A missing file at the default location yields the defaults; an explicit
/// path must exist.
fn load_config(explicit: Option<&Path>) -> Result<(RestartConfig, PathBuf)> {
    match explicit {
        Some(path) => {
            let config = RestartConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            Ok((config, path.to_path_buf()))
        }
        None => {
            let path = default_config_path();
            if !path.exists() {
                return Ok((RestartConfig::default(), path));
            }
            let config = RestartConfig::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            Ok((config, path))
        }
    }
}

#[derive(Debug, Serialize)]
struct NextRestart {
    restart_time: String,
    restart_at: NaiveDateTime,
    seconds_remaining: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Run {
        config: None,
        daemon: false,
    });

    match command {
        Command::Run { config, daemon } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'autorestartd stop' to stop it first.");
                process::exit(1);
            }

            // Fail before forking so configuration errors reach the terminal
            let (restart_config, config_path) = load_config(config.as_deref())?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(restart_config, config_path);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
        Command::Next { config, json } => {
            let (restart_config, _) = load_config(config.as_deref())?;
            let calculator = restart_config
                .calculator()
                .context("Cannot calculate the next restart")?;

            let now = SystemClock.now();
            let next = NextRestart {
                restart_time: calculator.restart_time().to_string(),
                restart_at: calculator.next_occurrence(now),
                seconds_remaining: calculator.until_next(now).as_secs(),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&next)?);
            } else {
                println!(
                    "{} (in {})",
                    next.restart_at,
                    restart_config.messages.countdown(
                        autorestart_core::Countdown::from_remaining(calculator.until_next(now))
                    )
                );
            }
            Ok(())
        }
        Command::Check { config } => {
            let (restart_config, path) = load_config(config.as_deref())?;
            let issues = restart_config.validate();

            if issues.is_empty() {
                println!("{}: OK", path.display());
                return Ok(());
            }

            for issue in &issues {
                eprintln!("{}: {issue}", path.display());
            }
            process::exit(1);
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: RestartConfig, config_path: PathBuf) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("autorestartd=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        config = %config_path.display(),
        "autorestart daemon starting"
    );

    for issue in config.validate() {
        warn!(issue = %issue, "Configuration problem");
    }

    let host = SignalHost::from_config(&config.host).context("Invalid [host] configuration")?;
    if config.host.pid_file.is_none() {
        warn!("No host.pid_file configured, restarts will only be logged");
    }

    let engine = spawn_engine(config, host, SystemClock);
    let cancel_token = CancellationToken::new();

    tokio::spawn(log_events(engine.clone(), cancel_token.clone()));

    if let Err(e) = wait_for_signals(&engine, &config_path).await {
        error!(error = %e, "Error waiting for signals");
    }

    cancel_token.cancel();
    if let Err(e) = engine.unload().await {
        warn!(error = %e, "Engine already stopped");
    }

    info!("autorestart daemon stopped");
    Ok(())
}

/// Reloads on SIGHUP until SIGINT or SIGTERM arrives.
async fn wait_for_signals(engine: &EngineHandle, config_path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    return Ok(());
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                    return Ok(());
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    reload(engine, config_path).await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (engine, config_path);
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        Ok(())
    }
}

async fn reload(engine: &EngineHandle, config_path: &Path) {
    let config = match RestartConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to reload configuration, keeping the current one");
            return;
        }
    };

    match engine.reload_config(config).await {
        Ok(report) => info!(
            rescheduled = report.rescheduled,
            next_restart = ?report.next_restart,
            "Configuration reloaded"
        ),
        Err(e) => error!(error = %e, "Failed to apply configuration"),
    }
}

async fn log_events(engine: EngineHandle, cancel_token: CancellationToken) {
    let mut rx = engine.subscribe();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = rx.recv() => match event {
                Ok(EngineEvent::Terminated { cause }) => {
                    info!(cause = %cause, "Restart signal issued");
                }
                Ok(event) => debug!(event = ?event, "Engine event"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log lagged behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
