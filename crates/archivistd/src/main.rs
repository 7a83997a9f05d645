//! Command line interface for the archivist watcher daemon.
//!
//! Provides the three-command surface spec.md §6 describes:
//! - `start` / `launcher`: smart idempotent starter, exits 0 if already running.
//! - `daemon`: direct foreground run, the same process `start` execs into.
//! - `stop`: sends SIGTERM to the PID file's process, escalating to SIGKILL.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon if not already running
//! archivistd start
//!
//! # Run in the foreground with verbose logging
//! archivistd daemon --debug
//!
//! # Stop a running daemon
//! archivistd stop
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::{style, Emoji};
use errors::ArchivistdErrors;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod approval;
pub mod daemon;
pub mod errors;
pub mod watcher;

static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✨ ", "");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "");

/// Command line interface configuration and argument parsing.
#[derive(Parser)]
#[command(author, version, about = "Watcher daemon for the archivist bibliographic ingestion pipeline")]
struct Cli {
  /// Path to the template configuration file.
  #[arg(long, global = true, default_value = "archivist.toml")]
  config: PathBuf,

  /// Path to the personal configuration overlay.
  #[arg(long, global = true, default_value = "archivist.local.toml")]
  local_config: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

/// Available commands for the CLI.
#[derive(Subcommand)]
enum Commands {
  /// Idempotent starter: exits 0 if an instance is already running locally,
  /// otherwise execs the foreground daemon.
  Start,

  /// Equivalent alias for `start`, kept for parity with launch scripts that
  /// expect a `launcher` entry point.
  Launcher,

  /// Runs the daemon in the foreground.
  Daemon {
    /// Enables verbose (debug-level) logging.
    #[arg(long)]
    debug: bool,
  },

  /// Sends SIGTERM to the running daemon and waits up to ~10s for it to
  /// exit before giving up.
  Stop,
}

/// Wires a rolling daily file layer alongside a plain stdout layer, the same
/// two-layer registry `learnerd::daemon::Daemon::start` builds, so output
/// survives the CLI's own stdout being swallowed (e.g. under systemd) while
/// still being visible to an interactive operator.
fn setup_logging(debug: bool, log_dir: &std::path::Path) -> Result<(), ArchivistdErrors> {
  let default_level = if debug { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  std::fs::create_dir_all(log_dir)?;
  let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
    .rotation(tracing_appender::rolling::Rotation::DAILY)
    .filename_prefix("archivistd")
    .filename_suffix("log")
    .build(log_dir)
    .map_err(|e| ArchivistdErrors::WatchDirInvalid(format!("cannot open log directory {}: {e}", log_dir.display())))?;

  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(file_appender)
    .with_ansi(false)
    .with_thread_ids(true)
    .with_target(true)
    .with_file(true)
    .with_line_number(true);
  let stdout_layer = tracing_subscriber::fmt::layer().with_ansi(true).with_target(true);

  tracing_subscriber::registry().with(file_layer).with(stdout_layer).with(filter).init();
  Ok(())
}

#[tokio::main]
async fn main() -> Result<std::process::ExitCode, ArchivistdErrors> {
  let cli = Cli::parse();

  match cli.command {
    Commands::Start | Commands::Launcher => run_start(&cli.config, &cli.local_config).await,
    Commands::Daemon { debug } => run_daemon(&cli.config, &cli.local_config, debug).await,
    Commands::Stop => run_stop(&cli.config, &cli.local_config).await,
  }
}

/// Loads the layered configuration. A misconfigured or unreadable watch
/// directory is a startup failure per spec.md §6's exit-code table.
fn load_config(config: &PathBuf, local_config: &PathBuf) -> Result<archivist::config::Config, ArchivistdErrors> {
  archivist::config::Config::load(config, local_config).map_err(Into::into)
}

async fn run_start(config_path: &PathBuf, local_config_path: &PathBuf) -> Result<std::process::ExitCode, ArchivistdErrors> {
  let config = load_config(config_path, local_config_path)?;
  let log_dir = config.paths.log_dir.clone();
  match daemon::Daemon::acquire(config).await {
    Ok(None) => {
      println!("{} Daemon already running, nothing to do", style("ℹ").blue());
      Ok(std::process::ExitCode::SUCCESS)
    },
    Ok(Some(running)) => {
      setup_logging(false, &log_dir)?;
      println!("{} Starting daemon...", style(ROCKET).cyan());
      run_until_shutdown(running).await
    },
    Err(ArchivistdErrors::RemoteSingletonActive(host)) => {
      eprintln!("{} A remote daemon at {host} already owns this store", style(WARNING).yellow());
      Ok(std::process::ExitCode::from(2))
    },
    Err(e) => {
      eprintln!("{} Failed to start: {e}", style(WARNING).yellow());
      Ok(std::process::ExitCode::FAILURE)
    },
  }
}

async fn run_daemon(config_path: &PathBuf, local_config_path: &PathBuf, debug: bool) -> Result<std::process::ExitCode, ArchivistdErrors> {
  let config = load_config(config_path, local_config_path)?;
  setup_logging(debug, &config.paths.log_dir)?;
  match daemon::Daemon::acquire(config).await {
    Ok(None) => {
      println!("{} Daemon already running, exiting cleanly", style("ℹ").blue());
      Ok(std::process::ExitCode::SUCCESS)
    },
    Ok(Some(running)) => run_until_shutdown(running).await,
    Err(ArchivistdErrors::RemoteSingletonActive(host)) => {
      eprintln!("{} A remote daemon at {host} already owns this store", style(WARNING).yellow());
      Ok(std::process::ExitCode::from(2))
    },
    Err(e) => {
      eprintln!("{} Failed to start: {e}", style(WARNING).yellow());
      Ok(std::process::ExitCode::FAILURE)
    },
  }
}

/// Runs `running` to completion, wiring SIGINT/SIGTERM into the cancellation
/// channel the daemon's poll loop watches between documents.
async fn run_until_shutdown(running: daemon::Daemon) -> Result<std::process::ExitCode, ArchivistdErrors> {
  let (tx, rx) = tokio::sync::watch::channel(false);

  tokio::spawn(async move {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(s) => s,
      Err(_) => return,
    };
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {},
      _ = sigterm.recv() => {},
    }
    let _ = tx.send(true);
  });

  match running.run(rx).await {
    Ok(()) => {
      println!("{} Shut down cleanly", style(SUCCESS).green());
      Ok(std::process::ExitCode::SUCCESS)
    },
    Err(e) => {
      eprintln!("{} Daemon exited with error: {e}", style(WARNING).yellow());
      Ok(std::process::ExitCode::FAILURE)
    },
  }
}

async fn run_stop(config_path: &PathBuf, local_config_path: &PathBuf) -> Result<std::process::ExitCode, ArchivistdErrors> {
  let config = load_config(config_path, local_config_path)?;
  let lockfile = config.paths.scanner_papers_dir.join(daemon::PID_FILE_NAME);
  let Ok(contents) = std::fs::read_to_string(&lockfile) else {
    println!("{} No running daemon found", style(WARNING).yellow());
    return Ok(std::process::ExitCode::SUCCESS);
  };
  let Ok(pid) = contents.trim().parse::<i32>() else {
    println!("{} PID file is unreadable, nothing to stop", style(WARNING).yellow());
    return Ok(std::process::ExitCode::SUCCESS);
  };

  println!("{} Stopping daemon (pid {pid})...", style(WARNING).yellow());
  daemon::send_sigterm(pid)?;

  for _ in 0..20 {
    if !lockfile.exists() {
      println!("{} Daemon stopped", style(SUCCESS).green());
      return Ok(std::process::ExitCode::SUCCESS);
    }
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
  }

  println!("{} Daemon did not exit in time, sending SIGKILL", style(WARNING).yellow());
  let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGKILL);
  let _ = std::fs::remove_file(&lockfile);
  Ok(std::process::ExitCode::SUCCESS)
}
