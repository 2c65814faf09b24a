mod app;
mod cache;
mod commands;
mod config;
mod error;
mod event;
mod posts;
mod query;
mod session;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cache::{CacheStorage, NoopStorage, SqliteStorage};
use crate::commands::{Args, Command};
use crate::config::Config;
use crate::posts::cache::feed_scope;
use crate::session::{Session, SessionStore, User};

/// Environment variable holding the log filter (e.g. "pinfeed=debug")
const LOG_ENV: &str = "PINFEED_LOG";

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // Logs go to a file; stdout is for command output
  let _guard = init_logging()?;

  // Load configuration; session commands work without a post service
  let config = Config::load(args.config.as_deref(), args.api_url.as_deref())?;
  let store = SessionStore::new(config.session_path()?);

  if args.command.is_session_command() {
    run_session_command(&store, args.command)?;
    return Ok(ExitCode::SUCCESS);
  }

  let api_url = config.api_url()?.to_string();
  let session = store.load();
  tracing::info!(api = %api_url, user = ?session.current_user(), "starting");

  if config.cache.enabled {
    let storage = SqliteStorage::open(&config.cache_path()?, &feed_scope(&api_url))?;
    run(config, session, storage, args.command).await
  } else {
    run(config, session, NoopStorage, args.command).await
  }
}

fn init_logging() -> Result<WorkerGuard> {
  let log_dir = Config::data_dir()?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&log_dir, "pinfeed.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
  fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

async fn run<S: CacheStorage>(
  config: Config,
  session: Session,
  storage: S,
  command: Command,
) -> Result<ExitCode> {
  let mut app = app::App::new(config, session, storage, std::io::stdout())?;

  match app.run(command).await {
    Ok(()) => Ok(ExitCode::SUCCESS),
    Err(e) => {
      tracing::warn!(error = %e, retryable = e.is_retryable(), "command failed");
      eprintln!("{}", e.friendly_message());
      Ok(ExitCode::FAILURE)
    }
  }
}

fn run_session_command(store: &SessionStore, command: Command) -> Result<()> {
  let mut out = std::io::stdout();
  match command {
    Command::Login { username, email } => {
      let session = store.login(User { username, email })?;
      writeln!(
        out,
        "Logged in as {}",
        session.current_user().unwrap_or_default()
      )?;
    }
    Command::Logout => {
      store.logout()?;
      writeln!(out, "Logged out")?;
    }
    Command::Whoami => match store.load().user() {
      Some(user) => match &user.email {
        Some(email) => writeln!(out, "{} <{}>", user.username, email)?,
        None => writeln!(out, "{}", user.username)?,
      },
      None => writeln!(out, "Not logged in")?,
    },
    other => return Err(eyre!("{:?} is not a session command", other)),
  }
  Ok(())
}
