use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use mihrab::{app, config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mihrab")]
#[command(about = "Offline-first prayer times companion for the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/mihrab/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Location slug to use (overrides the config file)
  #[arg(short, long)]
  location: Option<String>,

  /// Print a single resolution and exit instead of running the tick loop
  #[arg(long)]
  once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let _log_guard = init_tracing()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override location if specified on command line
  let config = if let Some(location) = args.location {
    config::Config {
      provider: config::ProviderConfig {
        location,
        ..config.provider
      },
      ..config
    }
  } else {
    config
  };

  let mut app = app::App::new(config)?;

  if args.once {
    println!("{}", app.resolve_once().await?);
    return Ok(());
  }

  app.run().await
}

/// Log to a file under the data directory; stdout stays reserved for the
/// status line.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("mihrab");

  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::never(log_dir, "mihrab.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("MIHRAB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
