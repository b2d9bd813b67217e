use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use workout_coach_lib::config::{CliOverrides, EventFormat};
use workout_coach_lib::AppConfig;

#[derive(Parser, Debug)]
#[command(
  name = "workout-coach",
  about = "Rhythm workout coach",
  long_about = "Alternate your keys in time with the coach. Flags override COACH_* environment variables."
)]
struct Args {
  /// Number of players (1-4)
  #[arg(long, short = 'p')]
  players: Option<usize>,

  /// JSON workout plan to run instead of the built-in one
  #[arg(long)]
  plan: Option<PathBuf>,

  /// Every press of a player's first key counts (`--single-button=false` turns it off)
  #[arg(long, num_args = 0..=1, default_missing_value = "true")]
  single_button: Option<bool>,

  /// Output format: tui or json
  #[arg(long)]
  events: Option<EventFormat>,

  /// Write logs to this file instead of the default location
  #[arg(long)]
  log_file: Option<PathBuf>,
}

impl Args {
  fn overrides(self) -> CliOverrides {
    CliOverrides {
      players: self.players,
      plan_path: self.plan,
      single_button: self.single_button,
      event_format: self.events,
      log_file: self.log_file,
    }
  }
}

fn init_logging(config: &AppConfig) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  let writer = match config.log_destination() {
    None => BoxMakeWriter::new(std::io::stderr),
    Some(path) => match OpenOptions::new().create(true).append(true).open(&path) {
      Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
      Err(e) => {
        // Anything written to the terminal would land on the text screen
        eprintln!("Logging disabled, cannot open {}: {}", path.display(), e);
        BoxMakeWriter::new(std::io::sink)
      }
    },
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(config.log_destination().is_none())
    .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
  // Load environment variables from .env file
  dotenvy::dotenv().ok();

  let args = Args::parse();
  let config = match AppConfig::from_env().and_then(|c| c.with_overrides(args.overrides())) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{}", e);
      return ExitCode::FAILURE;
    }
  };
  init_logging(&config);

  match workout_coach_lib::run(config).await {
    Ok(history) => {
      for result in &history {
        for card in &result.scores {
          println!("{}  {}  {}", result.title, card.player, card.label);
        }
      }
      ExitCode::SUCCESS
    }
    Err(e) => {
      error!(error = %e, "Session failed");
      eprintln!("{}", e);
      ExitCode::FAILURE
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_single_button_flag_forms() {
    let args = Args::try_parse_from(["workout-coach", "--single-button"]).unwrap();
    assert_eq!(args.overrides().single_button, Some(true));

    let args = Args::try_parse_from(["workout-coach", "--single-button=false"]).unwrap();
    assert_eq!(args.overrides().single_button, Some(false));

    let args = Args::try_parse_from(["workout-coach"]).unwrap();
    assert_eq!(args.overrides(), CliOverrides::default());
  }

  #[test]
  fn test_flags_map_to_overrides() {
    let args = Args::try_parse_from([
      "workout-coach",
      "-p",
      "3",
      "--plan",
      "plans/sprint.json",
      "--events",
      "json",
    ])
    .unwrap();

    let overrides = args.overrides();
    assert_eq!(overrides.players, Some(3));
    assert_eq!(overrides.plan_path, Some(PathBuf::from("plans/sprint.json")));
    assert_eq!(overrides.event_format, Some(EventFormat::Json));
  }
}
