//! Configuration for workout phases and the application
//!
//! Phase configuration is validated once, before a phase is allowed to
//! start. Application settings come from the environment (a `.env` file is
//! honoured) and can be overridden on the command line.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::coach::{CoachKind, TargetBand};
use crate::player::DEFAULT_BINDINGS;
use crate::rate::{DEFAULT_QUIET_PERIOD, DEFAULT_WINDOW_SIZE};

/// ---------------------------------------------------------------------------
/// Defaults
/// ---------------------------------------------------------------------------

pub const DEFAULT_TOTAL_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_COACHING_INTERVAL: Duration = Duration::from_secs(4);
pub const DEFAULT_FEEDBACK_DISPLAY: Duration = Duration::from_secs(1);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_PLAYERS: usize = 2;
pub const DEFAULT_LOG_FILE: &str = "workout-coach.log";

pub fn default_score_labels() -> Vec<String> {
  to_strings(&["LOSER", "OK", "GREAT", "AWESOME"])
}

pub fn default_slow_warnings() -> Vec<String> {
  to_strings(&["FASTER", "ARE YOU KIDDING ME", "MORE ENERGY"])
}

pub fn default_fast_warnings() -> Vec<String> {
  to_strings(&["SLOW DOWN", "EASY"])
}

pub fn default_in_range_message() -> String {
  "PERFECT".to_string()
}

fn to_strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("{0} must be a positive duration")]
  NonPositiveDuration(&'static str),

  #[error("Coaching interval {interval:?} exceeds total duration {total:?}")]
  IntervalExceedsDuration { interval: Duration, total: Duration },

  #[error("Window size must be at least 2, got {0}")]
  WindowTooSmall(usize),

  #[error("{0} must not be empty")]
  EmptyList(&'static str),

  #[error("Invalid target band: min {min}, max {max}")]
  InvalidBand { min: f64, max: f64 },

  #[error("Player count must be between 1 and {max}, got {requested}")]
  PlayerCount { requested: usize, max: usize },

  #[error("Workout plan has no steps")]
  EmptyPlan,

  #[error("Invalid value for {var}: {reason}")]
  InvalidEnv { var: String, reason: String },

  #[error("Failed to read plan {path}: {reason}")]
  PlanRead { path: String, reason: String },

  #[error("Failed to parse plan: {0}")]
  PlanParse(String),
}

/// ---------------------------------------------------------------------------
/// Phase Configuration
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseConfig {
  pub title: String,
  pub coach: CoachKind,
  pub target_band: TargetBand,
  pub total_duration: Duration,
  pub coaching_interval: Duration,
  pub window_size: usize,
  pub decay_quiet_period: Duration,
  /// How long a feedback message stays visible
  pub feedback_display: Duration,
  pub progress_interval: Duration,
  pub score_labels: Vec<String>,
  pub slow_warnings: Vec<String>,
  pub fast_warnings: Vec<String>,
  pub in_range_message: String,
  /// Audio loop for the presentation layer; never interpreted here
  pub soundtrack: Option<String>,
}

impl PhaseConfig {
  /// A phase with the stock durations, labels and messages
  pub fn new(title: impl Into<String>, target_band: TargetBand) -> Self {
    Self {
      title: title.into(),
      coach: CoachKind::default(),
      target_band,
      total_duration: DEFAULT_TOTAL_DURATION,
      coaching_interval: DEFAULT_COACHING_INTERVAL,
      window_size: DEFAULT_WINDOW_SIZE,
      decay_quiet_period: DEFAULT_QUIET_PERIOD,
      feedback_display: DEFAULT_FEEDBACK_DISPLAY,
      progress_interval: DEFAULT_PROGRESS_INTERVAL,
      score_labels: default_score_labels(),
      slow_warnings: default_slow_warnings(),
      fast_warnings: default_fast_warnings(),
      in_range_message: default_in_range_message(),
      soundtrack: None,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.target_band.validate()?;

    for (name, value) in [
      ("total_duration", self.total_duration),
      ("coaching_interval", self.coaching_interval),
      ("decay_quiet_period", self.decay_quiet_period),
      ("feedback_display", self.feedback_display),
      ("progress_interval", self.progress_interval),
    ] {
      if value.is_zero() {
        return Err(ConfigError::NonPositiveDuration(name));
      }
    }

    if self.coaching_interval > self.total_duration {
      return Err(ConfigError::IntervalExceedsDuration {
        interval: self.coaching_interval,
        total: self.total_duration,
      });
    }

    if self.window_size < 2 {
      return Err(ConfigError::WindowTooSmall(self.window_size));
    }

    for (name, list) in [
      ("score_labels", &self.score_labels),
      ("slow_warnings", &self.slow_warnings),
      ("fast_warnings", &self.fast_warnings),
    ] {
      if list.is_empty() {
        return Err(ConfigError::EmptyList(name));
      }
    }

    Ok(())
  }
}

/// Convert a seconds field into a strictly positive `Duration`
pub fn positive_secs(secs: f64, field: &'static str) -> Result<Duration, ConfigError> {
  match Duration::try_from_secs_f64(secs) {
    Ok(d) if !d.is_zero() => Ok(d),
    _ => Err(ConfigError::NonPositiveDuration(field)),
  }
}

/// ---------------------------------------------------------------------------
/// Application Configuration
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFormat {
  /// Full-screen terminal rendering
  #[default]
  Tui,
  /// One JSON object per event on stdout
  Json,
}

impl std::str::FromStr for EventFormat {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "tui" => Ok(Self::Tui),
      "json" => Ok(Self::Json),
      _ => Err(format!("Unknown event format: {}", s)),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
  pub players: usize,
  pub plan_path: Option<PathBuf>,
  pub single_button: bool,
  pub event_format: EventFormat,
  pub log_file: Option<PathBuf>,
}

/// Command-line values; each one set takes precedence over the environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
  pub players: Option<usize>,
  pub plan_path: Option<PathBuf>,
  pub single_button: Option<bool>,
  pub event_format: Option<EventFormat>,
  pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      players: DEFAULT_PLAYERS,
      plan_path: None,
      single_button: false,
      event_format: EventFormat::default(),
      log_file: None,
    }
  }
}

impl AppConfig {
  /// Read `COACH_*` variables, falling back to defaults for unset ones
  pub fn from_env() -> Result<Self, ConfigError> {
    let defaults = Self::default();

    let players = match env::var("COACH_PLAYERS") {
      Ok(raw) => raw.trim().parse::<usize>().map_err(|e| ConfigError::InvalidEnv {
        var: "COACH_PLAYERS".into(),
        reason: e.to_string(),
      })?,
      Err(_) => defaults.players,
    };

    let plan_path = env::var("COACH_PLAN")
      .ok()
      .filter(|p| !p.trim().is_empty())
      .map(PathBuf::from);

    let single_button = match env::var("COACH_SINGLE_BUTTON") {
      Ok(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidEnv {
        var: "COACH_SINGLE_BUTTON".into(),
        reason: format!("expected true/false, got {}", raw),
      })?,
      Err(_) => defaults.single_button,
    };

    let event_format = match env::var("COACH_EVENT_FORMAT") {
      Ok(raw) => raw.parse().map_err(|reason| ConfigError::InvalidEnv {
        var: "COACH_EVENT_FORMAT".into(),
        reason,
      })?,
      Err(_) => defaults.event_format,
    };

    let log_file = env::var("COACH_LOG_FILE")
      .ok()
      .filter(|p| !p.trim().is_empty())
      .map(PathBuf::from);

    let config = Self {
      players,
      plan_path,
      single_button,
      event_format,
      log_file,
    };
    config.validate()?;
    Ok(config)
  }

  pub fn with_overrides(mut self, overrides: CliOverrides) -> Result<Self, ConfigError> {
    if let Some(players) = overrides.players {
      self.players = players;
    }
    if let Some(path) = overrides.plan_path {
      self.plan_path = Some(path);
    }
    if let Some(single_button) = overrides.single_button {
      self.single_button = single_button;
    }
    if let Some(format) = overrides.event_format {
      self.event_format = format;
    }
    if let Some(path) = overrides.log_file {
      self.log_file = Some(path);
    }
    self.validate()?;
    Ok(self)
  }

  /// File that receives log output, or `None` for stderr.
  ///
  /// The text screen owns the terminal, so it always logs to a file.
  pub fn log_destination(&self) -> Option<PathBuf> {
    match (&self.log_file, self.event_format) {
      (Some(path), _) => Some(path.clone()),
      (None, EventFormat::Tui) => Some(env::temp_dir().join(DEFAULT_LOG_FILE)),
      (None, EventFormat::Json) => None,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let max = DEFAULT_BINDINGS.len();
    if self.players == 0 || self.players > max {
      return Err(ConfigError::PlayerCount {
        requested: self.players,
        max,
      });
    }
    Ok(())
  }
}

fn parse_bool(raw: &str) -> Option<bool> {
  match raw.trim().to_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "0" | "false" | "no" | "off" => Some(false),
    _ => None,
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  fn valid() -> PhaseConfig {
    PhaseConfig::new("LEVEL 1", TargetBand::new(120.0, 140.0))
  }

  #[test]
  fn test_stock_phase_is_valid() {
    assert_eq!(valid().validate(), Ok(()));
  }

  #[test]
  fn test_zero_duration_rejected() {
    let mut config = valid();
    config.total_duration = Duration::ZERO;
    assert_eq!(
      config.validate(),
      Err(ConfigError::NonPositiveDuration("total_duration"))
    );

    let mut config = valid();
    config.decay_quiet_period = Duration::ZERO;
    assert_eq!(
      config.validate(),
      Err(ConfigError::NonPositiveDuration("decay_quiet_period"))
    );
  }

  #[test]
  fn test_interval_longer_than_phase_rejected() {
    let mut config = valid();
    config.coaching_interval = Duration::from_secs(31);
    assert!(matches!(
      config.validate(),
      Err(ConfigError::IntervalExceedsDuration { .. })
    ));

    // Equal is allowed
    config.coaching_interval = Duration::from_secs(30);
    assert_eq!(config.validate(), Ok(()));
  }

  #[test]
  fn test_window_and_lists_validated() {
    let mut config = valid();
    config.window_size = 1;
    assert_eq!(config.validate(), Err(ConfigError::WindowTooSmall(1)));

    let mut config = valid();
    config.score_labels.clear();
    assert_eq!(config.validate(), Err(ConfigError::EmptyList("score_labels")));

    let mut config = valid();
    config.fast_warnings.clear();
    assert_eq!(config.validate(), Err(ConfigError::EmptyList("fast_warnings")));
  }

  #[test]
  fn test_positive_secs() {
    assert_eq!(positive_secs(1.5, "x"), Ok(Duration::from_millis(1500)));
    assert!(positive_secs(0.0, "x").is_err());
    assert!(positive_secs(-2.0, "x").is_err());
    assert!(positive_secs(f64::NAN, "x").is_err());
  }

  #[test]
  #[serial]
  fn test_from_env_defaults() {
    temp_env::with_vars_unset(
      [
        "COACH_PLAYERS",
        "COACH_PLAN",
        "COACH_SINGLE_BUTTON",
        "COACH_EVENT_FORMAT",
        "COACH_LOG_FILE",
      ],
      || {
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config, AppConfig::default());
      },
    );
  }

  #[test]
  #[serial]
  fn test_from_env_overrides() {
    temp_env::with_vars(
      [
        ("COACH_PLAYERS", Some("1")),
        ("COACH_PLAN", Some("plans/intervals.json")),
        ("COACH_SINGLE_BUTTON", Some("yes")),
        ("COACH_EVENT_FORMAT", Some("JSON")),
        ("COACH_LOG_FILE", Some("/tmp/coach.log")),
      ],
      || {
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.players, 1);
        assert_eq!(config.plan_path, Some(PathBuf::from("plans/intervals.json")));
        assert!(config.single_button);
        assert_eq!(config.event_format, EventFormat::Json);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/coach.log")));
      },
    );
  }

  #[test]
  #[serial]
  fn test_from_env_rejects_bad_values() {
    temp_env::with_var("COACH_PLAYERS", Some("two"), || {
      assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::InvalidEnv { ref var, .. }) if var == "COACH_PLAYERS"
      ));
    });

    temp_env::with_var("COACH_PLAYERS", Some("9"), || {
      assert_eq!(
        AppConfig::from_env(),
        Err(ConfigError::PlayerCount { requested: 9, max: 4 })
      );
    });

    temp_env::with_var("COACH_SINGLE_BUTTON", Some("maybe"), || {
      assert!(AppConfig::from_env().is_err());
    });
  }

  #[test]
  #[serial]
  fn test_cli_switches_single_button_off() {
    temp_env::with_var("COACH_SINGLE_BUTTON", Some("true"), || {
      let env_config = AppConfig::from_env().unwrap();
      assert!(env_config.single_button);

      let config = env_config
        .with_overrides(CliOverrides {
          single_button: Some(false),
          ..CliOverrides::default()
        })
        .unwrap();
      assert!(!config.single_button);
    });
  }

  #[test]
  fn test_unset_overrides_keep_environment_values() {
    let base = AppConfig {
      players: 3,
      plan_path: Some(PathBuf::from("plan.json")),
      single_button: true,
      event_format: EventFormat::Json,
      log_file: None,
    };

    let config = base.clone().with_overrides(CliOverrides::default()).unwrap();
    assert_eq!(config, base);

    let config = base
      .with_overrides(CliOverrides {
        players: Some(1),
        event_format: Some(EventFormat::Tui),
        ..CliOverrides::default()
      })
      .unwrap();
    assert_eq!(config.players, 1);
    assert_eq!(config.event_format, EventFormat::Tui);
    assert!(config.single_button);
  }

  #[test]
  fn test_overrides_are_validated() {
    let result = AppConfig::default().with_overrides(CliOverrides {
      players: Some(0),
      ..CliOverrides::default()
    });
    assert_eq!(result, Err(ConfigError::PlayerCount { requested: 0, max: 4 }));
  }

  #[test]
  fn test_text_screen_never_logs_to_terminal() {
    let tui = AppConfig::default();
    assert_eq!(
      tui.log_destination(),
      Some(env::temp_dir().join(DEFAULT_LOG_FILE))
    );

    let json = AppConfig {
      event_format: EventFormat::Json,
      ..AppConfig::default()
    };
    assert_eq!(json.log_destination(), None);

    let explicit = AppConfig {
      event_format: EventFormat::Json,
      log_file: Some(PathBuf::from("coach.log")),
      ..AppConfig::default()
    };
    assert_eq!(explicit.log_destination(), Some(PathBuf::from("coach.log")));
  }
}
