//! Serializable workout plans
//!
//! A plan is the ordered list of screens the session walks through: text
//! screens between workouts, and workout phases. Durations are written as
//! seconds; everything except the band has a default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::coach::{CoachKind, TargetBand};
use crate::config::{
  default_fast_warnings, default_in_range_message, default_score_labels, default_slow_warnings,
  positive_secs, ConfigError, PhaseConfig, DEFAULT_COACHING_INTERVAL, DEFAULT_FEEDBACK_DISPLAY,
  DEFAULT_PROGRESS_INTERVAL, DEFAULT_TOTAL_DURATION,
};
use crate::rate::{DEFAULT_QUIET_PERIOD, DEFAULT_WINDOW_SIZE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPlan {
  pub steps: Vec<StepDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepDef {
  Text { message: String },
  Workout(PhaseDef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDef {
  pub title: String,
  #[serde(default)]
  pub coach: CoachKind,
  pub min_rate: f64,
  pub max_rate: f64,
  #[serde(default = "default_total_secs")]
  pub total_duration_secs: f64,
  #[serde(default = "default_interval_secs")]
  pub coaching_interval_secs: f64,
  #[serde(default = "default_window_size")]
  pub window_size: usize,
  #[serde(default = "default_quiet_secs")]
  pub decay_quiet_period_secs: f64,
  #[serde(default = "default_display_secs")]
  pub feedback_display_secs: f64,
  #[serde(default = "default_progress_secs")]
  pub progress_interval_secs: f64,
  #[serde(default = "default_score_labels")]
  pub score_labels: Vec<String>,
  #[serde(default = "default_slow_warnings")]
  pub slow_warnings: Vec<String>,
  #[serde(default = "default_fast_warnings")]
  pub fast_warnings: Vec<String>,
  #[serde(default = "default_in_range_message")]
  pub in_range_message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub soundtrack: Option<String>,
}

fn default_total_secs() -> f64 {
  DEFAULT_TOTAL_DURATION.as_secs_f64()
}

fn default_interval_secs() -> f64 {
  DEFAULT_COACHING_INTERVAL.as_secs_f64()
}

fn default_window_size() -> usize {
  DEFAULT_WINDOW_SIZE
}

fn default_quiet_secs() -> f64 {
  DEFAULT_QUIET_PERIOD.as_secs_f64()
}

fn default_display_secs() -> f64 {
  DEFAULT_FEEDBACK_DISPLAY.as_secs_f64()
}

fn default_progress_secs() -> f64 {
  DEFAULT_PROGRESS_INTERVAL.as_secs_f64()
}

impl PhaseDef {
  pub fn new(title: &str, min_rate: f64, max_rate: f64) -> Self {
    Self {
      title: title.to_string(),
      coach: CoachKind::default(),
      min_rate,
      max_rate,
      total_duration_secs: default_total_secs(),
      coaching_interval_secs: default_interval_secs(),
      window_size: default_window_size(),
      decay_quiet_period_secs: default_quiet_secs(),
      feedback_display_secs: default_display_secs(),
      progress_interval_secs: default_progress_secs(),
      score_labels: default_score_labels(),
      slow_warnings: default_slow_warnings(),
      fast_warnings: default_fast_warnings(),
      in_range_message: default_in_range_message(),
      soundtrack: None,
    }
  }

  fn with_soundtrack(mut self, soundtrack: &str) -> Self {
    self.soundtrack = Some(soundtrack.to_string());
    self
  }

  /// Build and validate the runtime phase configuration
  pub fn to_config(&self) -> Result<PhaseConfig, ConfigError> {
    let config = PhaseConfig {
      title: self.title.clone(),
      coach: self.coach,
      target_band: TargetBand::new(self.min_rate, self.max_rate),
      total_duration: positive_secs(self.total_duration_secs, "total_duration")?,
      coaching_interval: positive_secs(self.coaching_interval_secs, "coaching_interval")?,
      window_size: self.window_size,
      decay_quiet_period: positive_secs(self.decay_quiet_period_secs, "decay_quiet_period")?,
      feedback_display: positive_secs(self.feedback_display_secs, "feedback_display")?,
      progress_interval: positive_secs(self.progress_interval_secs, "progress_interval")?,
      score_labels: self.score_labels.clone(),
      slow_warnings: self.slow_warnings.clone(),
      fast_warnings: self.fast_warnings.clone(),
      in_range_message: self.in_range_message.clone(),
      soundtrack: self.soundtrack.clone(),
    };
    config.validate()?;
    Ok(config)
  }
}

fn text(message: &str) -> StepDef {
  StepDef::Text {
    message: message.to_string(),
  }
}

impl WorkoutPlan {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::PlanParse(e.to_string()))
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let json = fs::read_to_string(path).map_err(|e| ConfigError::PlanRead {
      path: path.display().to_string(),
      reason: e.to_string(),
    })?;
    Self::from_json(&json)
  }

  pub fn to_json(&self) -> String {
    serde_json::to_string_pretty(self).unwrap_or_default()
  }

  /// The stock routine: warm-up, then two levels of increasing tempo
  pub fn default_plan() -> Self {
    Self {
      steps: vec![
        text("WORKOUT"),
        text("HELLO\nMY NAME IS ARNOLD"),
        text("I AM YOUR INSTRUCTOR"),
        text("WARM UP\n80-100 BPM"),
        StepDef::Workout(PhaseDef::new("WARM UP", 80.0, 100.0).with_soundtrack("sound/loop90.wav")),
        text("ALL RIGHT\nNOW LETS GET SERIOUS"),
        text("LEVEL 1\n120-140 BPM"),
        StepDef::Workout(PhaseDef::new("LEVEL 1", 120.0, 140.0).with_soundtrack("sound/loop130.wav")),
        text("COME ON\nMORE ENERGY"),
        text("LEVEL 2\nOVER 200 BPM"),
        StepDef::Workout(PhaseDef::new("LEVEL 2", 200.0, 1000.0).with_soundtrack("sound/loop220.wav")),
        text("NOW TAKE A SHOWER"),
      ],
    }
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
