//! Coaching policy: live rate vs. target band
//!
//! Every coaching round classifies the current rate into exactly one of
//! TooSlow / TooFast / InRange. No verdict is carried between rounds; the
//! only state is the per-kind warning rotation and the in-range counter.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::config::{ConfigError, PhaseConfig};

/// ---------------------------------------------------------------------------
/// Target Band
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetBand {
  pub min_rate: f64,
  pub max_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  TooSlow,
  TooFast,
  InRange,
}

impl TargetBand {
  pub fn new(min_rate: f64, max_rate: f64) -> Self {
    Self { min_rate, max_rate }
  }

  /// Both bounds are inclusive
  pub fn classify(&self, rate: f64) -> Verdict {
    if rate < self.min_rate {
      Verdict::TooSlow
    } else if rate > self.max_rate {
      Verdict::TooFast
    } else {
      Verdict::InRange
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let ordered = self.min_rate.is_finite()
      && self.max_rate.is_finite()
      && self.min_rate >= 0.0
      && self.min_rate <= self.max_rate;
    if ordered {
      Ok(())
    } else {
      Err(ConfigError::InvalidBand {
        min: self.min_rate,
        max: self.max_rate,
      })
    }
  }
}

/// ---------------------------------------------------------------------------
/// Feedback
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Warning,
  Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackEvent {
  pub message: String,
  pub severity: Severity,
  pub is_in_range: bool,
  pub verdict: Verdict,
}

/// ---------------------------------------------------------------------------
/// Message Rotation
/// ---------------------------------------------------------------------------

/// Non-empty round-robin queue of messages
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRotation {
  queue: VecDeque<String>,
}

impl MessageRotation {
  pub fn new(messages: Vec<String>, name: &'static str) -> Result<Self, ConfigError> {
    if messages.is_empty() {
      return Err(ConfigError::EmptyList(name));
    }
    Ok(Self {
      queue: messages.into(),
    })
  }

  /// Return the head and move it to the tail
  pub fn take(&mut self) -> String {
    let head = self.queue.front().cloned().unwrap_or_default();
    self.queue.rotate_left(1);
    head
  }

  pub fn peek(&self) -> Option<&str> {
    self.queue.front().map(String::as_str)
  }

  pub fn messages(&self) -> impl Iterator<Item = &str> {
    self.queue.iter().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }
}

/// ---------------------------------------------------------------------------
/// Coach Policy
/// ---------------------------------------------------------------------------

pub trait CoachPolicy {
  /// Classify `rate`, rotating the matching warning queue or counting an
  /// in-range round.
  fn evaluate(&mut self, rate: f64) -> FeedbackEvent;

  fn in_range_count(&self) -> u32;

  fn band(&self) -> TargetBand;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachKind {
  /// Only the lower bound is coached
  WarmUp,
  #[default]
  TargetBand,
}

/// Shared state of every coach variant
#[derive(Debug, Clone)]
struct Rounds {
  band: TargetBand,
  slow_warnings: MessageRotation,
  fast_warnings: MessageRotation,
  in_range_message: String,
  in_range_count: u32,
}

impl Rounds {
  fn from_config(config: &PhaseConfig) -> Result<Self, ConfigError> {
    Ok(Self {
      band: config.target_band,
      slow_warnings: MessageRotation::new(config.slow_warnings.clone(), "slow_warnings")?,
      fast_warnings: MessageRotation::new(config.fast_warnings.clone(), "fast_warnings")?,
      in_range_message: config.in_range_message.clone(),
      in_range_count: 0,
    })
  }

  fn respond(&mut self, verdict: Verdict) -> FeedbackEvent {
    let (message, severity) = match verdict {
      Verdict::TooSlow => (self.slow_warnings.take(), Severity::Warning),
      Verdict::TooFast => (self.fast_warnings.take(), Severity::Warning),
      Verdict::InRange => {
        self.in_range_count += 1;
        (self.in_range_message.clone(), Severity::Neutral)
      }
    };

    FeedbackEvent {
      message,
      severity,
      is_in_range: verdict == Verdict::InRange,
      verdict,
    }
  }
}

/// Full three-way coaching against the band
#[derive(Debug, Clone)]
pub struct BandCoach {
  rounds: Rounds,
}

impl CoachPolicy for BandCoach {
  fn evaluate(&mut self, rate: f64) -> FeedbackEvent {
    let verdict = self.rounds.band.classify(rate);
    debug!(rate, ?verdict, "Band coach verdict");
    self.rounds.respond(verdict)
  }

  fn in_range_count(&self) -> u32 {
    self.rounds.in_range_count
  }

  fn band(&self) -> TargetBand {
    self.rounds.band
  }
}

/// Warm-up coaching: only pushes the player up to the lower bound
#[derive(Debug, Clone)]
pub struct WarmUpCoach {
  rounds: Rounds,
}

impl CoachPolicy for WarmUpCoach {
  fn evaluate(&mut self, rate: f64) -> FeedbackEvent {
    let verdict = match self.rounds.band.classify(rate) {
      Verdict::TooSlow => Verdict::TooSlow,
      _ => Verdict::InRange,
    };
    debug!(rate, ?verdict, "Warm-up coach verdict");
    self.rounds.respond(verdict)
  }

  fn in_range_count(&self) -> u32 {
    self.rounds.in_range_count
  }

  fn band(&self) -> TargetBand {
    self.rounds.band
  }
}

#[derive(Debug, Clone)]
pub enum Coach {
  WarmUp(WarmUpCoach),
  TargetBand(BandCoach),
}

impl Coach {
  pub fn from_config(config: &PhaseConfig) -> Result<Self, ConfigError> {
    let rounds = Rounds::from_config(config)?;
    Ok(match config.coach {
      CoachKind::WarmUp => Coach::WarmUp(WarmUpCoach { rounds }),
      CoachKind::TargetBand => Coach::TargetBand(BandCoach { rounds }),
    })
  }

  pub fn kind(&self) -> CoachKind {
    match self {
      Coach::WarmUp(_) => CoachKind::WarmUp,
      Coach::TargetBand(_) => CoachKind::TargetBand,
    }
  }

  fn rounds(&self) -> &Rounds {
    match self {
      Coach::WarmUp(c) => &c.rounds,
      Coach::TargetBand(c) => &c.rounds,
    }
  }

  pub fn slow_warnings(&self) -> &MessageRotation {
    &self.rounds().slow_warnings
  }

  pub fn fast_warnings(&self) -> &MessageRotation {
    &self.rounds().fast_warnings
  }
}

impl CoachPolicy for Coach {
  fn evaluate(&mut self, rate: f64) -> FeedbackEvent {
    match self {
      Coach::WarmUp(c) => c.evaluate(rate),
      Coach::TargetBand(c) => c.evaluate(rate),
    }
  }

  fn in_range_count(&self) -> u32 {
    self.rounds().in_range_count
  }

  fn band(&self) -> TargetBand {
    self.rounds().band
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::mock_phase_config;

  fn band_coach(min: f64, max: f64) -> Coach {
    Coach::from_config(&mock_phase_config(min, max)).unwrap()
  }

  fn snapshot(rotation: &MessageRotation) -> Vec<String> {
    rotation.messages().map(str::to_string).collect()
  }

  #[test]
  fn test_band_classification_edges() {
    let band = TargetBand::new(120.0, 140.0);

    assert_eq!(band.classify(119.9), Verdict::TooSlow);
    assert_eq!(band.classify(120.0), Verdict::InRange);
    assert_eq!(band.classify(140.0), Verdict::InRange);
    assert_eq!(band.classify(140.1), Verdict::TooFast);
    assert_eq!(band.classify(0.0), Verdict::TooSlow);
  }

  #[test]
  fn test_band_validation() {
    assert!(TargetBand::new(80.0, 100.0).validate().is_ok());
    assert!(TargetBand::new(100.0, 100.0).validate().is_ok());
    assert!(TargetBand::new(100.0, 80.0).validate().is_err());
    assert!(TargetBand::new(-1.0, 80.0).validate().is_err());
    assert!(TargetBand::new(f64::NAN, 80.0).validate().is_err());
  }

  #[test]
  fn test_coach_reports_its_band() {
    let coach = band_coach(120.0, 140.0);
    assert_eq!(coach.band(), TargetBand::new(120.0, 140.0));
    assert_eq!(coach.kind(), CoachKind::TargetBand);
  }

  #[test]
  fn test_too_fast_uses_fast_queue_head() {
    let mut coach = band_coach(120.0, 140.0);
    let slow_before = snapshot(coach.slow_warnings());

    let feedback = coach.evaluate(150.0);

    assert_eq!(feedback.severity, Severity::Warning);
    assert_eq!(feedback.message, "SLOW DOWN");
    assert_eq!(feedback.verdict, Verdict::TooFast);
    assert!(!feedback.is_in_range);
    assert_eq!(coach.in_range_count(), 0);
    assert_eq!(snapshot(coach.slow_warnings()), slow_before);
    assert_eq!(coach.fast_warnings().peek(), Some("EASY"));
  }

  #[test]
  fn test_slow_warnings_rotate_without_repeats() {
    let mut coach = band_coach(120.0, 140.0);

    let messages: Vec<String> = (0..4).map(|_| coach.evaluate(10.0).message).collect();

    assert_eq!(
      messages,
      vec!["FASTER", "ARE YOU KIDDING ME", "MORE ENERGY", "FASTER"]
    );
    for pair in messages.windows(2) {
      assert_ne!(pair[0], pair[1]);
    }
  }

  #[test]
  fn test_in_range_counts_and_leaves_queues() {
    let mut coach = band_coach(120.0, 140.0);
    let slow_before = snapshot(coach.slow_warnings());
    let fast_before = snapshot(coach.fast_warnings());

    for expected in 1..=5 {
      let feedback = coach.evaluate(130.0);
      assert_eq!(feedback.message, "PERFECT");
      assert_eq!(feedback.severity, Severity::Neutral);
      assert!(feedback.is_in_range);
      assert_eq!(coach.in_range_count(), expected);
    }

    assert_eq!(snapshot(coach.slow_warnings()), slow_before);
    assert_eq!(snapshot(coach.fast_warnings()), fast_before);
  }

  #[test]
  fn test_rotation_returns_to_original_order() {
    let messages: Vec<String> = ["ONE", "TWO", "THREE", "FOUR", "FIVE"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    let mut rotation = MessageRotation::new(messages.clone(), "test").unwrap();

    for _ in 0..rotation.len() {
      rotation.take();
    }

    assert_eq!(snapshot(&rotation), messages);
  }

  #[test]
  fn test_single_message_rotation_repeats() {
    let mut rotation = MessageRotation::new(vec!["GO".to_string()], "test").unwrap();

    assert_eq!(rotation.take(), "GO");
    assert_eq!(rotation.take(), "GO");
  }

  #[test]
  fn test_empty_rotation_rejected() {
    let result = MessageRotation::new(Vec::new(), "fast_warnings");
    assert!(matches!(result, Err(ConfigError::EmptyList("fast_warnings"))));
  }

  #[test]
  fn test_warm_up_ignores_upper_bound() {
    let mut config = mock_phase_config(80.0, 100.0);
    config.coach = CoachKind::WarmUp;
    let mut coach = Coach::from_config(&config).unwrap();
    let fast_before = snapshot(coach.fast_warnings());

    let fast = coach.evaluate(180.0);
    let slow = coach.evaluate(50.0);

    assert_eq!(coach.kind(), CoachKind::WarmUp);
    assert!(fast.is_in_range);
    assert_eq!(slow.verdict, Verdict::TooSlow);
    assert_eq!(slow.message, "FASTER");
    assert_eq!(coach.in_range_count(), 1);
    assert_eq!(snapshot(coach.fast_warnings()), fast_before);
  }
}
