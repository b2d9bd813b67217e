//! Score accumulation and the final score band
//!
//! The tally of in-range coaching rounds is mapped onto an ordered list of
//! labels with integer (floor) division:
//! `index = min(len - 1, (len - 1) * in_range / max_possible)`.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::player::PlayerId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
  #[error("Score already finalized as {label}")]
  AlreadyFinalized { label: String },

  #[error("No score labels configured")]
  NoLabels,
}

/// Final score for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreCard {
  pub player: PlayerId,
  pub label: String,
  pub in_range_count: u32,
  pub max_possible_count: u32,
}

/// Coaching rounds that fit into a phase
pub fn max_possible_count(total: Duration, interval: Duration) -> u32 {
  if interval.is_zero() {
    return 0;
  }
  let rounds = total.as_nanos() / interval.as_nanos();
  u32::try_from(rounds).unwrap_or(u32::MAX)
}

/// Pick the label for `in_range` out of `max_possible`
pub fn score_index(in_range: u32, max_possible: u32, label_count: usize) -> usize {
  if label_count == 0 || max_possible == 0 {
    return 0;
  }
  let top = label_count as u64 - 1;
  let index = top * u64::from(in_range) / u64::from(max_possible);
  index.min(top) as usize
}

#[derive(Debug, Clone, Default)]
pub struct ScoreAccumulator {
  in_range: u32,
  finalized: Option<String>,
}

impl ScoreAccumulator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record_in_range(&mut self) {
    if let Some(label) = &self.finalized {
      warn!(%label, "In-range round recorded after finalization, ignoring");
      return;
    }
    self.in_range += 1;
  }

  pub fn in_range_count(&self) -> u32 {
    self.in_range
  }

  pub fn label(&self) -> Option<&str> {
    self.finalized.as_deref()
  }

  /// Map the tally to its label. May only succeed once.
  pub fn finalize(
    &mut self,
    total: Duration,
    interval: Duration,
    labels: &[String],
  ) -> Result<String, ScoreError> {
    if let Some(label) = &self.finalized {
      return Err(ScoreError::AlreadyFinalized {
        label: label.clone(),
      });
    }
    if labels.is_empty() {
      return Err(ScoreError::NoLabels);
    }

    let max_possible = max_possible_count(total, interval);
    let label = labels[score_index(self.in_range, max_possible, labels.len())].clone();
    self.finalized = Some(label.clone());
    Ok(label)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
