//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Time helpers
//! - Mock configuration factories
//! - Scheduler fixtures and event draining
//! - Helper assertions

use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::coach::TargetBand;
use crate::config::PhaseConfig;
use crate::models::{CoachEvent, EventSink};
use crate::phase::PhaseScheduler;
use crate::player::{default_bindings, PlayerId};

/// Strike period giving roughly 130 strikes per minute over a 4-tick window
pub const STEADY_130_BPM_MS: u64 = 461;

/// ---------------------------------------------------------------------------
/// Time Helpers
/// ---------------------------------------------------------------------------

pub fn ms(millis: u64) -> Duration {
  Duration::from_millis(millis)
}

pub fn secs(seconds: f64) -> Duration {
  Duration::from_secs_f64(seconds)
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

pub fn default_labels() -> Vec<String> {
  crate::config::default_score_labels()
}

/// A 30s phase with a 4s coaching interval and the stock messages
pub fn mock_phase_config(min_rate: f64, max_rate: f64) -> PhaseConfig {
  PhaseConfig::new("LEVEL", TargetBand::new(min_rate, max_rate))
}

/// Scheduler for `players` players on the default bindings
pub fn mock_scheduler(
  config: PhaseConfig,
  players: usize,
) -> (PhaseScheduler, UnboundedReceiver<CoachEvent>) {
  let (sink, rx) = EventSink::channel();
  let scheduler = PhaseScheduler::new(config, &default_bindings(players, false), sink)
    .expect("Failed to build mock scheduler");
  (scheduler, rx)
}

/// ---------------------------------------------------------------------------
/// Driving Helpers
/// ---------------------------------------------------------------------------

/// Everything emitted since the last drain
pub fn drain_events(rx: &mut UnboundedReceiver<CoachEvent>) -> Vec<CoachEvent> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}

/// Strike every `period_ms` in `[from_ms, until_ms)`, letting timers fire
/// before each strike the way a real event loop would
pub fn strike_steadily(
  scheduler: &mut PhaseScheduler,
  player: PlayerId,
  from_ms: u64,
  until_ms: u64,
  period_ms: u64,
) {
  let mut t = from_ms;
  while t < until_ms {
    scheduler.advance_to(ms(t));
    scheduler.input_down(player, ms(t));
    t += period_ms;
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mock_factories_create_valid_data() {
    let config = mock_phase_config(120.0, 140.0);
    assert!(config.validate().is_ok());
    assert_eq!(default_labels().len(), 4);

    let (scheduler, _rx) = mock_scheduler(config, 2);
    assert_eq!(scheduler.phase().player_count(), 2);
  }

  #[test]
  fn test_steady_period_is_inside_level_one_band() {
    let span = 3.0 * STEADY_130_BPM_MS as f64 / 1000.0;
    let rate = 3.0 / span * 60.0;
    assert!((120.0..=140.0).contains(&rate), "rate {}", rate);
  }

  #[test]
  fn test_strike_steadily_respects_bounds() {
    let (mut scheduler, mut rx) = mock_scheduler(mock_phase_config(120.0, 140.0), 1);
    scheduler.start(ms(0)).unwrap();
    drain_events(&mut rx);

    strike_steadily(&mut scheduler, PlayerId(0), 0, 1_000, 250);

    let beats = drain_events(&mut rx)
      .into_iter()
      .filter(|e| matches!(e, CoachEvent::Beat { .. }))
      .count();
    assert_eq!(beats, 4);
  }
}
