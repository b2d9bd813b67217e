//! Players and their input bindings
//!
//! A player strikes by alternating between two keys. The first bound key
//! pressed decides where the alternation starts; after that only the
//! expected key counts as a tick. Binding the same key twice gives
//! single-button mode, where every press counts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::rate::RateEstimator;
use crate::timer::{TimerKind, TimerQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub usize);

impl fmt::Display for PlayerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "P{}", self.0 + 1)
  }
}

/// Physical input, already translated out of the windowing/terminal layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKey {
  Left,
  Right,
  Up,
  Down,
  Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
  pub first: InputKey,
  pub second: InputKey,
}

impl KeyPair {
  pub fn new(first: InputKey, second: InputKey) -> Self {
    Self { first, second }
  }

  /// Single-button mode: both strikes on the same key
  pub fn single(key: InputKey) -> Self {
    Self { first: key, second: key }
  }

  pub fn contains(&self, key: InputKey) -> bool {
    self.first == key || self.second == key
  }

  fn index_of(&self, key: InputKey) -> Option<usize> {
    if self.first == key {
      Some(0)
    } else if self.second == key {
      Some(1)
    } else {
      None
    }
  }

  fn get(&self, index: usize) -> InputKey {
    if index == 0 {
      self.first
    } else {
      self.second
    }
  }
}

/// Default bindings, one pair per player slot
pub const DEFAULT_BINDINGS: [KeyPair; 4] = [
  KeyPair { first: InputKey::Left, second: InputKey::Right },
  KeyPair { first: InputKey::Up, second: InputKey::Down },
  KeyPair { first: InputKey::Char('a'), second: InputKey::Char('d') },
  KeyPair { first: InputKey::Char('j'), second: InputKey::Char('l') },
];

/// Bindings for `count` players, optionally collapsed to single-button mode
pub fn default_bindings(count: usize, single_button: bool) -> Vec<KeyPair> {
  DEFAULT_BINDINGS
    .iter()
    .take(count)
    .map(|pair| if single_button { KeyPair::single(pair.first) } else { *pair })
    .collect()
}

/// ---------------------------------------------------------------------------
/// Player
/// ---------------------------------------------------------------------------

pub struct Player {
  id: PlayerId,
  keys: KeyPair,
  next_key: Option<usize>,
  estimator: RateEstimator,
}

impl Player {
  pub fn new(id: PlayerId, keys: KeyPair, window_size: usize, quiet_period: Duration) -> Self {
    Self {
      id,
      keys,
      next_key: None,
      estimator: RateEstimator::new(id, window_size, quiet_period),
    }
  }

  pub fn id(&self) -> PlayerId {
    self.id
  }

  pub fn owns_key(&self, key: InputKey) -> bool {
    self.keys.contains(key)
  }

  /// Apply the alternation rule. Returns true when the press counts as a tick.
  pub fn accept_press(&mut self, key: InputKey) -> bool {
    let expected = match self.next_key {
      Some(index) => index,
      None => match self.keys.index_of(key) {
        Some(index) => index,
        None => return false,
      },
    };

    if self.keys.get(expected) == key {
      self.next_key = Some(1 - expected);
      true
    } else {
      false
    }
  }

  /// Record a strike at `at`. Returns the new rate if it changed.
  pub fn strike(&mut self, at: Duration, timers: &mut TimerQueue<TimerKind>) -> Option<f64> {
    self.estimator.tick(at, timers)
  }

  pub fn estimator(&self) -> &RateEstimator {
    &self.estimator
  }

  pub fn estimator_mut(&mut self) -> &mut RateEstimator {
    &mut self.estimator
  }
}

impl fmt::Debug for Player {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Player")
      .field("id", &self.id)
      .field("keys", &self.keys)
      .field("rate", &self.estimator.current_rate())
      .finish()
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  fn player(keys: KeyPair) -> Player {
    Player::new(PlayerId(0), keys, 4, Duration::from_secs(2))
  }

  #[test]
  fn test_alternation_starts_from_first_pressed_key() {
    let mut p = player(KeyPair::new(InputKey::Left, InputKey::Right));

    assert!(p.accept_press(InputKey::Right));
    assert!(!p.accept_press(InputKey::Right));
    assert!(p.accept_press(InputKey::Left));
    assert!(p.accept_press(InputKey::Right));
  }

  #[test]
  fn test_unbound_keys_never_count() {
    let mut p = player(KeyPair::new(InputKey::Left, InputKey::Right));

    assert!(!p.accept_press(InputKey::Up));
    assert!(!p.accept_press(InputKey::Char('x')));
    // Alternation has not started yet, so either bound key may open it
    assert!(p.accept_press(InputKey::Left));
  }

  #[test]
  fn test_single_button_mode_counts_every_press() {
    let mut p = player(KeyPair::single(InputKey::Char(' ')));

    for _ in 0..5 {
      assert!(p.accept_press(InputKey::Char(' ')));
    }
  }

  #[test]
  fn test_default_bindings_single_button() {
    let bindings = default_bindings(2, true);

    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings[0], KeyPair::single(InputKey::Left));
    assert_eq!(bindings[1], KeyPair::single(InputKey::Up));
  }

  #[test]
  fn test_player_id_display_is_one_based() {
    assert_eq!(PlayerId(0).to_string(), "P1");
    assert_eq!(PlayerId(1).to_string(), "P2");
  }
}
