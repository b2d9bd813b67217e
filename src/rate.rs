//! Tempo estimation from discrete strikes
//!
//! Keeps the last `window_size` strike timestamps and reports strikes per
//! minute over that window. A decay timer, re-armed on every strike, drops
//! the rate to zero once the player has been quiet for the quiet period.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::player::PlayerId;
use crate::timer::{TimerId, TimerKind, TimerQueue, TimerSlot};

pub const DEFAULT_WINDOW_SIZE: usize = 4;
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateError {
  #[error("Window of {ticks} ticks spans zero time")]
  DegenerateWindow { ticks: usize },
}

/// ---------------------------------------------------------------------------
/// Subscriptions
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type RateListener = Box<dyn FnMut(f64) + Send>;

#[derive(Default)]
struct Subscribers {
  next_id: u64,
  listeners: Vec<(SubscriptionId, RateListener)>,
}

impl Subscribers {
  fn add(&mut self, listener: RateListener) -> SubscriptionId {
    let id = SubscriptionId(self.next_id);
    self.next_id += 1;
    self.listeners.push((id, listener));
    id
  }

  fn remove(&mut self, id: SubscriptionId) -> bool {
    let before = self.listeners.len();
    self.listeners.retain(|(existing, _)| *existing != id);
    self.listeners.len() != before
  }

  fn notify(&mut self, rate: f64) {
    for (_, listener) in self.listeners.iter_mut() {
      listener(rate);
    }
  }
}

/// ---------------------------------------------------------------------------
/// Rate Estimator
/// ---------------------------------------------------------------------------

pub struct RateEstimator {
  player: PlayerId,
  window_size: usize,
  quiet_period: Duration,
  ticks: VecDeque<Duration>,
  rate: f64,
  decay: TimerSlot,
  subscribers: Subscribers,
}

impl RateEstimator {
  pub fn new(player: PlayerId, window_size: usize, quiet_period: Duration) -> Self {
    Self {
      player,
      window_size,
      quiet_period,
      ticks: VecDeque::with_capacity(window_size + 1),
      rate: 0.0,
      decay: TimerSlot::new(),
      subscribers: Subscribers::default(),
    }
  }

  /// Record one strike. Returns the new rate if it changed.
  ///
  /// A strike stamped before the newest recorded one is dropped: it does not
  /// enter the window and leaves the decay timer alone.
  pub fn tick(&mut self, at: Duration, timers: &mut TimerQueue<TimerKind>) -> Option<f64> {
    if let Some(&last) = self.ticks.back() {
      if at < last {
        warn!(player = %self.player, ?at, ?last, "Dropping out-of-order tick");
        return None;
      }
    }

    self.decay.cancel(timers);

    self.ticks.push_back(at);
    while self.ticks.len() > self.window_size {
      self.ticks.pop_front();
    }

    let rate = match self.compute_rate() {
      Ok(rate) => rate,
      Err(e) => {
        debug!(player = %self.player, error = %e, "Reporting zero rate");
        0.0
      }
    };
    let changed = self.set_rate(rate);

    self
      .decay
      .rearm(timers, at + self.quiet_period, TimerKind::Decay(self.player));

    changed
  }

  /// Handle this estimator's decay timer firing
  pub fn expire(&mut self, id: TimerId) -> Option<f64> {
    if !self.decay.settle(id) {
      return None;
    }
    debug!(player = %self.player, "No input for quiet period, rate decays to zero");
    self.set_rate(0.0)
  }

  /// Strikes per minute over the current window
  pub fn compute_rate(&self) -> Result<f64, RateError> {
    if self.ticks.len() < self.window_size {
      return Ok(0.0);
    }

    let (first, last) = match (self.ticks.front(), self.ticks.back()) {
      (Some(first), Some(last)) => (*first, *last),
      _ => return Ok(0.0),
    };

    let span = last.saturating_sub(first).as_secs_f64();
    if span <= 0.0 {
      return Err(RateError::DegenerateWindow {
        ticks: self.ticks.len(),
      });
    }

    Ok((self.ticks.len() - 1) as f64 / span * 60.0)
  }

  pub fn current_rate(&self) -> f64 {
    self.rate
  }

  pub fn tick_count(&self) -> usize {
    self.ticks.len()
  }

  pub fn window_size(&self) -> usize {
    self.window_size
  }

  pub fn decay_pending(&self) -> bool {
    self.decay.is_pending()
  }

  pub fn cancel_decay(&mut self, timers: &mut TimerQueue<TimerKind>) {
    self.decay.cancel(timers);
  }

  pub fn subscribe(&mut self, listener: impl FnMut(f64) + Send + 'static) -> SubscriptionId {
    self.subscribers.add(Box::new(listener))
  }

  pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
    self.subscribers.remove(id)
  }

  fn set_rate(&mut self, rate: f64) -> Option<f64> {
    if rate == self.rate {
      return None;
    }
    self.rate = rate;
    self.subscribers.notify(rate);
    Some(rate)
  }
}

impl fmt::Debug for RateEstimator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RateEstimator")
      .field("player", &self.player)
      .field("window_size", &self.window_size)
      .field("ticks", &self.ticks)
      .field("rate", &self.rate)
      .field("subscribers", &self.subscribers.listeners.len())
      .finish()
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
