//! Workout phase scheduling
//!
//! A `PhaseScheduler` owns one `WorkoutPhase` and every timer that belongs to
//! it. Lifecycle: Idle -> Running -> Completed. Starting arms the coaching
//! tick, the progress tick and the completion deadline; completing (by the
//! deadline or by an abort) cancels every timer, finalizes each player's
//! score exactly once and publishes the results.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::coach::{Coach, CoachPolicy};
use crate::config::{ConfigError, PhaseConfig};
use crate::models::{CoachEvent, EventSink};
use crate::player::{InputKey, KeyPair, Player, PlayerId, DEFAULT_BINDINGS};
use crate::score::{max_possible_count, ScoreAccumulator, ScoreCard, ScoreError};
use crate::timer::{FiredTimer, TimerKind, TimerQueue, TimerSlot};

/// ---------------------------------------------------------------------------
/// Errors and State
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhaseError {
  #[error("Phase is not idle")]
  NotIdle,

  #[error("Phase has not started")]
  NotStarted,

  #[error("Phase already completed")]
  AlreadyCompleted,

  #[error("Score error: {0}")]
  Score(#[from] ScoreError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseState {
  Idle,
  Running { started_at: Duration },
  Completed { at: Duration, aborted: bool },
}

/// ---------------------------------------------------------------------------
/// Workout Phase: configuration + per-player coaching state
/// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Lane {
  player: Player,
  coach: Coach,
  score: ScoreAccumulator,
  hide: TimerSlot,
}

#[derive(Debug)]
pub struct WorkoutPhase {
  config: PhaseConfig,
  lanes: Vec<Lane>,
}

impl WorkoutPhase {
  pub fn new(config: PhaseConfig, bindings: &[KeyPair]) -> Result<Self, ConfigError> {
    config.validate()?;
    if bindings.is_empty() || bindings.len() > DEFAULT_BINDINGS.len() {
      return Err(ConfigError::PlayerCount {
        requested: bindings.len(),
        max: DEFAULT_BINDINGS.len(),
      });
    }

    let lanes = bindings
      .iter()
      .enumerate()
      .map(|(i, keys)| {
        Ok(Lane {
          player: Player::new(PlayerId(i), *keys, config.window_size, config.decay_quiet_period),
          coach: Coach::from_config(&config)?,
          score: ScoreAccumulator::new(),
          hide: TimerSlot::new(),
        })
      })
      .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(Self { config, lanes })
  }

  pub fn config(&self) -> &PhaseConfig {
    &self.config
  }

  pub fn player_count(&self) -> usize {
    self.lanes.len()
  }

  pub fn max_possible_count(&self) -> u32 {
    max_possible_count(self.config.total_duration, self.config.coaching_interval)
  }
}

/// ---------------------------------------------------------------------------
/// Phase Scheduler
/// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PhaseScheduler {
  phase: WorkoutPhase,
  state: PhaseState,
  timers: TimerQueue<TimerKind>,
  coaching: TimerSlot,
  completion: TimerSlot,
  progress: TimerSlot,
  events: EventSink,
  rounds: u32,
  scores: Vec<ScoreCard>,
}

impl PhaseScheduler {
  pub fn new(config: PhaseConfig, bindings: &[KeyPair], events: EventSink) -> Result<Self, ConfigError> {
    let mut phase = WorkoutPhase::new(config, bindings)?;
    for lane in phase.lanes.iter_mut() {
      let listener = events.rate_listener(lane.player.id());
      lane.player.estimator_mut().subscribe(listener);
    }

    Ok(Self {
      phase,
      state: PhaseState::Idle,
      timers: TimerQueue::new(),
      coaching: TimerSlot::new(),
      completion: TimerSlot::new(),
      progress: TimerSlot::new(),
      events,
      rounds: 0,
      scores: Vec::new(),
    })
  }

  pub fn start(&mut self, now: Duration) -> Result<(), PhaseError> {
    if self.state != PhaseState::Idle {
      return Err(PhaseError::NotIdle);
    }
    self.state = PhaseState::Running { started_at: now };

    let config = &self.phase.config;
    info!(
      title = %config.title,
      min = config.target_band.min_rate,
      max = config.target_band.max_rate,
      players = self.phase.lanes.len(),
      "Phase started"
    );
    self.events.emit(CoachEvent::PhaseStarted {
      title: config.title.clone(),
      min_rate: config.target_band.min_rate,
      max_rate: config.target_band.max_rate,
      total_duration_secs: config.total_duration.as_secs_f64(),
      soundtrack: config.soundtrack.clone(),
    });
    self.events.emit(CoachEvent::Progress { fraction: 0.0 });

    let (interval, total, progress) = (
      config.coaching_interval,
      config.total_duration,
      config.progress_interval,
    );
    self
      .coaching
      .rearm(&mut self.timers, now + interval, TimerKind::CoachingTick);
    self
      .completion
      .rearm(&mut self.timers, now + total, TimerKind::Completion);
    if progress < total {
      self
        .progress
        .rearm(&mut self.timers, now + progress, TimerKind::Progress);
    }

    Ok(())
  }

  /// ---------------------------------------------------------------------------
  /// Input
  /// ---------------------------------------------------------------------------

  /// Route a raw key press. Returns the player whose strike it counted as.
  pub fn key_down(&mut self, key: InputKey, now: Duration) -> Option<PlayerId> {
    if !self.is_running() {
      return None;
    }
    let index = self.phase.lanes.iter().position(|l| l.player.owns_key(key))?;
    if !self.phase.lanes[index].player.accept_press(key) {
      debug!(?key, "Press out of alternation, ignored");
      return None;
    }
    self.strike(index, now);
    Some(PlayerId(index))
  }

  pub fn key_up(&mut self, key: InputKey) -> Option<PlayerId> {
    if !self.is_running() {
      return None;
    }
    let player = self
      .phase
      .lanes
      .iter()
      .find(|l| l.player.owns_key(key))
      .map(|l| l.player.id())?;
    self.events.emit(CoachEvent::Released { player });
    Some(player)
  }

  /// A strike already routed to `player` by the presentation layer
  pub fn input_down(&mut self, player: PlayerId, now: Duration) -> bool {
    if !self.is_running() || player.0 >= self.phase.lanes.len() {
      return false;
    }
    self.strike(player.0, now);
    true
  }

  pub fn input_up(&mut self, player: PlayerId) -> bool {
    if !self.is_running() || player.0 >= self.phase.lanes.len() {
      return false;
    }
    self.events.emit(CoachEvent::Released { player });
    true
  }

  fn strike(&mut self, index: usize, now: Duration) {
    let lane = &mut self.phase.lanes[index];
    self.events.emit(CoachEvent::Beat {
      player: lane.player.id(),
    });
    lane.player.strike(now, &mut self.timers);
  }

  /// ---------------------------------------------------------------------------
  /// Timers
  /// ---------------------------------------------------------------------------

  /// Fire every timer due at or before `now`, earliest first
  pub fn advance_to(&mut self, now: Duration) {
    while let Some(fired) = self.timers.pop_due(now) {
      self.fire(fired);
    }
  }

  pub fn next_deadline(&self) -> Option<Duration> {
    self.timers.next_deadline()
  }

  fn fire(&mut self, fired: FiredTimer<TimerKind>) {
    match fired.kind {
      TimerKind::Decay(player) => {
        if let Some(lane) = self.phase.lanes.get_mut(player.0) {
          lane.player.estimator_mut().expire(fired.id);
        }
      }
      TimerKind::Hide(player) => {
        let owned = self
          .phase
          .lanes
          .get_mut(player.0)
          .is_some_and(|lane| lane.hide.settle(fired.id));
        if owned {
          self.events.emit(CoachEvent::FeedbackHidden { player });
        }
      }
      TimerKind::Progress => {
        if self.progress.settle(fired.id) {
          self.progress_round(fired.due);
        }
      }
      TimerKind::CoachingTick => {
        if self.coaching.settle(fired.id) {
          self.coaching_round(fired.due);
        }
      }
      TimerKind::Completion => {
        if self.completion.settle(fired.id) {
          if let Err(e) = self.finish(fired.due, false) {
            warn!(error = %e, "Completion timer could not finish phase");
          }
        }
      }
    }
  }

  fn progress_round(&mut self, at: Duration) {
    let PhaseState::Running { started_at } = self.state else {
      return;
    };
    self.events.emit(CoachEvent::Progress {
      fraction: self.fraction_at(at),
    });

    let next = at + self.phase.config.progress_interval;
    if next < started_at + self.phase.config.total_duration {
      self.progress.rearm(&mut self.timers, next, TimerKind::Progress);
    }
  }

  fn coaching_round(&mut self, at: Duration) {
    if !self.is_running() {
      return;
    }
    self.rounds += 1;
    self.events.emit(CoachEvent::Instructing { tick: self.rounds });

    let display = self.phase.config.feedback_display;
    for lane in self.phase.lanes.iter_mut() {
      let player = lane.player.id();
      let rate = lane.player.estimator().current_rate();
      let feedback = lane.coach.evaluate(rate);
      if feedback.is_in_range {
        lane.score.record_in_range();
      }
      let band = lane.coach.band();
      debug!(
        %player,
        rate,
        min = band.min_rate,
        max = band.max_rate,
        message = %feedback.message,
        "Coaching feedback"
      );

      self.events.emit(CoachEvent::Feedback {
        player,
        message: feedback.message,
        severity: feedback.severity,
        in_range: feedback.is_in_range,
      });
      lane
        .hide
        .rearm(&mut self.timers, at + display, TimerKind::Hide(player));
    }

    let next = at + self.phase.config.coaching_interval;
    self
      .coaching
      .rearm(&mut self.timers, next, TimerKind::CoachingTick);
  }

  /// ---------------------------------------------------------------------------
  /// Completion
  /// ---------------------------------------------------------------------------

  /// Finish the phase normally
  pub fn complete(&mut self, now: Duration) -> Result<Vec<ScoreCard>, PhaseError> {
    self.finish(now, false)
  }

  /// Finish the phase early
  pub fn abort(&mut self, now: Duration) -> Result<Vec<ScoreCard>, PhaseError> {
    self.finish(now, true)
  }

  fn finish(&mut self, at: Duration, aborted: bool) -> Result<Vec<ScoreCard>, PhaseError> {
    match self.state {
      PhaseState::Idle => return Err(PhaseError::NotStarted),
      PhaseState::Completed { .. } => {
        warn!(title = %self.phase.config.title, "Phase completion requested twice");
        return Err(PhaseError::AlreadyCompleted);
      }
      PhaseState::Running { .. } => {}
    }
    let fraction = self.fraction_at(at);
    self.state = PhaseState::Completed { at, aborted };

    self.coaching.cancel(&mut self.timers);
    self.completion.cancel(&mut self.timers);
    self.progress.cancel(&mut self.timers);
    for lane in self.phase.lanes.iter_mut() {
      lane.player.estimator_mut().cancel_decay(&mut self.timers);
      lane.hide.cancel(&mut self.timers);
    }
    debug_assert!(self.timers.is_empty());

    self.events.emit(CoachEvent::Progress { fraction });

    let max_possible = self.phase.max_possible_count();
    let config = &self.phase.config;
    let mut cards = Vec::with_capacity(self.phase.lanes.len());
    for lane in self.phase.lanes.iter_mut() {
      let label = lane.score.finalize(
        config.total_duration,
        config.coaching_interval,
        &config.score_labels,
      )?;
      cards.push(ScoreCard {
        player: lane.player.id(),
        label,
        in_range_count: lane.score.in_range_count(),
        max_possible_count: max_possible,
      });
    }

    for card in &cards {
      info!(
        player = %card.player,
        label = %card.label,
        in_range = card.in_range_count,
        max_possible = card.max_possible_count,
        aborted,
        "Phase completed"
      );
      self.events.emit(CoachEvent::PhaseCompleted {
        player: card.player,
        score_label: card.label.clone(),
        in_range_count: card.in_range_count,
        max_possible_count: card.max_possible_count,
      });
    }

    self.scores = cards.clone();
    Ok(cards)
  }

  fn fraction_at(&self, at: Duration) -> f64 {
    match self.state {
      PhaseState::Running { started_at } => {
        let elapsed = at.saturating_sub(started_at).as_secs_f64();
        (elapsed / self.phase.config.total_duration.as_secs_f64()).clamp(0.0, 1.0)
      }
      PhaseState::Completed { .. } => 1.0,
      PhaseState::Idle => 0.0,
    }
  }

  /// ---------------------------------------------------------------------------
  /// Accessors
  /// ---------------------------------------------------------------------------

  pub fn state(&self) -> PhaseState {
    self.state
  }

  pub fn is_running(&self) -> bool {
    matches!(self.state, PhaseState::Running { .. })
  }

  pub fn is_completed(&self) -> bool {
    matches!(self.state, PhaseState::Completed { .. })
  }

  pub fn phase(&self) -> &WorkoutPhase {
    &self.phase
  }

  pub fn config(&self) -> &PhaseConfig {
    &self.phase.config
  }

  /// Coaching rounds evaluated so far
  pub fn rounds(&self) -> u32 {
    self.rounds
  }

  pub fn scores(&self) -> &[ScoreCard] {
    &self.scores
  }

  pub fn rate(&self, player: PlayerId) -> Option<f64> {
    self
      .phase
      .lanes
      .get(player.0)
      .map(|l| l.player.estimator().current_rate())
  }

  pub fn in_range_count(&self, player: PlayerId) -> Option<u32> {
    self.phase.lanes.get(player.0).map(|l| l.coach.in_range_count())
  }

  pub fn pending_timers(&self) -> usize {
    self.timers.len()
  }

  pub fn pending_hide_timers(&self, player: PlayerId) -> usize {
    self
      .timers
      .count_where(|kind| *kind == TimerKind::Hide(player))
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
