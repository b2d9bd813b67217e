//! Workout Session
//!
//! Walks an ordered list of steps with an explicit cursor. Text steps are
//! screens the player reads before pressing on; workout steps build a fresh
//! `PhaseScheduler` on entry and drop it when the session moves on. The
//! cursor wraps back to the first step after the last.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, PhaseConfig};
use crate::models::{CoachEvent, EventSink, StepDef, StepView, WorkoutPlan};
use crate::phase::{PhaseError, PhaseScheduler, PhaseState};
use crate::player::{InputKey, KeyPair, PlayerId, DEFAULT_BINDINGS};
use crate::score::ScoreCard;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
  #[error("Configuration error: {0}")]
  Config(#[from] ConfigError),

  #[error("Phase error: {0}")]
  Phase(#[from] PhaseError),

  #[error("Session already started")]
  AlreadyStarted,

  #[error("No workout phase is active")]
  NoActivePhase,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
  Text(String),
  Workout(PhaseConfig),
}

impl Step {
  fn from_def(def: &StepDef) -> Result<Self, ConfigError> {
    match def {
      StepDef::Text { message } => Ok(Self::Text(message.clone())),
      StepDef::Workout(phase) => Ok(Self::Workout(phase.to_config()?)),
    }
  }

  pub fn view(&self) -> StepView {
    match self {
      Self::Text(message) => StepView::Text {
        message: message.clone(),
      },
      Self::Workout(config) => StepView::Workout {
        title: config.title.clone(),
      },
    }
  }
}

/// Outcome of one finished workout phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseResult {
  pub title: String,
  pub completed_at: DateTime<Utc>,
  pub aborted: bool,
  pub scores: Vec<ScoreCard>,
}

/// ---------------------------------------------------------------------------
/// Session
/// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct WorkoutSession {
  steps: Vec<Step>,
  cursor: usize,
  started: bool,
  bindings: Vec<KeyPair>,
  events: EventSink,
  active: Option<PhaseScheduler>,
  recorded: bool,
  history: Vec<PhaseResult>,
}

impl WorkoutSession {
  /// Validate every step of `plan` up front; an invalid plan never starts
  pub fn new(plan: &WorkoutPlan, bindings: Vec<KeyPair>, events: EventSink) -> Result<Self, SessionError> {
    if plan.steps.is_empty() {
      return Err(ConfigError::EmptyPlan.into());
    }
    if bindings.is_empty() || bindings.len() > DEFAULT_BINDINGS.len() {
      return Err(
        ConfigError::PlayerCount {
          requested: bindings.len(),
          max: DEFAULT_BINDINGS.len(),
        }
        .into(),
      );
    }

    let steps = plan
      .steps
      .iter()
      .map(Step::from_def)
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self {
      steps,
      cursor: 0,
      started: false,
      bindings,
      events,
      active: None,
      recorded: false,
      history: Vec::new(),
    })
  }

  /// Enter the first step
  pub fn start(&mut self, now: Duration) -> Result<(), SessionError> {
    if self.started {
      return Err(SessionError::AlreadyStarted);
    }
    self.started = true;
    self.enter(0, now)
  }

  /// Move to the next step, wrapping after the last. Returns false while a
  /// workout phase is still running.
  pub fn request_advance(&mut self, now: Duration) -> Result<bool, SessionError> {
    if !self.started {
      self.start(now)?;
      return Ok(true);
    }
    self.advance_to(now);
    if self.is_phase_running() {
      debug!(cursor = self.cursor, "Advance refused while phase is running");
      return Ok(false);
    }

    let next = (self.cursor + 1) % self.steps.len();
    self.enter(next, now)?;
    Ok(true)
  }

  /// Finish the running phase early
  pub fn abort_phase(&mut self, now: Duration) -> Result<Vec<ScoreCard>, SessionError> {
    self.advance_to(now);
    let scheduler = self.active.as_mut().ok_or(SessionError::NoActivePhase)?;
    let cards = scheduler.abort(now)?;
    self.record_result();
    Ok(cards)
  }

  fn enter(&mut self, index: usize, now: Duration) -> Result<(), SessionError> {
    self.active = None;
    self.recorded = false;
    self.cursor = index;

    let step = &self.steps[index];
    info!(index, step = ?step.view(), "Entering step");
    self.events.emit(CoachEvent::StepEntered {
      index,
      step: step.view(),
    });

    if let Step::Workout(config) = step {
      let mut scheduler = PhaseScheduler::new(config.clone(), &self.bindings, self.events.clone())?;
      scheduler.start(now)?;
      self.active = Some(scheduler);
    }
    Ok(())
  }

  fn record_result(&mut self) {
    if self.recorded {
      return;
    }
    let Some(scheduler) = self.active.as_ref() else {
      return;
    };
    let PhaseState::Completed { aborted, .. } = scheduler.state() else {
      return;
    };

    self.history.push(PhaseResult {
      title: scheduler.config().title.clone(),
      completed_at: Utc::now(),
      aborted,
      scores: scheduler.scores().to_vec(),
    });
    self.recorded = true;
  }

  /// ---------------------------------------------------------------------------
  /// Input and timers, forwarded to the active phase
  /// ---------------------------------------------------------------------------

  pub fn key_down(&mut self, key: InputKey, now: Duration) -> Option<PlayerId> {
    self.advance_to(now);
    self.active.as_mut()?.key_down(key, now)
  }

  pub fn key_up(&mut self, key: InputKey) -> Option<PlayerId> {
    self.active.as_mut()?.key_up(key)
  }

  pub fn advance_to(&mut self, now: Duration) {
    if let Some(scheduler) = self.active.as_mut() {
      scheduler.advance_to(now);
    }
    self.record_result();
  }

  pub fn next_deadline(&self) -> Option<Duration> {
    self.active.as_ref().and_then(PhaseScheduler::next_deadline)
  }

  /// ---------------------------------------------------------------------------
  /// Accessors
  /// ---------------------------------------------------------------------------

  pub fn cursor(&self) -> usize {
    self.cursor
  }

  pub fn current_step(&self) -> &Step {
    &self.steps[self.cursor]
  }

  pub fn steps(&self) -> &[Step] {
    &self.steps
  }

  pub fn active_phase(&self) -> Option<&PhaseScheduler> {
    self.active.as_ref()
  }

  pub fn is_phase_running(&self) -> bool {
    self.active.as_ref().is_some_and(PhaseScheduler::is_running)
  }

  pub fn history(&self) -> &[PhaseResult] {
    &self.history
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
