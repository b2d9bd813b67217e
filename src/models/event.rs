use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::coach::Severity;
use crate::player::PlayerId;

/// What the presentation layer shows for a session step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepView {
  Text { message: String },
  Workout { title: String },
}

/// Everything the core tells the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoachEvent {
  StepEntered {
    index: usize,
    step: StepView,
  },
  PhaseStarted {
    title: String,
    min_rate: f64,
    max_rate: f64,
    total_duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    soundtrack: Option<String>,
  },
  /// An accepted strike (heart pulse, beat sound)
  Beat {
    player: PlayerId,
  },
  Released {
    player: PlayerId,
  },
  RateChanged {
    player: PlayerId,
    rate: f64,
  },
  /// A coaching round is about to be evaluated
  Instructing {
    tick: u32,
  },
  Feedback {
    player: PlayerId,
    message: String,
    severity: Severity,
    in_range: bool,
  },
  FeedbackHidden {
    player: PlayerId,
  },
  Progress {
    fraction: f64,
  },
  PhaseCompleted {
    player: PlayerId,
    score_label: String,
    in_range_count: u32,
    max_possible_count: u32,
  },
}

/// Sending half of the outbound event channel
///
/// Emitting never blocks. Once the presentation layer has dropped its
/// receiver, events are discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
  tx: UnboundedSender<CoachEvent>,
}

impl EventSink {
  pub fn new(tx: UnboundedSender<CoachEvent>) -> Self {
    Self { tx }
  }

  /// Sink plus the receiver the presentation layer drains
  pub fn channel() -> (Self, UnboundedReceiver<CoachEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self::new(tx), rx)
  }

  pub fn emit(&self, event: CoachEvent) {
    if let Err(e) = self.tx.send(event) {
      trace!(event = ?e.0, "Event receiver dropped");
    }
  }

  /// A callback forwarding rate changes for one player
  pub fn rate_listener(&self, player: PlayerId) -> impl FnMut(f64) + Send + 'static {
    let sink = self.clone();
    move |rate| sink.emit(CoachEvent::RateChanged { player, rate })
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
