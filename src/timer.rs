//! Virtual-time timers for the coaching loop
//!
//! The core never reads a clock. Every pending callback is an entry in a
//! `TimerQueue`, keyed by deadline and timer kind, and the driver fires due
//! entries by calling `pop_due(now)`. Each logical timer is owned through a
//! `TimerSlot`, which holds at most one pending entry: re-arming a slot
//! cancels whatever it had scheduled before.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::player::PlayerId;

/// ---------------------------------------------------------------------------
/// Timer Kinds
/// ---------------------------------------------------------------------------

/// Every logical timer in a workout phase.
///
/// Declaration order matters: timers due at the same instant fire in this
/// order, so a coaching tick landing exactly on the phase deadline is
/// evaluated before the phase completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
  /// Resets a player's rate to zero after the quiet period
  Decay(PlayerId),
  /// Hides a player's feedback message
  Hide(PlayerId),
  /// Periodic progress notification
  Progress,
  /// Periodic coaching round
  CoachingTick,
  /// End of the phase
  Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// A timer popped from the queue because its deadline was reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer<K> {
  pub id: TimerId,
  pub due: Duration,
  pub kind: K,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Entry<K> {
  due: Duration,
  kind: K,
  id: TimerId,
}

/// ---------------------------------------------------------------------------
/// Timer Queue
/// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TimerQueue<K> {
  ordered: BTreeSet<Entry<K>>,
  pending: HashMap<TimerId, Entry<K>>,
  next_id: u64,
}

impl<K: Ord + Clone> TimerQueue<K> {
  pub fn new() -> Self {
    Self {
      ordered: BTreeSet::new(),
      pending: HashMap::new(),
      next_id: 0,
    }
  }

  pub fn schedule(&mut self, due: Duration, kind: K) -> TimerId {
    let id = TimerId(self.next_id);
    self.next_id += 1;

    let entry = Entry { due, kind, id };
    self.ordered.insert(entry.clone());
    self.pending.insert(id, entry);
    id
  }

  /// Cancel a pending timer. Returns false if it already fired or was cancelled.
  pub fn cancel(&mut self, id: TimerId) -> bool {
    match self.pending.remove(&id) {
      Some(entry) => {
        self.ordered.remove(&entry);
        true
      }
      None => false,
    }
  }

  /// Remove and return the earliest timer whose deadline is `<= now`
  pub fn pop_due(&mut self, now: Duration) -> Option<FiredTimer<K>> {
    let first = self.ordered.first()?;
    if first.due > now {
      return None;
    }

    let entry = self.ordered.pop_first()?;
    self.pending.remove(&entry.id);
    Some(FiredTimer {
      id: entry.id,
      due: entry.due,
      kind: entry.kind,
    })
  }

  pub fn next_deadline(&self) -> Option<Duration> {
    self.ordered.first().map(|entry| entry.due)
  }

  pub fn is_pending(&self, id: TimerId) -> bool {
    self.pending.contains_key(&id)
  }

  pub fn len(&self) -> usize {
    self.pending.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }

  /// Count pending timers matching a predicate on their kind
  pub fn count_where(&self, mut pred: impl FnMut(&K) -> bool) -> usize {
    self.pending.values().filter(|entry| pred(&entry.kind)).count()
  }
}

impl<K: Ord + Clone> Default for TimerQueue<K> {
  fn default() -> Self {
    Self::new()
  }
}

/// ---------------------------------------------------------------------------
/// Timer Slot: one owned handle per logical timer
/// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct TimerSlot {
  pending: Option<TimerId>,
}

impl TimerSlot {
  pub fn new() -> Self {
    Self { pending: None }
  }

  /// Cancel whatever this slot has pending and schedule a replacement
  pub fn rearm<K: Ord + Clone>(&mut self, queue: &mut TimerQueue<K>, due: Duration, kind: K) -> TimerId {
    self.cancel(queue);
    let id = queue.schedule(due, kind);
    self.pending = Some(id);
    id
  }

  pub fn cancel<K: Ord + Clone>(&mut self, queue: &mut TimerQueue<K>) -> bool {
    match self.pending.take() {
      Some(id) => queue.cancel(id),
      None => false,
    }
  }

  /// Mark the slot's timer as fired. Returns false for an id this slot no
  /// longer owns.
  pub fn settle(&mut self, id: TimerId) -> bool {
    if self.pending == Some(id) {
      self.pending = None;
      true
    } else {
      false
    }
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
