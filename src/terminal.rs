//! Terminal driver
//!
//! Reads keys with crossterm on a dedicated thread, feeds them to the
//! `WorkoutSession` stamped with the time since the session epoch, and sleeps
//! until the next timer deadline in between. Events go out either as a
//! redrawn text screen or as one JSON object per line.

use crossterm::event::{
  self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
  PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::style::Print;
use crossterm::terminal::{self, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute, queue};
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::coach::Severity;
use crate::config::{AppConfig, ConfigError, EventFormat};
use crate::models::{CoachEvent, EventSink, StepView, WorkoutPlan};
use crate::player::{default_bindings, InputKey};
use crate::session::{PhaseResult, SessionError, WorkoutSession};

#[derive(Error, Debug)]
pub enum AppError {
  #[error("Terminal I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("Configuration error: {0}")]
  Config(#[from] ConfigError),

  #[error("Session error: {0}")]
  Session(#[from] SessionError),

  #[error("Failed to encode event: {0}")]
  Encode(#[from] serde_json::Error),
}

/// ---------------------------------------------------------------------------
/// Key Mapping
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  Advance,
  Abort,
  Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalInput {
  Press(InputKey),
  Release(InputKey),
  Command(Command),
}

/// Translate a crossterm key event. Auto-repeat never counts as a strike.
pub fn map_key(key: &KeyEvent) -> Option<TerminalInput> {
  if key.kind == KeyEventKind::Repeat {
    return None;
  }
  let released = key.kind == KeyEventKind::Release;

  let command = match key.code {
    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
    KeyCode::Char('q') => Some(Command::Quit),
    KeyCode::Char(' ') | KeyCode::Enter => Some(Command::Advance),
    KeyCode::Esc => Some(Command::Abort),
    _ => None,
  };
  if let Some(command) = command {
    return (!released).then_some(TerminalInput::Command(command));
  }

  let input = match key.code {
    KeyCode::Left => InputKey::Left,
    KeyCode::Right => InputKey::Right,
    KeyCode::Up => InputKey::Up,
    KeyCode::Down => InputKey::Down,
    KeyCode::Char(c) if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
      InputKey::Char(c.to_ascii_lowercase())
    }
    _ => return None,
  };

  Some(if released {
    TerminalInput::Release(input)
  } else {
    TerminalInput::Press(input)
  })
}

fn spawn_key_reader() -> UnboundedReceiver<TerminalInput> {
  let (tx, rx) = mpsc::unbounded_channel();
  std::thread::spawn(move || loop {
    match event::read() {
      Ok(Event::Key(key)) => {
        if let Some(input) = map_key(&key) {
          if tx.send(input).is_err() {
            break;
          }
        }
      }
      Ok(_) => {}
      Err(e) => {
        warn!(error = %e, "Terminal input failed");
        break;
      }
    }
  });
  rx
}

/// ---------------------------------------------------------------------------
/// Text Screen
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
struct LaneView {
  rate: f64,
  pulse: bool,
  feedback: Option<(String, Severity)>,
  score: Option<String>,
}

/// What the text renderer currently shows, folded from the event stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Screen {
  step: Option<StepView>,
  band: Option<(f64, f64)>,
  progress: f64,
  tick: u32,
  lanes: Vec<LaneView>,
}

impl Screen {
  pub fn new(players: usize) -> Self {
    Self {
      lanes: vec![LaneView::default(); players],
      ..Self::default()
    }
  }

  pub fn apply(&mut self, event: &CoachEvent) {
    match event {
      CoachEvent::StepEntered { step, .. } => {
        let players = self.lanes.len();
        *self = Self::new(players);
        self.step = Some(step.clone());
      }
      CoachEvent::PhaseStarted {
        min_rate, max_rate, ..
      } => {
        self.band = Some((*min_rate, *max_rate));
      }
      CoachEvent::Beat { player } => {
        if let Some(lane) = self.lanes.get_mut(player.0) {
          lane.pulse = true;
        }
      }
      CoachEvent::Released { player } => {
        if let Some(lane) = self.lanes.get_mut(player.0) {
          lane.pulse = false;
        }
      }
      CoachEvent::RateChanged { player, rate } => {
        if let Some(lane) = self.lanes.get_mut(player.0) {
          lane.rate = *rate;
        }
      }
      CoachEvent::Instructing { tick } => self.tick = *tick,
      CoachEvent::Feedback {
        player,
        message,
        severity,
        ..
      } => {
        if let Some(lane) = self.lanes.get_mut(player.0) {
          lane.feedback = Some((message.clone(), *severity));
        }
      }
      CoachEvent::FeedbackHidden { player } => {
        if let Some(lane) = self.lanes.get_mut(player.0) {
          lane.feedback = None;
        }
      }
      CoachEvent::Progress { fraction } => {
        self.progress = *fraction;
        // Terminals without release events would otherwise keep the pulse lit
        for lane in self.lanes.iter_mut() {
          lane.pulse = false;
        }
      }
      CoachEvent::PhaseCompleted {
        player,
        score_label,
        in_range_count,
        max_possible_count,
      } => {
        if let Some(lane) = self.lanes.get_mut(player.0) {
          lane.feedback = None;
          lane.score = Some(format!(
            "{} ({}/{})",
            score_label, in_range_count, max_possible_count
          ));
        }
      }
    }
  }

  pub fn lines(&self) -> Vec<String> {
    let mut lines = Vec::new();
    match &self.step {
      None => {}
      Some(StepView::Text { message }) => {
        lines.extend(message.lines().map(str::to_string));
        lines.push(String::new());
        lines.push("[space] continue   [q] quit".to_string());
      }
      Some(StepView::Workout { title }) => {
        let band = self
          .band
          .map(|(min, max)| format!("{:.0}-{:.0} BPM", min, max))
          .unwrap_or_default();
        let mut header = format!("== {} ==  {}", title, band);
        if self.tick > 0 {
          header.push_str(&format!("  round {}", self.tick));
        }
        lines.push(header);
        lines.push(progress_bar(self.progress, 30));
        lines.push(String::new());

        for (i, lane) in self.lanes.iter().enumerate() {
          let pulse = if lane.pulse { "<3" } else { "  " };
          let message = match (&lane.score, &lane.feedback) {
            (Some(score), _) => score.clone(),
            (None, Some((message, Severity::Warning))) => format!("!! {}", message),
            (None, Some((message, Severity::Neutral))) => message.clone(),
            (None, None) => String::new(),
          };
          lines.push(format!("P{}  {:>4.0} BPM  {}  {}", i + 1, lane.rate, pulse, message));
        }

        lines.push(String::new());
        let done = self.lanes.iter().all(|l| l.score.is_some());
        lines.push(if done {
          "[space] continue   [q] quit".to_string()
        } else {
          "[esc] stop   [q] quit".to_string()
        });
      }
    }
    lines
  }
}

fn progress_bar(fraction: f64, width: usize) -> String {
  let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
  format!(
    "[{}{}] {:>3.0}%",
    "#".repeat(filled),
    ".".repeat(width - filled),
    fraction.clamp(0.0, 1.0) * 100.0
  )
}

/// ---------------------------------------------------------------------------
/// Renderers
/// ---------------------------------------------------------------------------

enum Renderer {
  Screen(Screen),
  JsonLines,
}

impl Renderer {
  fn new(format: EventFormat, players: usize) -> Self {
    match format {
      EventFormat::Tui => Self::Screen(Screen::new(players)),
      EventFormat::Json => Self::JsonLines,
    }
  }

  fn render(&mut self, out: &mut impl Write, events: &[CoachEvent]) -> Result<(), AppError> {
    if events.is_empty() {
      return Ok(());
    }
    match self {
      Self::Screen(screen) => {
        for event in events {
          screen.apply(event);
        }
        queue!(out, terminal::Clear(ClearType::All))?;
        for (row, line) in screen.lines().iter().enumerate() {
          queue!(out, cursor::MoveTo(0, row as u16), Print(line))?;
        }
      }
      Self::JsonLines => {
        for event in events {
          serde_json::to_writer(&mut *out, event)?;
          // Raw mode turns off newline translation
          out.write_all(b"\r\n")?;
        }
      }
    }
    out.flush()?;
    Ok(())
  }
}

/// Raw mode for the lifetime of the driver; restores the terminal on drop
struct TerminalGuard {
  alternate_screen: bool,
  enhanced_keys: bool,
}

impl TerminalGuard {
  fn enter(format: EventFormat) -> io::Result<Self> {
    terminal::enable_raw_mode()?;
    let mut out = io::stdout();

    let alternate_screen = format == EventFormat::Tui;
    if alternate_screen {
      execute!(out, EnterAlternateScreen, cursor::Hide)?;
    }

    // Release events are only reported with the keyboard enhancement protocol
    let enhanced_keys = terminal::supports_keyboard_enhancement().unwrap_or(false);
    if enhanced_keys {
      execute!(
        out,
        PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
      )?;
    }
    debug!(alternate_screen, enhanced_keys, "Terminal prepared");

    Ok(Self {
      alternate_screen,
      enhanced_keys,
    })
  }
}

impl Drop for TerminalGuard {
  fn drop(&mut self) {
    let mut out = io::stdout();
    if self.enhanced_keys {
      let _ = execute!(out, PopKeyboardEnhancementFlags);
    }
    if self.alternate_screen {
      let _ = execute!(out, cursor::Show, LeaveAlternateScreen);
    }
    let _ = terminal::disable_raw_mode();
  }
}

/// ---------------------------------------------------------------------------
/// Event Loop
/// ---------------------------------------------------------------------------

async fn sleep_until_deadline(epoch: Instant, deadline: Option<Duration>) {
  match deadline {
    Some(due) => tokio::time::sleep_until(epoch + due).await,
    None => std::future::pending().await,
  }
}

fn drain(rx: &mut UnboundedReceiver<CoachEvent>) -> Vec<CoachEvent> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}

/// Run the interactive session until the player quits
pub async fn run(config: AppConfig) -> Result<Vec<PhaseResult>, AppError> {
  config.validate()?;
  let plan = match &config.plan_path {
    Some(path) => WorkoutPlan::load(path)?,
    None => WorkoutPlan::default_plan(),
  };
  let bindings = default_bindings(config.players, config.single_button);
  let (sink, mut events) = EventSink::channel();
  let mut session = WorkoutSession::new(&plan, bindings, sink)?;
  info!(
    players = config.players,
    steps = session.steps().len(),
    format = ?config.event_format,
    "Starting session"
  );

  let _guard = TerminalGuard::enter(config.event_format)?;
  let mut out = io::stdout();
  let mut renderer = Renderer::new(config.event_format, config.players);
  let mut keys = spawn_key_reader();

  let epoch = Instant::now();
  session.start(Duration::ZERO)?;

  loop {
    renderer.render(&mut out, &drain(&mut events))?;

    tokio::select! {
      input = keys.recv() => {
        let Some(input) = input else {
          break;
        };
        let now = epoch.elapsed();
        session.advance_to(now);

        match input {
          TerminalInput::Press(key) => {
            session.key_down(key, now);
          }
          TerminalInput::Release(key) => {
            session.key_up(key);
          }
          TerminalInput::Command(Command::Advance) => {
            if !session.request_advance(now)? {
              debug!("Advance ignored until the phase completes");
            }
          }
          TerminalInput::Command(Command::Abort) => match session.abort_phase(now) {
            Ok(_) => {}
            Err(SessionError::NoActivePhase | SessionError::Phase(_)) => {
              debug!("Nothing to abort");
            }
            Err(e) => return Err(e.into()),
          },
          TerminalInput::Command(Command::Quit) => break,
        }
      }
      _ = sleep_until_deadline(epoch, session.next_deadline()) => {
        session.advance_to(epoch.elapsed());
      }
    }
  }

  renderer.render(&mut out, &drain(&mut events))?;
  info!(phases = session.history().len(), "Session ended");
  Ok(session.history().to_vec())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::player::PlayerId;

  fn press(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_map_key_commands() {
    assert_eq!(
      map_key(&press(KeyCode::Char(' '))),
      Some(TerminalInput::Command(Command::Advance))
    );
    assert_eq!(
      map_key(&press(KeyCode::Esc)),
      Some(TerminalInput::Command(Command::Abort))
    );
    assert_eq!(
      map_key(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
      Some(TerminalInput::Command(Command::Quit))
    );
  }

  #[test]
  fn test_map_key_strikes_and_releases() {
    assert_eq!(
      map_key(&press(KeyCode::Left)),
      Some(TerminalInput::Press(InputKey::Left))
    );
    assert_eq!(
      map_key(&press(KeyCode::Char('A'))),
      Some(TerminalInput::Press(InputKey::Char('a')))
    );

    let release = KeyEvent::new_with_kind(KeyCode::Up, KeyModifiers::NONE, KeyEventKind::Release);
    assert_eq!(map_key(&release), Some(TerminalInput::Release(InputKey::Up)));

    let repeat = KeyEvent::new_with_kind(KeyCode::Right, KeyModifiers::NONE, KeyEventKind::Repeat);
    assert_eq!(map_key(&repeat), None);

    let space_up = KeyEvent::new_with_kind(KeyCode::Char(' '), KeyModifiers::NONE, KeyEventKind::Release);
    assert_eq!(map_key(&space_up), None);
    assert_eq!(map_key(&press(KeyCode::F(1))), None);
  }

  #[test]
  fn test_screen_tracks_phase() {
    let mut screen = Screen::new(2);
    screen.apply(&CoachEvent::StepEntered {
      index: 4,
      step: StepView::Workout {
        title: "LEVEL 1".to_string(),
      },
    });
    screen.apply(&CoachEvent::PhaseStarted {
      title: "LEVEL 1".to_string(),
      min_rate: 120.0,
      max_rate: 140.0,
      total_duration_secs: 30.0,
      soundtrack: None,
    });
    screen.apply(&CoachEvent::RateChanged {
      player: PlayerId(0),
      rate: 130.4,
    });
    screen.apply(&CoachEvent::Feedback {
      player: PlayerId(1),
      message: "FASTER".to_string(),
      severity: Severity::Warning,
      in_range: false,
    });
    screen.apply(&CoachEvent::Progress { fraction: 0.5 });

    let lines = screen.lines();
    assert_eq!(lines[0], "== LEVEL 1 ==  120-140 BPM");
    assert!(lines[1].ends_with(" 50%"));
    assert!(lines[3].contains(" 130 BPM"));
    assert!(lines[4].ends_with("!! FASTER"));
    assert!(lines.last().unwrap().contains("[esc] stop"));
  }

  #[test]
  fn test_screen_shows_scores_and_resets_on_step() {
    let mut screen = Screen::new(1);
    screen.apply(&CoachEvent::StepEntered {
      index: 7,
      step: StepView::Workout {
        title: "LEVEL 1".to_string(),
      },
    });
    screen.apply(&CoachEvent::PhaseCompleted {
      player: PlayerId(0),
      score_label: "GREAT".to_string(),
      in_range_count: 5,
      max_possible_count: 7,
    });
    assert!(screen.lines()[3].ends_with("GREAT (5/7)"));
    assert!(screen.lines().last().unwrap().contains("[space] continue"));

    screen.apply(&CoachEvent::StepEntered {
      index: 8,
      step: StepView::Text {
        message: "COME ON\nMORE ENERGY".to_string(),
      },
    });
    assert_eq!(&screen.lines()[..2], &["COME ON", "MORE ENERGY"]);
  }

  #[test]
  fn test_json_renderer_writes_one_line_per_event() {
    let mut renderer = Renderer::new(EventFormat::Json, 1);
    let mut out = Vec::new();
    renderer
      .render(
        &mut out,
        &[
          CoachEvent::Instructing { tick: 1 },
          CoachEvent::Progress { fraction: 0.25 },
        ],
      )
      .unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["type"], "instructing");
    assert_eq!(first["tick"], 1);
  }

  #[test]
  fn test_progress_bar_clamps() {
    assert_eq!(progress_bar(0.0, 4), "[....]   0%");
    assert_eq!(progress_bar(1.5, 4), "[####] 100%");
  }

  #[tokio::test]
  async fn test_sleep_without_deadline_never_fires() {
    let epoch = Instant::now();
    let fired = tokio::time::timeout(
      Duration::from_millis(20),
      sleep_until_deadline(epoch, None),
    )
    .await;
    assert!(fired.is_err());

    let fired = tokio::time::timeout(
      Duration::from_millis(500),
      sleep_until_deadline(epoch, Some(Duration::from_millis(1))),
    )
    .await;
    assert!(fired.is_ok());
  }
}
