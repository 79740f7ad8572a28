//! Raw-mode terminal front end
//!
//! A thin consumer of the core: translates crossterm key events into
//! [`InputEvent`]s and prints notices and session changes as lines.

use anyhow::{Context, Result};
use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use crossterm::ExecutableCommand;
use std::io::{self, Stdout, Write};
use teleop_shared::{limits, Command, RoverDirection, TelemetrySample};
use tracing::warn;

use crate::app::Notice;
use crate::input::{motion_for, InputEvent, Key, UiAction};
use crate::session::Session;

const HELP: &[&str] = &[
    "teleop client",
    "  w/s ascend/descend   a/d rotate   arrows move   (hold to move, release to stop)",
    "  c connect   x disconnect   t takeoff/land   p snapshot   v camera",
    "  r toggle recording   g toggle collecting   h chart",
    "  m enable mission pads   i mission pad data   n navigate to pad",
    "  8/2/4/6 rover forward/backward/left/right   5 rover stop",
    "  q or Esc quit",
];

/// Width of the longest chart bar
const CHART_WIDTH: f64 = 50.0;

pub struct Terminal {
    out: Stdout,
    /// Whether key release events are reported
    enhanced: bool,
    last_status: String,
}

impl Terminal {
    /// Switch the terminal into raw mode
    pub fn enter() -> Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        let mut out = io::stdout();

        let enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
        if enhanced {
            let pushed = out
                .execute(PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::REPORT_EVENT_TYPES,
                ))
                .map(|_| ());
            restore_on_error(pushed, disable_raw_mode)
                .context("failed to enable key release reporting")?;
        } else {
            warn!("Terminal does not report key releases, movement keys act as taps");
        }

        Ok(Self {
            out,
            enhanced,
            last_status: String::new(),
        })
    }

    pub fn translate(&self, event: &Event) -> Vec<InputEvent> {
        match event {
            Event::Key(key) => translate_key(key, self.enhanced),
            _ => Vec::new(),
        }
    }

    pub fn print_help(&mut self) -> io::Result<()> {
        for line in HELP {
            self.print_line(line)?;
        }
        Ok(())
    }

    pub fn print_line(&mut self, line: &str) -> io::Result<()> {
        write!(self.out, "{}\r\n", line)?;
        self.out.flush()
    }

    pub fn print_notice(&mut self, notice: &Notice) -> io::Result<()> {
        match notice {
            Notice::Info(message) => self.print_line(&format!("* {}", message)),
            Notice::Error(message) => self.print_line(&format!("! {}", message)),
            Notice::Chart(samples) => {
                for line in chart_lines(samples) {
                    self.print_line(&line)?;
                }
                Ok(())
            }
        }
    }

    /// Print the session summary if it changed since the last call
    pub fn print_status(&mut self, session: &Session) -> io::Result<()> {
        let status = session.summary();
        if status == self.last_status {
            return Ok(());
        }
        self.print_line(&status)?;
        self.last_status = status;
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = self.out.execute(PopKeyboardEnhancementFlags);
        }
        let _ = disable_raw_mode();
    }
}

/// Run `restore` when `result` failed, keeping the original error
fn restore_on_error(
    result: io::Result<()>,
    restore: impl FnOnce() -> io::Result<()>,
) -> io::Result<()> {
    if result.is_err() {
        let _ = restore();
    }
    result
}

fn translate_key(key: &KeyEvent, enhanced: bool) -> Vec<InputEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return match key.kind {
            KeyEventKind::Press => vec![InputEvent::Action(UiAction::Quit)],
            _ => Vec::new(),
        };
    }

    let physical = match key.code {
        KeyCode::Up => Some(Key::ArrowUp),
        KeyCode::Down => Some(Key::ArrowDown),
        KeyCode::Left => Some(Key::ArrowLeft),
        KeyCode::Right => Some(Key::ArrowRight),
        KeyCode::Char(c) if motion_for(&Key::Char(c)).is_some() => Some(Key::Char(c)),
        _ => None,
    };

    if let Some(physical) = physical {
        return match (key.kind, enhanced) {
            (KeyEventKind::Release, _) => vec![InputEvent::KeyUp(physical)],
            (_, true) => vec![InputEvent::KeyDown(physical)],
            // No release events: treat every press as a tap
            (_, false) => vec![
                InputEvent::KeyDown(physical.clone()),
                InputEvent::KeyUp(physical),
            ],
        };
    }

    if key.kind != KeyEventKind::Press {
        return Vec::new();
    }

    let action = match key.code {
        KeyCode::Esc => UiAction::Quit,
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            'c' => UiAction::Connect,
            'x' => UiAction::Disconnect,
            'p' => UiAction::Command(Command::TakeSnapshot),
            't' => UiAction::Command(Command::TakeoffLand),
            'r' => UiAction::Command(Command::ToggleRecording),
            'g' => UiAction::Command(Command::ToggleCollecting),
            'v' => UiAction::Command(Command::ChangeCameraDirection),
            'm' => UiAction::Command(Command::EnableMissionPad),
            'i' => UiAction::Command(Command::GetMissionPadData),
            'n' => UiAction::Command(Command::NavigateToMissionPad),
            '8' => UiAction::Command(Command::RoverMove(RoverDirection::Forward)),
            '2' => UiAction::Command(Command::RoverMove(RoverDirection::Backward)),
            '4' => UiAction::Command(Command::RoverMove(RoverDirection::Left)),
            '6' => UiAction::Command(Command::RoverMove(RoverDirection::Right)),
            '5' => UiAction::Command(Command::Stop),
            'h' => UiAction::ShowChart,
            'q' => UiAction::Quit,
            _ => return vec![InputEvent::KeyDown(Key::Char(c))],
        },
        other => return vec![InputEvent::KeyDown(Key::Named(format!("{:?}", other)))],
    };
    vec![InputEvent::Action(action)]
}

fn chart_lines(samples: &[TelemetrySample]) -> Vec<String> {
    if samples.is_empty() {
        return vec!["No distance samples to chart".into()];
    }
    let mut lines = vec![format!("Distance (cm), {} samples", samples.len())];
    for sample in samples {
        let width = (sample.distance.max(0.0) / limits::OUTLIER_THRESHOLD_CM * CHART_WIDTH).round();
        lines.push(format!(
            "{} {:>7.1} {}",
            sample.timestamp.format("%H:%M:%S%.3f"),
            sample.distance,
            "#".repeat(width as usize)
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn key(code: KeyCode, kind: KeyEventKind) -> KeyEvent {
        KeyEvent::new_with_kind(code, KeyModifiers::NONE, kind)
    }

    #[test]
    fn test_raw_mode_restored_when_setup_fails() {
        let mut restored = false;
        let failed = Err(io::Error::new(io::ErrorKind::Other, "not a tty"));
        let result = restore_on_error(failed, || {
            restored = true;
            Ok(())
        });
        assert!(restored);
        assert_eq!(result.unwrap_err().to_string(), "not a tty");

        let mut restored = false;
        restore_on_error(Ok(()), || {
            restored = true;
            Ok(())
        })
        .expect("ok");
        assert!(!restored);
    }

    #[test]
    fn test_movement_press_repeat_release() {
        let w = KeyCode::Char('w');
        assert_eq!(
            translate_key(&key(w, KeyEventKind::Press), true),
            vec![InputEvent::KeyDown(Key::Char('w'))]
        );
        assert_eq!(
            translate_key(&key(w, KeyEventKind::Repeat), true),
            vec![InputEvent::KeyDown(Key::Char('w'))]
        );
        assert_eq!(
            translate_key(&key(KeyCode::Left, KeyEventKind::Release), true),
            vec![InputEvent::KeyUp(Key::ArrowLeft)]
        );
    }

    #[test]
    fn test_movement_without_release_reporting_is_a_tap() {
        assert_eq!(
            translate_key(&key(KeyCode::Up, KeyEventKind::Press), false),
            vec![
                InputEvent::KeyDown(Key::ArrowUp),
                InputEvent::KeyUp(Key::ArrowUp)
            ]
        );
    }

    #[test]
    fn test_action_keys_fire_on_press_only() {
        assert_eq!(
            translate_key(&key(KeyCode::Char('r'), KeyEventKind::Press), true),
            vec![InputEvent::Action(UiAction::Command(Command::ToggleRecording))]
        );
        assert!(translate_key(&key(KeyCode::Char('r'), KeyEventKind::Release), true).is_empty());
        assert_eq!(
            translate_key(&key(KeyCode::Char('5'), KeyEventKind::Press), true),
            vec![InputEvent::Action(UiAction::Command(Command::Stop))]
        );
        assert_eq!(
            translate_key(&key(KeyCode::Esc, KeyEventKind::Press), true),
            vec![InputEvent::Action(UiAction::Quit)]
        );
    }

    #[test]
    fn test_ctrl_c_quits() {
        let ctrl_c = KeyEvent::new_with_kind(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
            KeyEventKind::Press,
        );
        assert_eq!(
            translate_key(&ctrl_c, true),
            vec![InputEvent::Action(UiAction::Quit)]
        );
    }

    #[test]
    fn test_unbound_keys_reach_the_router() {
        assert_eq!(
            translate_key(&key(KeyCode::Char('z'), KeyEventKind::Press), true),
            vec![InputEvent::KeyDown(Key::Char('z'))]
        );
        assert_eq!(
            translate_key(&key(KeyCode::F(1), KeyEventKind::Press), true),
            vec![InputEvent::KeyDown(Key::Named("F(1)".into()))]
        );
    }

    #[test]
    fn test_chart_lines() {
        assert_eq!(chart_lines(&[]), vec!["No distance samples to chart"]);

        let ts = Utc.with_ymd_and_hms(2023, 10, 17, 12, 0, 5).unwrap();
        let lines = chart_lines(&[TelemetrySample::new(ts, 250.0)]);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("12:00:05.000   250.0 "));
        assert!(lines[1].ends_with(&"#".repeat(25)));
    }
}
