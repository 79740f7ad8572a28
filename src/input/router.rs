//! Input Router
//!
//! Each movement key runs `Up -> Down -> Up`. A command is emitted on each
//! transition, never on the raw event, so OS key-repeat collapses into one
//! press. Key state is tracked even while the vehicle link is down; held
//! keys are not replayed when it comes back.

use std::collections::HashSet;
use teleop_shared::{Command, ConnectionState, Motion};
use tracing::debug;

use super::keymap::motion_for;
use super::Key;
use crate::error::UnmappedInput;

/// What the router decided for one key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Forward this command to the vehicle
    Emit(Command),
    /// A transition happened but the link is down
    Suppressed(Command),
    /// Repeat press or release of a key that was not held
    NoTransition,
}

#[derive(Debug, Default)]
pub struct InputRouter {
    held: HashSet<Motion>,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, key: &Key, link: ConnectionState) -> Result<Routed, UnmappedInput> {
        let motion = motion_for(key).ok_or_else(|| UnmappedInput(key.to_string()))?;
        if !self.held.insert(motion) {
            return Ok(Routed::NoTransition);
        }
        Ok(gate(Command::press(motion), link))
    }

    pub fn key_up(&mut self, key: &Key, link: ConnectionState) -> Result<Routed, UnmappedInput> {
        let motion = motion_for(key).ok_or_else(|| UnmappedInput(key.to_string()))?;
        if !self.held.remove(&motion) {
            return Ok(Routed::NoTransition);
        }
        Ok(gate(Command::release(motion), link))
    }

    pub fn is_held(&self, motion: Motion) -> bool {
        self.held.contains(&motion)
    }

    /// Forget every held key (explicit disconnect)
    pub fn reset(&mut self) {
        if !self.held.is_empty() {
            debug!("Clearing {} held key(s)", self.held.len());
        }
        self.held.clear();
    }
}

fn gate(command: Command, link: ConnectionState) -> Routed {
    if link.is_connected() {
        Routed::Emit(command)
    } else {
        Routed::Suppressed(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleop_shared::{Direction, Rotation};

    const UP: ConnectionState = ConnectionState::Connected;
    const DOWN: ConnectionState = ConnectionState::Disconnected;

    fn emitted(routed: Result<Routed, UnmappedInput>) -> Option<String> {
        match routed.expect("mapped key") {
            Routed::Emit(cmd) => cmd.stream_code(),
            _ => None,
        }
    }

    #[test]
    fn test_press_release_order() {
        let mut router = InputRouter::new();
        let w = Key::Char('w');

        let sent: Vec<String> = [router.key_down(&w, UP), router.key_up(&w, UP)]
            .into_iter()
            .filter_map(emitted)
            .collect();
        assert_eq!(sent, vec!["w", "release-w"]);
    }

    #[test]
    fn test_key_repeat_emits_once() {
        let mut router = InputRouter::new();
        let key = Key::ArrowLeft;

        assert_eq!(
            router.key_down(&key, UP),
            Ok(Routed::Emit(Command::Move(Direction::Left)))
        );
        for _ in 0..10 {
            assert_eq!(router.key_down(&key, UP), Ok(Routed::NoTransition));
        }
        assert_eq!(
            router.key_up(&key, UP),
            Ok(Routed::Emit(Command::Release(Motion::Move(Direction::Left))))
        );
        assert_eq!(router.key_up(&key, UP), Ok(Routed::NoTransition));
    }

    #[test]
    fn test_nothing_emitted_while_disconnected() {
        for link in [ConnectionState::Disconnected, ConnectionState::Connecting] {
            let mut router = InputRouter::new();
            let d = Key::Char('d');
            assert_eq!(
                router.key_down(&d, link),
                Ok(Routed::Suppressed(Command::Rotate(Rotation::Right)))
            );
            assert!(router.is_held(Motion::Rotate(Rotation::Right)));
            assert!(matches!(router.key_up(&d, link), Ok(Routed::Suppressed(_))));
        }
    }

    #[test]
    fn test_held_key_across_reconnect_is_not_replayed() {
        let mut router = InputRouter::new();
        let s = Key::Char('s');

        assert!(matches!(router.key_down(&s, DOWN), Ok(Routed::Suppressed(_))));

        // Link comes up; the repeat of the held key must not re-signal
        assert_eq!(router.key_down(&s, UP), Ok(Routed::NoTransition));

        // Release is a real transition and is sent
        assert_eq!(emitted(router.key_up(&s, UP)).as_deref(), Some("release-s"));
    }

    #[test]
    fn test_unmapped_is_distinct_from_rejected() {
        let mut router = InputRouter::new();
        assert_eq!(
            router.key_down(&Key::Char('z'), UP),
            Err(UnmappedInput("'z'".into()))
        );
        assert!(router.key_up(&Key::Named("F5".into()), UP).is_err());

        // Mapped but rejected by the link gate is Ok, not an error
        assert!(router.key_down(&Key::Char('w'), DOWN).is_ok());
    }

    #[test]
    fn test_reset_clears_held_keys() {
        let mut router = InputRouter::new();
        router.key_down(&Key::Char('a'), UP).expect("mapped");
        router.reset();
        assert!(!router.is_held(Motion::Rotate(Rotation::Left)));
        assert_eq!(router.key_up(&Key::Char('a'), UP), Ok(Routed::NoTransition));
    }

    #[test]
    fn test_independent_keys() {
        let mut router = InputRouter::new();
        let sent: Vec<String> = [
            router.key_down(&Key::Char('w'), UP),
            router.key_down(&Key::ArrowUp, UP),
            router.key_up(&Key::Char('w'), UP),
            router.key_up(&Key::ArrowUp, UP),
        ]
        .into_iter()
        .filter_map(emitted)
        .collect();
        assert_eq!(sent, vec!["w", "Up", "release-w", "release-Up"]);
    }
}
