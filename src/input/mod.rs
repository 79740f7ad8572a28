//! Operator input
//!
//! Raw key transitions go through the [`InputRouter`]; buttons and menu keys
//! arrive as [`UiAction`]s and bypass the key state machine.

mod keymap;
mod router;

pub use keymap::motion_for;
pub use router::{InputRouter, Routed};

use std::fmt;
use teleop_shared::Command;

/// A physical key as reported by the front end
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    /// Any other named key (function keys, modifiers, ...)
    Named(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{:?}", c),
            Key::ArrowUp => f.write_str("ArrowUp"),
            Key::ArrowDown => f.write_str("ArrowDown"),
            Key::ArrowLeft => f.write_str("ArrowLeft"),
            Key::ArrowRight => f.write_str("ArrowRight"),
            Key::Named(name) => f.write_str(name),
        }
    }
}

/// Single-shot operator actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Connect,
    Disconnect,
    /// A control-channel command (snapshot, toggles, mission pad, rover)
    Command(Command),
    ShowChart,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    Action(UiAction),
}
