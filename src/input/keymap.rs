//! Movement key bindings

use teleop_shared::{Direction, Motion, Rotation};

use super::Key;

/// Held motion bound to a key, if any
///
/// Letter keys match regardless of case so caps lock or shift does not
/// strand a held key.
pub fn motion_for(key: &Key) -> Option<Motion> {
    let motion = match key {
        Key::ArrowUp => Motion::Move(Direction::Forward),
        Key::ArrowDown => Motion::Move(Direction::Back),
        Key::ArrowLeft => Motion::Move(Direction::Left),
        Key::ArrowRight => Motion::Move(Direction::Right),
        Key::Char(c) => match c.to_ascii_lowercase() {
            'w' => Motion::Move(Direction::Up),
            's' => Motion::Move(Direction::Down),
            'a' => Motion::Rotate(Rotation::Left),
            'd' => Motion::Rotate(Rotation::Right),
            _ => return None,
        },
        Key::Named(_) => return None,
    };
    Some(motion)
}
