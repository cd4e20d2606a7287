use std::fmt;

use serde::{Deserialize, Serialize};

/// Drift direction of the grating on one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionDirection {
    #[serde(rename = "left")]
    Leftward,
    #[serde(rename = "right")]
    Rightward,
}

impl MotionDirection {
    /// Multiplier applied to the grating phase: leftward drifts with +1.
    pub fn sign(self) -> f64 {
        match self {
            MotionDirection::Leftward => 1.0,
            MotionDirection::Rightward => -1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MotionDirection::Leftward => "left",
            MotionDirection::Rightward => "right",
        }
    }

    /// Maps a key pressed during the response window onto a judgement of
    /// this direction.
    pub fn classify(self, key: &Key) -> KeyResponse {
        use MotionDirection::*;
        match (key, self) {
            (k, _) if k.is_quit() => KeyResponse::Quit,
            (Key::Left, Leftward) | (Key::Right, Rightward) => KeyResponse::Judged { correct: true },
            (Key::Left, Rightward) | (Key::Right, Leftward) => KeyResponse::Judged { correct: false },
            _ => KeyResponse::Ignored,
        }
    }
}

impl fmt::Display for MotionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A discrete key event from the input device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Left,
    Right,
    Space,
    Escape,
    Char(char),
    Other(String),
}

impl Key {
    /// `escape` and `q` cancel the session from any wait.
    pub fn is_quit(&self) -> bool {
        matches!(self, Key::Escape | Key::Char('q'))
    }

    /// Parses the key names used by keyboard backends (`left`, `escape`, ...).
    pub fn from_name(name: &str) -> Self {
        match name {
            "left" => Key::Left,
            "right" => Key::Right,
            "space" => Key::Space,
            "escape" => Key::Escape,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => Key::Other(other.to_string()),
                }
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Left => f.write_str("left"),
            Key::Right => f.write_str("right"),
            Key::Space => f.write_str("space"),
            Key::Escape => f.write_str("escape"),
            Key::Char(c) => write!(f, "{c}"),
            Key::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResponse {
    Judged { correct: bool },
    Quit,
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_key_is_correct() {
        assert_eq!(
            KeyResponse::Judged { correct: true },
            MotionDirection::Leftward.classify(&Key::Left)
        );
        assert_eq!(
            KeyResponse::Judged { correct: true },
            MotionDirection::Rightward.classify(&Key::Right)
        );
    }

    #[test]
    fn crossed_key_is_incorrect() {
        assert_eq!(
            KeyResponse::Judged { correct: false },
            MotionDirection::Rightward.classify(&Key::Left)
        );
        assert_eq!(
            KeyResponse::Judged { correct: false },
            MotionDirection::Leftward.classify(&Key::Right)
        );
    }

    #[test]
    fn quit_keys_win_and_others_are_ignored() {
        assert_eq!(KeyResponse::Quit, MotionDirection::Leftward.classify(&Key::Escape));
        assert_eq!(KeyResponse::Quit, MotionDirection::Leftward.classify(&Key::Char('q')));
        assert_eq!(KeyResponse::Ignored, MotionDirection::Leftward.classify(&Key::Space));
        assert_eq!(KeyResponse::Ignored, MotionDirection::Leftward.classify(&Key::Char('x')));
    }

    #[test]
    fn key_names_round_trip_through_display() {
        for name in ["left", "right", "space", "escape", "q", "return"] {
            assert_eq!(name, Key::from_name(name).to_string());
        }
    }
}
