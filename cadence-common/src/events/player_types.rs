//! Player-related type definitions
//!
//! Supporting types for playback state and queue traversal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Player state enumeration
///
/// `None` means nothing is loaded in the output. Errors are not a stored
/// state; they route back to `None` with a `PlayerError` event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    None,
    Playing,
    Paused,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerState::None => write!(f, "none"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
        }
    }
}

/// Queue traversal policy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Sequential, wrapping at the tail
    #[default]
    Queue,
    /// Single-track loop
    Loop,
    /// Shuffled ordering
    Shuffle,
}

impl RepeatMode {
    /// Next mode in the toggle cycle: Shuffle → Loop → Queue → Shuffle
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::Shuffle => RepeatMode::Loop,
            RepeatMode::Loop => RepeatMode::Queue,
            RepeatMode::Queue => RepeatMode::Shuffle,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatMode::Queue => write!(f, "queue"),
            RepeatMode::Loop => write!(f, "loop"),
            RepeatMode::Shuffle => write!(f, "shuffle"),
        }
    }
}

impl FromStr for RepeatMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue" => Ok(RepeatMode::Queue),
            "loop" => Ok(RepeatMode::Loop),
            "shuffle" => Ok(RepeatMode::Shuffle),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown repeat mode: {}",
                other
            ))),
        }
    }
}

/// Playback progress in seconds
///
/// `duration` is `None` until the output reports a length.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub current_time: f64,
    pub duration: Option<f64>,
}
