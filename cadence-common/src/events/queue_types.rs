//! Queue and output type definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::media::MediaRef;

/// Reason for a queue change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueChangeTrigger {
    /// Entries inserted after the current track
    AddNext,
    /// Entry appended at the tail
    Append,
    /// Whole queue replaced
    Replace,
    /// Entry removed
    Remove,
    /// Queue emptied
    Clear,
    /// Shuffle ordering applied
    Shuffle,
    /// Insertion ordering restored
    Unshuffle,
    /// Restored from persisted state at startup
    Restore,
}

/// Instruction for the audio output owned by the UI process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutputAction {
    /// Load a new source; playback does not start until `Play`
    SetSource {
        media: MediaRef,
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    Play,
    Pause,
    SeekTo {
        /// Position in seconds
        position: f64,
    },
    /// Unload the current source
    Clear,
    SetVolume {
        volume: f32,
    },
    SetSpeed {
        speed: f32,
    },
}
