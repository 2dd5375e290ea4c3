//! Playback state types
//!
//! `EngineState` is the single mutable record guarded by the engine lock.
//! `PlaybackStatus` is its read-only projection for API consumers.

use super::queue::{QueueEntry, QueueStore};
use crate::lyrics::LyricSnapshot;
use cadence_common::events::{PlayerState, Progress, RepeatMode};
use cadence_common::{MediaItem, MediaRef, QualityKey};
use serde::{Deserialize, Serialize};

/// Per-call overrides for `PlaybackEngine::play_at`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayOptions {
    /// Replaying the current track restarts from 0 (`true`) or resumes in
    /// place (`false`); `None` uses the configured default
    pub restart_on_same_media: Option<bool>,
    /// Re-resolve the source even when the track is already current
    pub refresh_source: bool,
    /// Start position in seconds
    pub seek_to: Option<f64>,
    /// Preferred quality; `None` uses the configured default
    pub quality: Option<QualityKey>,
}

impl PlayOptions {
    pub fn refresh() -> Self {
        Self {
            refresh_source: true,
            ..Default::default()
        }
    }
}

/// Mutable playback state
///
/// Invariant: `current_index.is_some() == current_item.is_some()`, and when
/// set, `current_index` is the position of `current_item` in `queue`.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub queue: QueueStore,
    pub current_index: Option<usize>,
    pub current_item: Option<QueueEntry>,
    pub player_state: PlayerState,
    pub repeat_mode: RepeatMode,
    pub quality: QualityKey,
    pub progress: Progress,
    pub volume: f32,
    pub speed: f32,
    /// Track whose source is being resolved by the latest `play_at`
    pub loading: Option<MediaRef>,
    /// Bumped by every `play_at` that starts a resolution
    pub play_generation: u64,
    /// Whole second last written as the saved progress
    pub saved_second: Option<u64>,
    /// Stamp of the latest preference write
    pub pref_version: u64,
}

impl EngineState {
    pub fn new(default_quality: QualityKey) -> Self {
        Self {
            queue: QueueStore::new(),
            current_index: None,
            current_item: None,
            player_state: PlayerState::None,
            repeat_mode: RepeatMode::Queue,
            quality: default_quality,
            progress: Progress::default(),
            volume: 1.0,
            speed: 1.0,
            loading: None,
            play_generation: 0,
            saved_second: None,
            pref_version: 0,
        }
    }

    pub fn current_media(&self) -> Option<&MediaRef> {
        self.current_item.as_ref().map(QueueEntry::media)
    }

    pub fn is_current(&self, media: &MediaRef) -> bool {
        self.current_media() == Some(media)
    }

    /// Index that relative skips start from
    ///
    /// A track still being resolved counts as current, so repeated skips
    /// keep advancing.
    pub fn skip_base(&self) -> Option<usize> {
        self.loading
            .as_ref()
            .and_then(|m| self.queue.position_of(m))
            .or(self.current_index)
    }

    pub fn status(&self, lyric: LyricSnapshot) -> PlaybackStatus {
        PlaybackStatus {
            current_index: self.current_index,
            current_item: self.current_item.as_ref().map(|e| e.item.clone()),
            player_state: self.player_state,
            repeat_mode: self.repeat_mode,
            quality: self.quality,
            progress: self.progress,
            volume: self.volume,
            speed: self.speed,
            queue_length: self.queue.len(),
            lyric,
        }
    }
}

/// Read-only playback snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackStatus {
    pub current_index: Option<usize>,
    pub current_item: Option<MediaItem>,
    pub player_state: PlayerState,
    pub repeat_mode: RepeatMode,
    pub quality: QualityKey,
    pub progress: Progress,
    pub volume: f32,
    pub speed: f32,
    pub queue_length: usize,
    pub lyric: LyricSnapshot,
}
