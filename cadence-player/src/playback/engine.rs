//! Playback engine
//!
//! Owns the play queue and the current-playback pointer, and drives the audio
//! sink. States: `None -> Playing <-> Paused`; any state falls back to `None`
//! when the queue empties or a track cannot be resolved. A resolution failure
//! is reported with a `PlayerError` event, not stored as a state.
//!
//! **Concurrency:** all state sits behind one `RwLock`. The lock is never
//! held across a plugin, filesystem or database await. Operations that await
//! re-check their precondition by identity afterwards (is this still the
//! current track, is the requested entry still at that index) and drop
//! results that went stale. Persistence work is collected while the lock is
//! held and flushed after it is released.

use super::output::AudioSink;
use super::persist::{PrefPersister, PrefWrite, QueuePersister};
use super::queue::{QueueEntry, QueueSnapshot, QueueStore, QueueTarget};
use super::state::{EngineState, PlayOptions, PlaybackStatus};
use crate::config::{ErrorPolicy, PlayerSettings};
use crate::db::queue::load_queue;
use crate::db::settings::{self, keys};
use crate::error::{Error, Result};
use crate::lyrics::LyricSynchronizer;
use crate::source::MediaSourceResolver;
use cadence_common::events::{
    CadenceEvent, EventBus, PlayerState, Progress, QueueChangeTrigger, RepeatMode,
};
use cadence_common::time;
use cadence_common::transport::PlayerCommand;
use cadence_common::{MediaItem, MediaRef, QualityKey};
use serde::de::DeserializeOwned;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default step for `volume_up` / `volume_down`
pub const VOLUME_STEP: f32 = 0.04;

/// Persistence work collected under the lock
#[derive(Debug, Default)]
struct Pending {
    queue: Option<QueueSnapshot>,
    prefs: Vec<(u64, PrefWrite)>,
}

impl Pending {
    /// Queue a preference write stamped with the next version
    fn pref(&mut self, state: &mut EngineState, write: PrefWrite) {
        state.pref_version += 1;
        self.prefs.push((state.pref_version, write));
    }
}

/// Playback engine - owns queue and playback state
pub struct PlaybackEngine {
    db: Pool<Sqlite>,
    state: Arc<RwLock<EngineState>>,
    settings: Arc<RwLock<PlayerSettings>>,
    resolver: Arc<MediaSourceResolver>,
    sink: Arc<dyn AudioSink>,
    lyrics: Arc<LyricSynchronizer>,
    persister: Arc<QueuePersister>,
    prefs: Arc<PrefPersister>,
    events: Arc<EventBus>,
    /// Background auto-skip tasks
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PlaybackEngine {
    pub fn new(
        db: Pool<Sqlite>,
        settings: PlayerSettings,
        resolver: Arc<MediaSourceResolver>,
        sink: Arc<dyn AudioSink>,
        lyrics: Arc<LyricSynchronizer>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            persister: Arc::new(QueuePersister::new(db.clone())),
            prefs: Arc::new(PrefPersister::new(db.clone())),
            state: Arc::new(RwLock::new(EngineState::new(settings.default_quality))),
            settings: Arc::new(RwLock::new(settings)),
            db,
            resolver,
            sink,
            lyrics,
            events,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn clone_handles(&self) -> Self {
        Self {
            db: self.db.clone(),
            state: Arc::clone(&self.state),
            settings: Arc::clone(&self.settings),
            resolver: Arc::clone(&self.resolver),
            sink: Arc::clone(&self.sink),
            lyrics: Arc::clone(&self.lyrics),
            persister: Arc::clone(&self.persister),
            prefs: Arc::clone(&self.prefs),
            events: Arc::clone(&self.events),
            tasks: Arc::clone(&self.tasks),
        }
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Restore the previous session
    ///
    /// Loads the queue snapshot and saved preferences, then loads the saved
    /// track's source paused at the saved position. A track that can no
    /// longer be resolved is left current but unloaded.
    pub async fn setup(&self) -> Result<()> {
        let settings = self.settings().await;
        let entries = load_queue(&self.db).await?;

        let repeat_mode: RepeatMode = self.load_pref(keys::REPEAT_MODE).await.unwrap_or_default();
        let saved_item: Option<MediaItem> = self.load_json_pref(keys::CURRENT_MEDIA).await;
        let saved_progress: Option<f64> = self.load_pref(keys::CURRENT_PROGRESS).await;
        let saved_quality: Option<QualityKey> = self.load_pref(keys::CURRENT_QUALITY).await;
        let volume: Option<f32> = self.load_pref(keys::VOLUME).await;
        let speed: Option<f32> = self.load_pref(keys::SPEED).await;

        self.persister.reset().await;

        let mut pending = Pending::default();
        let current = {
            let mut state = self.state.write().await;
            state.queue = QueueStore::from_entries(entries);
            state.repeat_mode = repeat_mode;
            self.emit(CadenceEvent::QueueChanged {
                length: state.queue.len(),
                trigger: QueueChangeTrigger::Restore,
                timestamp: time::now(),
            });
            self.emit(CadenceEvent::RepeatModeChanged {
                mode: repeat_mode,
                timestamp: time::now(),
            });

            if let Some(volume) = volume.filter(|v| v.is_finite()) {
                state.volume = volume.clamp(0.0, 1.0);
                self.sink.set_volume(state.volume);
                self.emit(CadenceEvent::VolumeChanged {
                    volume: state.volume,
                    timestamp: time::now(),
                });
            }
            if let Some(speed) = speed.filter(|s| s.is_finite() && *s > 0.0) {
                state.speed = speed;
                self.sink.set_speed(speed);
                self.emit(CadenceEvent::SpeedChanged {
                    speed,
                    timestamp: time::now(),
                });
            }

            let position = saved_item
                .as_ref()
                .and_then(|item| state.queue.position_of(&item.media));
            if position.is_none() {
                if let Some(item) = &saved_item {
                    info!("Saved track {} is no longer queued", item.media);
                }
            }
            self.set_current(&mut state, position, &mut pending);
            state.current_item.as_ref().map(|e| e.item.clone())
        };
        self.flush(pending).await;

        let Some(item) = current else {
            info!("Session restored: no current track");
            return Ok(());
        };

        let preference = saved_quality.unwrap_or(settings.default_quality);
        match self
            .resolver
            .resolve(&item, preference, settings.when_quality_missing)
            .await
        {
            Ok(resolved) => {
                let mut pending = Pending::default();
                {
                    let mut state = self.state.write().await;
                    if !state.is_current(&item.media) {
                        debug!("Current track changed during restore");
                        return Ok(());
                    }
                    let position = saved_progress.filter(|p| p.is_finite() && *p > 0.0);
                    self.sink.set_source(&item.media, &resolved.source);
                    if let Some(position) = position {
                        self.sink.seek_to(position);
                    }
                    state.progress = Progress {
                        current_time: position.unwrap_or(0.0),
                        duration: item.duration,
                    };
                    state.saved_second = position.map(|p| p as u64);
                    self.set_quality_value(&mut state, resolved.quality, &mut pending);
                    self.set_player_state(&mut state, PlayerState::Paused);
                }
                self.flush(pending).await;
                info!("Session restored: {} ({})", item.media, resolved.quality);
            }
            Err(e) => debug!("Could not restore source for {}: {}", item.media, e),
        }
        Ok(())
    }

    /// Abort background tasks
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for handle in tasks.drain(..) {
            handle.abort();
        }
        self.lyrics.shutdown();
        info!("Playback engine shut down");
    }

    pub async fn settings(&self) -> PlayerSettings {
        self.settings.read().await.clone()
    }

    /// Re-read player settings from the database
    pub async fn reload_settings(&self) -> Result<()> {
        let settings = PlayerSettings::load(&self.db).await?;
        *self.settings.write().await = settings;
        Ok(())
    }

    // ========================================================================
    // Track selection
    // ========================================================================

    /// Play the queue entry at `index`
    ///
    /// `index` wraps in both directions. Replaying the entry that is already
    /// current restarts (or resumes) it without re-resolving. Otherwise the
    /// source is resolved and installed only if no newer `play_at` started
    /// meanwhile and the entry is still at `index`. On failure a track that is
    /// still queued becomes current, the sink is cleared and the error policy
    /// runs; a failure for a track no longer queued is dropped.
    pub async fn play_at(&self, index: i64, options: PlayOptions) -> Result<()> {
        let settings = self.settings().await;
        let mut pending = Pending::default();

        let (target, index, generation) = {
            let mut state = self.state.write().await;
            if state.queue.is_empty() {
                state.play_generation += 1;
                state.loading = None;
                self.clear_playback(&mut state, &mut pending);
                drop(state);
                self.flush(pending).await;
                return Ok(());
            }

            let index = index.rem_euclid(state.queue.len() as i64) as usize;
            let Some(target) = state.queue.get(index).cloned() else {
                return Ok(());
            };

            if !options.refresh_source
                && state.current_index == Some(index)
                && state.is_current(target.media())
                && state.player_state != PlayerState::None
            {
                let restart = options
                    .restart_on_same_media
                    .unwrap_or(settings.restart_on_same_media);
                if restart {
                    self.sink.seek_to(0.0);
                    state.progress.current_time = 0.0;
                }
                self.sink.play();
                self.set_player_state(&mut state, PlayerState::Playing);
                return Ok(());
            }

            state.play_generation += 1;
            state.loading = Some(target.media().clone());
            (target, index, state.play_generation)
        };

        let preference = options.quality.unwrap_or(settings.default_quality);
        let result = self
            .resolver
            .resolve(&target.item, preference, settings.when_quality_missing)
            .await;

        let mut state = self.state.write().await;
        if state.play_generation != generation {
            debug!("Discarding source for {}: superseded", target.media());
            return Ok(());
        }
        state.loading = None;
        let still_at_index = state
            .queue
            .get(index)
            .is_some_and(|e| e.media() == target.media());

        match result {
            Ok(resolved) => {
                if !still_at_index {
                    debug!("Discarding source for {}: queue changed", target.media());
                    return Ok(());
                }
                self.set_quality_value(&mut state, resolved.quality, &mut pending);
                self.set_current(&mut state, Some(index), &mut pending);
                self.reset_progress(&mut state, target.item.duration, &mut pending);
                self.sink.set_source(target.media(), &resolved.source);
                if let Some(position) = options.seek_to.filter(|p| p.is_finite() && *p > 0.0) {
                    self.sink.seek_to(position);
                    state.progress.current_time = position;
                }
                self.sink.play();
                self.set_player_state(&mut state, PlayerState::Playing);
                drop(state);
                self.flush(pending).await;
                Ok(())
            }
            Err(e) => {
                let position = if still_at_index {
                    Some(index)
                } else {
                    state.queue.position_of(target.media())
                };
                let Some(position) = position else {
                    debug!("Discarding failure for {}: no longer queued", target.media());
                    return Ok(());
                };
                self.set_current(&mut state, Some(position), &mut pending);
                self.set_quality_value(&mut state, settings.default_quality, &mut pending);
                self.sink.clear();
                self.set_player_state(&mut state, PlayerState::None);
                self.reset_progress(&mut state, target.item.duration, &mut pending);
                self.report_error(&state, Some(target.media().clone()), e.to_string(), &settings);
                drop(state);
                self.flush(pending).await;
                Err(e)
            }
        }
    }

    /// Play `item`, appending it to the queue if absent
    pub async fn play_media(&self, item: MediaItem, options: PlayOptions) -> Result<()> {
        let mut pending = Pending::default();
        let index = {
            let mut state = self.state.write().await;
            let before = state.queue.len();
            let index = state.queue.append(item);
            if state.queue.len() != before {
                self.queue_changed(&state, QueueChangeTrigger::Append, &mut pending);
            }
            index
        };
        self.flush(pending).await;
        self.play_at(index as i64, options).await
    }

    /// Replace the queue with `items` and start playing
    ///
    /// Plays `start` if given, otherwise the first entry of the new queue
    /// (after shuffling, in Shuffle mode).
    pub async fn play_with_replace_queue(
        &self,
        items: Vec<MediaItem>,
        start: Option<MediaItem>,
    ) -> Result<()> {
        if items.is_empty() && start.is_none() {
            return Ok(());
        }

        let mut pending = Pending::default();
        let start = {
            let mut state = self.state.write().await;
            let shuffle = state.repeat_mode == RepeatMode::Shuffle;
            state.queue.enqueue_replace(items, shuffle);
            self.relocate_current(&mut state, &mut pending);
            self.queue_changed(&state, QueueChangeTrigger::Replace, &mut pending);
            start.or_else(|| state.queue.get(0).map(|e| e.item.clone()))
        };
        self.flush(pending).await;

        match start {
            Some(item) => self.play_media(item, PlayOptions::default()).await,
            None => Ok(()),
        }
    }

    pub async fn skip_next(&self) -> Result<()> {
        self.skip_by(1).await
    }

    pub async fn skip_prev(&self) -> Result<()> {
        self.skip_by(-1).await
    }

    async fn skip_by(&self, delta: i64) -> Result<()> {
        let base = {
            let state = self.state.read().await;
            state.skip_base().map_or(-1, |i| i as i64)
        };
        // play_at clears playback on an empty queue
        self.play_at(base + delta, PlayOptions::default()).await
    }

    /// Output reached the end of the current track
    pub async fn on_track_ended(&self) -> Result<()> {
        let mut pending = Pending::default();
        let (mode, index) = {
            let mut state = self.state.write().await;
            let duration = state.progress.duration;
            self.reset_progress(&mut state, duration, &mut pending);
            (state.repeat_mode, state.current_index)
        };
        self.flush(pending).await;

        match (mode, index) {
            (RepeatMode::Loop, Some(index)) => {
                let options = PlayOptions {
                    restart_on_same_media: Some(true),
                    ..Default::default()
                };
                self.play_at(index as i64, options).await
            }
            _ => self.skip_next().await,
        }
    }

    // ========================================================================
    // Queue editing
    // ========================================================================

    /// Insert items right after the current track
    pub async fn add_next(&self, items: Vec<MediaItem>) {
        if items.is_empty() {
            return;
        }
        let mut pending = Pending::default();
        {
            let mut state = self.state.write().await;
            let current = state.current_media().cloned();
            state.queue.enqueue_next(items, current.as_ref());
            self.relocate_current(&mut state, &mut pending);
            self.queue_changed(&state, QueueChangeTrigger::AddNext, &mut pending);
        }
        self.flush(pending).await;
    }

    /// Remove an entry; playback is cleared first if it is the current track
    ///
    /// Returns whether anything was removed.
    pub async fn remove_from_queue(&self, target: QueueTarget) -> bool {
        let mut pending = Pending::default();
        {
            let mut state = self.state.write().await;
            let index = match &target {
                QueueTarget::Index(i) => (*i < state.queue.len()).then_some(*i),
                QueueTarget::Media(media) => state.queue.position_of(media),
            };
            let Some(index) = index else {
                return false;
            };

            if state.current_index == Some(index) {
                self.clear_playback(&mut state, &mut pending);
            }
            state.queue.remove(&QueueTarget::Index(index));
            self.relocate_current(&mut state, &mut pending);
            self.queue_changed(&state, QueueChangeTrigger::Remove, &mut pending);
        }
        self.flush(pending).await;
        true
    }

    /// Empty the queue and stop playback
    pub async fn clear_queue(&self) {
        let mut pending = Pending::default();
        {
            let mut state = self.state.write().await;
            state.play_generation += 1;
            state.loading = None;
            self.clear_playback(&mut state, &mut pending);
            state.queue.clear();
            self.queue_changed(&state, QueueChangeTrigger::Clear, &mut pending);
        }
        self.flush(pending).await;
    }

    // ========================================================================
    // Transport controls
    // ========================================================================

    /// Resume the current track
    ///
    /// A current track with no loaded source (its resolution failed) is
    /// resolved again.
    pub async fn resume(&self) -> Result<()> {
        let reload = {
            let mut state = self.state.write().await;
            match (state.current_index, state.player_state) {
                (None, _) => None,
                (Some(index), PlayerState::None) => Some(index),
                (Some(_), _) => {
                    self.sink.play();
                    self.set_player_state(&mut state, PlayerState::Playing);
                    None
                }
            }
        };
        match reload {
            Some(index) => self.play_at(index as i64, PlayOptions::refresh()).await,
            None => Ok(()),
        }
    }

    pub async fn pause(&self) {
        let mut state = self.state.write().await;
        if state.player_state == PlayerState::Playing {
            self.sink.pause();
            self.set_player_state(&mut state, PlayerState::Paused);
        }
    }

    pub async fn toggle_player_state(&self) -> Result<()> {
        let playing = self.state.read().await.player_state == PlayerState::Playing;
        if playing {
            self.pause().await;
            Ok(())
        } else {
            self.resume().await
        }
    }

    /// Seek within the current track
    pub async fn seek_to(&self, position: f64) -> Result<()> {
        if !position.is_finite() {
            return Err(Error::BadRequest(format!("Invalid seek position: {}", position)));
        }
        let mut state = self.state.write().await;
        if state.current_item.is_some() {
            let position = position.max(0.0);
            self.sink.seek_to(position);
            state.progress.current_time = position;
        }
        Ok(())
    }

    /// Set output volume, clamped to 0.0-1.0
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(Error::BadRequest(format!("Invalid volume: {}", volume)));
        }
        let volume = volume.clamp(0.0, 1.0);
        let mut pending = Pending::default();
        {
            let mut state = self.state.write().await;
            state.volume = volume;
            self.sink.set_volume(volume);
            pending.pref(&mut state, PrefWrite::Volume(volume));
            self.emit(CadenceEvent::VolumeChanged {
                volume,
                timestamp: time::now(),
            });
        }
        self.flush(pending).await;
        Ok(())
    }

    pub async fn volume_up(&self, step: f32) -> Result<()> {
        let volume = self.state.read().await.volume;
        self.set_volume(volume + step).await
    }

    pub async fn volume_down(&self, step: f32) -> Result<()> {
        let volume = self.state.read().await.volume;
        self.set_volume(volume - step).await
    }

    /// Set playback speed; must be positive
    pub async fn set_speed(&self, speed: f32) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(Error::BadRequest(format!("Invalid speed: {}", speed)));
        }
        let mut pending = Pending::default();
        {
            let mut state = self.state.write().await;
            state.speed = speed;
            self.sink.set_speed(speed);
            pending.pref(&mut state, PrefWrite::Speed(speed));
            self.emit(CadenceEvent::SpeedChanged {
                speed,
                timestamp: time::now(),
            });
        }
        self.flush(pending).await;
        Ok(())
    }

    /// Switch repeat mode
    ///
    /// Entering Shuffle permutes the queue, leaving it restores insertion
    /// order. The current track keeps its identity either way.
    pub async fn set_repeat_mode(&self, mode: RepeatMode) {
        let mut pending = Pending::default();
        {
            let mut state = self.state.write().await;
            let was_shuffle = state.repeat_mode == RepeatMode::Shuffle;
            let is_shuffle = mode == RepeatMode::Shuffle;
            if was_shuffle != is_shuffle {
                state.queue.toggle_shuffle_ordering(is_shuffle);
                self.relocate_current(&mut state, &mut pending);
                let trigger = if is_shuffle {
                    QueueChangeTrigger::Shuffle
                } else {
                    QueueChangeTrigger::Unshuffle
                };
                self.queue_changed(&state, trigger, &mut pending);
            }
            state.repeat_mode = mode;
            pending.pref(&mut state, PrefWrite::RepeatMode(mode));
            self.emit(CadenceEvent::RepeatModeChanged {
                mode,
                timestamp: time::now(),
            });
        }
        self.flush(pending).await;
    }

    /// Advance Shuffle -> Loop -> Queue -> Shuffle
    pub async fn toggle_repeat_mode(&self) -> RepeatMode {
        let next = self.state.read().await.repeat_mode.cycle();
        self.set_repeat_mode(next).await;
        next
    }

    /// Switch the current track to another quality tier
    ///
    /// The new source is installed at the same position and play/pause state,
    /// provided the track is still current once resolution finishes.
    pub async fn set_quality(&self, quality: QualityKey) -> Result<()> {
        let settings = self.settings().await;
        let item = {
            let state = self.state.read().await;
            match &state.current_item {
                Some(entry) if state.quality != quality => entry.item.clone(),
                _ => return Ok(()),
            }
        };

        let resolved = self
            .resolver
            .resolve(&item, quality, settings.when_quality_missing)
            .await?;

        let mut pending = Pending::default();
        {
            let mut state = self.state.write().await;
            if !state.is_current(&item.media) {
                debug!("Discarding {} source for {}: track changed", quality, item.media);
                return Ok(());
            }
            let position = state.progress.current_time;
            self.sink.set_source(&item.media, &resolved.source);
            if position > 0.0 {
                self.sink.seek_to(position);
            }
            match state.player_state {
                PlayerState::Playing => self.sink.play(),
                PlayerState::None => self.set_player_state(&mut state, PlayerState::Paused),
                PlayerState::Paused => {}
            }
            self.set_quality_value(&mut state, resolved.quality, &mut pending);
        }
        self.flush(pending).await;
        Ok(())
    }

    // ========================================================================
    // Output feedback
    // ========================================================================

    /// Progress reported by the output
    ///
    /// The saved position is rewritten once per whole second.
    pub async fn on_progress(&self, current_time: f64, duration: Option<f64>) {
        if !current_time.is_finite() {
            return;
        }
        let mut pending = Pending::default();
        {
            let mut state = self.state.write().await;
            if state.current_item.is_none() {
                return;
            }
            state.progress = Progress {
                current_time,
                duration: duration.or(state.progress.duration),
            };
            let second = current_time.max(0.0) as u64;
            if state.saved_second != Some(second) {
                state.saved_second = Some(second);
                pending.pref(&mut state, PrefWrite::CurrentProgress(Some(current_time)));
            }
            self.emit(CadenceEvent::ProgressUpdated {
                current_time,
                duration: state.progress.duration,
                timestamp: time::now(),
            });
        }
        self.lyrics.on_progress(current_time);
        self.flush(pending).await;
    }

    /// The output failed to play the current source
    pub async fn on_output_error(&self, reason: impl Into<String>) {
        let settings = self.settings().await;
        let mut pending = Pending::default();
        {
            let mut state = self.state.write().await;
            let media = state.current_media().cloned();
            self.set_player_state(&mut state, PlayerState::None);
            let duration = state.progress.duration;
            self.reset_progress(&mut state, duration, &mut pending);
            self.report_error(&state, media, reason.into(), &settings);
        }
        self.flush(pending).await;
    }

    /// Dispatch a transport command
    pub async fn handle_command(&self, command: PlayerCommand) -> Result<()> {
        debug!("Handling command {:?}", command);
        match command {
            PlayerCommand::SkipNext => self.skip_next().await,
            PlayerCommand::SkipPrev => self.skip_prev().await,
            PlayerCommand::SetRepeatMode(mode) => {
                self.set_repeat_mode(mode).await;
                Ok(())
            }
            PlayerCommand::SetPlayerState(PlayerState::Playing) => self.resume().await,
            PlayerCommand::SetPlayerState(_) => {
                self.pause().await;
                Ok(())
            }
        }
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub async fn snapshot(&self) -> PlaybackStatus {
        self.state.read().await.status(self.lyrics.snapshot())
    }

    pub async fn queue(&self) -> Vec<QueueEntry> {
        self.state.read().await.queue.entries().to_vec()
    }

    pub async fn current_item(&self) -> Option<MediaItem> {
        self.state
            .read()
            .await
            .current_item
            .as_ref()
            .map(|e| e.item.clone())
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // ========================================================================
    // State helpers (called with the write lock held)
    // ========================================================================

    fn emit(&self, event: CadenceEvent) {
        self.events.emit_lossy(event);
    }

    fn set_player_state(&self, state: &mut EngineState, new_state: PlayerState) {
        if state.player_state == new_state {
            return;
        }
        let old_state = std::mem::replace(&mut state.player_state, new_state);
        self.emit(CadenceEvent::PlayerStateChanged {
            old_state,
            new_state,
            timestamp: time::now(),
        });
    }

    /// Point the current track at a queue position (`None` clears it)
    fn set_current(&self, state: &mut EngineState, index: Option<usize>, pending: &mut Pending) {
        let entry = index.and_then(|i| state.queue.get(i)).cloned();
        let changed = state.current_media() != entry.as_ref().map(QueueEntry::media);
        state.current_index = entry.as_ref().and(index);
        state.current_item = entry;

        if changed {
            let item = state.current_item.as_ref().map(|e| e.item.clone());
            self.lyrics.on_track_changed(item.as_ref());
            pending.pref(state, PrefWrite::CurrentMedia(item.clone()));
            self.emit(CadenceEvent::CurrentMediaChanged {
                item,
                timestamp: time::now(),
            });
        }
    }

    fn set_quality_value(&self, state: &mut EngineState, quality: QualityKey, pending: &mut Pending) {
        if state.quality != quality {
            state.quality = quality;
            self.emit(CadenceEvent::QualityChanged {
                quality,
                timestamp: time::now(),
            });
        }
        pending.pref(state, PrefWrite::Quality(quality));
    }

    fn reset_progress(&self, state: &mut EngineState, duration: Option<f64>, pending: &mut Pending) {
        state.progress = Progress {
            current_time: 0.0,
            duration,
        };
        state.saved_second = None;
        pending.pref(state, PrefWrite::CurrentProgress(None));
    }

    /// Stop the output and drop the current track
    fn clear_playback(&self, state: &mut EngineState, pending: &mut Pending) {
        self.sink.clear();
        self.set_current(state, None, pending);
        self.set_player_state(state, PlayerState::None);
        self.reset_progress(state, None, pending);
    }

    /// Re-point `current_index` at the current track after a reorder
    fn relocate_current(&self, state: &mut EngineState, pending: &mut Pending) {
        let Some(media) = state.current_media().cloned() else {
            return;
        };
        match state.queue.position_of(&media) {
            Some(position) => state.current_index = Some(position),
            None => self.clear_playback(state, pending),
        }
    }

    fn queue_changed(&self, state: &EngineState, trigger: QueueChangeTrigger, pending: &mut Pending) {
        pending.queue = Some(state.queue.snapshot());
        self.emit(CadenceEvent::QueueChanged {
            length: state.queue.len(),
            trigger,
            timestamp: time::now(),
        });
    }

    /// Publish a playback error and apply the error policy
    fn report_error(
        &self,
        state: &EngineState,
        media: Option<MediaRef>,
        reason: String,
        settings: &PlayerSettings,
    ) {
        match &media {
            Some(m) => warn!("Playback error for {}: {}", m, reason),
            None => warn!("Playback error: {}", reason),
        }
        self.emit(CadenceEvent::PlayerError {
            media: media.clone(),
            reason,
            timestamp: time::now(),
        });

        // Without a current track there is nothing to skip past
        let Some(media) = media else {
            return;
        };
        if settings.play_error == ErrorPolicy::Skip && state.queue.len() > 1 {
            self.schedule_error_skip(media, settings.error_skip_cooldown());
        }
    }

    /// Skip to the next track after `cooldown`, unless the track changed
    fn schedule_error_skip(&self, failed: MediaRef, cooldown: Duration) {
        let engine = self.clone_handles();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let unchanged = engine.state.read().await.current_media() == Some(&failed);
            if !unchanged {
                debug!("Auto-skip cancelled: current track changed");
                return;
            }
            if let Err(e) = engine.skip_next().await {
                debug!("Auto-skip did not start playback: {}", e);
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    async fn flush(&self, pending: Pending) {
        if let Some(snapshot) = pending.queue {
            self.persister.persist(snapshot).await;
        }
        for (version, write) in pending.prefs {
            self.prefs.persist(version, write).await;
        }
    }

    async fn load_pref<T: FromStr>(&self, key: &str) -> Option<T> {
        settings::get_setting(&self.db, key).await.unwrap_or_else(|e| {
            warn!("Ignoring saved '{}': {}", key, e);
            None
        })
    }

    async fn load_json_pref<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        settings::get_json_setting(&self.db, key)
            .await
            .unwrap_or_else(|e| {
                warn!("Ignoring saved '{}': {}", key, e);
                None
            })
    }
}
