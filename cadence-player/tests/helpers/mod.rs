//! Shared fixtures for cadence-player integration tests
//!
//! A scripted plugin, a sink that records every call, and a builder wiring
//! them into a `PlaybackEngine` over an in-memory database.

#![allow(dead_code)]

use async_trait::async_trait;
use cadence_common::events::{CadenceEvent, EventBus};
use cadence_common::{MediaItem, MediaRef, QualityKey};
use cadence_player::config::PlayerSettings;
use cadence_player::db::open_in_memory;
use cadence_player::fs::{FileSystem, LocalFileSystem};
use cadence_player::library::DownloadRegistry;
use cadence_player::lyrics::LyricSynchronizer;
use cadence_player::playback::{AudioSink, PlaybackEngine};
use cadence_player::plugin::{MediaPlugin, MediaSource, PluginHost, RawLyric};
use cadence_player::source::MediaSourceResolver;
use sqlx::{Pool, Sqlite};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const PLATFORM: &str = "test";

pub fn item(id: &str) -> MediaItem {
    MediaItem::new(PLATFORM, id).with_title(id.to_uppercase())
}

pub fn media(id: &str) -> MediaRef {
    MediaRef::new(PLATFORM, id)
}

pub fn items(ids: &[&str]) -> Vec<MediaItem> {
    ids.iter().map(|id| item(id)).collect()
}

pub fn source_url(id: &str, quality: QualityKey) -> String {
    format!("https://test.invalid/{}/{}", id, quality)
}

// ============================================================================
// Scripted plugin
// ============================================================================

/// Serves every id at every tier unless told otherwise
#[derive(Default)]
pub struct ScriptedPlugin {
    failing: Mutex<HashSet<String>>,
    tiers: Mutex<HashMap<String, Vec<QualityKey>>>,
    delays: Mutex<HashMap<String, Duration>>,
    lyrics: Mutex<HashMap<String, String>>,
    lookups: Mutex<Vec<(String, QualityKey)>>,
}

impl ScriptedPlugin {
    /// Every lookup for `id` errors
    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn recover(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }

    /// Restrict `id` to the given tiers
    pub fn tiers(&self, id: &str, tiers: &[QualityKey]) {
        self.tiers
            .lock()
            .unwrap()
            .insert(id.to_string(), tiers.to_vec());
    }

    /// Delay source lookups for `id`
    pub fn delay(&self, id: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(id.to_string(), delay);
    }

    pub fn lyric(&self, id: &str, lrc: &str) {
        self.lyrics
            .lock()
            .unwrap()
            .insert(id.to_string(), lrc.to_string());
    }

    pub fn lookups(&self) -> Vec<(String, QualityKey)> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaPlugin for ScriptedPlugin {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn get_media_source(
        &self,
        item: &MediaItem,
        quality: QualityKey,
    ) -> anyhow::Result<Option<MediaSource>> {
        let id = item.media.id.clone();
        self.lookups.lock().unwrap().push((id.clone(), quality));

        let delay = self.delays.lock().unwrap().get(&id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&id) {
            anyhow::bail!("source lookup failed for {}", id);
        }
        let served = self
            .tiers
            .lock()
            .unwrap()
            .get(&id)
            .map_or(true, |tiers| tiers.contains(&quality));
        Ok(served.then(|| MediaSource::new(source_url(&id, quality))))
    }

    async fn get_lyric(&self, item: &MediaItem) -> anyhow::Result<Option<RawLyric>> {
        Ok(self
            .lyrics
            .lock()
            .unwrap()
            .get(&item.media.id)
            .map(|raw| RawLyric {
                raw_lrc: raw.clone(),
            }))
    }
}

// ============================================================================
// Recording sink
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    SetSource(MediaRef, String),
    Play,
    Pause,
    SeekTo(f64),
    Clear,
    SetVolume(f32),
    SetSpeed(f32),
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<SinkCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn push(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl AudioSink for RecordingSink {
    fn set_source(&self, media: &MediaRef, source: &MediaSource) {
        self.push(SinkCall::SetSource(media.clone(), source.url.clone()));
    }

    fn play(&self) {
        self.push(SinkCall::Play);
    }

    fn pause(&self) {
        self.push(SinkCall::Pause);
    }

    fn seek_to(&self, position: f64) {
        self.push(SinkCall::SeekTo(position));
    }

    fn clear(&self) {
        self.push(SinkCall::Clear);
    }

    fn set_volume(&self, volume: f32) {
        self.push(SinkCall::SetVolume(volume));
    }

    fn set_speed(&self, speed: f32) {
        self.push(SinkCall::SetSpeed(speed));
    }
}

// ============================================================================
// Engine fixture
// ============================================================================

pub struct TestPlayer {
    pub engine: Arc<PlaybackEngine>,
    pub registry: Arc<DownloadRegistry>,
    pub plugin: Arc<ScriptedPlugin>,
    pub sink: Arc<RecordingSink>,
    pub events: Arc<EventBus>,
    pub db: Pool<Sqlite>,
}

impl TestPlayer {
    pub async fn new() -> Self {
        Self::with_settings(test_settings()).await
    }

    pub async fn with_settings(settings: PlayerSettings) -> Self {
        let db = open_in_memory().await.expect("in-memory database");
        Self::on_database(db, settings).await
    }

    /// Build a player over an existing database, e.g. to simulate a restart
    pub async fn on_database(db: Pool<Sqlite>, settings: PlayerSettings) -> Self {
        let events = Arc::new(EventBus::new(1024));
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem);
        let registry = Arc::new(DownloadRegistry::new(
            db.clone(),
            Arc::clone(&fs),
            Arc::clone(&events),
        ));
        registry.load().await.expect("registry load");

        let plugin = Arc::new(ScriptedPlugin::default());
        let plugin_handle: Arc<dyn MediaPlugin> = Arc::clone(&plugin) as Arc<dyn MediaPlugin>;
        let plugins = Arc::new(PluginHost::new().with_plugin(plugin_handle));
        let resolver = Arc::new(MediaSourceResolver::new(
            Arc::clone(&registry),
            Arc::clone(&plugins),
            fs,
        ));
        let lyrics = Arc::new(LyricSynchronizer::new(plugins, Arc::clone(&events)));
        let sink = Arc::new(RecordingSink::default());
        let sink_handle: Arc<dyn AudioSink> = Arc::clone(&sink) as Arc<dyn AudioSink>;

        let engine = Arc::new(PlaybackEngine::new(
            db.clone(),
            settings,
            resolver,
            sink_handle,
            lyrics,
            Arc::clone(&events),
        ));

        Self {
            engine,
            registry,
            plugin,
            sink,
            events,
            db,
        }
    }

    /// Replace the queue with `ids` and start at the first
    pub async fn with_queue(ids: &[&str]) -> Self {
        let player = Self::new().await;
        player
            .engine
            .play_with_replace_queue(items(ids), None)
            .await
            .expect("initial playback");
        player
    }

    pub async fn current_id(&self) -> Option<String> {
        self.engine.current_item().await.map(|i| i.media.id)
    }

    pub async fn queue_ids(&self) -> Vec<String> {
        self.engine
            .queue()
            .await
            .into_iter()
            .map(|e| e.item.media.id)
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CadenceEvent> {
        self.events.subscribe()
    }
}

/// Default settings with a short error cooldown
pub fn test_settings() -> PlayerSettings {
    PlayerSettings {
        error_skip_cooldown_ms: 20,
        ..PlayerSettings::default()
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Drain events received so far
pub fn drain(rx: &mut broadcast::Receiver<CadenceEvent>) -> Vec<CadenceEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
