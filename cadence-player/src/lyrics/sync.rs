//! Lyric synchronizer
//!
//! Keeps the active lyric line in step with playback progress. A timeline is
//! fetched from the plugin whenever the current track changes; a fetch that
//! completes after the track changed again is dropped by identity.

use super::parser::{LrcParser, LyricLine, LyricTimeline};
use crate::plugin::PluginHost;
use cadence_common::events::{CadenceEvent, EventBus};
use cadence_common::{MediaItem, MediaRef};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
struct LyricState {
    /// Track the state belongs to
    media: Option<MediaRef>,
    timeline: Option<LyricTimeline>,
    current_index: Option<usize>,
}

/// Read-only view of the lyric state
#[derive(Debug, Clone, Default, Serialize)]
pub struct LyricSnapshot {
    pub media: Option<MediaRef>,
    /// Whether a non-empty timeline is loaded
    pub loaded: bool,
    pub current_index: Option<usize>,
    pub current_line: Option<LyricLine>,
}

struct Inner {
    plugins: Arc<PluginHost>,
    events: Arc<EventBus>,
    state: Mutex<LyricState>,
}

/// Derives the active lyric line from progress updates
pub struct LyricSynchronizer {
    inner: Arc<Inner>,
    fetches: Mutex<Vec<JoinHandle<()>>>,
}

impl LyricSynchronizer {
    pub fn new(plugins: Arc<PluginHost>, events: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                plugins,
                events,
                state: Mutex::new(LyricState::default()),
            }),
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Reset for a new current track and fetch its lyric in the background
    ///
    /// Nothing is fetched when the track is unchanged or cleared.
    pub fn on_track_changed(&self, item: Option<&MediaItem>) {
        if !self.inner.reset(item.map(|i| &i.media)) {
            return;
        }
        let Some(item) = item.cloned() else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            inner.fetch(&item).await;
        });

        let mut fetches = self.fetches.lock().unwrap_or_else(|e| e.into_inner());
        fetches.retain(|h| !h.is_finished());
        fetches.push(handle);
    }

    /// Fetch and install the lyric for `item` in the foreground
    ///
    /// Same staleness rule as the background fetch: the result is dropped if
    /// `item` is no longer the current track.
    pub async fn load(&self, item: &MediaItem) {
        self.inner.fetch(item).await;
    }

    /// Recompute the active line; returns whether it changed
    pub fn on_progress(&self, current_time: f64) -> bool {
        let mut state = self.inner.lock();
        let Some(timeline) = &state.timeline else {
            return false;
        };

        let index = timeline.position(current_time);
        if index == state.current_index {
            return false;
        }

        let line = index.and_then(|i| timeline.get(i)).cloned();
        state.current_index = index;
        let Some(media) = state.media.clone() else {
            return true;
        };
        drop(state);

        self.inner.events.emit_lossy(CadenceEvent::LyricLineChanged {
            media,
            index,
            time: line.as_ref().map(|l| l.time),
            text: line.map(|l| l.text).unwrap_or_default(),
            timestamp: chrono::Utc::now(),
        });
        true
    }

    pub fn snapshot(&self) -> LyricSnapshot {
        let state = self.inner.lock();
        let current_line = state
            .timeline
            .as_ref()
            .zip(state.current_index)
            .and_then(|(t, i)| t.get(i))
            .cloned();
        LyricSnapshot {
            media: state.media.clone(),
            loaded: state.timeline.as_ref().is_some_and(|t| !t.is_empty()),
            current_index: state.current_index,
            current_line,
        }
    }

    /// Abort in-flight fetches
    pub fn shutdown(&self) {
        let mut fetches = self.fetches.lock().unwrap_or_else(|e| e.into_inner());
        for handle in fetches.drain(..) {
            handle.abort();
        }
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, LyricState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Point the state at `media`, dropping the old timeline
    ///
    /// Returns false if `media` already owns the state.
    fn reset(&self, media: Option<&MediaRef>) -> bool {
        {
            let mut state = self.lock();
            if state.media.as_ref() == media {
                return false;
            }
            *state = LyricState {
                media: media.cloned(),
                ..Default::default()
            };
        }
        self.events.emit_lossy(CadenceEvent::LyricCleared {
            timestamp: chrono::Utc::now(),
        });
        true
    }

    async fn fetch(&self, item: &MediaItem) {
        let timeline = match self.plugins.get_lyric(item).await {
            Ok(Some(raw)) => LrcParser::parse(&raw.raw_lrc),
            Ok(None) => {
                debug!("No lyric for {}", item.media);
                LyricTimeline::default()
            }
            Err(e) => {
                debug!("Lyric fetch for {} failed: {}", item.media, e);
                LyricTimeline::default()
            }
        };

        let line_count = timeline.len();
        {
            let mut state = self.lock();
            if state.media.as_ref() != Some(&item.media) {
                debug!("Discarding stale lyric for {}", item.media);
                return;
            }
            state.timeline = Some(timeline);
            state.current_index = None;
        }

        if line_count > 0 {
            self.events.emit_lossy(CadenceEvent::LyricLoaded {
                media: item.media.clone(),
                line_count,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{MediaPlugin, MediaSource, RawLyric};
    use async_trait::async_trait;
    use cadence_common::QualityKey;

    struct LyricPlugin;

    #[async_trait]
    impl MediaPlugin for LyricPlugin {
        fn platform(&self) -> &str {
            "test"
        }

        async fn get_media_source(
            &self,
            _item: &MediaItem,
            _quality: QualityKey,
        ) -> anyhow::Result<Option<MediaSource>> {
            Ok(None)
        }

        async fn get_lyric(&self, item: &MediaItem) -> anyhow::Result<Option<RawLyric>> {
            match item.media.id.as_str() {
                "broken" => anyhow::bail!("lyric server down"),
                "none" => Ok(None),
                _ => Ok(Some(RawLyric {
                    raw_lrc: "[00:01.00]one\n[00:03.00]two\n".to_string(),
                })),
            }
        }
    }

    fn synchronizer() -> LyricSynchronizer {
        let plugins = PluginHost::new().with_plugin(Arc::new(LyricPlugin));
        LyricSynchronizer::new(Arc::new(plugins), Arc::new(EventBus::new(64)))
    }

    #[tokio::test]
    async fn test_line_changes_only_on_new_index() {
        let sync = synchronizer();
        let item = MediaItem::new("test", "song");
        sync.inner.reset(Some(&item.media));
        sync.load(&item).await;

        assert!(!sync.on_progress(0.5));
        assert!(sync.on_progress(1.0));
        assert!(!sync.on_progress(1.5));
        assert!(!sync.on_progress(2.9));
        assert!(sync.on_progress(3.0));
        assert_eq!(sync.snapshot().current_line.unwrap().text, "two");

        // Seeking back before the first line clears the line
        assert!(sync.on_progress(0.0));
        assert!(sync.snapshot().current_line.is_none());
    }

    #[tokio::test]
    async fn test_stale_result_discarded() {
        let sync = synchronizer();
        let first = MediaItem::new("test", "first");
        let second = MediaItem::new("test", "second");

        sync.inner.reset(Some(&second.media));
        // A fetch for a track that is no longer current
        sync.load(&first).await;

        let snapshot = sync.snapshot();
        assert_eq!(snapshot.media, Some(second.media));
        assert!(!snapshot.loaded);
    }

    #[tokio::test]
    async fn test_unavailable_lyric_is_empty_state() {
        let sync = synchronizer();
        for id in ["broken", "none"] {
            let item = MediaItem::new("test", id);
            sync.inner.reset(Some(&item.media));
            sync.load(&item).await;
            assert!(!sync.snapshot().loaded);
            assert!(!sync.on_progress(10.0));
        }
    }

    #[tokio::test]
    async fn test_track_change_spawns_fetch() {
        let sync = synchronizer();
        let mut rx = sync.inner.events.subscribe();
        let item = MediaItem::new("test", "song");

        sync.on_track_changed(Some(&item));
        assert!(matches!(rx.recv().await.unwrap(), CadenceEvent::LyricCleared { .. }));
        match rx.recv().await.unwrap() {
            CadenceEvent::LyricLoaded { media, line_count, .. } => {
                assert_eq!(media, item.media);
                assert_eq!(line_count, 2);
            }
            other => panic!("unexpected event {:?}", other),
        }

        // Same track again does not refetch
        sync.on_track_changed(Some(&item));
        sync.on_track_changed(None);
        assert!(matches!(rx.recv().await.unwrap(), CadenceEvent::LyricCleared { .. }));
        assert!(sync.snapshot().media.is_none());
        sync.shutdown();
    }
}
