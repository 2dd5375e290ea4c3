//! Audio output seam
//!
//! The core never decodes audio. It drives an [`AudioSink`]; failures and
//! progress come back through `PlaybackEngine::on_output_error` and
//! `PlaybackEngine::on_progress`.

use crate::plugin::MediaSource;
use cadence_common::events::{CadenceEvent, EventBus, OutputAction};
use cadence_common::MediaRef;
use std::sync::Arc;

/// Output driven by the playback engine
///
/// Calls are fire-and-forget and must not block.
pub trait AudioSink: Send + Sync {
    /// Load a source without starting playback
    fn set_source(&self, media: &MediaRef, source: &MediaSource);
    fn play(&self);
    fn pause(&self);
    /// Seek to `position` seconds
    fn seek_to(&self, position: f64);
    /// Unload the current source
    fn clear(&self);
    fn set_volume(&self, volume: f32);
    fn set_speed(&self, speed: f32);
}

/// Sink that publishes every call as an `OutputRequested` event
///
/// Used by the host binary: the UI process owns the real audio element and
/// follows these events.
pub struct BusSink {
    events: Arc<EventBus>,
}

impl BusSink {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self { events }
    }

    fn send(&self, action: OutputAction) {
        self.events.emit_lossy(CadenceEvent::OutputRequested {
            action,
            timestamp: chrono::Utc::now(),
        });
    }
}

impl AudioSink for BusSink {
    fn set_source(&self, media: &MediaRef, source: &MediaSource) {
        self.send(OutputAction::SetSource {
            media: media.clone(),
            url: source.url.clone(),
            headers: source.headers.clone(),
        });
    }

    fn play(&self) {
        self.send(OutputAction::Play);
    }

    fn pause(&self) {
        self.send(OutputAction::Pause);
    }

    fn seek_to(&self, position: f64) {
        self.send(OutputAction::SeekTo { position });
    }

    fn clear(&self) {
        self.send(OutputAction::Clear);
    }

    fn set_volume(&self, volume: f32) {
        self.send(OutputAction::SetVolume { volume });
    }

    fn set_speed(&self, speed: f32) {
        self.send(OutputAction::SetSpeed { speed });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_sink_publishes_actions() {
        let events = Arc::new(EventBus::new(16));
        let mut rx = events.subscribe();
        let sink = BusSink::new(Arc::clone(&events));

        let media = MediaRef::new("local", "/a.mp3");
        sink.set_source(&media, &MediaSource::new("/a.mp3"));
        sink.seek_to(12.5);

        match rx.recv().await.unwrap() {
            CadenceEvent::OutputRequested {
                action: OutputAction::SetSource { media: m, url, .. },
                ..
            } => {
                assert_eq!(m, media);
                assert_eq!(url, "/a.mp3");
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            CadenceEvent::OutputRequested { action, .. } => {
                assert_eq!(action, OutputAction::SeekTo { position: 12.5 })
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
