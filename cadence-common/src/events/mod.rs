//! Event types for the Cadence event system
//!
//! Provides shared event definitions and the EventBus used by the playback
//! core, the HTTP surface and the host notification bridge.

mod player_types;
mod queue_types;

pub use player_types::{PlayerState, Progress, RepeatMode};
pub use queue_types::{OutputAction, QueueChangeTrigger};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::media::{MediaItem, MediaRef, QualityKey};

/// Cadence event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
/// Every state transition of the playback core emits one of these, whatever
/// triggered it, so all observers stay consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CadenceEvent {
    /// Player state changed (None / Playing / Paused)
    ///
    /// Triggers:
    /// - Host: `sync-current-playing-state` notification
    /// - SSE: Update UI controls
    PlayerStateChanged {
        /// Player state before change
        old_state: PlayerState,
        /// Player state after change
        new_state: PlayerState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Current track changed (including to no track)
    ///
    /// Triggers:
    /// - Host: `sync-current-music` notification (tray, extensions)
    /// - Lyric synchronizer: fetch timeline for the new track
    CurrentMediaChanged {
        /// New current track, `None` when playback was cleared
        item: Option<MediaItem>,
        /// When the track changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Repeat mode changed
    RepeatModeChanged {
        mode: RepeatMode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Effective playback quality changed
    QualityChanged {
        quality: QualityKey,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback progress reported by the output
    ///
    /// NOTE: high frequency; emitted lossy.
    ProgressUpdated {
        /// Position in seconds
        current_time: f64,
        /// Length in seconds, if known
        duration: Option<f64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents or ordering changed
    QueueChanged {
        /// Queue length after the change
        length: usize,
        /// Why the queue changed
        trigger: QueueChangeTrigger,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track could not be played
    ///
    /// Triggers:
    /// - Playback engine: auto-skip when the error policy allows
    /// - SSE: Show error toast
    PlayerError {
        /// Track that failed, if one was current
        media: Option<MediaRef>,
        /// Human-readable cause
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Volume changed (0.0-1.0)
    VolumeChanged {
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback speed changed
    SpeedChanged {
        speed: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A lyric timeline was loaded for the current track
    LyricLoaded {
        media: MediaRef,
        line_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Lyric state was reset (track change, or no lyric available)
    LyricCleared {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Active lyric line changed
    LyricLineChanged {
        media: MediaRef,
        /// Index into the timeline, `None` before the first stamped line
        index: Option<usize>,
        /// Line start in seconds
        time: Option<f64>,
        /// Line text (empty before the first line)
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Media entered the download library
    LibraryAdded {
        items: Vec<MediaRef>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Media left the download library
    LibraryRemoved {
        items: Vec<MediaRef>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Instruction for the audio output
    OutputRequested {
        action: OutputAction,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CadenceEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            CadenceEvent::PlayerStateChanged { .. } => "PlayerStateChanged",
            CadenceEvent::CurrentMediaChanged { .. } => "CurrentMediaChanged",
            CadenceEvent::RepeatModeChanged { .. } => "RepeatModeChanged",
            CadenceEvent::QualityChanged { .. } => "QualityChanged",
            CadenceEvent::ProgressUpdated { .. } => "ProgressUpdated",
            CadenceEvent::QueueChanged { .. } => "QueueChanged",
            CadenceEvent::PlayerError { .. } => "PlayerError",
            CadenceEvent::VolumeChanged { .. } => "VolumeChanged",
            CadenceEvent::SpeedChanged { .. } => "SpeedChanged",
            CadenceEvent::LyricLoaded { .. } => "LyricLoaded",
            CadenceEvent::LyricCleared { .. } => "LyricCleared",
            CadenceEvent::LyricLineChanged { .. } => "LyricLineChanged",
            CadenceEvent::LibraryAdded { .. } => "LibraryAdded",
            CadenceEvent::LibraryRemoved { .. } => "LibraryRemoved",
            CadenceEvent::OutputRequested { .. } => "OutputRequested",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over a `tokio::sync::broadcast` channel. Subscribers
/// unregister by dropping their receiver.
pub struct EventBus {
    tx: broadcast::Sender<CadenceEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    ///
    /// # Examples
    ///
    /// ```
    /// use cadence_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CadenceEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CadenceEvent,
    ) -> Result<usize, broadcast::error::SendError<CadenceEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// ```
    /// use cadence_common::events::{CadenceEvent, EventBus};
    ///
    /// let event_bus = EventBus::new(16);
    /// event_bus.emit_lossy(CadenceEvent::ProgressUpdated {
    ///     current_time: 42.0,
    ///     duration: Some(180.0),
    ///     timestamp: chrono::Utc::now(),
    /// });
    /// ```
    pub fn emit_lossy(&self, event: CadenceEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe_and_drop_unregisters() {
        let bus = EventBus::new(100);
        let rx = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let event = CadenceEvent::LyricCleared {
            timestamp: chrono::Utc::now(),
        };
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = Arc::new(EventBus::new(100));
        let mut rx = bus.subscribe();

        let event = CadenceEvent::PlayerStateChanged {
            old_state: PlayerState::Paused,
            new_state: PlayerState::Playing,
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(bus.emit(event).unwrap(), 1);

        match rx.recv().await.unwrap() {
            CadenceEvent::PlayerStateChanged {
                old_state,
                new_state,
                ..
            } => {
                assert_eq!(old_state, PlayerState::Paused);
                assert_eq!(new_state, PlayerState::Playing);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = CadenceEvent::RepeatModeChanged {
            mode: RepeatMode::Shuffle,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RepeatModeChanged");
        assert_eq!(json["mode"], "shuffle");
        assert_eq!(event.event_type(), "RepeatModeChanged");
    }

    #[test]
    fn test_output_action_serialization() {
        let event = CadenceEvent::OutputRequested {
            action: OutputAction::SeekTo { position: 12.5 },
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"]["action"], "seek_to");
        assert_eq!(json["action"]["position"], 12.5);
    }
}
