//! Playback orchestration
//!
//! Queue ownership, the play/pause/skip state machine and its persistence.

pub mod engine;
pub mod output;
pub mod persist;
pub mod queue;
pub mod state;

pub use engine::{PlaybackEngine, VOLUME_STEP};
pub use output::{AudioSink, BusSink};
pub use persist::{PrefPersister, PrefWrite, QueuePersister};
pub use queue::{QueueEntry, QueueSnapshot, QueueStore, QueueTarget};
pub use state::{PlayOptions, PlaybackStatus};
