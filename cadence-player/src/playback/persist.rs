//! Queue and preference persistence
//!
//! Writes queue snapshots to the `play_queue` table. Snapshots carry the
//! queue version they were taken at; a snapshot older than one already
//! written is dropped, so concurrent writers never regress the stored queue.
//! Failed writes are logged and not retried: the in-memory queue stays
//! authoritative and the next mutation writes a fresh snapshot.
//!
//! Playback preferences follow the same rule per settings key: each write is
//! stamped while the state lock is held, and a write older than the last one
//! stored for its key is dropped.

use super::queue::QueueSnapshot;
use crate::db::queue::save_queue;
use crate::db::settings::{self, keys};
use crate::error::Result;
use cadence_common::events::RepeatMode;
use cadence_common::{MediaItem, QualityKey};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct QueuePersister {
    db: Pool<Sqlite>,
    /// Highest snapshot version written (or attempted)
    last_version: Mutex<Option<u64>>,
}

impl QueuePersister {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            db,
            last_version: Mutex::new(None),
        }
    }

    /// Persist `snapshot` unless a newer one was already written
    ///
    /// Returns whether the write went through.
    pub async fn persist(&self, snapshot: QueueSnapshot) -> bool {
        let mut last = self.last_version.lock().await;
        if last.is_some_and(|v| snapshot.version <= v) {
            debug!(
                "Skipping stale queue snapshot v{} (have v{:?})",
                snapshot.version, *last
            );
            return false;
        }
        *last = Some(snapshot.version);

        match save_queue(&self.db, &snapshot.entries).await {
            Ok(()) => {
                debug!(
                    "Persisted queue v{} ({} entries)",
                    snapshot.version,
                    snapshot.entries.len()
                );
                true
            }
            Err(e) => {
                warn!("Failed to persist queue v{}: {}", snapshot.version, e);
                false
            }
        }
    }

    /// Forget the written version, e.g. after the queue was rebuilt from storage
    pub async fn reset(&self) {
        *self.last_version.lock().await = None;
    }
}

/// Playback preference change
#[derive(Debug, Clone)]
pub enum PrefWrite {
    CurrentMedia(Option<MediaItem>),
    CurrentProgress(Option<f64>),
    Quality(QualityKey),
    RepeatMode(RepeatMode),
    Volume(f32),
    Speed(f32),
}

impl PrefWrite {
    fn key(&self) -> &'static str {
        match self {
            PrefWrite::CurrentMedia(_) => keys::CURRENT_MEDIA,
            PrefWrite::CurrentProgress(_) => keys::CURRENT_PROGRESS,
            PrefWrite::Quality(_) => keys::CURRENT_QUALITY,
            PrefWrite::RepeatMode(_) => keys::REPEAT_MODE,
            PrefWrite::Volume(_) => keys::VOLUME,
            PrefWrite::Speed(_) => keys::SPEED,
        }
    }

    async fn apply(&self, db: &Pool<Sqlite>) -> Result<()> {
        let key = self.key();
        match self {
            PrefWrite::CurrentMedia(Some(item)) => settings::set_json_setting(db, key, item).await,
            PrefWrite::CurrentMedia(None) | PrefWrite::CurrentProgress(None) => {
                settings::delete_setting(db, key).await
            }
            PrefWrite::CurrentProgress(Some(t)) => settings::set_setting(db, key, *t).await,
            PrefWrite::Quality(q) => settings::set_setting(db, key, *q).await,
            PrefWrite::RepeatMode(m) => settings::set_setting(db, key, *m).await,
            PrefWrite::Volume(v) => settings::set_setting(db, key, *v).await,
            PrefWrite::Speed(s) => settings::set_setting(db, key, *s).await,
        }
    }
}

/// Ordered writer for playback preferences
pub struct PrefPersister {
    db: Pool<Sqlite>,
    /// Settings key -> highest version written (or attempted)
    last_versions: Mutex<HashMap<&'static str, u64>>,
}

impl PrefPersister {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            db,
            last_versions: Mutex::new(HashMap::new()),
        }
    }

    /// Store `write` unless a newer write to the same key was already stored
    ///
    /// Returns whether the write went through.
    pub async fn persist(&self, version: u64, write: PrefWrite) -> bool {
        let mut last = self.last_versions.lock().await;
        let key = write.key();
        if last.get(key).is_some_and(|v| version <= *v) {
            debug!("Skipping stale '{}' write v{}", key, version);
            return false;
        }
        last.insert(key, version);

        match write.apply(&self.db).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save preference {:?}: {}", write, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::db::queue::load_queue;
    use crate::playback::queue::QueueEntry;
    use cadence_common::MediaItem;

    fn snapshot(version: u64, ids: &[&str]) -> QueueSnapshot {
        QueueSnapshot {
            version,
            entries: ids
                .iter()
                .enumerate()
                .map(|(i, id)| QueueEntry::new(MediaItem::new("test", *id), 1, i as u32))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_older_snapshot_never_overwrites_newer() {
        let db = open_in_memory().await.unwrap();
        let persister = QueuePersister::new(db.clone());

        assert!(persister.persist(snapshot(2, &["a", "b"])).await);
        assert!(!persister.persist(snapshot(1, &["stale"])).await);
        assert!(!persister.persist(snapshot(2, &["dup"])).await);

        let stored = load_queue(&db).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].media().id, "a");

        assert!(persister.persist(snapshot(3, &["c"])).await);
        assert_eq!(load_queue(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_accepts_restarted_versions() {
        let db = open_in_memory().await.unwrap();
        let persister = QueuePersister::new(db.clone());
        assert!(persister.persist(snapshot(5, &["a"])).await);
        persister.reset().await;
        assert!(persister.persist(snapshot(0, &["b"])).await);
        assert_eq!(load_queue(&db).await.unwrap()[0].media().id, "b");
    }

    #[tokio::test]
    async fn test_failed_write_is_not_fatal() {
        let db = open_in_memory().await.unwrap();
        sqlx::query("DROP TABLE play_queue").execute(&db).await.unwrap();
        let persister = QueuePersister::new(db);
        assert!(!persister.persist(snapshot(1, &["a"])).await);
    }

    #[tokio::test]
    async fn test_older_pref_write_never_overwrites_newer() {
        let db = open_in_memory().await.unwrap();
        let prefs = PrefPersister::new(db.clone());
        let newer = MediaItem::new("test", "b");

        assert!(prefs.persist(4, PrefWrite::CurrentMedia(Some(newer.clone()))).await);
        assert!(!prefs.persist(3, PrefWrite::CurrentMedia(Some(MediaItem::new("test", "a")))).await);
        assert!(!prefs.persist(3, PrefWrite::CurrentMedia(None)).await);

        let stored: Option<MediaItem> = settings::get_json_setting(&db, keys::CURRENT_MEDIA)
            .await
            .unwrap();
        assert_eq!(stored.map(|i| i.media), Some(newer.media));
    }

    #[tokio::test]
    async fn test_pref_versions_are_tracked_per_key() {
        let db = open_in_memory().await.unwrap();
        let prefs = PrefPersister::new(db.clone());

        assert!(prefs.persist(7, PrefWrite::Volume(0.5)).await);
        assert!(prefs.persist(2, PrefWrite::Speed(1.5)).await);

        let volume: Option<f32> = settings::get_setting(&db, keys::VOLUME).await.unwrap();
        let speed: Option<f32> = settings::get_setting(&db, keys::SPEED).await.unwrap();
        assert_eq!(volume, Some(0.5));
        assert_eq!(speed, Some(1.5));
    }
}
