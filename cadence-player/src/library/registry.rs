//! Download registry
//!
//! Reference-counted ledger of library media. Each record counts how many
//! logical owners reference a MediaRef; a record whose count would reach zero
//! is deleted. A record may also carry the local file it was downloaded to.
//!
//! The in-memory index mirrors the set of records that have a local file, so
//! [`DownloadRegistry::is_downloaded`] never touches the database. It is only
//! updated after the ledger transaction commits.
//!
//! Ledger mutations lock the MediaRefs they touch through [`KeyedLocks`]:
//! calls over overlapping sets serialize, disjoint calls run concurrently.

use super::locks::KeyedLocks;
use crate::db::library::{self as ledger, DownloadData, LibraryRecord};
use crate::db::settings::{self, keys};
use crate::error::Result;
use crate::fs::FileSystem;
use cadence_common::events::{CadenceEvent, EventBus};
use cadence_common::{MediaItem, MediaRef};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Item handed to [`DownloadRegistry::add_to_library`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    #[serde(flatten)]
    pub item: MediaItem,
    /// Local file, when the add is the result of a finished download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadData>,
}

impl LibraryEntry {
    /// Library membership without a local file
    pub fn reference(item: MediaItem) -> Self {
        Self {
            item,
            download: None,
        }
    }

    /// Library membership backed by a downloaded file
    pub fn downloaded(item: MediaItem, download: DownloadData) -> Self {
        Self {
            item,
            download: Some(download),
        }
    }
}

/// Result of [`DownloadRegistry::remove_from_library`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoveOutcome {
    /// Entries whose ledger reference was dropped
    pub removed: Vec<MediaRef>,
    /// Entries left untouched because their file could not be deleted
    pub failed: Vec<MediaRef>,
}

/// Reference-counted download ledger with an in-memory download index
pub struct DownloadRegistry {
    db: Pool<Sqlite>,
    fs: Arc<dyn FileSystem>,
    events: Arc<EventBus>,
    /// MediaRef -> local file, for records that have one
    index: RwLock<HashMap<MediaRef, DownloadData>>,
    locks: KeyedLocks<MediaRef>,
}

impl DownloadRegistry {
    /// Create an empty registry; call [`load`](Self::load) to hydrate it
    pub fn new(db: Pool<Sqlite>, fs: Arc<dyn FileSystem>, events: Arc<EventBus>) -> Self {
        Self {
            db,
            fs,
            events,
            index: RwLock::new(HashMap::new()),
            locks: KeyedLocks::new(),
        }
    }

    /// Hydrate the index from the persisted membership list
    pub async fn load(&self) -> Result<usize> {
        let listed: Vec<MediaRef> = settings::get_json_setting(&self.db, keys::DOWNLOADED_LIST)
            .await?
            .unwrap_or_default();
        let records = ledger::get_records(&self.db, &listed).await?;

        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        index.clear();
        for record in records {
            if let Some(download) = record.download {
                index.insert(record.item.media, download);
            }
        }

        if index.len() != listed.len() {
            warn!(
                "Downloaded list names {} items, ledger has files for {}",
                listed.len(),
                index.len()
            );
        }
        info!("Download registry loaded: {} downloaded items", index.len());
        Ok(index.len())
    }

    /// Add entries under a fresh batch id
    pub async fn add_to_library(&self, entries: Vec<LibraryEntry>) -> Result<Vec<MediaRef>> {
        self.add_to_library_batch(Uuid::new_v4(), entries).await
    }

    /// Add entries as one logical batch
    ///
    /// Existing records gain one reference and take any new local-file
    /// metadata; absent ones are created with one reference. Duplicates within
    /// the call count once. Replaying an applied `batch_id` changes nothing, so
    /// a retried add increments once. Returns the MediaRefs that were applied.
    pub async fn add_to_library_batch(
        &self,
        batch_id: Uuid,
        entries: Vec<LibraryEntry>,
    ) -> Result<Vec<MediaRef>> {
        let entries = dedup_by_media(entries, |e| &e.item.media);
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self
            .locks
            .lock_all(entries.iter().map(|e| e.item.media.clone()))
            .await;

        let mut tx = self.db.begin().await?;
        if !ledger::mark_batch_applied(&mut *tx, batch_id).await? {
            debug!("Library batch {} already applied", batch_id);
            return Ok(Vec::new());
        }

        let mut updated = Vec::with_capacity(entries.len());
        for entry in entries {
            let record = match ledger::get_record(&mut *tx, &entry.item.media).await? {
                Some(mut existing) => {
                    existing.ref_count += 1;
                    if entry.download.is_some() {
                        existing.download = entry.download;
                    }
                    existing
                }
                None => LibraryRecord {
                    item: entry.item,
                    ref_count: 1,
                    download: entry.download,
                },
            };
            ledger::put_record(&mut *tx, &record).await?;
            updated.push(record);
        }

        let membership = ledger::downloaded_refs(&mut *tx).await?;
        settings::set_json_setting(&mut *tx, keys::DOWNLOADED_LIST, &membership).await?;
        tx.commit().await?;

        let added: Vec<MediaRef> = updated.iter().map(|r| r.media().clone()).collect();
        {
            let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
            for record in updated {
                if let Some(download) = record.download {
                    index.insert(record.item.media, download);
                }
            }
        }

        debug!("Library batch {} added {} items", batch_id, added.len());
        self.events.emit_lossy(CadenceEvent::LibraryAdded {
            items: added.clone(),
            timestamp: chrono::Utc::now(),
        });
        Ok(added)
    }

    /// Drop one reference from each entry
    ///
    /// With `delete_file`, local files are deleted first and concurrently,
    /// outside the ledger transaction; an entry whose file could not be
    /// deleted is left untouched and reported in `failed`. Proceeding entries
    /// lose a reference: at zero the record is deleted, otherwise its local
    /// file metadata is cleared. Entries with no record are ignored.
    pub async fn remove_from_library(
        &self,
        media: &[MediaRef],
        delete_file: bool,
    ) -> Result<RemoveOutcome> {
        let media = dedup_by_media(media.to_vec(), |m| m);
        if media.is_empty() {
            return Ok(RemoveOutcome::default());
        }

        let _guard = self.locks.lock_all(media.iter().cloned()).await;

        let records = ledger::get_records(&self.db, &media).await?;

        let mut outcome = RemoveOutcome::default();
        let proceeding: Vec<LibraryRecord> = if delete_file {
            let deletions = records.iter().map(|record| async {
                match &record.download {
                    Some(download) => self.fs.remove(&download.path).await,
                    None => true,
                }
            });
            let results = join_all(deletions).await;

            records
                .into_iter()
                .zip(results)
                .filter_map(|(record, deleted)| {
                    if deleted {
                        Some(record)
                    } else {
                        warn!("Keeping {} in library: file deletion failed", record.media());
                        outcome.failed.push(record.item.media);
                        None
                    }
                })
                .collect()
        } else {
            records
        };

        if proceeding.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.db.begin().await?;
        for mut record in proceeding {
            record.ref_count -= 1;
            if record.ref_count == 0 {
                ledger::delete_record(&mut *tx, record.media()).await?;
            } else {
                record.download = None;
                ledger::put_record(&mut *tx, &record).await?;
            }
            outcome.removed.push(record.item.media);
        }
        let membership = ledger::downloaded_refs(&mut *tx).await?;
        settings::set_json_setting(&mut *tx, keys::DOWNLOADED_LIST, &membership).await?;
        tx.commit().await?;

        {
            let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
            for m in &outcome.removed {
                index.remove(m);
            }
        }

        debug!(
            "Library removed {} items ({} failed)",
            outcome.removed.len(),
            outcome.failed.len()
        );
        self.events.emit_lossy(CadenceEvent::LibraryRemoved {
            items: outcome.removed.clone(),
            timestamp: chrono::Utc::now(),
        });
        Ok(outcome)
    }

    /// Whether a local file is recorded for `media`
    pub fn is_downloaded(&self, media: &MediaRef) -> bool {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(media)
    }

    /// Recorded local file for `media`
    pub fn download_data(&self, media: &MediaRef) -> Option<DownloadData> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(media)
            .cloned()
    }

    /// Every record that has a local file, in ledger order
    pub async fn downloaded_items(&self) -> Result<Vec<LibraryRecord>> {
        let mut conn = self.db.acquire().await?;
        let refs = ledger::downloaded_refs(&mut conn).await?;
        drop(conn);
        ledger::get_records(&self.db, &refs).await
    }

    /// Current ledger record for `media`
    pub async fn record(&self, media: &MediaRef) -> Result<Option<LibraryRecord>> {
        let mut conn = self.db.acquire().await?;
        ledger::get_record(&mut conn, media).await
    }
}

/// Keep the first occurrence of each MediaRef
fn dedup_by_media<T>(items: Vec<T>, media: impl Fn(&T) -> &MediaRef) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(media(item).clone()))
        .collect()
}
