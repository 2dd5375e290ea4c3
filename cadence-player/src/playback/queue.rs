//! Play queue store
//!
//! Ordered, identity-unique list of queue entries. The store is purely
//! in-memory and synchronous; the playback engine owns it and hands every
//! resulting snapshot to the [`QueuePersister`](crate::playback::persist::QueuePersister).
//!
//! Ordering key: each entry carries `(inserted_at, order_index)`. Disabling
//! shuffle sorts by that key, so every operation that could make the key
//! disagree with the visible order (shuffle enable) re-seals it first.

use cadence_common::time;
use cadence_common::{MediaItem, MediaRef};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Queue entry: media plus its restorable ordering key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    #[serde(flatten)]
    pub item: MediaItem,
    /// Unix milliseconds at insertion
    pub inserted_at: i64,
    /// Position within the insertion batch
    pub order_index: u32,
}

impl QueueEntry {
    pub fn new(item: MediaItem, inserted_at: i64, order_index: u32) -> Self {
        Self {
            item,
            inserted_at,
            order_index,
        }
    }

    pub fn media(&self) -> &MediaRef {
        &self.item.media
    }

    fn sort_key(&self) -> (i64, u32) {
        (self.inserted_at, self.order_index)
    }
}

/// What to remove from the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueueTarget {
    Index(usize),
    Media(MediaRef),
}

impl From<MediaRef> for QueueTarget {
    fn from(media: MediaRef) -> Self {
        QueueTarget::Media(media)
    }
}

impl From<usize> for QueueTarget {
    fn from(index: usize) -> Self {
        QueueTarget::Index(index)
    }
}

/// Versioned copy of the queue handed to persistence
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub version: u64,
    pub entries: Vec<QueueEntry>,
}

/// In-memory play queue
#[derive(Debug, Default)]
pub struct QueueStore {
    entries: Vec<QueueEntry>,
    /// Incremented on every mutation
    version: u64,
    /// Last ordering timestamp handed out; keeps stamps strictly increasing
    last_stamp: i64,
}

impl QueueStore {
    /// Create new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue from persisted entries
    ///
    /// Later duplicates of a MediaRef are dropped.
    pub fn from_entries(entries: Vec<QueueEntry>) -> Self {
        let mut seen = HashSet::new();
        let entries: Vec<QueueEntry> = entries
            .into_iter()
            .filter(|e| seen.insert(e.media().clone()))
            .collect();
        let last_stamp = entries.iter().map(|e| e.inserted_at).max().unwrap_or(0);

        Self {
            entries,
            version: 0,
            last_stamp,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    /// Position of a MediaRef by identity
    pub fn position_of(&self, media: &MediaRef) -> Option<usize> {
        self.entries.iter().position(|e| e.media() == media)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            version: self.version,
            entries: self.entries.clone(),
        }
    }

    /// Insert items right after the current track
    ///
    /// Existing occurrences of the incoming MediaRefs are removed first. If
    /// one of the items is the current track it leads the batch, so the
    /// current position is preserved. With no current track the batch goes
    /// to the tail.
    pub fn enqueue_next(&mut self, items: Vec<MediaItem>, current: Option<&MediaRef>) {
        let mut batch = self.stamp_batch(items);
        if batch.is_empty() {
            return;
        }

        if let Some(current) = current {
            if let Some(dup) = batch.iter().position(|e| e.media() == current) {
                let entry = batch.remove(dup);
                batch.insert(0, entry);
            }
        }

        let incoming: HashSet<MediaRef> = batch.iter().map(|e| e.media().clone()).collect();
        let anchor = current.and_then(|c| self.position_of(c));

        let old = std::mem::take(&mut self.entries);
        let (head, tail): (Vec<QueueEntry>, Vec<QueueEntry>) = match anchor {
            Some(pos) => {
                let mut head = old;
                let tail = head.split_off(pos + 1);
                (head, tail)
            }
            None => (old, Vec::new()),
        };

        self.entries = head
            .into_iter()
            .filter(|e| !incoming.contains(e.media()))
            .chain(batch)
            .chain(tail.into_iter().filter(|e| !incoming.contains(e.media())))
            .collect();
        self.version += 1;
    }

    /// Replace the entire queue
    ///
    /// Fresh ordering keys follow the incoming order; `shuffle` then permutes
    /// the stored sequence without touching the keys.
    pub fn enqueue_replace(&mut self, items: Vec<MediaItem>, shuffle: bool) {
        self.entries = self.stamp_batch(items);
        if shuffle {
            self.entries.shuffle(&mut rand::thread_rng());
        }
        self.version += 1;
    }

    /// Append an item at the tail unless already queued
    ///
    /// Returns the item's position.
    pub fn append(&mut self, item: MediaItem) -> usize {
        if let Some(pos) = self.position_of(&item.media) {
            return pos;
        }
        let stamp = self.next_stamp();
        self.entries.push(QueueEntry::new(item, stamp, 0));
        self.version += 1;
        self.entries.len() - 1
    }

    /// Remove by identity or by position
    pub fn remove(&mut self, target: &QueueTarget) -> Option<QueueEntry> {
        let index = match target {
            QueueTarget::Index(i) => (*i < self.entries.len()).then_some(*i),
            QueueTarget::Media(media) => self.position_of(media),
        }?;
        self.version += 1;
        Some(self.entries.remove(index))
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.version += 1;
    }

    /// Switch between shuffled and insertion ordering
    ///
    /// Enabling seals the ordering key to the current sequence and applies a
    /// Fisher-Yates shuffle. Disabling sorts by `(inserted_at, order_index)`.
    pub fn toggle_shuffle_ordering(&mut self, enable: bool) {
        if enable {
            self.seal_ordering();
            self.entries.shuffle(&mut rand::thread_rng());
        } else {
            self.entries.sort_by_key(QueueEntry::sort_key);
        }
        self.version += 1;
    }

    /// Rewrite ordering keys so that sorting reproduces the current order
    fn seal_ordering(&mut self) {
        let base = self
            .entries
            .iter()
            .map(|e| e.inserted_at)
            .min()
            .unwrap_or_else(time::now_millis);
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.inserted_at = base;
            entry.order_index = i as u32;
        }
    }

    fn next_stamp(&mut self) -> i64 {
        self.last_stamp = time::now_millis().max(self.last_stamp + 1);
        self.last_stamp
    }

    /// Stamp a batch with one timestamp and batch positions, dropping
    /// duplicates inside the batch
    fn stamp_batch(&mut self, items: Vec<MediaItem>) -> Vec<QueueEntry> {
        let stamp = self.next_stamp();
        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(|item| seen.insert(item.media.clone()))
            .enumerate()
            .map(|(i, item)| QueueEntry::new(item, stamp, i as u32))
            .collect()
    }
}
