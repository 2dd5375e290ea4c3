//! Play queue snapshot persistence
//!
//! The whole queue is rewritten in one transaction; rows are keyed by
//! position so loading restores the exact order.

use crate::error::Result;
use crate::playback::queue::QueueEntry;
use cadence_common::MediaItem;
use sqlx::{Pool, Row, Sqlite};

/// Replace the stored queue with `entries`
pub async fn save_queue(db: &Pool<Sqlite>, entries: &[QueueEntry]) -> Result<()> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM play_queue").execute(&mut *tx).await?;

    for (position, entry) in entries.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO play_queue
                (position, platform, media_id, title, artist, album, duration, inserted_at, order_index)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position as i64)
        .bind(&entry.item.media.platform)
        .bind(&entry.item.media.id)
        .bind(&entry.item.title)
        .bind(&entry.item.artist)
        .bind(&entry.item.album)
        .bind(entry.item.duration)
        .bind(entry.inserted_at)
        .bind(entry.order_index as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Load the stored queue in position order
pub async fn load_queue(db: &Pool<Sqlite>) -> Result<Vec<QueueEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT platform, media_id, title, artist, album, duration, inserted_at, order_index
        FROM play_queue
        ORDER BY position
        "#,
    )
    .fetch_all(db)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<QueueEntry> {
            let mut item = MediaItem::new(
                row.try_get::<String, _>("platform")?,
                row.try_get::<String, _>("media_id")?,
            );
            item.title = row.try_get("title")?;
            item.artist = row.try_get("artist")?;
            item.album = row.try_get("album")?;
            item.duration = row.try_get("duration")?;

            Ok(QueueEntry::new(
                item,
                row.try_get("inserted_at")?,
                row.try_get::<i64, _>("order_index")? as u32,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn entry(id: &str, order_index: u32) -> QueueEntry {
        let mut item = MediaItem::new("test", id).with_title(id).with_artist("artist");
        item.duration = Some(200.5);
        QueueEntry::new(item, 1_700_000_000_000, order_index)
    }

    #[tokio::test]
    async fn test_empty_queue_loads_empty() {
        let db = open_in_memory().await.unwrap();
        assert!(load_queue(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_preserves_order_and_keys() {
        let db = open_in_memory().await.unwrap();
        let entries = vec![entry("c", 2), entry("a", 0), entry("b", 1)];
        save_queue(&db, &entries).await.unwrap();

        let loaded = load_queue(&db).await.unwrap();
        let ids: Vec<&str> = loaded.iter().map(|e| e.media().id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
        assert_eq!(loaded[0].order_index, 2);
        assert_eq!(loaded[0].inserted_at, 1_700_000_000_000);
        assert_eq!(loaded[0].item.duration, Some(200.5));
        assert_eq!(loaded[0].item.artist, "artist");
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let db = open_in_memory().await.unwrap();
        save_queue(&db, &[entry("a", 0), entry("b", 1)]).await.unwrap();
        save_queue(&db, &[entry("z", 0)]).await.unwrap();

        let loaded = load_queue(&db).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].media().id, "z");
    }
}
