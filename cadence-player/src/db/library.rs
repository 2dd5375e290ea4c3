//! Download ledger rows
//!
//! One row per MediaRef in `media_library`. Row-level helpers take a
//! connection so the registry can compose them inside its own transaction.

use crate::error::{Error, Result};
use cadence_common::{MediaItem, MediaRef, QualityKey};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use std::path::PathBuf;
use uuid::Uuid;

/// Local file backing a library record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadData {
    pub path: PathBuf,
    pub quality: QualityKey,
}

/// Ledger record
///
/// `ref_count` is always at least 1; a record that would drop to zero is
/// deleted instead.
#[derive(Debug, Clone)]
pub struct LibraryRecord {
    pub item: MediaItem,
    pub ref_count: u32,
    pub download: Option<DownloadData>,
}

impl LibraryRecord {
    pub fn media(&self) -> &MediaRef {
        &self.item.media
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let mut item = MediaItem::new(
            row.try_get::<String, _>("platform")?,
            row.try_get::<String, _>("media_id")?,
        );
        item.title = row.try_get("title")?;
        item.artist = row.try_get("artist")?;
        item.album = row.try_get("album")?;
        item.duration = row.try_get("duration")?;

        let path: Option<String> = row.try_get("download_path")?;
        let quality: Option<String> = row.try_get("download_quality")?;
        let download = match (path, quality) {
            (Some(path), Some(quality)) => Some(DownloadData {
                path: PathBuf::from(path),
                quality: quality.parse().map_err(|e: cadence_common::Error| {
                    Error::Internal(format!("Corrupt ledger row for {}: {}", item.media, e))
                })?,
            }),
            _ => None,
        };

        Ok(Self {
            item,
            ref_count: row.try_get::<i64, _>("ref_count")? as u32,
            download,
        })
    }
}

/// Fetch one record
pub async fn get_record(
    conn: &mut SqliteConnection,
    media: &MediaRef,
) -> Result<Option<LibraryRecord>> {
    let row = sqlx::query(
        r#"
        SELECT platform, media_id, title, artist, album, duration,
               ref_count, download_path, download_quality
        FROM media_library
        WHERE platform = ? AND media_id = ?
        "#,
    )
    .bind(&media.platform)
    .bind(&media.id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(LibraryRecord::from_row).transpose()
}

/// Fetch several records, preserving input order and skipping absent ones
pub async fn get_records(db: &Pool<Sqlite>, media: &[MediaRef]) -> Result<Vec<LibraryRecord>> {
    let mut conn = db.acquire().await?;
    let mut records = Vec::with_capacity(media.len());
    for m in media {
        if let Some(record) = get_record(&mut conn, m).await? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Insert or overwrite a record
pub async fn put_record(conn: &mut SqliteConnection, record: &LibraryRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO media_library
            (platform, media_id, title, artist, album, duration,
             ref_count, download_path, download_quality)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(platform, media_id) DO UPDATE SET
            title = excluded.title,
            artist = excluded.artist,
            album = excluded.album,
            duration = excluded.duration,
            ref_count = excluded.ref_count,
            download_path = excluded.download_path,
            download_quality = excluded.download_quality
        "#,
    )
    .bind(&record.item.media.platform)
    .bind(&record.item.media.id)
    .bind(&record.item.title)
    .bind(&record.item.artist)
    .bind(&record.item.album)
    .bind(record.item.duration)
    .bind(record.ref_count as i64)
    .bind(
        record
            .download
            .as_ref()
            .map(|d| d.path.to_string_lossy().into_owned()),
    )
    .bind(record.download.as_ref().map(|d| d.quality.to_string()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Delete a record
pub async fn delete_record(conn: &mut SqliteConnection, media: &MediaRef) -> Result<()> {
    sqlx::query("DELETE FROM media_library WHERE platform = ? AND media_id = ?")
        .bind(&media.platform)
        .bind(&media.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Record a batch id, returning `false` if it was already applied
///
/// Issued as the first statement of a ledger transaction so the transaction
/// takes the write lock before it reads anything.
pub async fn mark_batch_applied(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO library_batches (batch_id) VALUES (?)")
        .bind(batch_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// MediaRefs that currently have a local file
pub async fn downloaded_refs(conn: &mut SqliteConnection) -> Result<Vec<MediaRef>> {
    let rows = sqlx::query(
        r#"
        SELECT platform, media_id FROM media_library
        WHERE download_path IS NOT NULL
        ORDER BY rowid
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> Result<MediaRef> {
            Ok(MediaRef::new(
                row.try_get::<String, _>("platform")?,
                row.try_get::<String, _>("media_id")?,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn record(id: &str, ref_count: u32, download: Option<DownloadData>) -> LibraryRecord {
        LibraryRecord {
            item: MediaItem::new("test", id).with_title(id),
            ref_count,
            download,
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let db = open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let media = MediaRef::new("test", "a");

        assert!(get_record(&mut conn, &media).await.unwrap().is_none());

        let download = DownloadData {
            path: PathBuf::from("/music/a.flac"),
            quality: QualityKey::High,
        };
        put_record(&mut conn, &record("a", 2, Some(download.clone())))
            .await
            .unwrap();

        let loaded = get_record(&mut conn, &media).await.unwrap().unwrap();
        assert_eq!(loaded.ref_count, 2);
        assert_eq!(loaded.download, Some(download));
        assert_eq!(loaded.item.title, "a");

        delete_record(&mut conn, &media).await.unwrap();
        assert!(get_record(&mut conn, &media).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ref_count_rejected_by_schema() {
        let db = open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        assert!(put_record(&mut conn, &record("a", 0, None)).await.is_err());
    }

    #[tokio::test]
    async fn test_get_records_skips_missing() {
        let db = open_in_memory().await.unwrap();
        {
            let mut conn = db.acquire().await.unwrap();
            put_record(&mut conn, &record("b", 1, None)).await.unwrap();
        }
        let found = get_records(
            &db,
            &[MediaRef::new("test", "a"), MediaRef::new("test", "b")],
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].media().id, "b");
    }

    #[tokio::test]
    async fn test_batch_markers() {
        let db = open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let id = Uuid::new_v4();
        assert!(mark_batch_applied(&mut conn, id).await.unwrap());
        assert!(!mark_batch_applied(&mut conn, id).await.unwrap());
        assert!(mark_batch_applied(&mut conn, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_downloaded_refs_only_lists_local_files() {
        let db = open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        put_record(&mut conn, &record("a", 1, None)).await.unwrap();
        put_record(
            &mut conn,
            &record(
                "b",
                3,
                Some(DownloadData {
                    path: PathBuf::from("/music/b.mp3"),
                    quality: QualityKey::Standard,
                }),
            ),
        )
        .await
        .unwrap();

        let refs = downloaded_refs(&mut conn).await.unwrap();
        assert_eq!(refs, [MediaRef::new("test", "b")]);
    }
}
