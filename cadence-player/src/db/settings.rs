//! Settings database access
//!
//! Read/write settings from the settings table (key-value store). Holds both
//! the user preferences restored at startup (current track, volume, speed,
//! quality, repeat mode) and the runtime player configuration.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Executor, Pool, Sqlite};
use std::str::FromStr;

/// Setting keys
pub mod keys {
    pub const REPEAT_MODE: &str = "repeat_mode";
    pub const CURRENT_MEDIA: &str = "current_media";
    pub const CURRENT_PROGRESS: &str = "current_progress";
    pub const CURRENT_QUALITY: &str = "current_quality";
    pub const VOLUME: &str = "volume";
    pub const SPEED: &str = "speed";
    pub const DOWNLOADED_LIST: &str = "downloaded_list";

    pub const DEFAULT_QUALITY: &str = "play_default_quality";
    pub const WHEN_QUALITY_MISSING: &str = "play_when_quality_missing";
    pub const PLAY_ERROR: &str = "play_error";
    pub const ERROR_SKIP_COOLDOWN_MS: &str = "play_error_skip_cooldown_ms";
    pub const RESTART_ON_SAME_MEDIA: &str = "play_restart_on_same_media";
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database.
/// Parses value from string using FromStr trait.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting. Accepts a pool or an open transaction.
pub async fn set_setting<'e, E, T>(db: E, key: &str, value: T) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
    T: ToString,
{
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}

/// Remove a setting
pub async fn delete_setting(db: &Pool<Sqlite>, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(db)
        .await?;
    Ok(())
}

/// Read a JSON-encoded setting
pub async fn get_json_setting<T: DeserializeOwned>(
    db: &Pool<Sqlite>,
    key: &str,
) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    value
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(Error::from)
}

/// Write a JSON-encoded setting
pub async fn set_json_setting<'e, E, T>(db: E, key: &str, value: &T) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    set_setting(db, key, raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use cadence_common::events::RepeatMode;
    use cadence_common::{MediaItem, QualityKey};

    #[tokio::test]
    async fn test_get_missing_setting() {
        let db = open_in_memory().await.unwrap();
        let value: Option<f32> = get_setting(&db, keys::VOLUME).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let db = open_in_memory().await.unwrap();

        set_setting(&db, keys::VOLUME, 0.25f32).await.unwrap();
        set_setting(&db, keys::REPEAT_MODE, RepeatMode::Shuffle).await.unwrap();
        set_setting(&db, keys::CURRENT_QUALITY, QualityKey::High).await.unwrap();

        assert_eq!(get_setting::<f32>(&db, keys::VOLUME).await.unwrap(), Some(0.25));
        assert_eq!(
            get_setting::<RepeatMode>(&db, keys::REPEAT_MODE).await.unwrap(),
            Some(RepeatMode::Shuffle)
        );
        assert_eq!(
            get_setting::<QualityKey>(&db, keys::CURRENT_QUALITY).await.unwrap(),
            Some(QualityKey::High)
        );
    }

    #[tokio::test]
    async fn test_overwrite_and_delete() {
        let db = open_in_memory().await.unwrap();
        set_setting(&db, keys::SPEED, 1.0f32).await.unwrap();
        set_setting(&db, keys::SPEED, 1.5f32).await.unwrap();
        assert_eq!(get_setting::<f32>(&db, keys::SPEED).await.unwrap(), Some(1.5));

        delete_setting(&db, keys::SPEED).await.unwrap();
        assert!(get_setting::<f32>(&db, keys::SPEED).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let db = open_in_memory().await.unwrap();
        set_setting(&db, keys::REPEAT_MODE, "sideways").await.unwrap();
        let result = get_setting::<RepeatMode>(&db, keys::REPEAT_MODE).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_json_setting() {
        let db = open_in_memory().await.unwrap();
        let item = MediaItem::new("local", "/a.mp3").with_title("A");
        set_json_setting(&db, keys::CURRENT_MEDIA, &item).await.unwrap();

        let loaded: MediaItem = get_json_setting(&db, keys::CURRENT_MEDIA)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, item);
        assert_eq!(loaded.title, "A");
    }
}
