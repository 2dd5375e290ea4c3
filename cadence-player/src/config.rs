//! Runtime player settings
//!
//! Bootstrap configuration (root folder, database path, port, logging) comes
//! from TOML via `cadence_common::config`. Everything that may change while
//! the player runs lives in the database `settings` table and is read here.
//!
//! Missing values fall back to built-in defaults; unparseable values are
//! logged and replaced by the default rather than failing startup.

use crate::db::settings::{get_setting, keys};
use crate::error::Result;
use crate::source::MissingPolicy;
use cadence_common::{time, QualityKey};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// What to do when the current track cannot be played
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Advance to the next track after the cooldown
    #[default]
    Skip,
    /// Stay on the failed track
    Pause,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Skip => write!(f, "skip"),
            ErrorPolicy::Pause => write!(f, "pause"),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "skip" => Ok(ErrorPolicy::Skip),
            "pause" => Ok(ErrorPolicy::Pause),
            other => Err(format!("Unknown error policy: {}", other)),
        }
    }
}

/// Player behaviour read from the settings table
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSettings {
    /// Quality requested when nothing else is specified
    pub default_quality: QualityKey,
    /// Fallback direction when a tier is unavailable
    pub when_quality_missing: MissingPolicy,
    pub play_error: ErrorPolicy,
    /// Delay before auto-skipping a failed track
    pub error_skip_cooldown_ms: u64,
    /// Replaying the current track seeks to 0 instead of resuming in place
    pub restart_on_same_media: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_quality: QualityKey::Standard,
            when_quality_missing: MissingPolicy::Lower,
            play_error: ErrorPolicy::Skip,
            error_skip_cooldown_ms: 500,
            restart_on_same_media: true,
        }
    }
}

impl PlayerSettings {
    /// Load from the settings table
    pub async fn load(pool: &Pool<Sqlite>) -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            default_quality: setting_or(pool, keys::DEFAULT_QUALITY, defaults.default_quality)
                .await?,
            when_quality_missing: setting_or(
                pool,
                keys::WHEN_QUALITY_MISSING,
                defaults.when_quality_missing,
            )
            .await?,
            play_error: setting_or(pool, keys::PLAY_ERROR, defaults.play_error).await?,
            error_skip_cooldown_ms: setting_or(
                pool,
                keys::ERROR_SKIP_COOLDOWN_MS,
                defaults.error_skip_cooldown_ms,
            )
            .await?,
            restart_on_same_media: setting_or(
                pool,
                keys::RESTART_ON_SAME_MEDIA,
                defaults.restart_on_same_media,
            )
            .await?,
        };

        info!(
            "Loaded player settings: quality={} missing={} error={} cooldown={}ms",
            settings.default_quality,
            settings.when_quality_missing,
            settings.play_error,
            settings.error_skip_cooldown_ms
        );
        Ok(settings)
    }

    pub fn error_skip_cooldown(&self) -> Duration {
        time::millis_to_duration(self.error_skip_cooldown_ms)
    }
}

/// Read a setting, using `default` when it is missing or invalid
async fn setting_or<T>(pool: &Pool<Sqlite>, key: &str, default: T) -> Result<T>
where
    T: FromStr + fmt::Display,
{
    match get_setting::<String>(pool, key).await? {
        None => Ok(default),
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!("Invalid setting {}='{}', using default '{}'", key, raw, default);
                Ok(default)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::db::settings::{delete_setting, set_setting};

    #[tokio::test]
    async fn test_load_defaults() {
        let pool = open_in_memory().await.unwrap();
        let settings = PlayerSettings::load(&pool).await.unwrap();
        assert_eq!(settings.default_quality, QualityKey::Standard);
        assert_eq!(settings.when_quality_missing, MissingPolicy::Lower);
        assert_eq!(settings.play_error, ErrorPolicy::Skip);
        assert_eq!(settings.error_skip_cooldown(), Duration::from_millis(500));
        assert!(settings.restart_on_same_media);
    }

    #[tokio::test]
    async fn test_load_overrides_and_invalid_values() {
        let pool = open_in_memory().await.unwrap();
        set_setting(&pool, keys::DEFAULT_QUALITY, "super").await.unwrap();
        set_setting(&pool, keys::WHEN_QUALITY_MISSING, "higher").await.unwrap();
        set_setting(&pool, keys::PLAY_ERROR, "explode").await.unwrap();
        set_setting(&pool, keys::ERROR_SKIP_COOLDOWN_MS, 50).await.unwrap();
        delete_setting(&pool, keys::RESTART_ON_SAME_MEDIA).await.unwrap();

        let settings = PlayerSettings::load(&pool).await.unwrap();
        assert_eq!(settings.default_quality, QualityKey::Super);
        assert_eq!(settings.when_quality_missing, MissingPolicy::Higher);
        assert_eq!(settings.play_error, ErrorPolicy::Skip);
        assert_eq!(settings.error_skip_cooldown_ms, 50);
        assert!(settings.restart_on_same_media);
    }
}
