//! Media identity and metadata
//!
//! A piece of media is identified by its `(platform, id)` pair only. Display
//! metadata travels alongside in [`MediaItem`] but never takes part in
//! equality, so a retitled track is still the same track.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a piece of media: the plugin platform plus the platform's id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaRef {
    pub platform: String,
    pub id: String,
}

impl MediaRef {
    pub fn new(platform: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.id)
    }
}

/// Media identity plus display metadata copied in from a plugin result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(flatten)]
    pub media: MediaRef,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    /// Track length in seconds, when the plugin knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl MediaItem {
    pub fn new(platform: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            media: MediaRef::new(platform, id),
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            duration: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    /// Identity comparison; metadata is ignored
    pub fn is_same_media(&self, other: &MediaRef) -> bool {
        self.media == *other
    }
}

impl PartialEq for MediaItem {
    fn eq(&self, other: &Self) -> bool {
        self.media == other.media
    }
}

impl Eq for MediaItem {}

/// Playback fidelity tier, ordered from lowest to highest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityKey {
    Low,
    #[default]
    Standard,
    High,
    Super,
}

impl QualityKey {
    /// Every tier, lowest first
    pub const ALL: [QualityKey; 4] = [
        QualityKey::Low,
        QualityKey::Standard,
        QualityKey::High,
        QualityKey::Super,
    ];

    /// Position of this tier in [`QualityKey::ALL`]
    pub fn rank(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityKey::Low => "low",
            QualityKey::Standard => "standard",
            QualityKey::High => "high",
            QualityKey::Super => "super",
        }
    }
}

impl fmt::Display for QualityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(QualityKey::Low),
            "standard" => Ok(QualityKey::Standard),
            "high" => Ok(QualityKey::High),
            "super" => Ok(QualityKey::Super),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown quality tier: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ignores_metadata() {
        let a = MediaItem::new("qq", "42").with_title("First title");
        let b = MediaItem::new("qq", "42").with_title("Renamed");
        assert_eq!(a, b);
        assert!(a.is_same_media(&b.media));
    }

    #[test]
    fn test_identity_distinguishes_platform() {
        let a = MediaRef::new("qq", "42");
        let b = MediaRef::new("netease", "42");
        assert_ne!(a, b);
    }

    #[test]
    fn test_media_item_json_flattens_identity() {
        let item = MediaItem::new("local", "/music/a.flac").with_artist("Someone");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["platform"], "local");
        assert_eq!(json["id"], "/music/a.flac");
        assert_eq!(json["artist"], "Someone");
        assert!(json.get("duration").is_none());
    }

    #[test]
    fn test_quality_ordering_and_parse() {
        assert!(QualityKey::Low < QualityKey::Standard);
        assert!(QualityKey::High < QualityKey::Super);
        assert_eq!("high".parse::<QualityKey>().unwrap(), QualityKey::High);
        assert!("ultra".parse::<QualityKey>().is_err());
        assert_eq!(QualityKey::Super.to_string(), "super");
        assert_eq!(QualityKey::default(), QualityKey::Standard);
    }
}
