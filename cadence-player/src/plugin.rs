//! Plugin delegate
//!
//! Plugins fetch media sources and lyrics for one platform each. The core
//! never talks to a plugin directly; calls go through [`PluginHost`], which
//! dispatches on the media's platform identifier.

use crate::error::Error;
use async_trait::async_trait;
use cadence_common::{MediaItem, QualityKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Platform served by [`LocalFilePlugin`]
pub const LOCAL_PLATFORM: &str = "local";

/// A playable source returned by a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl MediaSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }
}

/// Unparsed lyric text in LRC format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLyric {
    pub raw_lrc: String,
}

/// Media plugin for one platform
///
/// Calls may fail independently; callers decide whether a failure matters.
#[async_trait]
pub trait MediaPlugin: Send + Sync {
    /// Platform identifier this plugin serves
    fn platform(&self) -> &str;

    /// Source for `item` at exactly `quality`, `None` if that tier is unavailable
    async fn get_media_source(
        &self,
        item: &MediaItem,
        quality: QualityKey,
    ) -> anyhow::Result<Option<MediaSource>>;

    /// Lyric for `item`, `None` if there is none
    async fn get_lyric(&self, item: &MediaItem) -> anyhow::Result<Option<RawLyric>>;
}

/// Registry of plugins keyed by platform
#[derive(Default, Clone)]
pub struct PluginHost {
    plugins: HashMap<String, Arc<dyn MediaPlugin>>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, replacing any previous one for the same platform
    pub fn register(&mut self, plugin: Arc<dyn MediaPlugin>) {
        let platform = plugin.platform().to_string();
        info!("Registered plugin for platform '{}'", platform);
        self.plugins.insert(platform, plugin);
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn MediaPlugin>) -> Self {
        self.register(plugin);
        self
    }

    pub fn get(&self, platform: &str) -> Result<Arc<dyn MediaPlugin>, Error> {
        self.plugins
            .get(platform)
            .cloned()
            .ok_or_else(|| Error::UnknownPlatform(platform.to_string()))
    }

    pub fn platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self.plugins.keys().cloned().collect();
        platforms.sort();
        platforms
    }

    /// Dispatch a source lookup to the item's platform
    pub async fn get_media_source(
        &self,
        item: &MediaItem,
        quality: QualityKey,
    ) -> anyhow::Result<Option<MediaSource>> {
        let plugin = self.get(&item.media.platform)?;
        plugin.get_media_source(item, quality).await
    }

    /// Dispatch a lyric lookup to the item's platform
    pub async fn get_lyric(&self, item: &MediaItem) -> anyhow::Result<Option<RawLyric>> {
        let plugin = self.get(&item.media.platform)?;
        plugin.get_lyric(item).await
    }
}

/// Plugin for files on local disk
///
/// The media id is the file path. Every quality tier maps to the same file;
/// lyrics come from a sibling `.lrc` file with the same stem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFilePlugin;

#[async_trait]
impl MediaPlugin for LocalFilePlugin {
    fn platform(&self) -> &str {
        LOCAL_PLATFORM
    }

    async fn get_media_source(
        &self,
        item: &MediaItem,
        _quality: QualityKey,
    ) -> anyhow::Result<Option<MediaSource>> {
        let path = Path::new(&item.media.id);
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(MediaSource::new(item.media.id.clone()))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_lyric(&self, item: &MediaItem) -> anyhow::Result<Option<RawLyric>> {
        let lrc = Path::new(&item.media.id).with_extension("lrc");
        match tokio::fs::read_to_string(&lrc).await {
            Ok(raw_lrc) => Ok(Some(RawLyric { raw_lrc })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No lyric file at {}", lrc.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
