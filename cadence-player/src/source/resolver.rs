//! Media source resolver
//!
//! Resolution cascade:
//! 1. A download record whose file still exists wins outright, at the
//!    recorded quality. A record pointing at a missing file is skipped.
//! 2. Otherwise quality tiers are probed one at a time in
//!    [`quality_order`](super::quality_order). Plugin errors and empty URLs
//!    move on to the next tier; the first usable source wins.
//! 3. If every tier fails, resolution fails with
//!    [`Error::ResolutionExhausted`].
//!
//! Tiers are never probed in parallel: an earlier success must prevent later
//! lookups, and the winner must be the most preferred tier.

use super::quality::{quality_order, MissingPolicy};
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::library::DownloadRegistry;
use crate::plugin::{MediaSource, PluginHost};
use cadence_common::{MediaItem, QualityKey};
use std::sync::Arc;
use tracing::debug;

/// A playable source and the quality it was resolved at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub source: MediaSource,
    pub quality: QualityKey,
    /// Whether the source is a local download
    pub local: bool,
}

pub struct MediaSourceResolver {
    registry: Arc<DownloadRegistry>,
    plugins: Arc<PluginHost>,
    fs: Arc<dyn FileSystem>,
}

impl MediaSourceResolver {
    pub fn new(
        registry: Arc<DownloadRegistry>,
        plugins: Arc<PluginHost>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            registry,
            plugins,
            fs,
        }
    }

    pub async fn resolve(
        &self,
        item: &MediaItem,
        preference: QualityKey,
        policy: MissingPolicy,
    ) -> Result<ResolvedSource> {
        if let Some(download) = self.registry.download_data(&item.media) {
            if self.fs.is_file(&download.path).await {
                debug!(
                    "Resolved {} to local file {} ({})",
                    item.media,
                    download.path.display(),
                    download.quality
                );
                return Ok(ResolvedSource {
                    source: MediaSource::new(download.path.to_string_lossy()),
                    quality: download.quality,
                    local: true,
                });
            }
            debug!(
                "Download record for {} points at missing file {}",
                item.media,
                download.path.display()
            );
        }

        for quality in quality_order(preference, policy) {
            match self.plugins.get_media_source(item, quality).await {
                Ok(Some(source)) if !source.url.is_empty() => {
                    debug!("Resolved {} at {}", item.media, quality);
                    return Ok(ResolvedSource {
                        source,
                        quality,
                        local: false,
                    });
                }
                Ok(_) => debug!("No {} source for {}", quality, item.media),
                Err(e) => debug!("{} source for {} failed: {}", quality, item.media, e),
            }
        }

        Err(Error::ResolutionExhausted(item.media.clone()))
    }
}
