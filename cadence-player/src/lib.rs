//! # Cadence Player Library (cadence-player)
//!
//! Playback orchestration core for the Cadence desktop player.
//!
//! **Purpose:** Own the play queue and playback state machine, resolve
//! playable sources across quality tiers and local downloads, keep the
//! reference-counted download library, and follow lyrics with progress.
//! Audio decoding is left to the UI process, driven through an
//! [`AudioSink`](playback::AudioSink).
//!
//! **Architecture:** Tokio services sharing an [`EventBus`](cadence_common::events::EventBus),
//! SQLite persistence via sqlx, and an HTTP/SSE control surface via axum.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod fs;
pub mod library;
pub mod lyrics;
pub mod playback;
pub mod plugin;
pub mod source;

pub use error::{Error, Result};
