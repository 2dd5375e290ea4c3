//! # Cadence Common Library
//!
//! Shared code for the Cadence host and UI processes including:
//! - Media identity and metadata types
//! - Event types (CadenceEvent enum) and the EventBus
//! - Transport command envelope and host notifications
//! - Configuration loading
//! - Utility functions

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod time;
pub mod transport;

pub use error::{Error, Result};
pub use media::{MediaItem, MediaRef, QualityKey};
