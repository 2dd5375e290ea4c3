//! Media source resolution
//!
//! Turns a queue entry plus a quality preference into something playable:
//! a valid local download first, otherwise the first quality tier a plugin
//! can serve.

pub mod quality;
pub mod resolver;

pub use quality::{quality_order, MissingPolicy};
pub use resolver::{MediaSourceResolver, ResolvedSource};
