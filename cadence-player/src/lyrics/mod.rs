//! Lyrics
//!
//! LRC parsing and progress-driven line tracking.

pub mod parser;
pub mod sync;

pub use parser::{LrcParser, LyricLine, LyricTimeline};
pub use sync::{LyricSnapshot, LyricSynchronizer};
