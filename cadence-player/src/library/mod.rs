//! Local download library
//!
//! The ref-counted ledger of library media and the per-key locking that
//! keeps concurrent ledger mutations consistent.

pub mod locks;
pub mod registry;

pub use locks::KeyedLocks;
pub use registry::{DownloadRegistry, LibraryEntry, RemoveOutcome};
