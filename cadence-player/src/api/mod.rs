//! HTTP control surface
//!
//! Lets the UI process drive the player core and follow its events.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{router, run, AppContext};
