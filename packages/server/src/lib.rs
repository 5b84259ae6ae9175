// Job Monitor - HTTP control surface
//
// Wraps the monitor engine in a small JSON API with per-client rate
// limiting and revision-checked response caching.

pub mod config;
pub mod server;

pub use config::*;
