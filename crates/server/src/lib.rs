//! Read-only HTTP API over the torrent index.

pub mod api;
pub mod metrics;
pub mod state;
