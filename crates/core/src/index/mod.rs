//! Torrent index - PostgreSQL persistence for discovered torrent metadata.
//!
//! The ingestion side stores torrents exactly once per info hash; the query side
//! serves keyset-paginated searches, point lookups and discovery statistics.

mod error;
mod handle;
mod postgres;
pub mod reader;
pub mod schema;
pub mod search;
pub mod statistics;
pub mod timespec;
mod types;
pub mod writer;

pub use error::IndexError;
pub use handle::{IndexHandle, Locator, SchemaName, DEFAULT_SCHEMA};
pub use postgres::PostgresIndex;
pub use search::TorrentQuery;
pub use timespec::{Granularity, TimeSpec};
pub use types::*;

use async_trait::async_trait;

/// Trait for torrent index storage.
#[async_trait]
pub trait TorrentIndex: Send + Sync {
    /// Check whether a torrent with this info hash is stored.
    async fn does_torrent_exist(&self, info_hash: &InfoHash) -> Result<bool, IndexError>;

    /// Store a torrent and its files in one transaction.
    ///
    /// Invalid names or paths, zero total size and already stored hashes are
    /// reported through the outcome, not as errors.
    async fn add_new_torrent(&self, torrent: &NewTorrent) -> Result<IngestOutcome, IndexError>;

    /// Fetch one page of search results.
    async fn query_torrents(
        &self,
        query: &TorrentQuery,
    ) -> Result<Vec<TorrentMetadata>, IndexError>;

    /// Get a torrent summary, or `None` if it is not stored.
    async fn get_torrent(&self, info_hash: &InfoHash)
        -> Result<Option<TorrentMetadata>, IndexError>;

    /// Get the files of a torrent, or `None` if it is not stored.
    async fn get_files(&self, info_hash: &InfoHash) -> Result<Option<Vec<File>>, IndexError>;

    /// Discovery statistics for `n` units of the granularity encoded in `from`.
    async fn get_statistics(&self, from: &str, n: u32) -> Result<Statistics, IndexError>;

    /// Approximate number of stored torrents.
    async fn get_number_of_torrents(&self) -> Result<u64, IndexError>;

    /// Release all connections.
    async fn close(&self);
}
