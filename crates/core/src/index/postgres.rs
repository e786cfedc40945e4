//! PostgreSQL-backed torrent index.

use async_trait::async_trait;

use super::{
    reader, schema, search, statistics, writer, File, IndexError, IndexHandle, InfoHash,
    IngestOutcome, NewTorrent, SchemaName, Statistics, TorrentIndex, TorrentMetadata,
    TorrentQuery,
};
use crate::config::DatabaseConfig;
use crate::metrics::{INGEST_TOTAL, QUERY_DURATION};

/// PostgreSQL-backed torrent index.
#[derive(Debug, Clone)]
pub struct PostgresIndex {
    handle: IndexHandle,
    schema_version: i16,
}

impl PostgresIndex {
    /// Connect, then create or migrate the schema.
    ///
    /// Fails if the engine is unreachable or the `pg_trgm` extension is not enabled.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, IndexError> {
        let handle = IndexHandle::connect(config).await?;
        Self::with_handle(handle).await
    }

    /// Set up the schema over an already connected handle.
    pub async fn with_handle(handle: IndexHandle) -> Result<Self, IndexError> {
        let schema_version = schema::ensure_schema(&handle).await?;
        Ok(Self {
            handle,
            schema_version,
        })
    }

    pub fn schema(&self) -> &SchemaName {
        self.handle.schema()
    }

    pub fn schema_version(&self) -> i16 {
        self.schema_version
    }

    pub fn handle(&self) -> &IndexHandle {
        &self.handle
    }
}

#[async_trait]
impl TorrentIndex for PostgresIndex {
    async fn does_torrent_exist(&self, info_hash: &InfoHash) -> Result<bool, IndexError> {
        let _timer = QUERY_DURATION
            .with_label_values(&["does_torrent_exist"])
            .start_timer();
        reader::does_torrent_exist(&self.handle, info_hash).await
    }

    async fn add_new_torrent(&self, torrent: &NewTorrent) -> Result<IngestOutcome, IndexError> {
        let _timer = QUERY_DURATION
            .with_label_values(&["add_new_torrent"])
            .start_timer();

        let result = writer::add_new_torrent(&self.handle, torrent).await;
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "error",
        };
        INGEST_TOTAL.with_label_values(&[label]).inc();
        result
    }

    async fn query_torrents(
        &self,
        query: &TorrentQuery,
    ) -> Result<Vec<TorrentMetadata>, IndexError> {
        let _timer = QUERY_DURATION
            .with_label_values(&["query_torrents"])
            .start_timer();
        search::query_torrents(&self.handle, query).await
    }

    async fn get_torrent(
        &self,
        info_hash: &InfoHash,
    ) -> Result<Option<TorrentMetadata>, IndexError> {
        let _timer = QUERY_DURATION
            .with_label_values(&["get_torrent"])
            .start_timer();
        reader::get_torrent(&self.handle, info_hash).await
    }

    async fn get_files(&self, info_hash: &InfoHash) -> Result<Option<Vec<File>>, IndexError> {
        let _timer = QUERY_DURATION
            .with_label_values(&["get_files"])
            .start_timer();
        reader::get_files(&self.handle, info_hash).await
    }

    async fn get_statistics(&self, from: &str, n: u32) -> Result<Statistics, IndexError> {
        let _timer = QUERY_DURATION
            .with_label_values(&["get_statistics"])
            .start_timer();
        statistics::get_statistics(&self.handle, from, n).await
    }

    async fn get_number_of_torrents(&self) -> Result<u64, IndexError> {
        let _timer = QUERY_DURATION
            .with_label_values(&["get_number_of_torrents"])
            .start_timer();
        statistics::get_number_of_torrents(&self.handle).await
    }

    async fn close(&self) {
        tracing::info!(schema = %self.handle.schema(), "Closing torrent index");
        self.handle.close().await;
    }
}
