//! In-memory torrent index for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::index::writer::valid_text;
use crate::index::{
    File, IndexError, InfoHash, IngestOutcome, NewTorrent, SkipReason, Statistics, TimeSpec,
    TorrentIndex, TorrentMetadata, TorrentQuery,
};

#[derive(Debug, Clone)]
struct StoredTorrent {
    metadata: TorrentMetadata,
    files: Vec<File>,
}

/// Mock implementation of the TorrentIndex trait.
///
/// Applies the same ingestion rules and pagination semantics as the PostgreSQL index,
/// so handlers can be tested without a database:
/// - Invalid names/paths, zero and oversized totals are skipped
/// - Searches filter by epoch and case-insensitive substring, then keyset-paginate
/// - Statistics buckets use the same labels
///
/// Relevance is a stand-in for trigram similarity: the share of the name covered by
/// the query text.
///
/// # Example
///
/// ```rust,ignore
/// use hashdex_core::testing::{fixtures, MockTorrentIndex};
///
/// let index = MockTorrentIndex::new();
/// index.add_new_torrent(&fixtures::new_torrent(1, "ubuntu.iso", &[(100, "a")])).await?;
/// assert!(index.does_torrent_exist(&fixtures::info_hash(1)).await?);
/// ```
pub struct MockTorrentIndex {
    torrents: Arc<RwLock<Vec<StoredTorrent>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<IndexError>>>,
    /// Recorded search queries.
    queries: Arc<RwLock<Vec<TorrentQuery>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MockTorrentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTorrentIndex")
            .field("torrents", &"<torrents>")
            .field("next_error", &"<next_error>")
            .field("queries", &"<queries>")
            .field("closed", &self.closed)
            .finish()
    }
}

impl Default for MockTorrentIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentIndex {
    /// Create an empty mock index.
    pub fn new() -> Self {
        Self {
            torrents: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            queries: Arc::new(RwLock::new(Vec::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Ingest a torrent as if it had been discovered at `discovered_on`.
    pub async fn add_torrent_at(
        &self,
        torrent: &NewTorrent,
        discovered_on: DateTime<Utc>,
    ) -> IngestOutcome {
        let Some(name) = valid_text(&torrent.name) else {
            return IngestOutcome::Skipped {
                reason: SkipReason::InvalidName,
            };
        };

        let total_size = match torrent.total_size() {
            None => {
                return IngestOutcome::Skipped {
                    reason: SkipReason::SizeOverflow,
                }
            }
            Some(0) => {
                return IngestOutcome::Skipped {
                    reason: SkipReason::ZeroSize,
                }
            }
            Some(size) if size > i64::MAX as u64 => {
                return IngestOutcome::Skipped {
                    reason: SkipReason::SizeOverflow,
                }
            }
            Some(size) => size,
        };

        let mut torrents = self.torrents.write().await;
        if torrents
            .iter()
            .any(|t| t.metadata.info_hash == torrent.info_hash)
        {
            return IngestOutcome::AlreadyExists;
        }

        let mut files = Vec::with_capacity(torrent.files.len());
        for file in &torrent.files {
            let Some(path) = valid_text(&file.path) else {
                return IngestOutcome::Skipped {
                    reason: SkipReason::InvalidPath,
                };
            };
            files.push(File {
                size: file.size,
                path: path.to_string(),
            });
        }

        let id = torrents.last().map(|t| t.metadata.id + 1).unwrap_or(1);
        torrents.push(StoredTorrent {
            metadata: TorrentMetadata {
                id,
                info_hash: torrent.info_hash,
                name: name.to_string(),
                total_size,
                discovered_on,
                n_files: files.len() as u64,
                relevance: None,
            },
            files,
        });

        IngestOutcome::Added { id }
    }

    /// Make the next call fail with `error`.
    pub async fn set_next_error(&self, error: IndexError) {
        *self.next_error.write().await = Some(error);
    }

    /// Get recorded search queries.
    pub async fn recorded_queries(&self) -> Vec<TorrentQuery> {
        self.queries.read().await.clone()
    }

    /// Number of stored torrents.
    pub async fn torrent_count(&self) -> usize {
        self.torrents.read().await.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }

    async fn take_error(&self) -> Result<(), IndexError> {
        match self.next_error.write().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn relevance(name: &str, query: &str) -> f64 {
    let name_len = name.chars().count().max(1) as f64;
    (query.chars().count() as f64 / name_len).min(1.0)
}

fn compare_keys(a: (f64, i64), b: (f64, i64)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

#[async_trait]
impl TorrentIndex for MockTorrentIndex {
    async fn does_torrent_exist(&self, info_hash: &InfoHash) -> Result<bool, IndexError> {
        self.take_error().await?;
        Ok(self
            .torrents
            .read()
            .await
            .iter()
            .any(|t| &t.metadata.info_hash == info_hash))
    }

    async fn add_new_torrent(&self, torrent: &NewTorrent) -> Result<IngestOutcome, IndexError> {
        self.take_error().await?;
        Ok(self.add_torrent_at(torrent, Utc::now()).await)
    }

    async fn query_torrents(
        &self,
        query: &TorrentQuery,
    ) -> Result<Vec<TorrentMetadata>, IndexError> {
        self.take_error().await?;
        self.queries.write().await.push(query.clone());
        query.validate()?;

        if query.limit == 0 {
            return Ok(Vec::new());
        }

        // The epoch covers its whole second.
        let epoch_end = query
            .epoch
            .checked_add(1)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let needle = query.query.to_lowercase();

        let mut matched: Vec<(f64, TorrentMetadata)> = self
            .torrents
            .read()
            .await
            .iter()
            .filter(|t| t.metadata.discovered_on < epoch_end)
            .filter(|t| needle.is_empty() || t.metadata.name.to_lowercase().contains(&needle))
            .filter_map(|t| {
                let mut metadata = t.metadata.clone();
                if !needle.is_empty() {
                    metadata.relevance = Some(relevance(&metadata.name, &needle));
                }
                let key = metadata.ordered_value(query.order_by)?;
                Some((key, metadata))
            })
            .collect();

        matched.sort_by(|a, b| {
            let ordering = compare_keys((a.0, a.1.id), (b.0, b.1.id));
            if query.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });

        if let (Some(value), Some(id)) = (query.last_ordered_value, query.last_id) {
            matched.retain(|(key, metadata)| {
                let ordering = compare_keys((*key, metadata.id), (value, id));
                if query.ascending {
                    ordering == Ordering::Greater
                } else {
                    ordering == Ordering::Less
                }
            });
        }

        Ok(matched
            .into_iter()
            .take(query.limit as usize)
            .map(|(_, metadata)| metadata)
            .collect())
    }

    async fn get_torrent(
        &self,
        info_hash: &InfoHash,
    ) -> Result<Option<TorrentMetadata>, IndexError> {
        self.take_error().await?;
        Ok(self
            .torrents
            .read()
            .await
            .iter()
            .find(|t| &t.metadata.info_hash == info_hash)
            .map(|t| t.metadata.clone()))
    }

    async fn get_files(&self, info_hash: &InfoHash) -> Result<Option<Vec<File>>, IndexError> {
        self.take_error().await?;
        Ok(self
            .torrents
            .read()
            .await
            .iter()
            .find(|t| &t.metadata.info_hash == info_hash)
            .map(|t| t.files.clone()))
    }

    async fn get_statistics(&self, from: &str, n: u32) -> Result<Statistics, IndexError> {
        self.take_error().await?;
        let spec = TimeSpec::parse(from)?;
        let end = spec.end_after(n)?;

        let mut statistics = Statistics::default();
        for torrent in self.torrents.read().await.iter() {
            let discovered_on = torrent.metadata.discovered_on;
            if torrent.files.is_empty() || discovered_on < spec.start || discovered_on > end {
                continue;
            }

            let bucket = statistics
                .buckets
                .entry(spec.label(discovered_on))
                .or_default();
            bucket.n_discovered += 1;
            bucket.total_size += torrent.metadata.total_size;
            bucket.n_files += torrent.files.len() as u64;
        }

        Ok(statistics)
    }

    async fn get_number_of_torrents(&self) -> Result<u64, IndexError> {
        self.take_error().await?;
        Ok(self.torrents.read().await.len() as u64)
    }

    async fn close(&self) {
        self.closed.store(true, AtomicOrdering::SeqCst);
    }
}
