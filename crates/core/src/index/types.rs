//! Types for the torrent index.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of a BitTorrent v1 info hash in bytes.
pub const INFO_HASH_LEN: usize = 20;

/// SHA-1 info hash identifying a torrent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; INFO_HASH_LEN]);

/// Error returned when bytes or text do not form an info hash.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid info hash: {0}")]
pub struct InvalidInfoHash(pub String);

impl InfoHash {
    pub const fn new(bytes: [u8; INFO_HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for InfoHash {
    type Error = InvalidInfoHash;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; INFO_HASH_LEN] = bytes.try_into().map_err(|_| {
            InvalidInfoHash(format!(
                "expected {} bytes, got {}",
                INFO_HASH_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }
}

impl FromStr for InfoHash {
    type Err = InvalidInfoHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| InvalidInfoHash(format!("{}: {}", s, e)))?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A file as reported by the discovery source.
///
/// The path is kept as raw bytes; whether it is storable text is decided at ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    /// File size in bytes.
    pub size: u64,
    /// Path within the torrent, as received.
    pub path: Vec<u8>,
}

impl NewFile {
    pub fn new(size: u64, path: impl Into<Vec<u8>>) -> Self {
        Self {
            size,
            path: path.into(),
        }
    }
}

/// A newly discovered torrent, ready for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTorrent {
    pub info_hash: InfoHash,
    /// Torrent name, as received.
    pub name: Vec<u8>,
    pub files: Vec<NewFile>,
    /// Opaque metadata blob (the bencoded info dictionary).
    pub metadata: Vec<u8>,
}

impl NewTorrent {
    pub fn new(
        info_hash: InfoHash,
        name: impl Into<Vec<u8>>,
        files: Vec<NewFile>,
        metadata: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            info_hash,
            name: name.into(),
            files,
            metadata: metadata.into(),
        }
    }

    /// Sum of all file sizes, or `None` if it overflows.
    pub fn total_size(&self) -> Option<u64> {
        self.files
            .iter()
            .try_fold(0u64, |acc, file| acc.checked_add(file.size))
    }
}

/// A file stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// File size in bytes.
    pub size: u64,
    /// Path within the torrent.
    pub path: String,
}

/// Summary of a stored torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentMetadata {
    /// Engine-assigned sequential id; tie-breaker for pagination.
    pub id: i64,
    pub info_hash: InfoHash,
    pub name: String,
    /// Total size in bytes (sum of file sizes).
    pub total_size: u64,
    pub discovered_on: DateTime<Utc>,
    /// Number of files in the torrent.
    pub n_files: u64,
    /// Similarity to the search text; only set by searches with a text query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

impl TorrentMetadata {
    /// The value this row was ordered on, suitable as the next page's cursor value.
    ///
    /// Returns `None` for relevance ordering when the row was not produced by a text search.
    pub fn ordered_value(&self, order_by: OrderingCriteria) -> Option<f64> {
        match order_by {
            OrderingCriteria::ByRelevance => self.relevance,
            OrderingCriteria::ByTotalSize => Some(self.total_size as f64),
            OrderingCriteria::ByDiscoveredOn => Some(timestamp_to_cursor(self.discovered_on)),
            OrderingCriteria::ByNFiles => Some(self.n_files as f64),
        }
    }
}

/// Unix seconds with a microsecond fraction.
pub fn timestamp_to_cursor(timestamp: DateTime<Utc>) -> f64 {
    timestamp.timestamp_micros() as f64 / 1_000_000.0
}

/// Sort column for torrent searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderingCriteria {
    /// Trigram similarity to the search text. Requires a non-empty query.
    #[serde(rename = "relevance")]
    ByRelevance,
    #[serde(rename = "total_size")]
    ByTotalSize,
    #[default]
    #[serde(rename = "discovered_on")]
    ByDiscoveredOn,
    #[serde(rename = "n_files")]
    ByNFiles,
}

impl OrderingCriteria {
    /// Returns the string representation used in APIs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderingCriteria::ByRelevance => "relevance",
            OrderingCriteria::ByTotalSize => "total_size",
            OrderingCriteria::ByDiscoveredOn => "discovered_on",
            OrderingCriteria::ByNFiles => "n_files",
        }
    }
}

/// Why an ingestion call wrote nothing even though it succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The torrent name is not storable text.
    InvalidName,
    /// A file path is not storable text; the whole torrent was discarded.
    InvalidPath,
    /// The files add up to zero bytes.
    ZeroSize,
    /// The files add up to more than the index can store.
    SizeOverflow,
}

/// Result of a successful ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The torrent and its files were committed.
    Added { id: i64 },
    /// A torrent with the same info hash is already stored.
    AlreadyExists,
    /// Nothing was written.
    Skipped { reason: SkipReason },
}

impl IngestOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, IngestOutcome::Added { .. })
    }

    /// Label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Added { .. } => "added",
            IngestOutcome::AlreadyExists => "already_exists",
            IngestOutcome::Skipped { reason } => match reason {
                SkipReason::InvalidName => "invalid_name",
                SkipReason::InvalidPath => "invalid_path",
                SkipReason::ZeroSize => "zero_size",
                SkipReason::SizeOverflow => "size_overflow",
            },
        }
    }
}

/// Discovery counts for one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatisticsBucket {
    /// Distinct torrents discovered.
    pub n_discovered: u64,
    /// Sum of file sizes in bytes.
    pub total_size: u64,
    /// Distinct files.
    pub n_files: u64,
}

/// Time-bucketed discovery statistics. Buckets without discoveries are absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub buckets: BTreeMap<String, StatisticsBucket>,
}

impl Statistics {
    /// Bucket for `label`, zero if nothing was discovered in it.
    pub fn bucket(&self, label: &str) -> StatisticsBucket {
        self.buckets.get(label).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
