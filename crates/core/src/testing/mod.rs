//! Testing utilities: an in-memory index and fixtures.
//!
//! # Example
//!
//! ```rust,ignore
//! use hashdex_core::testing::{fixtures, MockTorrentIndex};
//!
//! let index = MockTorrentIndex::new();
//! index.add_new_torrent(&fixtures::new_torrent(1, "ubuntu.iso", &[(100, "a")])).await?;
//!
//! // Use in AppState...
//! ```

mod mock_index;

pub use mock_index::MockTorrentIndex;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::index::{InfoHash, NewFile, NewTorrent, INFO_HASH_LEN};

    /// A deterministic info hash whose every byte is `n`.
    pub fn info_hash(n: u8) -> InfoHash {
        InfoHash::new([n; INFO_HASH_LEN])
    }

    /// A torrent with hash [`info_hash(n)`](info_hash), the given name and `(size, path)` files.
    pub fn new_torrent(n: u8, name: &str, files: &[(u64, &str)]) -> NewTorrent {
        NewTorrent::new(
            info_hash(n),
            name,
            files
                .iter()
                .map(|(size, path)| NewFile::new(*size, *path))
                .collect(),
            format!("d4:name{}:{}e", name.len(), name),
        )
    }
}
