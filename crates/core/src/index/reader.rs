//! Point lookups by info hash.

use sqlx::postgres::PgRow;
use sqlx::Row;

use super::{File, IndexError, IndexHandle, InfoHash, TorrentMetadata};

/// Correlated file count, shared by every query returning torrent summaries.
pub(crate) const N_FILES_SUBQUERY: &str =
    "(SELECT COUNT(*) FROM files f WHERE f.torrent_id = t.id)";

pub async fn does_torrent_exist(
    handle: &IndexHandle,
    info_hash: &InfoHash,
) -> Result<bool, IndexError> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM torrents WHERE info_hash = $1)")
        .bind(info_hash.as_bytes())
        .fetch_one(handle.pool())
        .await
        .map_err(IndexError::database("check torrent existence"))
}

pub async fn get_torrent(
    handle: &IndexHandle,
    info_hash: &InfoHash,
) -> Result<Option<TorrentMetadata>, IndexError> {
    let sql = format!(
        "SELECT t.id::BIGINT AS id, t.info_hash, t.name, t.total_size, t.discovered_on,
                {N_FILES_SUBQUERY} AS n_files,
                NULL::DOUBLE PRECISION AS relevance
         FROM torrents t
         WHERE t.info_hash = $1"
    );

    let row = sqlx::query(&sql)
        .bind(info_hash.as_bytes())
        .fetch_optional(handle.pool())
        .await
        .map_err(IndexError::database("get torrent"))?;

    row.as_ref()
        .map(torrent_from_row)
        .transpose()
        .map_err(IndexError::database("decode torrent"))
}

/// Files of the torrent in insertion order, or `None` if no such torrent is stored.
pub async fn get_files(
    handle: &IndexHandle,
    info_hash: &InfoHash,
) -> Result<Option<Vec<File>>, IndexError> {
    // The LEFT JOIN yields one all-NULL file row for a torrent without files, and no
    // rows at all for an unknown hash.
    let rows = sqlx::query(
        "SELECT f.size, f.path
         FROM torrents t
         LEFT JOIN files f ON f.torrent_id = t.id
         WHERE t.info_hash = $1
         ORDER BY f.id",
    )
    .bind(info_hash.as_bytes())
    .fetch_all(handle.pool())
    .await
    .map_err(IndexError::database("get files"))?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut files = Vec::with_capacity(rows.len());
    for row in &rows {
        let size: Option<i64> = row
            .try_get("size")
            .map_err(IndexError::database("decode file"))?;
        let path: Option<String> = row
            .try_get("path")
            .map_err(IndexError::database("decode file"))?;

        if let (Some(size), Some(path)) = (size, path) {
            let size = u64::try_from(size)
                .map_err(|e| IndexError::database("decode file")(decode_error(e)))?;
            files.push(File { size, path });
        }
    }

    Ok(Some(files))
}

/// Maps a summary row (`id, info_hash, name, total_size, discovered_on, n_files,
/// relevance`) to [`TorrentMetadata`].
pub(crate) fn torrent_from_row(row: &PgRow) -> Result<TorrentMetadata, sqlx::Error> {
    let info_hash: Vec<u8> = row.try_get("info_hash")?;
    let total_size: i64 = row.try_get("total_size")?;
    let n_files: i64 = row.try_get("n_files")?;

    Ok(TorrentMetadata {
        id: row.try_get("id")?,
        info_hash: InfoHash::try_from(info_hash.as_slice()).map_err(decode_error)?,
        name: row.try_get("name")?,
        total_size: u64::try_from(total_size).map_err(decode_error)?,
        discovered_on: row.try_get("discovered_on")?,
        n_files: u64::try_from(n_files).map_err(decode_error)?,
        relevance: row.try_get("relevance")?,
    })
}

fn decode_error<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}
