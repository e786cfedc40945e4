//! Ingestion of newly discovered torrents.

use chrono::Utc;

use super::error::is_duplicate_info_hash;
use super::reader::does_torrent_exist;
use super::{IndexError, IndexHandle, IngestOutcome, NewTorrent, SkipReason};

/// Stores a torrent and its files atomically.
///
/// Malformed input is not an error: the call succeeds without writing anything and the
/// returned [`IngestOutcome`] says why. An invalid name is rejected before any transaction
/// starts, while an invalid file path rolls back a transaction that already holds the
/// torrent row.
pub async fn add_new_torrent(
    handle: &IndexHandle,
    torrent: &NewTorrent,
) -> Result<IngestOutcome, IndexError> {
    let info_hash = &torrent.info_hash;

    let Some(name) = valid_text(&torrent.name) else {
        tracing::warn!(info_hash = %info_hash, "Ignoring torrent with invalid name");
        return Ok(skipped(SkipReason::InvalidName));
    };

    let Some(total_size) = torrent.total_size() else {
        tracing::warn!(info_hash = %info_hash, "Ignoring torrent whose file sizes overflow");
        return Ok(skipped(SkipReason::SizeOverflow));
    };

    if total_size == 0 {
        tracing::debug!(
            info_hash = %info_hash,
            torrent_name = name,
            "Ignoring torrent with zero total size"
        );
        return Ok(skipped(SkipReason::ZeroSize));
    }

    let Ok(total_size) = i64::try_from(total_size) else {
        tracing::warn!(info_hash = %info_hash, total_size, "Ignoring torrent too large to store");
        return Ok(skipped(SkipReason::SizeOverflow));
    };

    if does_torrent_exist(handle, info_hash).await? {
        tracing::debug!(info_hash = %info_hash, "Torrent already stored");
        return Ok(IngestOutcome::AlreadyExists);
    }

    // Dropping the transaction without committing rolls it back.
    let mut tx = handle
        .pool()
        .begin()
        .await
        .map_err(IndexError::database("begin ingestion"))?;

    let inserted = sqlx::query_scalar::<_, i32>(
        "INSERT INTO torrents (info_hash, name, total_size, discovered_on, metadata)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(info_hash.as_bytes())
    .bind(name)
    .bind(total_size)
    .bind(Utc::now())
    .bind(torrent.metadata.as_slice())
    .fetch_one(&mut *tx)
    .await;

    let torrent_id = match inserted {
        Ok(id) => id,
        Err(err) if is_duplicate_info_hash(&err) => {
            tracing::debug!(
                info_hash = %info_hash,
                "Torrent stored concurrently by another writer"
            );
            return Ok(IngestOutcome::AlreadyExists);
        }
        Err(err) => return Err(IndexError::database("insert torrent")(err)),
    };

    for file in &torrent.files {
        let Some(path) = valid_text(&file.path) else {
            tracing::warn!(
                info_hash = %info_hash,
                torrent_name = name,
                "Ignoring torrent with invalid file path"
            );
            return Ok(skipped(SkipReason::InvalidPath));
        };

        // Each size is at most the already checked total.
        let size = i64::try_from(file.size).unwrap_or(i64::MAX);

        sqlx::query("INSERT INTO files (torrent_id, size, path) VALUES ($1, $2, $3)")
            .bind(torrent_id)
            .bind(size)
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(IndexError::database("insert file"))?;
    }

    tx.commit()
        .await
        .map_err(IndexError::database("commit ingestion"))?;

    tracing::debug!(
        info_hash = %info_hash,
        torrent_name = name,
        id = torrent_id,
        files = torrent.files.len(),
        "Torrent added"
    );
    Ok(IngestOutcome::Added {
        id: i64::from(torrent_id),
    })
}

/// Returns the text if it can be stored in a `TEXT` column: valid UTF-8 without NUL.
pub fn valid_text(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes)
        .ok()
        .filter(|text| !text.contains('\0'))
}

fn skipped(reason: SkipReason) -> IngestOutcome {
    IngestOutcome::Skipped { reason }
}
