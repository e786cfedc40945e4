//! Discovery statistics and the cheap row-count estimate.

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::timespec::TimeSpec;
use super::{IndexError, IndexHandle, Statistics, StatisticsBucket};

/// Per-bucket discovery counts for `n` granularity units starting at `from`.
///
/// Only torrents with at least one file are counted.
pub async fn get_statistics(
    handle: &IndexHandle,
    from: &str,
    n: u32,
) -> Result<Statistics, IndexError> {
    let spec = TimeSpec::parse(from)?;
    let end = spec.end_after(n)?;

    collect_buckets(handle, spec, end).await
}

async fn collect_buckets(
    handle: &IndexHandle,
    spec: TimeSpec,
    end: DateTime<Utc>,
) -> Result<Statistics, IndexError> {
    let rows = sqlx::query(
        "SELECT to_char(t.discovered_on AT TIME ZONE 'UTC', $3) AS bucket,
                COUNT(DISTINCT t.id) AS n_discovered,
                SUM(f.size)::BIGINT AS total_size,
                COUNT(DISTINCT f.id) AS n_files
         FROM torrents t
         JOIN files f ON f.torrent_id = t.id
         WHERE t.discovered_on >= $1 AND t.discovered_on <= $2
         GROUP BY 1",
    )
    .bind(spec.start)
    .bind(end)
    .bind(spec.granularity.sql_label_format())
    .fetch_all(handle.pool())
    .await
    .map_err(IndexError::database("get statistics"))?;

    let mut statistics = Statistics::default();
    for row in &rows {
        let label: String = row
            .try_get("bucket")
            .map_err(IndexError::database("decode statistics"))?;
        let n_discovered: i64 = row
            .try_get("n_discovered")
            .map_err(IndexError::database("decode statistics"))?;
        let total_size: i64 = row
            .try_get("total_size")
            .map_err(IndexError::database("decode statistics"))?;
        let n_files: i64 = row
            .try_get("n_files")
            .map_err(IndexError::database("decode statistics"))?;

        statistics.buckets.insert(
            label,
            StatisticsBucket {
                n_discovered: n_discovered.max(0) as u64,
                total_size: total_size.max(0) as u64,
                n_files: n_files.max(0) as u64,
            },
        );
    }

    tracing::debug!(
        from = %spec.start,
        to = %end,
        buckets = statistics.buckets.len(),
        "Collected statistics"
    );
    Ok(statistics)
}

/// Approximate number of stored torrents from planner statistics.
///
/// May lag behind recent writes until the table is analyzed again; a table that was
/// never analyzed reports 0.
pub async fn get_number_of_torrents(handle: &IndexHandle) -> Result<u64, IndexError> {
    let estimate: Option<i64> = sqlx::query_scalar(
        "SELECT reltuples::BIGINT FROM pg_class WHERE oid = to_regclass('torrents')",
    )
    .fetch_optional(handle.pool())
    .await
    .map_err(IndexError::database("estimate torrent count"))?;

    Ok(estimate.unwrap_or(0).max(0) as u64)
}
