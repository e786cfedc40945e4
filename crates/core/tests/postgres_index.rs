//! PostgreSQL index integration tests.
//!
//! These tests need a database with the `pg_trgm` extension enabled. Point
//! `HASHDEX_TEST_DATABASE_URL` at it to run them; without it they return early.
//! Every test works in its own freshly created schema, dropped at the end.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;

use hashdex_core::{
    index::search::TorrentQuery,
    testing::fixtures,
    DatabaseConfig, IndexError, IngestOutcome, OrderingCriteria, PostgresIndex, SkipReason,
    TorrentIndex, TorrentMetadata,
};

const DATABASE_URL_ENV: &str = "HASHDEX_TEST_DATABASE_URL";

struct TestHarness {
    index: PostgresIndex,
    config: DatabaseConfig,
    schema: String,
}

impl TestHarness {
    async fn new() -> Option<Self> {
        let Ok(url) = std::env::var(DATABASE_URL_ENV) else {
            eprintln!("{} not set; skipping", DATABASE_URL_ENV);
            return None;
        };

        let schema = format!("test_{}", uuid::Uuid::new_v4().simple());
        let config = DatabaseConfig {
            url,
            schema: Some(schema.clone()),
            ..DatabaseConfig::default()
        };
        let index = PostgresIndex::connect(&config)
            .await
            .expect("Failed to set up index");

        Some(Self {
            index,
            config,
            schema,
        })
    }

    fn pool(&self) -> &PgPool {
        self.index.handle().pool()
    }

    async fn set_discovered_on(&self, n: u8, discovered_on: DateTime<Utc>) {
        sqlx::query(&format!(
            "UPDATE {}.torrents SET discovered_on = $1 WHERE info_hash = $2",
            self.schema
        ))
        .bind(discovered_on)
        .bind(fixtures::info_hash(n).as_bytes())
        .execute(self.pool())
        .await
        .expect("Failed to set discovered_on");
    }

    async fn count_rows(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}.{}", self.schema, table))
            .fetch_one(self.pool())
            .await
            .expect("Failed to count rows")
    }

    async fn add(&self, n: u8, name: &str, files: &[(u64, &str)]) -> IngestOutcome {
        self.index
            .add_new_torrent(&fixtures::new_torrent(n, name, files))
            .await
            .expect("Failed to add torrent")
    }

    async fn cleanup(self) {
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(self.pool())
            .await
            .expect("Failed to drop schema");
        self.index.close().await;
    }
}

fn far_future() -> i64 {
    Utc::now().timestamp() + 3600
}

fn day(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, d, h, 0, 0).unwrap()
}

/// Walks every page of `query` and returns the rows in visiting order.
async fn walk(index: &PostgresIndex, mut query: TorrentQuery) -> Vec<TorrentMetadata> {
    let mut rows = Vec::new();
    loop {
        let page = index.query_torrents(&query).await.expect("Query failed");
        let Some(last) = page.last() else {
            return rows;
        };
        query = query.next_page(last).expect("Row has no sort value");
        rows.extend(page);
    }
}

#[tokio::test]
async fn test_schema_setup_is_idempotent() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };
    assert_eq!(harness.index.schema_version(), 0);
    assert_eq!(harness.index.schema().as_str(), harness.schema);

    let again = PostgresIndex::connect(&harness.config)
        .await
        .expect("Second setup failed");
    assert_eq!(again.schema_version(), 0);
    again.close().await;

    assert_eq!(harness.count_rows("migrations").await, 1);
    harness.cleanup().await;
}

#[tokio::test]
async fn test_added_torrent_exists() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    let outcome = harness.add(1, "ubuntu.iso", &[(100, "a")]).await;
    assert!(outcome.is_added());
    assert!(harness
        .index
        .does_torrent_exist(&fixtures::info_hash(1))
        .await
        .unwrap());
    assert!(!harness
        .index
        .does_torrent_exist(&fixtures::info_hash(2))
        .await
        .unwrap());

    harness.cleanup().await;
}

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    harness.add(1, "ubuntu.iso", &[(100, "a"), (20, "b")]).await;
    let second = harness.add(1, "renamed", &[(7, "c")]).await;
    assert_eq!(second, IngestOutcome::AlreadyExists);

    let torrent = harness
        .index
        .get_torrent(&fixtures::info_hash(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(torrent.name, "ubuntu.iso");

    let files = harness
        .index
        .get_files(&fixtures::info_hash(1))
        .await
        .unwrap()
        .unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["a", "b"]);
    assert_eq!(harness.count_rows("torrents").await, 1);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_concurrent_duplicates_store_once() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    let torrent = fixtures::new_torrent(9, "race", &[(1, "x")]);
    let (a, b) = tokio::join!(
        harness.index.add_new_torrent(&torrent),
        harness.index.add_new_torrent(&torrent)
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_added()).count(), 1);
    assert!(outcomes.contains(&IngestOutcome::AlreadyExists));
    assert_eq!(harness.count_rows("torrents").await, 1);
    assert_eq!(harness.count_rows("files").await, 1);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_total_size_matches_files() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    harness
        .add(1, "album", &[(300, "01.flac"), (200, "02.flac"), (1, "cover.jpg")])
        .await;

    let torrent = harness
        .index
        .get_torrent(&fixtures::info_hash(1))
        .await
        .unwrap()
        .unwrap();
    let files = harness
        .index
        .get_files(&fixtures::info_hash(1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(torrent.total_size, files.iter().map(|f| f.size).sum::<u64>());
    assert_eq!(torrent.total_size, 501);
    assert_eq!(torrent.n_files, 3);
    assert!(torrent.relevance.is_none());

    harness.cleanup().await;
}

#[tokio::test]
async fn test_rejected_torrents_leave_no_rows() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    let zero = harness.add(1, "empty", &[(0, "a"), (0, "b")]).await;
    assert_eq!(
        zero,
        IngestOutcome::Skipped {
            reason: SkipReason::ZeroSize
        }
    );

    let mut bad_name = fixtures::new_torrent(2, "x", &[(1, "a")]);
    bad_name.name = vec![0x62, 0x00, 0x64];
    assert_eq!(
        harness.index.add_new_torrent(&bad_name).await.unwrap(),
        IngestOutcome::Skipped {
            reason: SkipReason::InvalidName
        }
    );

    let mut bad_path = fixtures::new_torrent(3, "fine", &[(1, "a"), (2, "b")]);
    bad_path.files[1].path = vec![0xc3, 0x28];
    assert_eq!(
        harness.index.add_new_torrent(&bad_path).await.unwrap(),
        IngestOutcome::Skipped {
            reason: SkipReason::InvalidPath
        }
    );

    let too_big = fixtures::new_torrent(4, "huge", &[(u64::MAX / 2 + 1, "a")]);
    assert_eq!(
        harness.index.add_new_torrent(&too_big).await.unwrap(),
        IngestOutcome::Skipped {
            reason: SkipReason::SizeOverflow
        }
    );

    assert_eq!(harness.count_rows("torrents").await, 0);
    assert_eq!(harness.count_rows("files").await, 0);
    for n in 1..=4 {
        assert!(harness
            .index
            .get_torrent(&fixtures::info_hash(n))
            .await
            .unwrap()
            .is_none());
    }

    harness.cleanup().await;
}

#[tokio::test]
async fn test_unknown_torrent_has_no_files() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    let files = harness
        .index
        .get_files(&fixtures::info_hash(42))
        .await
        .unwrap();
    assert!(files.is_none());

    harness.cleanup().await;
}

#[tokio::test]
async fn test_discovery_order_pages() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    for (n, name) in [(1, "first"), (2, "second"), (3, "third")] {
        harness.add(n, name, &[(10, "f")]).await;
        harness.set_discovered_on(n, day(n.into(), 0)).await;
    }

    let query = TorrentQuery::new(far_future())
        .order_by(OrderingCriteria::ByDiscoveredOn, true)
        .limit(2);
    let page = harness.index.query_torrents(&query).await.unwrap();
    let names: Vec<&str> = page.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);

    let next = query.next_page(&page[1]).unwrap();
    let page = harness.index.query_torrents(&next).await.unwrap();
    let names: Vec<&str> = page.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["third"]);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_pagination_visits_every_row_once() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    // Repeating sizes, file counts and timestamps force the id tie-breaker.
    for n in 1..=11u8 {
        let size = 100 * u64::from(n % 3 + 1);
        let files: Vec<(u64, &str)> = (0..(n % 4 + 1)).map(|_| (size, "part")).collect();
        harness
            .add(n, &format!("linux distro {}", n % 2), &files)
            .await;
        harness.set_discovered_on(n, day(1, u32::from(n % 5))).await;
    }

    let criteria = [
        OrderingCriteria::ByTotalSize,
        OrderingCriteria::ByDiscoveredOn,
        OrderingCriteria::ByNFiles,
        OrderingCriteria::ByRelevance,
    ];

    for order_by in criteria {
        for ascending in [true, false] {
            for limit in [1, 2, 4, 20] {
                let query = TorrentQuery::new(far_future())
                    .text("distro")
                    .order_by(order_by, ascending)
                    .limit(limit);
                let rows = walk(&harness.index, query).await;

                let ids: HashSet<i64> = rows.iter().map(|t| t.id).collect();
                assert_eq!(rows.len(), 11, "{order_by:?} asc={ascending} limit={limit}");
                assert_eq!(ids.len(), 11, "{order_by:?} asc={ascending} limit={limit}");

                let keys: Vec<(f64, i64)> = rows
                    .iter()
                    .map(|t| (t.ordered_value(order_by).unwrap(), t.id))
                    .collect();
                for pair in keys.windows(2) {
                    let in_order = if ascending {
                        pair[0] < pair[1]
                    } else {
                        pair[0] > pair[1]
                    };
                    assert!(in_order, "{order_by:?} asc={ascending}: {pair:?}");
                }
            }
        }
    }

    harness.cleanup().await;
}

#[tokio::test]
async fn test_text_search_is_case_insensitive_and_literal() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    harness.add(1, "Ubuntu 20.04 LTS", &[(1, "a")]).await;
    harness.add(2, "100% legit", &[(1, "a")]).await;
    harness.add(3, "1000 legit", &[(1, "a")]).await;

    let query = TorrentQuery::new(far_future()).text("ubuntu");
    let page = harness.index.query_torrents(&query).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "Ubuntu 20.04 LTS");
    assert!(page[0].relevance.unwrap() > 0.0);

    let query = TorrentQuery::new(far_future()).text("100%");
    let page = harness.index.query_torrents(&query).await.unwrap();
    let names: Vec<&str> = page.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["100% legit"]);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_epoch_excludes_later_discoveries() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    harness.add(1, "old", &[(1, "a")]).await;
    harness.add(2, "new", &[(1, "a")]).await;
    harness.set_discovered_on(1, day(1, 0)).await;
    harness.set_discovered_on(2, day(3, 0)).await;

    let query = TorrentQuery::new(day(2, 0).timestamp());
    let page = harness.index.query_torrents(&query).await.unwrap();
    let names: Vec<&str> = page.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["old"]);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_fresh_torrent_listed_at_current_second() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    harness.add(1, "fresh", &[(1, "a")]).await;

    let query = TorrentQuery::new(Utc::now().timestamp());
    let page = harness.index.query_torrents(&query).await.unwrap();
    let names: Vec<&str> = page.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["fresh"]);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_epoch_covers_its_whole_second() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    harness.add(1, "late in second", &[(1, "a")]).await;
    harness.add(2, "next second", &[(1, "a")]).await;
    harness
        .set_discovered_on(1, day(2, 0) + chrono::TimeDelta::microseconds(999_999))
        .await;
    harness.set_discovered_on(2, day(2, 0) + chrono::TimeDelta::seconds(1)).await;

    let query = TorrentQuery::new(day(2, 0).timestamp());
    let page = harness.index.query_torrents(&query).await.unwrap();
    let names: Vec<&str> = page.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["late in second"]);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_known_hash_wins_over_invalid_path() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    assert!(harness.add(1, "stored", &[(1, "a")]).await.is_added());

    let mut again = fixtures::new_torrent(1, "stored", &[(1, "a")]);
    again.files[0].path = vec![0xff];
    assert_eq!(
        harness.index.add_new_torrent(&again).await.unwrap(),
        IngestOutcome::AlreadyExists
    );
    assert_eq!(harness.count_rows("files").await, 1);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_relevance_without_query_is_rejected() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    let query = TorrentQuery::new(far_future()).order_by(OrderingCriteria::ByRelevance, false);
    let result = harness.index.query_torrents(&query).await;
    assert!(matches!(result, Err(IndexError::Query(_))));

    harness.cleanup().await;
}

#[tokio::test]
async fn test_daily_statistics() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    harness.add(1, "a", &[(100, "x"), (50, "y")]).await;
    harness.add(2, "b", &[(10, "z")]).await;
    harness.add(3, "c", &[(1, "w")]).await;
    harness.set_discovered_on(1, day(1, 5)).await;
    harness.set_discovered_on(2, day(1, 20)).await;
    harness.set_discovered_on(3, day(3, 5)).await;

    let stats = harness
        .index
        .get_statistics("2021-01-01", 1)
        .await
        .unwrap();
    assert_eq!(stats.buckets.len(), 1);

    let bucket = stats.bucket("2021-01-01");
    assert_eq!(bucket.n_discovered, 2);
    assert_eq!(bucket.total_size, 160);
    assert_eq!(bucket.n_files, 3);
    assert!(!stats.buckets.contains_key("2021-01-02"));

    let hourly = harness
        .index
        .get_statistics("2021-01-01T00", 24)
        .await
        .unwrap();
    assert_eq!(hourly.bucket("2021-01-01T05").n_discovered, 1);
    assert_eq!(hourly.bucket("2021-01-01T20").n_files, 1);

    let monthly = harness.index.get_statistics("2021-01", 1).await.unwrap();
    assert_eq!(monthly.bucket("2021-01").n_discovered, 3);

    let bad = harness.index.get_statistics("2021-1-1", 1).await;
    assert!(matches!(bad, Err(IndexError::InvalidTimeSpec(_))));

    harness.cleanup().await;
}

#[tokio::test]
async fn test_torrent_count_estimate() {
    let Some(harness) = TestHarness::new().await else {
        return;
    };

    for n in 1..=3 {
        harness.add(n, "t", &[(1, "a")]).await;
    }
    sqlx::query(&format!("ANALYZE {}.torrents", harness.schema))
        .execute(harness.pool())
        .await
        .unwrap();

    assert_eq!(harness.index.get_number_of_torrents().await.unwrap(), 3);

    harness.cleanup().await;
}
