pub mod config;
pub mod index;
pub mod metrics;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    SanitizedConfig, ServerConfig,
};
pub use index::{
    File, IndexError, IndexHandle, InfoHash, IngestOutcome, NewFile, NewTorrent,
    OrderingCriteria, PostgresIndex, SkipReason, Statistics, StatisticsBucket, TorrentIndex,
    TorrentMetadata, TorrentQuery,
};
