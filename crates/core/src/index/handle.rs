//! Shared connection handle and schema resolution.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use url::Url;

use super::IndexError;
use crate::config::DatabaseConfig;

/// Schema used when neither the URL nor the config names one.
pub const DEFAULT_SCHEMA: &str = "magneticod";

/// Maximum identifier length PostgreSQL keeps (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated schema name that is safe to use unquoted in SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaName(String);

impl SchemaName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `search_path` for connections: our schema first, then `public` where
    /// extensions such as `pg_trgm` usually live.
    pub fn search_path(&self) -> String {
        format!("{},public", self.0)
    }
}

impl FromStr for SchemaName {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if valid_start && valid_rest && s.len() <= MAX_IDENTIFIER_LEN {
            Ok(Self(s.to_string()))
        } else {
            Err(IndexError::InvalidSchemaName(s.to_string()))
        }
    }
}

impl Default for SchemaName {
    fn default() -> Self {
        Self(DEFAULT_SCHEMA.to_string())
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connection URL with the `schema` query parameter split off.
#[derive(Debug, Clone)]
pub struct Locator {
    url: Url,
    schema: SchemaName,
}

impl Locator {
    /// Parses a `postgres://` URL.
    ///
    /// The schema is taken from `schema_override`, else from the URL's `schema` query
    /// parameter, else [`DEFAULT_SCHEMA`]. The `schema` parameter is removed from the URL
    /// since the driver does not understand it.
    pub fn parse(raw: &str, schema_override: Option<&str>) -> Result<Self, IndexError> {
        let mut url = Url::parse(raw).map_err(|e| IndexError::InvalidUrl(e.to_string()))?;

        let mut url_schema = None;
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(key, value)| {
                if key == "schema" {
                    url_schema = Some(value.into_owned());
                    None
                } else {
                    Some((key.into_owned(), value.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }

        let schema = match schema_override.or(url_schema.as_deref()) {
            Some(name) if !name.is_empty() => name.parse()?,
            _ => SchemaName::default(),
        };

        Ok(Self { url, schema })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }
}

/// Connection pool plus the resolved schema, shared by every index operation.
///
/// Immutable once constructed; cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    pool: PgPool,
    schema: SchemaName,
}

impl IndexHandle {
    /// Opens the pool and verifies the engine is reachable.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, IndexError> {
        let locator = Locator::parse(&config.url, config.schema.as_deref())?;

        let options = PgConnectOptions::from_str(locator.url().as_str())
            .map_err(|e| IndexError::InvalidUrl(e.to_string()))?
            .options([("search_path", locator.schema().search_path())]);

        tracing::info!(
            host = locator.url().host_str().unwrap_or("<none>"),
            database = locator.url().path().trim_start_matches('/'),
            schema = %locator.schema(),
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );

        // connect_with opens a first connection, so an unreachable engine fails here.
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(IndexError::Connection)?;

        Ok(Self {
            pool,
            schema: locator.schema,
        })
    }

    /// Wraps an existing pool. Its connections must already use `schema` on their
    /// search path.
    pub fn from_pool(pool: PgPool, schema: SchemaName) -> Self {
        Self { pool, schema }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    /// Closes every pooled connection. Operations afterwards fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
