//! Schema bootstrap and versioned migrations.

use super::{IndexError, IndexHandle, SchemaName};

/// Schema version this build creates and expects.
pub const SCHEMA_VERSION: i16 = 0;

/// One forward step from `version - 1` to `version`.
pub struct Migration {
    pub version: i16,
    pub description: &'static str,
    pub statements: fn(&SchemaName) -> Vec<String>,
}

/// Steps after the initial layout, in ascending version order.
pub static MIGRATIONS: &[Migration] = &[];

/// Steps of `migrations` newer than `stored`, in order.
pub fn pending_migrations(
    migrations: &'static [Migration],
    stored: i16,
) -> impl Iterator<Item = &'static Migration> {
    migrations.iter().filter(move |m| m.version > stored)
}

/// Creates the schema if absent, applies pending migrations and returns the resulting
/// version. Runs in one transaction; any failure leaves the database untouched.
pub async fn ensure_schema(handle: &IndexHandle) -> Result<i16, IndexError> {
    let schema = handle.schema();

    let trgm_enabled: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_extension WHERE extname = 'pg_trgm')")
            .fetch_one(handle.pool())
            .await
            .map_err(IndexError::schema_setup("pg_trgm check"))?;

    if !trgm_enabled {
        return Err(IndexError::Schema(
            "pg_trgm extension is not enabled; run 'CREATE EXTENSION pg_trgm' on this database"
                .to_string(),
        ));
    }

    let mut tx = handle
        .pool()
        .begin()
        .await
        .map_err(IndexError::schema_setup("begin"))?;

    for statement in bootstrap_statements(schema) {
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(IndexError::schema_setup("initial layout"))?;
    }

    let stored: Option<i16> = sqlx::query_scalar(&format!(
        "SELECT MAX(schema_version) FROM {}.migrations",
        schema
    ))
    .fetch_one(&mut *tx)
    .await
    .map_err(IndexError::schema_setup("read schema version"))?;
    let mut version = stored.unwrap_or(0);

    if version > SCHEMA_VERSION {
        tracing::warn!(
            schema = %schema,
            stored = version,
            supported = SCHEMA_VERSION,
            "Database schema is newer than this build"
        );
    }

    for migration in pending_migrations(MIGRATIONS, version) {
        tracing::warn!(
            schema = %schema,
            from = version,
            to = migration.version,
            "Migrating database schema: {}",
            migration.description
        );

        for statement in (migration.statements)(schema) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(IndexError::schema_setup("migration"))?;
        }

        sqlx::query(&format!(
            "INSERT INTO {}.migrations (schema_version) VALUES ($1)",
            schema
        ))
        .bind(migration.version)
        .execute(&mut *tx)
        .await
        .map_err(IndexError::schema_setup("record migration"))?;

        version = migration.version;
    }

    tx.commit()
        .await
        .map_err(IndexError::schema_setup("commit"))?;

    tracing::info!(schema = %schema, version, "Database schema ready");
    Ok(version)
}

/// DDL for schema version 0. Every statement is idempotent. Frozen: later changes go in
/// [`MIGRATIONS`].
pub fn bootstrap_statements(schema: &SchemaName) -> Vec<String> {
    let s = schema.as_str();
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {s}"),
        format!("CREATE SEQUENCE IF NOT EXISTS {s}.seq_torrents_id"),
        format!("CREATE SEQUENCE IF NOT EXISTS {s}.seq_files_id"),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.torrents (
                id             INTEGER PRIMARY KEY DEFAULT nextval('{s}.seq_torrents_id'),
                info_hash      BYTEA NOT NULL UNIQUE,
                name           TEXT NOT NULL,
                metadata       BYTEA NOT NULL,
                total_size     BIGINT NOT NULL CHECK (total_size > 0),
                discovered_on  TIMESTAMP WITH TIME ZONE NOT NULL
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_torrents_total_size ON {s}.torrents (total_size)"),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_torrents_discovered_on ON {s}.torrents (discovered_on)"
        ),
        // ILIKE patterns shorter than three characters cannot use this index.
        format!(
            "CREATE INDEX IF NOT EXISTS idx_torrents_name_gin_trgm ON {s}.torrents USING GIN (name gin_trgm_ops)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.files (
                id          INTEGER PRIMARY KEY DEFAULT nextval('{s}.seq_files_id'),
                torrent_id  INTEGER NOT NULL REFERENCES {s}.torrents ON DELETE CASCADE ON UPDATE RESTRICT,
                size        BIGINT NOT NULL,
                path        TEXT NOT NULL
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_files_torrent_id ON {s}.files (torrent_id)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.migrations (
                schema_version  SMALLINT NOT NULL UNIQUE
            )"
        ),
        format!("INSERT INTO {s}.migrations (schema_version) VALUES (0) ON CONFLICT DO NOTHING"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_is_schema_qualified() {
        let schema: SchemaName = "idx_test".parse().unwrap();
        let statements = bootstrap_statements(&schema);

        assert_eq!(statements[0], "CREATE SCHEMA IF NOT EXISTS idx_test");
        for statement in &statements[1..] {
            assert!(
                statement.contains("idx_test."),
                "unqualified statement: {statement}"
            );
        }
    }

    #[test]
    fn test_bootstrap_is_idempotent_ddl() {
        let statements = bootstrap_statements(&SchemaName::default());
        for statement in &statements {
            assert!(
                statement.contains("IF NOT EXISTS") || statement.contains("ON CONFLICT DO NOTHING"),
                "statement would fail on a second run: {statement}"
            );
        }
    }

    #[test]
    fn test_bootstrap_creates_expected_objects() {
        let ddl = bootstrap_statements(&SchemaName::default()).join("\n");
        for object in [
            "magneticod.seq_torrents_id",
            "magneticod.seq_files_id",
            "magneticod.torrents",
            "magneticod.files",
            "magneticod.migrations",
            "idx_torrents_total_size",
            "idx_torrents_discovered_on",
            "idx_torrents_name_gin_trgm",
            "idx_files_torrent_id",
        ] {
            assert!(ddl.contains(object), "missing {object}");
        }
        assert!(ddl.contains("CHECK (total_size > 0)"));
        assert!(ddl.contains("ON DELETE CASCADE"));
    }

    fn add_column(schema: &SchemaName) -> Vec<String> {
        vec![format!("ALTER TABLE {schema}.torrents ADD COLUMN IF NOT EXISTS seen INTEGER")]
    }

    static STEPS: &[Migration] = &[
        Migration {
            version: 1,
            description: "add seen column",
            statements: add_column,
        },
        Migration {
            version: 2,
            description: "second step",
            statements: add_column,
        },
    ];

    #[test]
    fn test_pending_migrations_skip_applied_steps() {
        let versions = |stored| {
            pending_migrations(STEPS, stored)
                .map(|m| m.version)
                .collect::<Vec<_>>()
        };

        assert_eq!(versions(0), vec![1, 2]);
        assert_eq!(versions(1), vec![2]);
        assert!(versions(2).is_empty());
        assert!(versions(7).is_empty());

        let statements = (STEPS[0].statements)(&SchemaName::default());
        assert!(statements[0].starts_with("ALTER TABLE magneticod.torrents"));
    }

    #[test]
    fn test_migrations_end_at_schema_version() {
        let last = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);
        assert_eq!(last, SCHEMA_VERSION);

        for pair in MIGRATIONS.windows(2) {
            assert_eq!(pair[1].version, pair[0].version + 1);
        }
    }
}
