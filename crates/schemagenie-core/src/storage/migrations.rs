//! Database migrations
//!
//! Versioned SQLite schema for the embedded property graph. Migrations are
//! applied automatically on connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 3;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Schema, attribute and meta nodes with their edges
const MIGRATION_V1: &str = r#"
    -- (:Schema) nodes, unique by id
    CREATE TABLE IF NOT EXISTS schemas (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        display_name TEXT NOT NULL,
        capture_base_id TEXT,
        schema_type TEXT NOT NULL,
        attribute_ordering TEXT,
        entry_code_ordering TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_schemas_name ON schemas(name);

    -- (:Attribute) nodes, unique by name across all schemas
    CREATE TABLE IF NOT EXISTS attributes (
        name TEXT PRIMARY KEY NOT NULL,
        attribute_type TEXT NOT NULL,
        unit TEXT,
        description TEXT,
        format TEXT,
        vocabulary TEXT,
        codes TEXT,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- (Schema)-[:HAS_ATTRIBUTE]->(Attribute)
    CREATE TABLE IF NOT EXISTS schema_attributes (
        schema_id TEXT NOT NULL REFERENCES schemas(id) ON DELETE CASCADE,
        attribute_name TEXT NOT NULL REFERENCES attributes(name) ON DELETE CASCADE,
        PRIMARY KEY (schema_id, attribute_name)
    );

    CREATE INDEX IF NOT EXISTS idx_schema_attributes_attribute
        ON schema_attributes(attribute_name);

    -- (:Meta) nodes linked by (Schema)-[:HAS_META]->(Meta)
    CREATE TABLE IF NOT EXISTS metas (
        name TEXT NOT NULL,
        schema_id TEXT NOT NULL REFERENCES schemas(id) ON DELETE CASCADE,
        language TEXT NOT NULL,
        description TEXT,
        PRIMARY KEY (name, schema_id, language)
    );
"#;

/// Migration 2: Import run history
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS import_runs (
        id TEXT PRIMARY KEY NOT NULL,
        folder TEXT NOT NULL,
        files_total INTEGER NOT NULL DEFAULT 0,
        files_imported INTEGER NOT NULL DEFAULT 0,
        files_failed INTEGER NOT NULL DEFAULT 0,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_import_runs_started_at ON import_runs(started_at);
"#;

/// Migration 3: Lowercased attribute search text
///
/// Rows written before this version get their name and description values
/// folded by SQLite's ASCII-only `LOWER`; the next import rewrites them.
const MIGRATION_V3: &str = r#"
    ALTER TABLE attributes ADD COLUMN search_text TEXT NOT NULL DEFAULT '';

    UPDATE attributes SET search_text = LOWER(
        name || COALESCE(
            char(10) || (SELECT group_concat(value, char(10)) FROM json_each(attributes.description)),
            ''
        )
    );
"#;

/// Get the current schema version
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Property graph tables");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Import run history");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    if current_version < 3 {
        tracing::info!("Applying migration v3: Attribute search text");
        sqlx::raw_sql(MIGRATION_V3).execute(pool).await?;
        record_migration(pool, 3).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}
