//! Database migrations
//!
//! Versioned SQLite schema for the entity graph. Migrations are applied in
//! order on connection and recorded in `_migrations`.

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

/// Migration 1: Entity graph
///
/// entity_type and relationship_type are plain TEXT so that rows written by
/// other tools with unknown values are still readable by the integrity pass.
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        normalized_name TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        canonical_form TEXT,
        confidence_score REAL NOT NULL DEFAULT 0.5,
        mention_count INTEGER NOT NULL DEFAULT 0,
        last_mentioned_at TEXT,
        metadata TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(normalized_name, entity_type)
    );

    CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
    CREATE INDEX IF NOT EXISTS idx_entities_normalized ON entities(normalized_name);

    CREATE TABLE IF NOT EXISTS entity_aliases (
        id TEXT PRIMARY KEY NOT NULL,
        entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        alias TEXT NOT NULL,
        alias_type TEXT NOT NULL DEFAULT 'variation',
        confidence_score REAL NOT NULL DEFAULT 0.5,
        created_at TEXT NOT NULL,
        UNIQUE(entity_id, alias)
    );

    CREATE INDEX IF NOT EXISTS idx_entity_aliases_alias ON entity_aliases(alias COLLATE NOCASE);

    CREATE TABLE IF NOT EXISTS entity_mentions (
        id TEXT PRIMARY KEY NOT NULL,
        entity_id TEXT NOT NULL REFERENCES entities(id),
        message_id TEXT NOT NULL,
        conversation_id TEXT NOT NULL,
        mention_text TEXT NOT NULL,
        start_position INTEGER NOT NULL,
        end_position INTEGER NOT NULL,
        confidence_score REAL NOT NULL DEFAULT 0.5,
        extraction_method TEXT NOT NULL DEFAULT 'unknown',
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entity_mentions_entity ON entity_mentions(entity_id);
    CREATE INDEX IF NOT EXISTS idx_entity_mentions_message ON entity_mentions(message_id);
    CREATE INDEX IF NOT EXISTS idx_entity_mentions_conversation ON entity_mentions(conversation_id);

    CREATE TABLE IF NOT EXISTS entity_relationships (
        id TEXT PRIMARY KEY NOT NULL,
        source_entity_id TEXT NOT NULL REFERENCES entities(id),
        target_entity_id TEXT NOT NULL REFERENCES entities(id),
        relationship_type TEXT NOT NULL,
        strength REAL NOT NULL DEFAULT 0.5,
        first_mentioned_at TEXT NOT NULL,
        last_mentioned_at TEXT NOT NULL,
        mention_count INTEGER NOT NULL DEFAULT 1,
        context_messages TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(source_entity_id, target_entity_id, relationship_type)
    );

    CREATE INDEX IF NOT EXISTS idx_entity_relationships_source ON entity_relationships(source_entity_id);
    CREATE INDEX IF NOT EXISTS idx_entity_relationships_target ON entity_relationships(target_entity_id);
"#;

/// Migration 2: Validation error audit log
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS validation_errors (
        id TEXT PRIMARY KEY NOT NULL,
        table_name TEXT NOT NULL,
        record_id TEXT NOT NULL,
        validation_type TEXT NOT NULL,
        field_name TEXT,
        error_message TEXT NOT NULL,
        severity TEXT NOT NULL,
        auto_correctable INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        corrected_at TEXT,
        correction_method TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_validation_errors_record ON validation_errors(table_name, record_id);
    CREATE INDEX IF NOT EXISTS idx_validation_errors_created ON validation_errors(created_at);
"#;

/// Migration 3: Message store backing conversation replay
const MIGRATION_V3: &str = r#"
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY NOT NULL,
        conversation_id TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
"#;

/// Get the current schema version from the database
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
        tracing::info!("Applying migration v1: Entity graph");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Validation error log");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    if current_version < 3 {
        tracing::info!("Applying migration v3: Message store");
        sqlx::raw_sql(MIGRATION_V3).execute(pool).await?;
        record_migration(pool, 3).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
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
