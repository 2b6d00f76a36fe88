//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::{Connection, params};

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                marketplace TEXT NOT NULL,
                credential_ref TEXT NOT NULL,
                client_id TEXT,
                shop_name TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_sync TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_active ON accounts(is_active);
            CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);

            CREATE TABLE IF NOT EXISTS rules (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                min_rating INTEGER NOT NULL DEFAULT 1,
                max_rating INTEGER NOT NULL DEFAULT 5,
                keywords_include TEXT NOT NULL DEFAULT '[]',
                keywords_exclude TEXT NOT NULL DEFAULT '[]',
                require_moderation INTEGER NOT NULL DEFAULT 1,
                custom_instructions TEXT,
                tone TEXT NOT NULL DEFAULT 'friendly',
                priority INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rules_user ON rules(user_id, is_active);

            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                external_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                text TEXT,
                product_name TEXT,
                product_id TEXT,
                customer_name TEXT,
                marketplace_created_at TEXT,
                created_at TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                response_text TEXT,
                tokens_used INTEGER,
                cost TEXT,
                moderation_status TEXT NOT NULL DEFAULT 'pending',
                response_sent INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT,
                last_error TEXT,
                UNIQUE (account_id, external_id)
            );
            CREATE INDEX IF NOT EXISTS idx_reviews_account ON reviews(account_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_moderation
                ON reviews(processed, moderation_status);
            CREATE INDEX IF NOT EXISTS idx_reviews_unsent
                ON reviews(response_sent, moderation_status);
        "#,
    },
    Migration {
        version: 2,
        name: "llm_call_ledger",
        sql: r#"
            CREATE TABLE IF NOT EXISTS llm_calls (
                id TEXT PRIMARY KEY,
                review_id TEXT,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_llm_calls_review ON llm_calls(review_id);
            CREATE INDEX IF NOT EXISTS idx_llm_calls_created ON llm_calls(created_at);
        "#,
    },
];

/// Run all pending migrations against the given connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }
        conn.execute_batch(migration.sql).await.map_err(|e| {
            DatabaseError::Migration(format!(
                "Migration V{} ({}) failed: {e}",
                migration.version, migration.name
            ))
        })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )
        .await
        .map_err(|e| {
            DatabaseError::Migration(format!(
                "Failed to record migration V{}: {e}",
                migration.version
            ))
        })?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied migration"
        );
    }

    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration state: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Migration(format!(
            "Failed to read migration state: {e}"
        ))),
    }
}
