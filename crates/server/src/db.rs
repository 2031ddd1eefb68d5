// PostgreSQL schema management for the chat server.
//
// The message store is the marketplace's source of truth for chat
// history; the schema is intentionally append-only apart from the
// `is_read` flag.

use anyhow::{Context, Result};
use sqlx::PgPool;

const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id              UUID PRIMARY KEY,
        display_name    TEXT NOT NULL,
        avatar_url      TEXT NULL
    );

    CREATE TABLE IF NOT EXISTS messages (
        id              UUID PRIMARY KEY,
        sender_id       UUID NOT NULL,
        receiver_id     UUID NOT NULL,
        body            TEXT NOT NULL,
        is_read         BOOLEAN NOT NULL DEFAULT FALSE,
        created_at      TIMESTAMPTZ NOT NULL
    );

    CREATE INDEX IF NOT EXISTS messages_sender_idx ON messages (sender_id, created_at);
    CREATE INDEX IF NOT EXISTS messages_receiver_idx ON messages (receiver_id, created_at);
    "#,
)];

/// Create the connection pool and bring the schema up to date.
pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to the chat database")?;
    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     BIGINT PRIMARY KEY,
            applied_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await
    .context("failed to ensure schema_migrations table exists")?;

    let current: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(pool)
            .await
            .context("failed to read current schema version")?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .with_context(|| format!("failed to apply migration v{version}"))?;
        sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
            .bind(*version)
            .execute(pool)
            .await
            .with_context(|| format!("failed to record migration v{version}"))?;
    }

    Ok(())
}
