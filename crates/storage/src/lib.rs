use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::UserId;

const IDENTITY_KEY: &str = "user_id";

/// Durable client-side key/value state. Only the authenticated identity lives here.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            // a single connection keeps `sqlite::memory:` databases shared across calls
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open session database '{database_url}'"))?;
        let storage = Self { pool };
        storage.ensure_session_table().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_session_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS client_session (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create client_session table")?;
        Ok(())
    }

    pub async fn load_identity(&self) -> Result<Option<UserId>> {
        let raw_value: Option<String> =
            sqlx::query_scalar("SELECT value FROM client_session WHERE key = ?")
                .bind(IDENTITY_KEY)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read stored identity")?;

        let Some(raw_value) = raw_value else {
            return Ok(None);
        };
        let Ok(user_id) = raw_value.trim().parse::<i64>() else {
            tracing::warn!("ignoring unparseable stored identity");
            return Ok(None);
        };
        Ok(Some(UserId(user_id)))
    }

    pub async fn save_identity(&self, user_id: UserId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO client_session (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(IDENTITY_KEY)
        .bind(user_id.0.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to persist identity")?;
        Ok(())
    }

    /// Returns whether an identity was present.
    pub async fn clear_identity(&self) -> Result<bool> {
        let result = sqlx::query("DELETE FROM client_session WHERE key = ?")
            .bind(IDENTITY_KEY)
            .execute(&self.pool)
            .await
            .context("failed to clear stored identity")?;
        Ok(result.rows_affected() > 0)
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
