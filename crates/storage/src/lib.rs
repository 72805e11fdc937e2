use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::EndpointId;

/// Endpoint-local SQLite store holding one session snapshot per endpoint.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub endpoint: String,
    pub snapshot_json: String,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory URL opens its own database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open snapshot database '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
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

    /// Overwrite the endpoint's snapshot.
    pub async fn save_snapshot(&self, endpoint: EndpointId, snapshot_json: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO endpoint_snapshots (endpoint, snapshot_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(endpoint) DO UPDATE SET
                snapshot_json = excluded.snapshot_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(endpoint.as_str())
        .bind(snapshot_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save snapshot for {endpoint}"))?;
        Ok(())
    }

    pub async fn load_snapshot(&self, endpoint: EndpointId) -> Result<Option<StoredSnapshot>> {
        let row = sqlx::query(
            "SELECT endpoint, snapshot_json, updated_at FROM endpoint_snapshots WHERE endpoint = ?1",
        )
        .bind(endpoint.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load snapshot for {endpoint}"))?;

        row.map(|row| -> Result<StoredSnapshot> {
            Ok(StoredSnapshot {
                endpoint: row.try_get("endpoint")?,
                snapshot_json: row.try_get("snapshot_json")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    /// Returns whether a snapshot existed.
    pub async fn clear_snapshot(&self, endpoint: EndpointId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM endpoint_snapshots WHERE endpoint = ?1")
            .bind(endpoint.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to clear snapshot for {endpoint}"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_snapshots(&self) -> Result<Vec<StoredSnapshot>> {
        let rows = sqlx::query(
            "SELECT endpoint, snapshot_json, updated_at FROM endpoint_snapshots ORDER BY endpoint",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list snapshots")?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredSnapshot {
                    endpoint: row.try_get("endpoint")?,
                    snapshot_json: row.try_get("snapshot_json")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
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
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
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
