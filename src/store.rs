//! Snapshot persistence
//!
//! Append-only SQLite table of collection results. The core never updates or
//! deletes rows; retention belongs to whoever operates the database.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::models::{ServiceCheck, Snapshot, StatusReport};

/// Opens (creating if missing) the database and runs embedded migrations.
pub async fn create_pool(database_url: &str) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: i64,
    healthy: i64,
    total: i64,
    all_healthy: bool,
    services: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = AppError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let services: Vec<ServiceCheck> = serde_json::from_str(&row.services)
            .map_err(|source| AppError::CorruptSnapshot { id: row.id, source })?;

        Ok(Snapshot {
            id: row.id,
            healthy: row.healthy as u32,
            total: row.total as u32,
            all_healthy: row.all_healthy,
            services,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // round-trip used by the liveness route
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert(&self, report: &StatusReport) -> AppResult<Snapshot> {
        self.insert_at(report, Utc::now()).await
    }

    pub async fn insert_at(
        &self,
        report: &StatusReport,
        created_at: DateTime<Utc>,
    ) -> AppResult<Snapshot> {
        let services = serde_json::to_string(&report.services)?;

        let result = sqlx::query(
            r#"
            INSERT INTO uptime_snapshots (healthy, total, all_healthy, services, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.summary.healthy as i64)
        .bind(report.summary.total as i64)
        .bind(report.summary.all_healthy)
        .bind(&services)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Snapshot {
            id: result.last_insert_rowid(),
            healthy: report.summary.healthy,
            total: report.summary.total,
            all_healthy: report.summary.all_healthy,
            services: report.services.clone(),
            created_at,
        })
    }

    /// Most recent `limit` snapshots, newest first.
    pub async fn recent(&self, limit: u32) -> AppResult<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, healthy, total, all_healthy, services, created_at
            FROM uptime_snapshots
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Snapshot::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceCheck;

    async fn memory_store() -> SnapshotStore {
        let pool = create_pool("sqlite::memory:")
            .await
            .expect("Failed to create in-memory pool");
        SnapshotStore::new(pool)
    }

    fn report(oks: &[bool]) -> StatusReport {
        StatusReport::new(
            oks.iter()
                .enumerate()
                .map(|(i, ok)| ServiceCheck {
                    name: format!("svc-{i}"),
                    ok: *ok,
                    status_code: Some(if *ok { 200 } else { 503 }),
                    error: (!ok).then(|| "HTTP 503".to_string()),
                    latency_ms: 3,
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_insert_returns_persisted_snapshot() {
        let store = memory_store().await;

        let saved = store.insert(&report(&[true, false, true])).await.unwrap();
        assert!(saved.id > 0);
        assert_eq!(saved.healthy, 2);
        assert_eq!(saved.total, 3);
        assert!(!saved.all_healthy);

        let loaded = store.recent(10).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].services, saved.services);
        assert_eq!(loaded[0].id, saved.id);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_bounded() {
        let store = memory_store().await;
        let base = Utc::now() - chrono::Duration::hours(10);

        for hour in 0..5 {
            store
                .insert_at(&report(&[true]), base + chrono::Duration::hours(hour))
                .await
                .unwrap();
        }

        let recent = store.recent(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent.windows(2).all(|w| w[0].created_at > w[1].created_at));
        assert_eq!(recent[0].created_at, base + chrono::Duration::hours(4));
    }

    #[tokio::test]
    async fn test_corrupt_services_column_is_reported() {
        let store = memory_store().await;
        sqlx::query(
            "INSERT INTO uptime_snapshots (healthy, total, all_healthy, services, created_at) VALUES (0, 0, 1, 'nope', ?)",
        )
        .bind(Utc::now())
        .execute(store.pool())
        .await
        .unwrap();

        let err = store.recent(1).await.unwrap_err();
        assert!(matches!(err, AppError::CorruptSnapshot { .. }));
    }

    #[tokio::test]
    async fn test_ping_fails_once_pool_closed() {
        let store = memory_store().await;
        assert!(store.ping().await.is_ok());

        store.pool().close().await;
        assert!(matches!(store.ping().await, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_create_pool_with_invalid_url() {
        let result = create_pool("invalid://url").await;
        assert!(result.is_err());
    }
}
