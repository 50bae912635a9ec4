use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use vigil_model::{
    PortResult, Scan, ScanId, ScanStatus, ScanType, SubdomainResult,
};

use crate::error::{Result, VigilError};
use crate::store::ScanStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scans (
    id           UUID PRIMARY KEY,
    name         VARCHAR(255) NOT NULL,
    target       VARCHAR(255) NOT NULL,
    scan_type    TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'PENDING',
    progress     SMALLINT NOT NULL DEFAULT 0,
    subdomains   JSONB NOT NULL DEFAULT '[]'::jsonb,
    open_ports   JSONB NOT NULL DEFAULT '[]'::jsonb,
    error        TEXT,
    started_at   TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Postgres-backed scan store.
///
/// Result lists live in JSONB columns and are appended with `||`, so an
/// append is a single per-row atomic statement and concurrent readers
/// always see a consistent list.
#[derive(Debug, Clone)]
pub struct PostgresScanStore {
    pool: PgPool,
}

impl PostgresScanStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent schema setup, run once at startup.
    pub async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn map_row(row: &PgRow) -> Result<Scan> {
        let id: Uuid = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let target: String = row.try_get("target")?;
        let scan_type: String = row.try_get("scan_type")?;
        let status: String = row.try_get("status")?;
        let progress: i16 = row.try_get("progress")?;
        let subdomains: serde_json::Value = row.try_get("subdomains")?;
        let open_ports: serde_json::Value = row.try_get("open_ports")?;
        let error: Option<String> = row.try_get("error")?;
        let started_at: Option<DateTime<Utc>> = row.try_get("started_at")?;
        let completed_at: Option<DateTime<Utc>> =
            row.try_get("completed_at")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        let subdomains: Vec<SubdomainResult> =
            serde_json::from_value(subdomains)?;
        let open_ports: Vec<PortResult> = serde_json::from_value(open_ports)?;

        Ok(Scan {
            id: ScanId(id),
            name,
            target,
            scan_type: ScanType::from_str(&scan_type)
                .map_err(VigilError::Internal)?,
            status: ScanStatus::from_str(&status)
                .map_err(VigilError::Internal)?,
            progress: progress.clamp(0, 100) as u8,
            subdomains,
            open_ports,
            error,
            started_at,
            completed_at,
            created_at,
            updated_at,
        })
    }

    async fn current_status(&self, id: ScanId) -> Result<ScanStatus> {
        let row = sqlx::query("SELECT status FROM scans WHERE id = $1")
            .bind(id.to_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(VigilError::NotFound(id))?;
        let status: String = row.try_get("status")?;
        ScanStatus::from_str(&status).map_err(VigilError::Internal)
    }
}

#[async_trait]
impl ScanStore for PostgresScanStore {
    async fn create(&self, scan: Scan) -> Result<Scan> {
        sqlx::query(
            r#"
            INSERT INTO scans
                (id, name, target, scan_type, status, progress,
                 subdomains, open_ports, error,
                 started_at, completed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(scan.id.to_uuid())
        .bind(&scan.name)
        .bind(&scan.target)
        .bind(scan.scan_type.to_string())
        .bind(scan.status.to_string())
        .bind(scan.progress as i16)
        .bind(serde_json::to_value(&scan.subdomains)?)
        .bind(serde_json::to_value(&scan.open_ports)?)
        .bind(&scan.error)
        .bind(scan.started_at)
        .bind(scan.completed_at)
        .bind(scan.created_at)
        .bind(scan.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(scan)
    }

    async fn get(&self, id: ScanId) -> Result<Option<Scan>> {
        let row = sqlx::query("SELECT * FROM scans WHERE id = $1")
            .bind(id.to_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Scan>> {
        let rows =
            sqlx::query("SELECT * FROM scans ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn mark_running(&self, id: ScanId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = 'RUNNING', progress = 0,
                started_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id.to_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(VigilError::InvalidTransition {
                from: self.current_status(id).await?,
                to: ScanStatus::Running,
            });
        }
        Ok(())
    }

    async fn update_progress(&self, id: ScanId, progress: u8) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET progress = GREATEST(progress, $2), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.to_uuid())
        .bind(progress.min(100) as i16)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(VigilError::NotFound(id));
        }
        Ok(())
    }

    async fn add_subdomain(
        &self,
        id: ScanId,
        result: SubdomainResult,
    ) -> Result<()> {
        let affected = sqlx::query(
            r#"
            UPDATE scans
            SET subdomains = subdomains || $2::jsonb, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.to_uuid())
        .bind(serde_json::to_value(vec![result])?)
        .execute(&self.pool)
        .await?;

        if affected.rows_affected() == 0 {
            return Err(VigilError::NotFound(id));
        }
        Ok(())
    }

    async fn add_port(&self, id: ScanId, result: PortResult) -> Result<()> {
        let affected = sqlx::query(
            r#"
            UPDATE scans
            SET open_ports = open_ports || $2::jsonb, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.to_uuid())
        .bind(serde_json::to_value(vec![result])?)
        .execute(&self.pool)
        .await?;

        if affected.rows_affected() == 0 {
            return Err(VigilError::NotFound(id));
        }
        Ok(())
    }

    async fn complete(&self, id: ScanId) -> Result<Scan> {
        let row = sqlx::query(
            r#"
            UPDATE scans
            SET status = 'COMPLETED', progress = 100,
                completed_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'RUNNING'
            RETURNING *
            "#,
        )
        .bind(id.to_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::map_row(&row),
            None => Err(VigilError::InvalidTransition {
                from: self.current_status(id).await?,
                to: ScanStatus::Completed,
            }),
        }
    }

    async fn fail(&self, id: ScanId, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = 'FAILED', error = $2,
                completed_at = now(), updated_at = now()
            WHERE id = $1 AND status IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(id.to_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(VigilError::InvalidTransition {
                from: self.current_status(id).await?,
                to: ScanStatus::Failed,
            });
        }
        Ok(())
    }
}
