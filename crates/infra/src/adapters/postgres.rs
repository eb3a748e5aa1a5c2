//! Postgres-backed collaborator adapters.
//!
//! ## Tables
//!
//! | Table | Columns used | Adapter |
//! |-------|--------------|---------|
//! | `system_settings` | `key` (PK), `value` (text, JSON), `updated_at` | [`PostgresSettingsStore`] |
//! | `attendance` | `user_id`, `date`, `status` | [`PostgresAttendance`] |
//!
//! ## Error Mapping
//!
//! SQLx errors become [`CollaboratorError::Unavailable`]; stored values that do not
//! parse become [`CollaboratorError::Malformed`]. Callers degrade both the same way.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use taskforge_core::UserId;
use taskforge_distribution::{AttendanceSource, CollaboratorError, SettingsStore};

const SETTINGS: &str = "settings";
const ATTENDANCE: &str = "attendance";

/// Settings persisted as JSON text in `system_settings`.
#[derive(Debug, Clone)]
pub struct PostgresSettingsStore {
    pool: Arc<PgPool>,
}

impl PostgresSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl SettingsStore for PostgresSettingsStore {
    #[instrument(skip(self), err)]
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, CollaboratorError> {
        let row = sqlx::query("SELECT value FROM system_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(SETTINGS, "get", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: Option<String> = row
            .try_get("value")
            .map_err(|e| CollaboratorError::malformed(SETTINGS, e.to_string()))?;

        match raw {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| CollaboratorError::malformed(SETTINGS, format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value), err)]
    async fn set(&self, key: &str, value: JsonValue) -> Result<(), CollaboratorError> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key)
            DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(SETTINGS, "set", e))?;

        Ok(())
    }
}

/// Attendance read from the `attendance` table. Any record whose status is not
/// `absent` counts as presence.
#[derive(Debug, Clone)]
pub struct PostgresAttendance {
    pool: Arc<PgPool>,
}

impl PostgresAttendance {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Users marked absent on `date`, sorted by id.
    #[instrument(skip(self), err)]
    pub async fn absent_on(&self, date: NaiveDate) -> Result<Vec<UserId>, CollaboratorError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id
            FROM attendance
            WHERE date = $1 AND status = 'absent'
            ORDER BY user_id ASC
            "#,
        )
        .bind(date)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(ATTENDANCE, "absent_on", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("user_id")
                    .map(UserId::from_uuid)
                    .map_err(|e| CollaboratorError::malformed(ATTENDANCE, e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl AttendanceSource for PostgresAttendance {
    #[instrument(skip(self), err)]
    async fn has_presence(&self, user_id: UserId, date: NaiveDate) -> Result<bool, CollaboratorError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM attendance
                WHERE user_id = $1 AND date = $2 AND status <> 'absent'
            ) AS present
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(date)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(ATTENDANCE, "has_presence", e))?;

        row.try_get("present")
            .map_err(|e| CollaboratorError::malformed(ATTENDANCE, e.to_string()))
    }
}

fn map_sqlx_error(collaborator: &'static str, operation: &str, err: sqlx::Error) -> CollaboratorError {
    match err {
        sqlx::Error::Database(db_err) => CollaboratorError::unavailable(
            collaborator,
            format!("database error in {operation}: {}", db_err.message()),
        ),
        sqlx::Error::PoolClosed => {
            CollaboratorError::unavailable(collaborator, format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            CollaboratorError::unavailable(collaborator, format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            CollaboratorError::malformed(collaborator, format!("decode error in {operation}: {err}"))
        }
        _ => CollaboratorError::unavailable(collaborator, format!("sqlx error in {operation}: {err}")),
    }
}
