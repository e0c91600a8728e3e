//! Relational descriptor store: `users` and `recognition_logs`
//! tables, the exclusive owner of `User` rows. `sqlx`/`PgPool` in the
//! service-function style, using the runtime `sqlx::query_as::<_, T>` form
//! rather than the `query_as!` compile-time macros, which need a live
//! database or cached `.sqlx` metadata at build time this crate doesn't
//! have.

pub mod error;

use async_trait::async_trait;
use chrono::Utc;
use facesrec_metrics::FaceMetrics;
use facesrec_types::{Descriptor, User, UserId};
pub use error::{Result, StoreError};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use std::time::{Duration, Instant};

/// Schema this crate expects to already exist. The core consumes these
/// tables; it does not create or migrate them:
///
/// ```sql
/// CREATE TABLE users (
///     user_id              BIGSERIAL PRIMARY KEY,
///     external_id          TEXT NOT NULL,
///     display_name         TEXT NOT NULL,
///     client_ref           TEXT NOT NULL,
///     descriptor           JSONB NOT NULL,
///     confidence           REAL NOT NULL,
///     active               BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
///     updated_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
///     last_recognition_at  TIMESTAMPTZ,
///     recognition_count    BIGINT NOT NULL DEFAULT 0
/// );
/// CREATE UNIQUE INDEX users_external_id_active_uq
///     ON users (external_id) WHERE active;
///
/// CREATE TABLE recognition_logs (
///     id         BIGSERIAL PRIMARY KEY,
///     user_id    BIGINT REFERENCES users(user_id),
///     event      TEXT NOT NULL,
///     detail     JSONB,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
/// );
/// ```
pub const SCHEMA_DOC: &str = "see module docs";

/// A fire-and-forget event appended to `recognition_logs`. Failure to append must never fail the caller's operation.
#[derive(Clone, Debug)]
pub struct LogEvent {
    pub user_id: Option<UserId>,
    pub event: String,
    pub detail: Option<serde_json::Value>,
}

/// The descriptor store's public contract.
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<UserId>;
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>>;
    async fn list_active(&self) -> Result<Vec<User>>;
    async fn update_descriptor(&self, user_id: UserId, descriptor: &Descriptor, confidence: f32) -> Result<()>;
    async fn soft_delete(&self, user_id: UserId) -> Result<()>;
    async fn count_active(&self) -> Result<u64>;
    async fn append_log(&self, event: LogEvent);
    /// Closes any underlying connection pool. Called once during shutdown;
    /// a no-op for stores with nothing to close.
    async fn close(&self) {}
}

/// Fields required to enroll a new user.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub external_id: String,
    pub display_name: String,
    pub client_ref: String,
    pub descriptor: Descriptor,
    pub confidence: f32,
}

struct UserRow {
    user_id: i64,
    external_id: String,
    display_name: String,
    client_ref: String,
    descriptor: serde_json::Value,
    confidence: f32,
    active: bool,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    last_recognition_at: Option<chrono::DateTime<Utc>>,
    recognition_count: i64,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            external_id: row.try_get("external_id")?,
            display_name: row.try_get("display_name")?,
            client_ref: row.try_get("client_ref")?,
            descriptor: row.try_get("descriptor")?,
            confidence: row.try_get("confidence")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            last_recognition_at: row.try_get("last_recognition_at")?,
            recognition_count: row.try_get("recognition_count")?,
        })
    }
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let descriptor = Descriptor::from_json(&self.descriptor)
            .map_err(|e| StoreError::MalformedDescriptor(self.user_id as u64, e.to_string()))?;
        Ok(User {
            user_id: UserId(self.user_id as u64),
            external_id: self.external_id,
            display_name: self.display_name,
            client_ref: self.client_ref,
            descriptor,
            confidence: self.confidence,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_recognition_at: self.last_recognition_at,
            recognition_count: self.recognition_count as u64,
        })
    }
}

/// Postgres-backed `DescriptorStore`.
pub struct PgDescriptorStore {
    pool: PgPool,
    metrics: FaceMetrics,
}

impl PgDescriptorStore {
    pub async fn connect(database_url: &str, metrics: FaceMetrics) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(20)
            .idle_timeout(Duration::from_secs(30))
            // spec §5 "5 s connect": bounds how long a borrowed connection
            // attempt (including the initial one) can block on an
            // unreachable database before the pool gives up.
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool, metrics })
    }

    pub fn from_pool(pool: PgPool, metrics: FaceMetrics) -> Self {
        Self { pool, metrics }
    }
}

#[async_trait]
impl DescriptorStore for PgDescriptorStore {
    #[tracing::instrument(skip(self, user))]
    async fn create(&self, user: NewUser) -> Result<UserId> {
        let started = Instant::now();
        let existing = self.find_by_external_id(&user.external_id).await?;
        if existing.is_some() {
            return Err(StoreError::Duplicate(user.external_id));
        }

        let row: std::result::Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO users (external_id, display_name, client_ref, descriptor, confidence, active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING user_id
            "#,
        )
        .bind(&user.external_id)
        .bind(&user.display_name)
        .bind(&user.client_ref)
        .bind(user.descriptor.to_json())
        .bind(user.confidence)
        .fetch_one(&self.pool)
        .await;

        self.metrics.record_db_query("create", started.elapsed());
        match row {
            Ok(row) => Ok(UserId(row.0 as u64)),
            // The find-then-insert check above is racy under concurrent
            // enrollment of the same external_id; `users_external_id_active_uq`
            // is the backstop, so a unique-violation here still surfaces as
            // `Duplicate` rather than a raw database error.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Duplicate(user.external_id)),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let started = Instant::now();
        let row: Option<UserRow> = sqlx::query_as(
            r#"SELECT * FROM users WHERE external_id = $1 AND active = TRUE"#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        self.metrics.record_db_query("find_by_external_id", started.elapsed());
        row.map(UserRow::into_user).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>> {
        let started = Instant::now();
        let row: Option<UserRow> = sqlx::query_as(r#"SELECT * FROM users WHERE user_id = $1"#)
            .bind(user_id.0 as i64)
            .fetch_optional(&self.pool)
            .await?;
        self.metrics.record_db_query("find_by_id", started.elapsed());
        row.map(UserRow::into_user).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_active(&self) -> Result<Vec<User>> {
        let started = Instant::now();
        let rows: Vec<UserRow> = sqlx::query_as(r#"SELECT * FROM users WHERE active = TRUE"#)
            .fetch_all(&self.pool)
            .await?;
        self.metrics.record_db_query("list_active", started.elapsed());
        rows.into_iter().map(UserRow::into_user).collect()
    }

    #[tracing::instrument(skip(self, descriptor))]
    async fn update_descriptor(&self, user_id: UserId, descriptor: &Descriptor, confidence: f32) -> Result<()> {
        let started = Instant::now();
        let result = sqlx::query(
            r#"UPDATE users SET descriptor = $1, confidence = $2, updated_at = now() WHERE user_id = $3"#,
        )
        .bind(descriptor.to_json())
        .bind(confidence)
        .bind(user_id.0 as i64)
        .execute(&self.pool)
        .await?;
        self.metrics.record_db_query("update_descriptor", started.elapsed());

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(user_id.to_string()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn soft_delete(&self, user_id: UserId) -> Result<()> {
        let started = Instant::now();
        let result = sqlx::query(r#"UPDATE users SET active = FALSE, updated_at = now() WHERE user_id = $1"#)
            .bind(user_id.0 as i64)
            .execute(&self.pool)
            .await?;
        self.metrics.record_db_query("soft_delete", started.elapsed());

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(user_id.to_string()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn count_active(&self) -> Result<u64> {
        let started = Instant::now();
        let row: (i64,) = sqlx::query_as(r#"SELECT count(*) FROM users WHERE active = TRUE"#)
            .fetch_one(&self.pool)
            .await?;
        self.metrics.record_db_query("count_active", started.elapsed());
        Ok(row.0 as u64)
    }

    /// Fire-and-forget: failures are logged and swallowed, never bubbled up
    /// to the caller's operation.
    #[tracing::instrument(skip(self, event))]
    async fn append_log(&self, event: LogEvent) {
        let started = Instant::now();
        let result = sqlx::query(
            r#"INSERT INTO recognition_logs (user_id, event, detail) VALUES ($1, $2, $3)"#,
        )
        .bind(event.user_id.map(|u| u.0 as i64))
        .bind(&event.event)
        .bind(event.detail)
        .execute(&self.pool)
        .await;
        self.metrics.record_db_query("append_log", started.elapsed());

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to append recognition log, continuing");
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_row_descriptor_roundtrip() {
        let d = Descriptor([0.25f32; facesrec_types::DESCRIPTOR_DIM]);
        let json = d.to_json();
        let row = UserRow {
            user_id: 1,
            external_id: "ext".into(),
            display_name: "name".into(),
            client_ref: "client".into(),
            descriptor: json,
            confidence: 0.9,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_recognition_at: None,
            recognition_count: 0,
        };
        let user = row.into_user().unwrap();
        assert_eq!(user.descriptor, d);
        assert_eq!(user.user_id, UserId(1));
    }

    #[test]
    fn user_row_rejects_malformed_descriptor() {
        let row = UserRow {
            user_id: 2,
            external_id: "ext".into(),
            display_name: "name".into(),
            client_ref: "client".into(),
            descriptor: serde_json::json!([1.0, 2.0]),
            confidence: 0.9,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_recognition_at: None,
            recognition_count: 0,
        };
        assert!(row.into_user().is_err());
    }
}
