use anyhow::{ensure, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;
use uuid::Uuid;

use crate::models::{NewNotification, NotificationRecord, UserAccount};

/// Upper bound on a single atomic multi-document delete. Candidate sets
/// larger than this must be chunked by the caller.
pub const MAX_BATCH_SIZE: usize = 500;

pub const FCM_TOKENS: &str = "fcmTokens";
pub const NOTIFICATIONS: &str = "notifications";
pub const USERS: &str = "users";

/// Collection-oriented document store. Per-document writes are atomic;
/// `delete_batch` applies all-or-nothing for a single call.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_push_token(&self, user_id: &str) -> Result<Option<String>>;

    async fn delete_push_token(&self, user_id: &str) -> Result<()>;

    async fn get_user(&self, uid: &str) -> Result<Option<UserAccount>>;

    async fn insert_user(&self, user: &UserAccount) -> Result<()>;

    /// Assigns the record id and server timestamp.
    async fn insert_notification(&self, new: NewNotification) -> Result<NotificationRecord>;

    /// Ids of documents in `collection` whose `field` equals `value`.
    async fn find_ids_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<String>>;

    /// Ids of notification records strictly older than `cutoff`.
    async fn find_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    /// Deletes up to [`MAX_BATCH_SIZE`] documents of one collection in a
    /// single atomic statement, returning the number actually deleted.
    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<u64>;
}

pub async fn init_db_pool(database_url: &str) -> Result<Pool<Postgres>> {
    info!("Initializing database connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Postgres rendition of the document store: one `documents` table keyed by
/// (collection, id) with a JSONB payload, so ownership sweeps can query any
/// (collection, field) pair without per-collection schema.
pub struct PgDocumentStore {
    pool: Pool<Postgres>,
}

impl PgDocumentStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_push_token(&self, user_id: &str) -> Result<Option<String>> {
        let token: Option<Option<String>> = sqlx::query_scalar(
            "SELECT data->>'token' FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(FCM_TOKENS)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token.flatten())
    }

    async fn delete_push_token(&self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(FCM_TOKENS)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> Result<Option<UserAccount>> {
        let data: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT data FROM documents WHERE collection = $1 AND id = $2")
                .bind(USERS)
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;

        match data {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn insert_user(&self, user: &UserAccount) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(USERS)
        .bind(&user.uid)
        .bind(serde_json::to_value(user)?)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_notification(&self, new: NewNotification) -> Result<NotificationRecord> {
        let record = NotificationRecord {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            title: new.title,
            body: new.body,
            category: new.category,
            data: new.data,
            read: false,
            created_at: Utc::now(),
            dispatch_ref: new.dispatch_ref,
        };

        sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(NOTIFICATIONS)
        .bind(&record.id)
        .bind(serde_json::to_value(&record)?)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_ids_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM documents WHERE collection = $1 AND data->>$2::text = $3",
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn find_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM documents WHERE collection = $1 AND created_at < $2",
        )
        .bind(NOTIFICATIONS)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<u64> {
        ensure!(
            ids.len() <= MAX_BATCH_SIZE,
            "batch of {} exceeds store limit of {}",
            ids.len(),
            MAX_BATCH_SIZE
        );
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = ANY($2)")
            .bind(collection)
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
