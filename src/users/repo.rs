use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::users::repo_types::{NewUser, User, UserChanges};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,

    #[error("email already registered")]
    DuplicateEmail,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable CRUD over account records.
///
/// Every id-addressed operation reports `StoreError::NotFound` when no row
/// matches, and every write that would repeat an email reports
/// `StoreError::DuplicateEmail`.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    async fn get(&self, id: i64) -> Result<User, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;
    async fn list(&self) -> Result<Vec<User>, StoreError>;
    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// `AccountStore` backed by a pooled PostgreSQL connection set.
#[derive(Clone)]
pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    #[instrument(skip(self, user))]
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, password, created_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_err)?;
        debug!(user_id = user.id, "user inserted");
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, name, email, password, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self, email))]
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, name, email, password, created_at FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(
            r#"SELECT id, name, email, password, created_at FROM users ORDER BY id"#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET name = $1, email = $2
            WHERE id = $3
            RETURNING id, name, email, password, created_at
            "#,
        )
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_err)?
        .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
