use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo_types::{NewUser, ProfileUpdate, User, UserRow},
    store::{StoreError, UserStore},
};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, is_verified, \
     verification_token, reset_password_token, reset_password_expires, created_at, updated_at";

/// Postgres-backed user store.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn to_user(row: UserRow) -> Result<User, StoreError> {
    User::try_from(row).map_err(StoreError::Corrupt)
}

fn map_write_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate("email"),
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_user).transpose()
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE reset_password_token = $1
               AND reset_password_expires > $2
            "#
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_user).transpose()
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(to_user).collect()
    }

    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, role,
                               is_verified, verification_token)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.role.as_str())
        .bind(&new.verification_token)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_err)?;
        to_user(row)
    }

    async fn mark_verified(&self, token: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET is_verified = TRUE,
                   verification_token = NULL,
                   updated_at = now()
             WHERE verification_token = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_user).transpose()
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET reset_password_token = $2,
                   reset_password_expires = $3,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(token)
        .bind(expires)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_user).transpose()
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET password_hash = $3,
                   reset_password_token = NULL,
                   reset_password_expires = NULL,
                   updated_at = now()
             WHERE reset_password_token = $1
               AND reset_password_expires > $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(token)
        .bind(now)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_user).transpose()
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   first_name = COALESCE($3, first_name),
                   last_name = COALESCE($4, last_name),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.email)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_err)?;
        row.map(to_user).transpose()
    }

    async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET password_hash = $2,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_user).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
